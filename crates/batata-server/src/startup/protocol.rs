//! Consistency protocol wiring
//!
//! Builds the [`ProtocolRegistry`] the protocol manager discovers its
//! protocols from. Standalone nodes link the in-process AP and CP protocols;
//! cluster deployments register their networked implementations here.

use std::sync::Arc;

use tracing::{info, warn};

use batata_consistency::{ProtocolRegistry, StandaloneApProtocol, StandaloneCpProtocol};
use batata_core::Configuration;

/// Build the protocol registry for this node
pub fn protocol_registry(configuration: &Configuration) -> ProtocolRegistry {
    let mut registry = ProtocolRegistry::new();

    let raft_config = configuration.raft_config();
    let distro_config = configuration.distro_config();
    registry
        .provide_config(move || raft_config.clone())
        .provide_config(move || distro_config.clone());

    if configuration.is_standalone() {
        registry
            .register_ap(Arc::new(StandaloneApProtocol::new()))
            .register_cp(Arc::new(StandaloneCpProtocol::new()));
        info!(kinds = ?registry.kinds(), "Registered standalone consistency protocols");
    } else {
        warn!("No networked consistency protocol is linked in, cluster mode runs without AP and CP protocols");
    }

    registry
}
