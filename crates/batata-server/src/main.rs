//! Main entry point for the Batata server node.
//!
//! Starts cluster membership, brings the consistency protocols up and tears
//! everything down again on Ctrl+C or SIGTERM.

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};

use batata_core::{ProtocolManager, cluster::ServerMemberManager};
use batata_server::{
    config::Cli,
    metrics::{self, Timer},
    startup::{self, LoggingConfig},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let configuration = cli.load_configuration()?;

    let logging_config = LoggingConfig::from_configuration(&configuration);
    let _logging_guard = startup::init_logging(&logging_config)?;

    metrics::init_metrics();

    info!(
        version = %configuration.version(),
        mode = if configuration.is_standalone() { "standalone" } else { "cluster" },
        port = configuration.server_main_port(),
        "Starting Batata server"
    );

    // Cluster membership
    let member_manager = Arc::new(ServerMemberManager::with_config(
        &configuration,
        configuration.server_member_manager_config(),
    ));
    member_manager.start().await;
    metrics::set_cluster_members(member_manager.member_count());

    // Consistency protocols
    let timer = Timer::new();
    let registry = startup::protocol_registry(&configuration);
    let protocol_manager = ProtocolManager::start(
        member_manager.clone(),
        &registry,
        configuration.protocol_manager_config(),
    )
    .await;
    if let Err(e) = protocol_manager.check_startup() {
        error!(error = %e, "Consistency protocol startup incomplete");
        for (kind, cause) in protocol_manager.startup_errors() {
            warn!(%kind, error = %cause, "Protocol unavailable");
        }
    }
    metrics::set_active_protocols(&protocol_manager.active_kinds());
    metrics::record_protocol_startup(timer.elapsed_secs());

    protocol_manager.on_context_started();
    info!(
        local_address = %member_manager.local_address(),
        active = ?protocol_manager.active_kinds(),
        "Batata server started"
    );

    startup::wait_for_shutdown_signal().wait().await;

    if let Err(e) = protocol_manager.destroy().await {
        error!(error = %e, "Consistency protocols did not shut down cleanly");
    }
    member_manager.stop().await;
    info!("Batata server stopped");

    Ok(())
}
