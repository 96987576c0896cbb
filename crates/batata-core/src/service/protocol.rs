// Consistency protocol lifecycle management
// Discovers the AP and CP protocols, injects cluster membership into their
// configuration, keeps them informed of member changes and shuts them down

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, error, info, warn};

use batata_api::model::Member;
use batata_common::BatataError;
use batata_consistency::{
    ConsistencyError, ProtocolConfig, ProtocolHandle, ProtocolKind, ProtocolRegistry,
};

use super::{
    cluster::MembershipSource,
    member_event::{MemberChangeListener, MembersChangeEvent},
    protocol_executor::ProtocolExecutor,
};

/// Protocol manager configuration
#[derive(Clone, Debug)]
pub struct ProtocolManagerConfig {
    /// How long queued member changes may keep running once shutdown starts
    pub drain_timeout: Duration,
}

impl Default for ProtocolManagerConfig {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(3),
        }
    }
}

/// Owns the active consistency protocols of this node
///
/// The protocol map is filled once during [`ProtocolManager::start`] and never
/// changes afterwards. Member changes are dispatched per kind on a
/// [`ProtocolExecutor`], so each protocol sees changes in the order they were
/// raised while a slow protocol never holds up the other one.
pub struct ProtocolManager {
    protocols: HashMap<ProtocolKind, Arc<dyn ProtocolHandle>>,
    startup_errors: HashMap<ProtocolKind, ConsistencyError>,
    executor: ProtocolExecutor,
    config: ProtocolManagerConfig,
    shutting_down: AtomicBool,
}

impl std::fmt::Debug for ProtocolManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolManager")
            .field("active", &self.active_kinds())
            .field("startup_errors", &self.startup_errors)
            .field("config", &self.config)
            .field("shutting_down", &self.is_shutdown())
            .finish()
    }
}

impl ProtocolManager {
    /// Initialize every registered protocol, then subscribe to member changes.
    ///
    /// Each kind is initialized on its own task. A kind that is not registered
    /// is skipped; a kind whose configuration or `init` fails is recorded in
    /// [`ProtocolManager::startup_errors`] and stays inactive, without
    /// affecting the other kind.
    pub async fn start(
        source: Arc<dyn MembershipSource>,
        registry: &ProtocolRegistry,
        config: ProtocolManagerConfig,
    ) -> Arc<Self> {
        let self_member = source.self_member();
        let members = source.all_members();

        let mut startup_errors = HashMap::new();
        let mut pending = Vec::new();

        for kind in ProtocolKind::ALL {
            let Some(protocol) = registry.find_if_present(kind) else {
                debug!(%kind, "No protocol registered, skipping");
                continue;
            };

            match Self::prepare_config(kind, protocol.as_ref(), registry, &self_member, &members) {
                Ok(protocol_config) => {
                    info!(
                        %kind,
                        self_member = protocol_config.self_member(),
                        peers = protocol_config.members().len(),
                        processors = protocol_config.log_processors().len(),
                        "Initializing consistency protocol"
                    );
                    let handle = protocol.clone();
                    let init = tokio::spawn(async move { handle.init(protocol_config).await });
                    pending.push((kind, protocol, init));
                }
                Err(e) => {
                    error!(%kind, error = %e, "Failed to configure consistency protocol");
                    startup_errors.insert(kind, e);
                }
            }
        }

        let mut protocols = HashMap::new();
        let outcomes = join_all(pending.into_iter().map(|(kind, protocol, init)| async move {
            (kind, protocol, init.await)
        }))
        .await;

        for (kind, protocol, outcome) in outcomes {
            let result = match outcome {
                Ok(result) => result,
                Err(e) => Err(ConsistencyError::Internal(format!("init task aborted: {}", e))),
            };
            match result {
                Ok(()) => {
                    info!(%kind, "Consistency protocol initialized");
                    protocols.insert(kind, protocol);
                }
                Err(e) => {
                    error!(%kind, error = %e, "Consistency protocol failed to initialize");
                    startup_errors.insert(
                        kind,
                        ConsistencyError::InitFailed {
                            kind,
                            reason: e.to_string(),
                        },
                    );
                }
            }
        }

        let manager = Arc::new(Self {
            executor: ProtocolExecutor::new(protocols.keys().copied()),
            protocols,
            startup_errors,
            config,
            shutting_down: AtomicBool::new(false),
        });

        source.subscribe(manager.clone()).await;
        info!(active = ?manager.active_kinds(), "Protocol manager started");

        manager
    }

    /// Build the configuration a protocol consumes, carrying the current
    /// member view and the log processors of its kind
    fn prepare_config(
        kind: ProtocolKind,
        protocol: &dyn ProtocolHandle,
        registry: &ProtocolRegistry,
        self_member: &Member,
        members: &[Member],
    ) -> Result<Box<dyn ProtocolConfig>, ConsistencyError> {
        let config_type = registry.resolve_config_type(protocol);
        let mut config = registry.get_config(&config_type)?;

        let self_address = kind.member_address(self_member)?;
        let peers = kind.member_addresses(
            members
                .iter()
                .filter(|member| member.address != self_member.address),
        )?;

        config.set_members(self_address, peers);
        config.add_log_processors(registry.processors_of_kind(kind));
        Ok(config)
    }

    /// Release the deferred metadata publishing of every active protocol
    pub fn stop_defer_publish(&self) {
        for (kind, protocol) in &self.protocols {
            debug!(%kind, "Stopping defer publish");
            protocol.protocol_meta_data().stop_defer_publish();
        }
    }

    /// Called once the server has fully started
    pub fn on_context_started(&self) {
        info!("Server started, releasing protocol metadata");
        self.stop_defer_publish();
    }

    /// Shut every active protocol down.
    ///
    /// Member changes submitted afterwards are rejected. Changes already
    /// queued may run for up to the configured drain timeout; whatever is
    /// left after that is dropped. Each protocol is shut down even when
    /// another one fails, and all failures are reported together. Calling
    /// this again does nothing.
    pub async fn destroy(&self) -> batata_common::Result<()> {
        if self
            .shutting_down
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Protocol manager already shut down");
            return Ok(());
        }

        info!("Shutting down consistency protocols");

        let dropped = self.executor.shutdown(self.config.drain_timeout).await;
        if !dropped.is_empty() {
            warn!(kinds = ?dropped, "Dropped queued member changes at shutdown");
        }

        let shutdowns = self.protocols.iter().map(|(kind, protocol)| {
            let kind = *kind;
            let protocol = protocol.clone();
            async move {
                let outcome = tokio::spawn(async move { protocol.shutdown().await }).await;
                (kind, outcome)
            }
        });
        let mut outcomes = join_all(shutdowns).await;
        outcomes.sort_by_key(|(kind, _)| *kind);

        let mut failures = Vec::new();
        for (kind, outcome) in outcomes {
            let reason = match outcome {
                Ok(Ok(())) => {
                    info!(%kind, "Consistency protocol shut down");
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(e) => format!("shutdown task aborted: {}", e),
            };
            let err = ConsistencyError::ShutdownFailed { kind, reason };
            error!(%kind, error = %err, "Consistency protocol failed to shut down");
            failures.push(err.to_string());
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(BatataError::ProtocolShutdown(failures))
        }
    }

    /// Whether a protocol of this kind initialized successfully
    pub fn is_active(&self, kind: ProtocolKind) -> bool {
        self.protocols.contains_key(&kind)
    }

    pub fn active_kinds(&self) -> Vec<ProtocolKind> {
        let mut kinds: Vec<ProtocolKind> = self.protocols.keys().copied().collect();
        kinds.sort();
        kinds
    }

    /// The active protocol of a kind
    pub fn protocol(&self, kind: ProtocolKind) -> Option<Arc<dyn ProtocolHandle>> {
        self.protocols.get(&kind).cloned()
    }

    /// Kinds that were registered but failed to start, with the cause
    pub fn startup_errors(&self) -> &HashMap<ProtocolKind, ConsistencyError> {
        &self.startup_errors
    }

    /// First startup failure, in kind order, as an application error
    pub fn check_startup(&self) -> batata_common::Result<()> {
        let mut kinds: Vec<&ProtocolKind> = self.startup_errors.keys().collect();
        kinds.sort();
        match kinds.first() {
            Some(kind) => Err(BatataError::ProtocolStartup(
                kind.to_string(),
                self.startup_errors[*kind].to_string(),
            )),
            None => Ok(()),
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }
}

#[async_trait]
impl MemberChangeListener for ProtocolManager {
    async fn on_event(&self, event: &MembersChangeEvent) {
        if self.is_shutdown() {
            debug!(sequence = event.sequence, "Ignoring member change during shutdown");
            return;
        }

        let members = event.members.clone();
        for (kind, protocol) in &self.protocols {
            let kind = *kind;
            let addresses = match kind.member_addresses(&members) {
                Ok(addresses) => addresses,
                Err(e) => {
                    error!(%kind, sequence = event.sequence, error = %e, "Cannot translate member change");
                    continue;
                }
            };

            let protocol = protocol.clone();
            let submitted = self.executor.member_change(kind, async move {
                protocol
                    .member_change(addresses)
                    .await
                    .map_err(|e| ConsistencyError::MemberChangeFailed {
                        kind,
                        reason: e.to_string(),
                    })
            });
            if let Err(e) = submitted {
                warn!(%kind, sequence = event.sequence, error = %e, "Member change not dispatched");
            }
        }
    }

    fn ignore_expire_event(&self) -> bool {
        true
    }
}
