//! Protocol registry
//!
//! The composition root registers the protocol implementations it links in,
//! the configuration each of them consumes, and the log processors of every
//! business module. The lifecycle coordinator discovers everything from here
//! once at startup.

use std::{any::TypeId, collections::HashMap, sync::Arc};

use tracing::{debug, warn};

use crate::{
    config::{ConfigType, ProtocolConfig},
    error::{ConsistencyError, Result},
    processor::LogProcessor,
    protocol::{ApProtocol, ConsistencyProtocol, CpProtocol, ProtocolHandle, ProtocolKind, TypedProtocol},
};

type ConfigFactory = Box<dyn Fn() -> Box<dyn ProtocolConfig> + Send + Sync>;

/// Registry of protocol implementations, configs and log processors
#[derive(Default)]
pub struct ProtocolRegistry {
    protocols: HashMap<ProtocolKind, Arc<dyn ProtocolHandle>>,
    configs: HashMap<TypeId, ConfigFactory>,
    processors: HashMap<ProtocolKind, Vec<Arc<dyn LogProcessor>>>,
}

impl std::fmt::Debug for ProtocolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolRegistry")
            .field("kinds", &self.kinds())
            .field("configs", &self.configs.len())
            .field(
                "processors",
                &self
                    .processors
                    .iter()
                    .map(|(kind, list)| (*kind, list.len()))
                    .collect::<HashMap<_, _>>(),
            )
            .finish()
    }
}

impl ProtocolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the AP protocol implementation
    pub fn register_ap<P: ApProtocol>(&mut self, protocol: Arc<P>) -> &mut Self {
        self.register(ProtocolKind::Ap, protocol)
    }

    /// Register the CP protocol implementation
    pub fn register_cp<P: CpProtocol>(&mut self, protocol: Arc<P>) -> &mut Self {
        self.register(ProtocolKind::Cp, protocol)
    }

    /// Register an implementation for a kind, replacing any previous one
    pub fn register<P: ConsistencyProtocol>(&mut self, kind: ProtocolKind, protocol: Arc<P>) -> &mut Self {
        let handle: Arc<dyn ProtocolHandle> = Arc::new(TypedProtocol::new(kind, protocol));
        if self.protocols.insert(kind, handle).is_some() {
            warn!(%kind, "Replacing previously registered protocol");
        }
        debug!(
            %kind,
            implementation = std::any::type_name::<P>(),
            "Registered consistency protocol"
        );
        self
    }

    /// Provide the factory building a configuration type
    pub fn provide_config<C, F>(&mut self, factory: F) -> &mut Self
    where
        C: ProtocolConfig,
        F: Fn() -> C + Send + Sync + 'static,
    {
        self.configs.insert(
            TypeId::of::<C>(),
            Box::new(move || Box::new(factory()) as Box<dyn ProtocolConfig>),
        );
        self
    }

    /// Register a log processor for a kind
    pub fn add_log_processor(&mut self, kind: ProtocolKind, processor: Arc<dyn LogProcessor>) -> &mut Self {
        debug!(%kind, group = processor.group(), "Registered log processor");
        self.processors.entry(kind).or_default().push(processor);
        self
    }

    /// The protocol registered for a kind, if any
    pub fn find_if_present(&self, kind: ProtocolKind) -> Option<Arc<dyn ProtocolHandle>> {
        self.protocols.get(&kind).cloned()
    }

    /// The configuration type a protocol consumes
    pub fn resolve_config_type(&self, protocol: &dyn ProtocolHandle) -> ConfigType {
        protocol.config_type()
    }

    /// Build a fresh configuration instance of the given type
    pub fn get_config(&self, config_type: &ConfigType) -> Result<Box<dyn ProtocolConfig>> {
        self.configs
            .get(&config_type.id())
            .map(|factory| factory())
            .ok_or(ConsistencyError::ConfigNotFound(config_type.name()))
    }

    /// Log processors registered for a kind
    pub fn processors_of_kind(&self, kind: ProtocolKind) -> Vec<Arc<dyn LogProcessor>> {
        self.processors.get(&kind).cloned().unwrap_or_default()
    }

    /// Kinds with a registered implementation, in a stable order
    pub fn kinds(&self) -> Vec<ProtocolKind> {
        let mut kinds: Vec<ProtocolKind> = self.protocols.keys().copied().collect();
        kinds.sort();
        kinds
    }

    pub fn is_empty(&self) -> bool {
        self.protocols.is_empty()
    }
}
