//! Protocol configuration contract

use std::{
    any::{Any, TypeId, type_name},
    collections::HashSet,
    fmt::{Display, Formatter},
    sync::Arc,
};

use crate::processor::LogProcessor;

/// Converts a boxed value into `Box<dyn Any>` so it can be downcast back to
/// its concrete type.
pub trait IntoAny: Any + Send {
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;

    fn config_type_name(&self) -> &'static str;
}

impl<T: Any + Send> IntoAny for T {
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }

    fn config_type_name(&self) -> &'static str {
        type_name::<T>()
    }
}

/// Settings object handed to a protocol's `init`
///
/// The lifecycle coordinator fills in the member set and the log processors
/// before the protocol sees it.
pub trait ProtocolConfig: IntoAny + Sync {
    /// Set this node's address and the addresses of its peers
    fn set_members(&mut self, self_member: String, members: HashSet<String>);

    /// Attach log processors
    fn add_log_processors(&mut self, processors: Vec<Arc<dyn LogProcessor>>);

    /// This node's address in the protocol's encoding
    fn self_member(&self) -> &str;

    /// Peer addresses in the protocol's encoding
    fn members(&self) -> &HashSet<String>;

    fn log_processors(&self) -> &[Arc<dyn LogProcessor>];
}

/// Identifies a configuration type registered with the protocol registry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConfigType {
    id: TypeId,
    name: &'static str,
}

impl ConfigType {
    pub fn of<C: ProtocolConfig>() -> Self {
        Self {
            id: TypeId::of::<C>(),
            name: type_name::<C>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl Display for ConfigType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Member and processor fields shared by the concrete protocol configs
#[derive(Clone, Default)]
pub(crate) struct MemberSettings {
    pub(crate) self_member: String,
    pub(crate) members: HashSet<String>,
    pub(crate) processors: Vec<Arc<dyn LogProcessor>>,
}

impl MemberSettings {
    pub(crate) fn set_members(&mut self, self_member: String, members: HashSet<String>) {
        self.self_member = self_member;
        self.members = members;
    }

    pub(crate) fn processor_groups(&self) -> Vec<&str> {
        self.processors.iter().map(|p| p.group()).collect()
    }
}

impl std::fmt::Debug for MemberSettings {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemberSettings")
            .field("self_member", &self.self_member)
            .field("members", &self.members)
            .field("processors", &self.processor_groups())
            .finish()
    }
}
