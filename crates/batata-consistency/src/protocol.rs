//! Consistency protocol contracts
//!
//! A node runs at most one protocol per [`ProtocolKind`]: an AP protocol
//! (Distro, eventually consistent) and a CP protocol (Raft, log replicated).
//! Implementations are written against the typed [`ConsistencyProtocol`]
//! trait; the registry erases them into [`ProtocolHandle`] so the lifecycle
//! coordinator can hold both kinds side by side.

use std::{
    any::type_name,
    collections::HashSet,
    fmt::{Display, Formatter},
    sync::Arc,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use batata_api::model::Member;

use crate::{
    config::{ConfigType, ProtocolConfig},
    error::{ConsistencyError, Result},
    metadata::ProtocolMetaData,
};

/// Kind of consistency protocol
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProtocolKind {
    /// Availability first (Distro)
    Ap,
    /// Consistency first (Raft)
    Cp,
}

impl ProtocolKind {
    pub const ALL: [ProtocolKind; 2] = [ProtocolKind::Ap, ProtocolKind::Cp];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolKind::Ap => "AP",
            ProtocolKind::Cp => "CP",
        }
    }

    /// Encode a member in the address form this kind of protocol expects.
    ///
    /// AP protocols address members by their server address. CP protocols
    /// address them by `ip:raftPort`, where the port comes from the member's
    /// extended info.
    pub fn member_address(&self, member: &Member) -> Result<String> {
        match self {
            ProtocolKind::Ap => Ok(member.address.clone()),
            ProtocolKind::Cp => member
                .raft_port()
                .map(|port| format!("{}:{}", member.ip, port))
                .ok_or_else(|| ConsistencyError::MissingRaftPort(member.address.clone())),
        }
    }

    /// Encode every member, failing on the first one that cannot be encoded
    pub fn member_addresses<'a, I>(&self, members: I) -> Result<HashSet<String>>
    where
        I: IntoIterator<Item = &'a Member>,
    {
        members
            .into_iter()
            .map(|member| self.member_address(member))
            .collect()
    }
}

impl Display for ProtocolKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A consistency protocol implementation
///
/// `init` is called exactly once with a configuration that already carries
/// the member set and log processors. `member_change` is only called after a
/// successful `init`, with the full member set in this protocol's address form.
#[async_trait]
pub trait ConsistencyProtocol: Send + Sync + 'static {
    /// The configuration shape this protocol consumes
    type Config: ProtocolConfig;

    /// Initialize the protocol; may block until it is ready to serve
    async fn init(&self, config: Self::Config) -> Result<()>;

    /// Apply a new cluster member set
    async fn member_change(&self, addresses: HashSet<String>) -> Result<()>;

    /// Shut the protocol down
    async fn shutdown(&self) -> Result<()>;

    /// Metadata published by this protocol
    fn protocol_meta_data(&self) -> &ProtocolMetaData;
}

/// Marker for availability-first protocols
pub trait ApProtocol: ConsistencyProtocol {}

/// Strong consistency protocol
pub trait CpProtocol: ConsistencyProtocol {
    /// Whether this node currently leads the given Raft group
    fn is_leader(&self, group: &str) -> bool;
}

/// Object-safe view of a registered protocol
#[async_trait]
pub trait ProtocolHandle: Send + Sync {
    fn kind(&self) -> ProtocolKind;

    /// The configuration type the underlying protocol consumes
    fn config_type(&self) -> ConfigType;

    async fn init(&self, config: Box<dyn ProtocolConfig>) -> Result<()>;

    async fn member_change(&self, addresses: HashSet<String>) -> Result<()>;

    async fn shutdown(&self) -> Result<()>;

    fn protocol_meta_data(&self) -> &ProtocolMetaData;
}

/// Bridges a typed protocol to [`ProtocolHandle`]
pub(crate) struct TypedProtocol<P> {
    kind: ProtocolKind,
    protocol: Arc<P>,
}

impl<P: ConsistencyProtocol> TypedProtocol<P> {
    pub(crate) fn new(kind: ProtocolKind, protocol: Arc<P>) -> Self {
        Self { kind, protocol }
    }
}

#[async_trait]
impl<P: ConsistencyProtocol> ProtocolHandle for TypedProtocol<P> {
    fn kind(&self) -> ProtocolKind {
        self.kind
    }

    fn config_type(&self) -> ConfigType {
        ConfigType::of::<P::Config>()
    }

    async fn init(&self, config: Box<dyn ProtocolConfig>) -> Result<()> {
        let actual = (*config).config_type_name();
        let config = config.into_any().downcast::<P::Config>().map_err(|_| {
            ConsistencyError::ConfigTypeMismatch {
                expected: type_name::<P::Config>(),
                actual,
            }
        })?;
        self.protocol.init(*config).await
    }

    async fn member_change(&self, addresses: HashSet<String>) -> Result<()> {
        self.protocol.member_change(addresses).await
    }

    async fn shutdown(&self) -> Result<()> {
        self.protocol.shutdown().await
    }

    fn protocol_meta_data(&self) -> &ProtocolMetaData {
        self.protocol.protocol_meta_data()
    }
}
