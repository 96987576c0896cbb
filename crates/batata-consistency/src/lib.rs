//! Batata Consistency - consistency protocol contracts
//!
//! This crate provides:
//! - Protocol kinds and the kind-specific member address encoding
//! - The `ConsistencyProtocol` contract implemented by AP (Distro) and CP (Raft) protocols
//! - Protocol configuration and log processor contracts
//! - Protocol metadata with deferred publishing
//! - The protocol registry used to discover implementations at startup
//! - Standalone AP and CP protocols for single-node deployments

pub mod config;
pub mod distro;
pub mod error;
pub mod metadata;
pub mod processor;
pub mod protocol;
pub mod raft;
pub mod registry;
pub mod standalone;

// Re-export commonly used types
pub use config::{ConfigType, IntoAny, ProtocolConfig};
pub use distro::DistroConfig;
pub use error::{ConsistencyError, Result};
pub use metadata::{MetaDataChange, MetaDataObserver, ProtocolMetaData, SubscriptionId};
pub use processor::{Log, LogProcessor, ReadRequest, Response};
pub use protocol::{ApProtocol, ConsistencyProtocol, CpProtocol, ProtocolHandle, ProtocolKind};
pub use raft::RaftConfig;
pub use registry::ProtocolRegistry;
pub use standalone::{StandaloneApProtocol, StandaloneCpProtocol};
