//! Batata Core - Cluster membership and protocol lifecycle
//!
//! This crate provides:
//! - Server member management and member change events
//! - Per-protocol ordered dispatch of member changes
//! - The protocol manager driving the AP and CP protocol lifecycle

pub mod model;
pub mod service;

// Re-export cluster module
pub mod cluster {
    pub use crate::service::cluster::{
        MembershipSource, ServerMemberManager, ServerMemberManagerConfig,
    };
}

// Re-export commonly used types
pub use model::Configuration;
pub use service::{
    MemberChangeEventPublisher, MemberChangeListener, MembersChangeEvent, ProtocolExecutor,
    ProtocolManager, ProtocolManagerConfig,
};

// Re-export common functions
pub use batata_common::local_ip;
