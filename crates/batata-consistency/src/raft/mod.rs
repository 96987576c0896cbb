// Raft (CP) protocol settings
// Strong consistency for persistent data

pub mod config;

pub use config::RaftConfig;
