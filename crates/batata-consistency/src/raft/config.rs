// Raft configuration
// Settings consumed by the CP protocol, including the member set injected at startup

use std::{collections::HashSet, sync::Arc, time::Duration};

use crate::{
    config::{MemberSettings, ProtocolConfig},
    processor::LogProcessor,
};

/// Configuration for the Raft consensus protocol
#[derive(Clone, Debug)]
pub struct RaftConfig {
    /// Election timeout in milliseconds (default: 5000ms)
    /// If a follower doesn't hear from leader within this time, it starts an election
    pub election_timeout_ms: u64,

    /// Heartbeat interval in milliseconds (default: 1000ms)
    pub heartbeat_interval_ms: u64,

    /// RPC request timeout in milliseconds (default: 5000ms)
    pub rpc_request_timeout_ms: u64,

    /// Snapshot threshold - number of log entries before triggering snapshot
    pub snapshot_threshold: u64,

    settings: MemberSettings,
}

impl Default for RaftConfig {
    fn default() -> Self {
        Self {
            election_timeout_ms: 5000,
            heartbeat_interval_ms: 1000,
            rpc_request_timeout_ms: 5000,
            snapshot_threshold: 10000,
            settings: MemberSettings::default(),
        }
    }
}

impl RaftConfig {
    /// Create a new RaftConfig with custom timings
    pub fn new(election_timeout_ms: u64, heartbeat_interval_ms: u64, rpc_request_timeout_ms: u64) -> Self {
        Self {
            election_timeout_ms,
            heartbeat_interval_ms,
            rpc_request_timeout_ms,
            ..Default::default()
        }
    }

    /// Get election timeout as Duration
    pub fn election_timeout(&self) -> Duration {
        Duration::from_millis(self.election_timeout_ms)
    }

    /// Get heartbeat interval as Duration
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Get RPC timeout as Duration
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_request_timeout_ms)
    }

    /// Groups of the attached log processors
    pub fn groups(&self) -> Vec<&str> {
        self.settings.processor_groups()
    }
}

impl ProtocolConfig for RaftConfig {
    fn set_members(&mut self, self_member: String, members: HashSet<String>) {
        self.settings.set_members(self_member, members);
    }

    fn add_log_processors(&mut self, processors: Vec<Arc<dyn LogProcessor>>) {
        self.settings.processors.extend(processors);
    }

    fn self_member(&self) -> &str {
        &self.settings.self_member
    }

    fn members(&self) -> &HashSet<String> {
        &self.settings.members
    }

    fn log_processors(&self) -> &[Arc<dyn LogProcessor>] {
        &self.settings.processors
    }
}
