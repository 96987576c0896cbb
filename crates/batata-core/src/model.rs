// Core configuration model
// Typed access to the settings used by cluster membership and the consistency protocols

use std::{path::Path, time::Duration};

use batata_common::BatataError;
use batata_consistency::{DistroConfig, RaftConfig};

use crate::service::{ProtocolManagerConfig, cluster::ServerMemberManagerConfig};

/// Application configuration wrapper
/// Provides access to configuration values for cluster and protocol management
#[derive(Clone, Debug)]
pub struct Configuration {
    pub config: config::Config,
}

impl Configuration {
    /// Create a new configuration from a Config instance
    pub fn from_config(config: config::Config) -> Self {
        Self { config }
    }

    /// Load configuration from an optional file, then apply overrides
    pub fn load<I>(file: Option<&Path>, overrides: I) -> Result<Self, BatataError>
    where
        I: IntoIterator<Item = (String, config::Value)>,
    {
        let mut builder = config::Config::builder();
        if let Some(file) = file {
            builder = builder.add_source(config::File::from(file).required(true));
        }
        for (key, value) in overrides {
            builder = builder
                .set_override(key, value)
                .map_err(|e| BatataError::ConfigError(e.to_string()))?;
        }
        builder
            .build()
            .map(Self::from_config)
            .map_err(|e| BatataError::ConfigError(e.to_string()))
    }

    /// Explicitly configured server IP, if any
    pub fn server_ip(&self) -> Option<String> {
        self.config
            .get_string("batata.server.ip")
            .ok()
            .filter(|ip| !ip.trim().is_empty())
    }

    /// Get the main server port
    pub fn server_main_port(&self) -> u16 {
        self.config
            .get_int("batata.server.main.port")
            .unwrap_or(8848) as u16
    }

    /// Check if running in standalone mode
    pub fn is_standalone(&self) -> bool {
        self.config.get_bool("batata.standalone").unwrap_or(true)
    }

    /// Get the server version
    pub fn version(&self) -> String {
        self.config
            .get_string("batata.version")
            .unwrap_or_else(|_| "1.0.0".to_string())
    }

    /// Cluster member addresses (`ip:port`, comma separated)
    pub fn member_list(&self) -> Vec<String> {
        self.config
            .get_string("batata.member.list")
            .map(|s| {
                s.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Member change event queue size (default: 1024)
    pub fn member_event_queue_size(&self) -> usize {
        self.config
            .get_int("batata.core.member.event-queue-size")
            .unwrap_or(1024) as usize
    }

    // ===================== Protocol Configuration =====================

    /// How long queued member changes may drain at shutdown, in milliseconds (default: 3000ms)
    pub fn protocol_drain_timeout_ms(&self) -> u64 {
        self.config
            .get_int("batata.core.protocol.drain-timeout")
            .unwrap_or(3000) as u64
    }

    /// Raft election timeout in milliseconds (default: 5000ms)
    pub fn raft_election_timeout_ms(&self) -> u64 {
        self.config
            .get_int("batata.core.protocol.raft.election-timeout")
            .unwrap_or(5000) as u64
    }

    /// Raft heartbeat interval in milliseconds (default: 1000ms)
    pub fn raft_heartbeat_interval_ms(&self) -> u64 {
        self.config
            .get_int("batata.core.protocol.raft.heartbeat-interval")
            .unwrap_or(1000) as u64
    }

    /// Raft RPC request timeout in milliseconds (default: 5000ms)
    pub fn raft_rpc_request_timeout_ms(&self) -> u64 {
        self.config
            .get_int("batata.core.protocol.raft.rpc-request-timeout")
            .unwrap_or(5000) as u64
    }

    /// Distro sync delay in milliseconds (default: 1000ms)
    pub fn distro_sync_delay_ms(&self) -> u64 {
        self.config
            .get_int("batata.core.protocol.distro.sync-delay")
            .unwrap_or(1000) as u64
    }

    /// Distro verify interval in milliseconds (default: 5000ms)
    pub fn distro_verify_interval_ms(&self) -> u64 {
        self.config
            .get_int("batata.core.protocol.distro.verify-interval")
            .unwrap_or(5000) as u64
    }

    // ===================== Logging Configuration =====================

    /// Log directory override
    pub fn log_dir(&self) -> Option<String> {
        self.config.get_string("batata.logs.path").ok()
    }

    /// Log level (default: info)
    pub fn log_level(&self) -> String {
        self.config
            .get_string("batata.logs.level")
            .unwrap_or_else(|_| "info".to_string())
    }

    // ===================== Derived settings =====================

    pub fn raft_config(&self) -> RaftConfig {
        RaftConfig::new(
            self.raft_election_timeout_ms(),
            self.raft_heartbeat_interval_ms(),
            self.raft_rpc_request_timeout_ms(),
        )
    }

    pub fn distro_config(&self) -> DistroConfig {
        DistroConfig::new(
            Duration::from_millis(self.distro_sync_delay_ms()),
            Duration::from_millis(self.distro_verify_interval_ms()),
        )
    }

    pub fn protocol_manager_config(&self) -> ProtocolManagerConfig {
        ProtocolManagerConfig {
            drain_timeout: Duration::from_millis(self.protocol_drain_timeout_ms()),
        }
    }

    pub fn server_member_manager_config(&self) -> ServerMemberManagerConfig {
        ServerMemberManagerConfig {
            event_queue_size: self.member_event_queue_size(),
        }
    }
}
