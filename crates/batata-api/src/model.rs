//! Cluster member model
//!
//! This module defines the member structure exchanged between the membership
//! layer and the consistency protocols, together with its extended info keys.

use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Node state enumeration for cluster members
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeState {
    Starting,
    #[default]
    Up,
    Suspicious,
    Down,
    Isolation,
}

impl NodeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeState::Starting => "STARTING",
            NodeState::Up => "UP",
            NodeState::Suspicious => "SUSPICIOUS",
            NodeState::Down => "DOWN",
            NodeState::Isolation => "ISOLATION",
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, NodeState::Up)
    }
}

impl Display for NodeState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for NodeState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STARTING" => Ok(NodeState::Starting),
            "UP" => Ok(NodeState::Up),
            "SUSPICIOUS" => Ok(NodeState::Suspicious),
            "DOWN" => Ok(NodeState::Down),
            "ISOLATION" => Ok(NodeState::Isolation),
            _ => Err(format!("Invalid node state: {}", s)),
        }
    }
}

/// Cluster member information structure
///
/// Cloning a member copies its extended info, so a cloned member is a
/// snapshot that later updates to the source do not touch.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub ip: String,
    pub port: u16,
    pub state: NodeState,
    #[serde(default)]
    pub extend_info: BTreeMap<String, Value>,
    pub address: String,
    pub fail_access_cnt: i32,
}

impl Member {
    pub const RAFT_PORT: &str = "raftPort";
    pub const SITE_KEY: &str = "site";
    pub const LAST_REFRESH_TIME: &str = "lastRefreshTime";
    pub const VERSION: &str = "version";
    pub const READY_TO_UPGRADE: &str = "readyToUpgrade";

    pub const DEFAULT_SERVER_PORT: u16 = 8848;
    pub const DEFAULT_RAFT_OFFSET_PORT: u16 = 1000;

    pub fn new(ip: String, port: u16) -> Self {
        MemberBuilder::new(ip, port).build()
    }

    pub fn calculate_raft_port(&self) -> u16 {
        self.port.saturating_sub(Member::DEFAULT_RAFT_OFFSET_PORT)
    }

    pub fn is_healthy(&self) -> bool {
        self.state.is_healthy()
    }

    /// Get an extended info value by key
    pub fn extend_val(&self, key: &str) -> Option<&Value> {
        self.extend_info.get(key)
    }

    /// Set an extended info value, returning the previous one
    pub fn set_extend_val(&mut self, key: &str, value: impl Into<Value>) -> Option<Value> {
        self.extend_info.insert(key.to_string(), value.into())
    }

    /// The Raft replication port carried in extended info.
    ///
    /// The port may have been stored as a JSON number or as a string, depending
    /// on which node reported it.
    pub fn raft_port(&self) -> Option<u16> {
        match self.extend_val(Member::RAFT_PORT)? {
            Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl Display for Member {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.address, self.state)
    }
}

/// Builder pattern for creating Member instances
pub struct MemberBuilder {
    ip: String,
    port: u16,
    node_state: NodeState,
    extend_info: BTreeMap<String, Value>,
}

impl MemberBuilder {
    pub fn new(ip: String, port: u16) -> Self {
        MemberBuilder {
            ip,
            port,
            node_state: NodeState::default(),
            extend_info: BTreeMap::new(),
        }
    }

    pub fn ip(mut self, ip: String) -> Self {
        self.ip = ip;
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn node_state(mut self, node_state: NodeState) -> Self {
        self.node_state = node_state;
        self
    }

    pub fn extend_info(mut self, info: BTreeMap<String, Value>) -> Self {
        self.extend_info = info;
        self
    }

    pub fn extend_val(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extend_info.insert(key.to_string(), value.into());
        self
    }

    pub fn raft_port(self, port: u16) -> Self {
        self.extend_val(Member::RAFT_PORT, port)
    }

    pub fn build(self) -> Member {
        Member {
            address: format!("{}:{}", self.ip, self.port),
            ip: self.ip,
            port: self.port,
            state: self.node_state,
            extend_info: self.extend_info,
            fail_access_cnt: 0,
        }
    }
}
