//! Standalone protocols
//!
//! Single-process AP and CP protocols used when a node runs on its own. Writes
//! and reads are applied directly to the log processor of the target group;
//! the member view and (for CP) the group leader are published as protocol
//! metadata.

use std::{collections::HashSet, sync::Arc};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info};

use crate::{
    config::ProtocolConfig,
    distro::DistroConfig,
    error::{ConsistencyError, Result},
    metadata::ProtocolMetaData,
    processor::{Log, LogProcessor, ReadRequest, Response},
    protocol::{ApProtocol, ConsistencyProtocol, CpProtocol, ProtocolKind},
    raft::RaftConfig,
};

/// Metadata key holding the sorted member list of a group
pub const META_MEMBERS: &str = "members";
/// Metadata key holding the leader address of a Raft group
pub const META_LEADER: &str = "leader";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Running,
    Shutdown,
}

struct StandaloneCore {
    kind: ProtocolKind,
    lifecycle: RwLock<Lifecycle>,
    self_member: RwLock<String>,
    members: RwLock<HashSet<String>>,
    processors: DashMap<String, Arc<dyn LogProcessor>>,
    meta_data: ProtocolMetaData,
}

impl StandaloneCore {
    fn new(kind: ProtocolKind) -> Self {
        Self {
            kind,
            lifecycle: RwLock::new(Lifecycle::Created),
            self_member: RwLock::new(String::new()),
            members: RwLock::new(HashSet::new()),
            processors: DashMap::new(),
            meta_data: ProtocolMetaData::new(),
        }
    }

    fn start(&self, config: &dyn ProtocolConfig) -> Result<()> {
        {
            let mut lifecycle = self.lifecycle.write();
            match *lifecycle {
                Lifecycle::Created => *lifecycle = Lifecycle::Running,
                Lifecycle::Running => {
                    return Err(ConsistencyError::InitFailed {
                        kind: self.kind,
                        reason: "already initialized".to_string(),
                    });
                }
                Lifecycle::Shutdown => return Err(ConsistencyError::AlreadyShutdown(self.kind)),
            }
        }

        let self_member = config.self_member().to_string();
        let mut members = config.members().clone();
        members.insert(self_member.clone());

        *self.self_member.write() = self_member;
        *self.members.write() = members;
        for processor in config.log_processors() {
            self.processors
                .insert(processor.group().to_string(), processor.clone());
        }

        self.publish_members();
        Ok(())
    }

    fn ensure_running(&self) -> Result<()> {
        match *self.lifecycle.read() {
            Lifecycle::Running => Ok(()),
            Lifecycle::Created => Err(ConsistencyError::NotInitialized(self.kind)),
            Lifecycle::Shutdown => Err(ConsistencyError::AlreadyShutdown(self.kind)),
        }
    }

    fn member_change(&self, addresses: HashSet<String>) -> Result<()> {
        self.ensure_running()?;
        debug!(kind = %self.kind, members = addresses.len(), "Applying member change");
        *self.members.write() = addresses;
        self.publish_members();
        Ok(())
    }

    fn shutdown(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.write();
        if *lifecycle == Lifecycle::Shutdown {
            return Ok(());
        }
        *lifecycle = Lifecycle::Shutdown;
        self.processors.clear();
        info!(kind = %self.kind, "Standalone protocol shut down");
        Ok(())
    }

    fn processor(&self, group: &str) -> Result<Arc<dyn LogProcessor>> {
        self.processors
            .get(group)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ConsistencyError::ProcessorNotFound(group.to_string()))
    }

    async fn write(&self, log: &Log) -> Result<Response> {
        self.ensure_running()?;
        let processor = self.processor(&log.group)?;
        processor.on_apply(log).await.inspect_err(|e| processor.on_error(e))
    }

    async fn read(&self, request: &ReadRequest) -> Result<Response> {
        self.ensure_running()?;
        let processor = self.processor(&request.group)?;
        processor
            .on_request(request)
            .await
            .inspect_err(|e| processor.on_error(e))
    }

    fn members(&self) -> HashSet<String> {
        self.members.read().clone()
    }

    fn groups(&self) -> Vec<String> {
        self.processors.iter().map(|e| e.key().clone()).collect()
    }

    fn publish_members(&self) {
        let mut members: Vec<String> = self.members.read().iter().cloned().collect();
        members.sort();
        for group in self.groups() {
            self.meta_data
                .put(&group, META_MEMBERS, Value::from(members.clone()));
        }
    }
}

/// Standalone availability-first protocol
pub struct StandaloneApProtocol {
    core: StandaloneCore,
}

impl Default for StandaloneApProtocol {
    fn default() -> Self {
        Self::new()
    }
}

impl StandaloneApProtocol {
    pub fn new() -> Self {
        Self {
            core: StandaloneCore::new(ProtocolKind::Ap),
        }
    }

    pub async fn write(&self, log: &Log) -> Result<Response> {
        self.core.write(log).await
    }

    pub async fn read(&self, request: &ReadRequest) -> Result<Response> {
        self.core.read(request).await
    }

    /// Current member view, self included
    pub fn members(&self) -> HashSet<String> {
        self.core.members()
    }
}

#[async_trait]
impl ConsistencyProtocol for StandaloneApProtocol {
    type Config = DistroConfig;

    async fn init(&self, config: DistroConfig) -> Result<()> {
        info!(
            target: "batata_consistency::distro",
            self_member = config.self_member(),
            groups = ?config.groups(),
            sync_delay = ?config.sync_delay,
            "Initializing standalone Distro protocol"
        );
        self.core.start(&config)
    }

    async fn member_change(&self, addresses: HashSet<String>) -> Result<()> {
        self.core.member_change(addresses)
    }

    async fn shutdown(&self) -> Result<()> {
        self.core.shutdown()
    }

    fn protocol_meta_data(&self) -> &ProtocolMetaData {
        &self.core.meta_data
    }
}

impl ApProtocol for StandaloneApProtocol {}

/// Standalone strong consistency protocol; this node leads every group
pub struct StandaloneCpProtocol {
    core: StandaloneCore,
}

impl Default for StandaloneCpProtocol {
    fn default() -> Self {
        Self::new()
    }
}

impl StandaloneCpProtocol {
    pub fn new() -> Self {
        Self {
            core: StandaloneCore::new(ProtocolKind::Cp),
        }
    }

    pub async fn write(&self, log: &Log) -> Result<Response> {
        self.core.write(log).await
    }

    pub async fn read(&self, request: &ReadRequest) -> Result<Response> {
        self.core.read(request).await
    }

    /// Current member view, self included
    pub fn members(&self) -> HashSet<String> {
        self.core.members()
    }
}

#[async_trait]
impl ConsistencyProtocol for StandaloneCpProtocol {
    type Config = RaftConfig;

    async fn init(&self, config: RaftConfig) -> Result<()> {
        info!(
            target: "batata_consistency::raft",
            self_member = config.self_member(),
            groups = ?config.groups(),
            election_timeout = ?config.election_timeout(),
            "Initializing standalone Raft protocol"
        );
        self.core.start(&config)?;

        let leader = self.core.self_member.read().clone();
        for group in self.core.groups() {
            self.core
                .meta_data
                .put(&group, META_LEADER, Value::from(leader.clone()));
        }
        Ok(())
    }

    async fn member_change(&self, addresses: HashSet<String>) -> Result<()> {
        self.core.member_change(addresses)
    }

    async fn shutdown(&self) -> Result<()> {
        self.core.shutdown()
    }

    fn protocol_meta_data(&self) -> &ProtocolMetaData {
        &self.core.meta_data
    }
}

impl CpProtocol for StandaloneCpProtocol {
    fn is_leader(&self, group: &str) -> bool {
        self.core.ensure_running().is_ok() && self.core.processors.contains_key(group)
    }
}
