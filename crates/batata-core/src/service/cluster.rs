// Cluster membership management
// Tracks the server list and publishes member change events to listeners

use std::{collections::HashSet, sync::Arc};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use batata_api::model::{Member, MemberBuilder, NodeState};
use batata_common::{local_ip, utils::split_address};

use crate::model::Configuration;

use super::member_event::{
    LoggingMemberChangeListener, MemberChangeEventPublisher, MemberChangeListener,
    MembersChangeEvent,
};

/// Source of cluster membership consumed by the protocol manager
#[async_trait]
pub trait MembershipSource: Send + Sync {
    /// The local member
    fn self_member(&self) -> Member;

    /// Snapshot of all members, self included
    fn all_members(&self) -> Vec<Member>;

    /// Register a listener for subsequent member changes
    async fn subscribe(&self, listener: Arc<dyn MemberChangeListener>);
}

/// Server member manager configuration
#[derive(Clone, Debug)]
pub struct ServerMemberManagerConfig {
    /// Event queue size
    pub event_queue_size: usize,
}

impl Default for ServerMemberManagerConfig {
    fn default() -> Self {
        Self {
            event_queue_size: 1024,
        }
    }
}

/// Server member manager
/// Central component for cluster membership
#[derive(Clone)]
pub struct ServerMemberManager {
    port: u16,
    local_address: String,
    self_member: Arc<Member>,
    server_list: Arc<DashMap<String, Member>>,
    is_standalone: bool,
    config: Configuration,
    event_publisher: Arc<MemberChangeEventPublisher>,
    // Held while a snapshot is taken and published, so sequence order matches snapshot order
    publish_lock: Arc<Mutex<()>>,
    running: Arc<RwLock<bool>>,
}

impl std::fmt::Debug for ServerMemberManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerMemberManager")
            .field("port", &self.port)
            .field("local_address", &self.local_address)
            .field("is_standalone", &self.is_standalone)
            .field("member_count", &self.server_list.len())
            .finish()
    }
}

impl ServerMemberManager {
    pub fn new(config: &Configuration) -> Self {
        Self::with_config(config, ServerMemberManagerConfig::default())
    }

    pub fn with_config(config: &Configuration, manager_config: ServerMemberManagerConfig) -> Self {
        let ip = config.server_ip().unwrap_or_else(local_ip);
        let port = config.server_main_port();
        let is_standalone = config.is_standalone();

        let mut member = MemberBuilder::new(ip, port)
            .extend_val(Member::READY_TO_UPGRADE, true)
            .extend_val(Member::VERSION, config.version())
            .extend_val(
                Member::LAST_REFRESH_TIME,
                chrono::Utc::now().timestamp_millis(),
            )
            .build();
        member.set_extend_val(Member::RAFT_PORT, member.calculate_raft_port());
        let local_address = member.address.clone();

        // Add self to server list
        let server_list = Arc::new(DashMap::new());
        server_list.insert(local_address.clone(), member.clone());

        let event_publisher = Arc::new(MemberChangeEventPublisher::new(
            manager_config.event_queue_size,
        ));

        Self {
            port,
            local_address,
            self_member: Arc::new(member),
            server_list,
            is_standalone,
            config: config.clone(),
            event_publisher,
            publish_lock: Arc::new(Mutex::new(())),
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Start the server member manager
    pub async fn start(&self) {
        let mut running = self.running.write().await;
        if *running {
            return;
        }

        info!(
            "Starting ServerMemberManager, standalone: {}",
            self.is_standalone
        );

        self.event_publisher.start();
        self.event_publisher
            .register_listener(Arc::new(LoggingMemberChangeListener))
            .await;

        if !self.is_standalone {
            let members = self.members_from_config();
            self.apply_members(members);
            self.publish_members().await;

            info!(
                "Cluster mode started with {} members",
                self.server_list.len()
            );
        } else {
            info!("Standalone mode - skipping cluster initialization");
        }

        *running = true;
    }

    /// Stop the server member manager
    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        if !*running {
            return;
        }

        info!("Stopping ServerMemberManager");
        self.event_publisher.stop();
        *running = false;
    }

    /// Members listed under `batata.member.list`
    fn members_from_config(&self) -> Vec<Member> {
        self.config
            .member_list()
            .iter()
            .filter_map(|address| match split_address(address) {
                Some((ip, port)) => Some(Self::peer(ip, port)),
                None => {
                    warn!("Ignoring malformed cluster member address: {}", address);
                    None
                }
            })
            .collect()
    }

    fn peer(ip: String, port: u16) -> Member {
        let mut member = MemberBuilder::new(ip, port).build();
        member.set_extend_val(Member::RAFT_PORT, member.calculate_raft_port());
        member
    }

    /// Replace the peer set, keeping self. Returns whether anything changed.
    fn apply_members(&self, members: Vec<Member>) -> bool {
        let current: HashSet<String> = self.server_list.iter().map(|e| e.key().clone()).collect();
        let incoming: HashSet<String> = members.iter().map(|m| m.address.clone()).collect();
        let mut changed = false;

        for member in members {
            if member.address == self.local_address {
                continue;
            }
            if !current.contains(&member.address) {
                info!("Adding new cluster member: {}", member.address);
                changed = true;
            }
            self.server_list.insert(member.address.clone(), member);
        }

        for address in current {
            if address != self.local_address
                && !incoming.contains(&address)
                && self.server_list.remove(&address).is_some()
            {
                info!("Removing cluster member: {}", address);
                changed = true;
            }
        }

        changed
    }

    async fn publish_members(&self) {
        let _guard = self.publish_lock.lock().await;
        let event = MembersChangeEvent::new(self.all_members());
        self.event_publisher.publish(event).await;
    }

    /// Replace the cluster member list and publish the result if it changed
    pub async fn update_members(&self, members: Vec<Member>) {
        if self.apply_members(members) {
            self.publish_members().await;
        }
    }

    /// Add a single member
    pub async fn member_join(&self, member: Member) {
        if member.address == self.local_address {
            return;
        }
        let address = member.address.clone();
        if self.server_list.insert(address.clone(), member).is_none() {
            info!("Member joined: {}", address);
            self.publish_members().await;
        }
    }

    /// Remove a single member
    pub async fn member_leave(&self, address: &str) {
        if address == self.local_address {
            warn!("Refusing to remove the local member from the server list");
            return;
        }
        if self.server_list.remove(address).is_some() {
            info!("Member left: {}", address);
            self.publish_members().await;
        }
    }

    /// Get all cluster members, sorted by address
    pub fn all_members(&self) -> Vec<Member> {
        let mut members: Vec<Member> = self.server_list.iter().map(|e| e.value().clone()).collect();
        members.sort_by(|a, b| a.address.cmp(&b.address));
        members
    }

    /// Get member by address
    pub fn get_member(&self, address: &str) -> Option<Member> {
        self.server_list.get(address).map(|e| e.value().clone())
    }

    /// Get local member
    pub fn get_self(&self) -> &Member {
        &self.self_member
    }

    /// Get local address
    pub fn local_address(&self) -> &str {
        &self.local_address
    }

    /// Get member count
    pub fn member_count(&self) -> usize {
        self.server_list.len()
    }

    /// Check if running in standalone mode
    pub fn is_standalone(&self) -> bool {
        self.is_standalone
    }

    /// Update member state, publishing the member set when it changed
    pub async fn update_member_state(&self, address: &str, state: NodeState) {
        let changed = match self.server_list.get_mut(address) {
            Some(mut member) if member.state != state => {
                info!("Member {} state {} -> {}", address, member.state, state);
                member.state = state;
                member.set_extend_val(
                    Member::LAST_REFRESH_TIME,
                    Value::from(chrono::Utc::now().timestamp_millis()),
                );
                true
            }
            _ => false,
        };

        if changed {
            self.publish_members().await;
        }
    }

    /// Register a member change listener
    pub async fn register_listener(&self, listener: Arc<dyn MemberChangeListener>) {
        self.event_publisher.register_listener(listener).await;
    }

    /// Subscribe to member change events
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<MembersChangeEvent> {
        self.event_publisher.subscribe()
    }

    /// Get event publisher
    pub fn event_publisher(&self) -> &Arc<MemberChangeEventPublisher> {
        &self.event_publisher
    }
}

#[async_trait]
impl MembershipSource for ServerMemberManager {
    fn self_member(&self) -> Member {
        self.server_list
            .get(&self.local_address)
            .map(|e| e.value().clone())
            .unwrap_or_else(|| self.self_member.as_ref().clone())
    }

    fn all_members(&self) -> Vec<Member> {
        ServerMemberManager::all_members(self)
    }

    async fn subscribe(&self, listener: Arc<dyn MemberChangeListener>) {
        self.register_listener(listener).await;
    }
}
