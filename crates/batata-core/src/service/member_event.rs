// Member change event handling
// Provides event-driven notifications for cluster membership changes

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use async_trait::async_trait;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info};

use batata_api::model::Member;

static EVENT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Member change event carrying the full member set after the change
#[derive(Clone, Debug)]
pub struct MembersChangeEvent {
    /// All cluster members, self included
    pub members: Vec<Member>,
    /// Monotonic sequence assigned when the event is created
    pub sequence: u64,
    /// Timestamp of the event
    pub timestamp: i64,
}

impl MembersChangeEvent {
    pub fn new(members: Vec<Member>) -> Self {
        Self {
            members,
            sequence: EVENT_SEQUENCE.fetch_add(1, Ordering::Relaxed),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn addresses(&self) -> Vec<&str> {
        self.members.iter().map(|m| m.address.as_str()).collect()
    }
}

/// Trait for handling member change events
#[async_trait]
pub trait MemberChangeListener: Send + Sync {
    /// Called when a member change event occurs
    async fn on_event(&self, event: &MembersChangeEvent);

    /// Whether events older than one already delivered should be skipped
    fn ignore_expire_event(&self) -> bool {
        false
    }
}

/// Member change event publisher
/// Manages subscriptions and delivers events to listeners in publish order
pub struct MemberChangeEventPublisher {
    /// Broadcast sender for passive observers
    broadcast_tx: broadcast::Sender<MembersChangeEvent>,
    /// Registered listeners
    listeners: RwLock<Vec<Arc<dyn MemberChangeListener>>>,
    /// Highest event sequence delivered so far
    last_event_sequence: AtomicU64,
    /// Serializes deliveries
    publish_lock: tokio::sync::Mutex<()>,
    /// Whether the publisher is running
    running: AtomicBool,
}

impl MemberChangeEventPublisher {
    /// Create a new event publisher
    pub fn new(queue_size: usize) -> Self {
        let (broadcast_tx, _) = broadcast::channel(queue_size.max(1));

        Self {
            broadcast_tx,
            listeners: RwLock::new(Vec::new()),
            last_event_sequence: AtomicU64::new(0),
            publish_lock: tokio::sync::Mutex::new(()),
            running: AtomicBool::new(false),
        }
    }

    /// Start the event publisher
    pub fn start(&self) {
        if !self.running.swap(true, Ordering::AcqRel) {
            info!("Starting member change event publisher");
        }
    }

    /// Stop the event publisher
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            info!("Stopped member change event publisher");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Register a listener for member change events
    pub async fn register_listener(&self, listener: Arc<dyn MemberChangeListener>) {
        let mut listeners = self.listeners.write().await;
        listeners.push(listener);
        debug!(
            "Registered member change listener, total: {}",
            listeners.len()
        );
    }

    /// Publish a member change event
    ///
    /// Listeners are awaited one after another, so every listener observes
    /// events in the order they were published.
    pub async fn publish(&self, event: MembersChangeEvent) {
        if !self.is_running() {
            return;
        }

        let _guard = self.publish_lock.lock().await;
        let last = self
            .last_event_sequence
            .fetch_max(event.sequence, Ordering::AcqRel);
        let expired = last > event.sequence;

        debug!(
            sequence = event.sequence,
            members = event.members.len(),
            expired,
            "Publishing members change event"
        );

        let listeners = self.listeners.read().await.clone();
        for listener in listeners {
            if expired && listener.ignore_expire_event() {
                continue;
            }
            listener.on_event(&event).await;
        }

        let _ = self.broadcast_tx.send(event);
    }

    /// Subscribe to member change events
    pub fn subscribe(&self) -> broadcast::Receiver<MembersChangeEvent> {
        self.broadcast_tx.subscribe()
    }
}

/// A simple logging listener for debugging
pub struct LoggingMemberChangeListener;

#[async_trait]
impl MemberChangeListener for LoggingMemberChangeListener {
    async fn on_event(&self, event: &MembersChangeEvent) {
        info!(
            "[MemberEvent] Cluster members changed ({}): {:?}",
            event.members.len(),
            event.addresses()
        );
    }

    fn ignore_expire_event(&self) -> bool {
        true
    }
}
