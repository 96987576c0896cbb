//! Protocol metadata
//!
//! Each protocol publishes grouped key/value metadata (for example the leader
//! of a Raft group) that observers outside the protocol subscribe to.
//!
//! Metadata starts in defer-publish mode: values are recorded but change
//! notifications are buffered until [`ProtocolMetaData::stop_defer_publish`]
//! is called once the server has fully started. Buffered changes are then
//! delivered in the order they happened.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use parking_lot::{Mutex, ReentrantMutex};
use serde_json::Value;
use tracing::debug;

/// A single metadata change
#[derive(Clone, Debug, PartialEq)]
pub struct MetaDataChange {
    pub group: String,
    pub key: String,
    pub value: Value,
}

/// Callback notified of changes to one `(group, key)` item
pub type MetaDataObserver = Arc<dyn Fn(&MetaDataChange) + Send + Sync>;

/// Handle returned by [`ProtocolMetaData::subscribe`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct Inner {
    groups: HashMap<String, HashMap<String, Value>>,
    observers: HashMap<(String, String), Vec<(SubscriptionId, MetaDataObserver)>>,
    defer_publish: bool,
    pending: Vec<MetaDataChange>,
}

impl Inner {
    fn observers_of(&self, change: &MetaDataChange) -> Vec<MetaDataObserver> {
        self.observers
            .get(&(change.group.clone(), change.key.clone()))
            .map(|list| list.iter().map(|(_, o)| o.clone()).collect())
            .unwrap_or_default()
    }
}

/// Grouped protocol metadata with observers
pub struct ProtocolMetaData {
    inner: Mutex<Inner>,
    // Serializes delivery so observers see changes in order. Reentrant so an
    // observer may update metadata itself.
    delivery: ReentrantMutex<()>,
    next_subscription: AtomicU64,
}

impl Default for ProtocolMetaData {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProtocolMetaData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ProtocolMetaData")
            .field("groups", &inner.groups)
            .field("defer_publish", &inner.defer_publish)
            .field("pending", &inner.pending.len())
            .finish()
    }
}

impl ProtocolMetaData {
    /// Create metadata in defer-publish mode
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                defer_publish: true,
                ..Default::default()
            }),
            delivery: ReentrantMutex::new(()),
            next_subscription: AtomicU64::new(1),
        }
    }

    /// Load several groups at once
    pub fn load(&self, groups: HashMap<String, HashMap<String, Value>>) {
        for (group, items) in groups {
            for (key, value) in items {
                self.put(&group, &key, value);
            }
        }
    }

    /// Set one value and notify (or buffer) the change
    pub fn put(&self, group: &str, key: &str, value: impl Into<Value>) {
        let change = MetaDataChange {
            group: group.to_string(),
            key: key.to_string(),
            value: value.into(),
        };

        let _delivery = self.delivery.lock();
        let observers = {
            let mut inner = self.inner.lock();
            inner
                .groups
                .entry(change.group.clone())
                .or_default()
                .insert(change.key.clone(), change.value.clone());

            if inner.defer_publish {
                inner.pending.push(change);
                return;
            }
            inner.observers_of(&change)
        };

        for observer in observers {
            observer(&change);
        }
    }

    pub fn get(&self, group: &str, key: &str) -> Option<Value> {
        self.inner
            .lock()
            .groups
            .get(group)
            .and_then(|items| items.get(key))
            .cloned()
    }

    /// All values of a group
    pub fn group(&self, group: &str) -> Option<HashMap<String, Value>> {
        self.inner.lock().groups.get(group).cloned()
    }

    pub fn subscribe(&self, group: &str, key: &str, observer: MetaDataObserver) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.inner
            .lock()
            .observers
            .entry((group.to_string(), key.to_string()))
            .or_default()
            .push((id, observer));
        id
    }

    /// Remove an observer; returns whether it was registered
    pub fn unsubscribe(&self, group: &str, key: &str, id: SubscriptionId) -> bool {
        let mut inner = self.inner.lock();
        let slot = (group.to_string(), key.to_string());
        let Some(list) = inner.observers.get_mut(&slot) else {
            return false;
        };
        let before = list.len();
        list.retain(|(sid, _)| *sid != id);
        let removed = list.len() != before;
        if list.is_empty() {
            inner.observers.remove(&slot);
        }
        removed
    }

    pub fn is_defer_publish(&self) -> bool {
        self.inner.lock().defer_publish
    }

    /// Leave defer-publish mode and deliver buffered changes in order.
    ///
    /// Calling this again is a no-op.
    pub fn stop_defer_publish(&self) {
        let _delivery = self.delivery.lock();
        let deliveries: Vec<(MetaDataChange, Vec<MetaDataObserver>)> = {
            let mut inner = self.inner.lock();
            if !inner.defer_publish {
                return;
            }
            inner.defer_publish = false;
            let pending = std::mem::take(&mut inner.pending);
            pending
                .into_iter()
                .map(|change| {
                    let observers = inner.observers_of(&change);
                    (change, observers)
                })
                .collect()
        };

        debug!(
            buffered = deliveries.len(),
            "Stopped defer publish of protocol metadata"
        );

        for (change, observers) in deliveries {
            for observer in observers {
                observer(&change);
            }
        }
    }
}
