// Metrics module for observability
// Describes the cluster and protocol metrics recorded by this node

use std::time::Instant;

use metrics::{describe_counter, describe_gauge, describe_histogram, gauge, histogram};

use batata_consistency::ProtocolKind;

/// Initialize all metric descriptions
/// Should be called once at application startup
pub fn init_metrics() {
    // Cluster metrics
    describe_gauge!("cluster_members_total", "Total number of cluster members");

    // Protocol lifecycle metrics
    describe_gauge!(
        "protocol_active",
        "Whether a consistency protocol kind is active on this node"
    );
    describe_histogram!(
        "protocol_startup_duration_seconds",
        "Time taken to initialize the consistency protocols"
    );

    // Member change dispatch metrics
    describe_counter!(
        "protocol_member_change_total",
        "Total number of member changes applied by a protocol"
    );
    describe_counter!(
        "protocol_member_change_errors_total",
        "Total number of member changes a protocol failed to apply"
    );
    describe_gauge!(
        "protocol_executor_pending",
        "Member changes queued for a protocol"
    );

    tracing::info!("Metrics initialized");
}

/// Update cluster member count
pub fn set_cluster_members(total: usize) {
    gauge!("cluster_members_total").set(total as f64);
}

/// Record which protocol kinds are active
pub fn set_active_protocols(active: &[ProtocolKind]) {
    for kind in ProtocolKind::ALL {
        let value = if active.contains(&kind) { 1.0 } else { 0.0 };
        gauge!("protocol_active", "kind" => kind.as_str()).set(value);
    }
}

/// Record how long protocol startup took
pub fn record_protocol_startup(duration_secs: f64) {
    histogram!("protocol_startup_duration_seconds").record(duration_secs);
}

/// Timer helper for measuring operation duration
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
