//! Distro protocol configuration

use std::{collections::HashSet, sync::Arc, time::Duration};

use crate::{
    config::{MemberSettings, ProtocolConfig},
    processor::LogProcessor,
};

/// Distro protocol configuration
#[derive(Clone, Debug)]
pub struct DistroConfig {
    /// Delay before syncing data after a change
    pub sync_delay: Duration,
    /// Timeout for sync operations
    pub sync_timeout: Duration,
    /// Retry delay after sync failure
    pub sync_retry_delay: Duration,
    /// Interval for data verification
    pub verify_interval: Duration,
    /// Retry delay for loading snapshot data
    pub load_retry_delay: Duration,
    settings: MemberSettings,
}

impl Default for DistroConfig {
    fn default() -> Self {
        Self {
            sync_delay: Duration::from_millis(1000),
            sync_timeout: Duration::from_millis(3000),
            sync_retry_delay: Duration::from_millis(3000),
            verify_interval: Duration::from_millis(5000),
            load_retry_delay: Duration::from_millis(30000),
            settings: MemberSettings::default(),
        }
    }
}

impl DistroConfig {
    pub fn new(sync_delay: Duration, verify_interval: Duration) -> Self {
        Self {
            sync_delay,
            verify_interval,
            ..Default::default()
        }
    }

    /// Groups of the attached log processors
    pub fn groups(&self) -> Vec<&str> {
        self.settings.processor_groups()
    }
}

impl ProtocolConfig for DistroConfig {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timings() {
        let config = DistroConfig::default();
        assert_eq!(config.sync_delay, Duration::from_millis(1000));
        assert_eq!(config.verify_interval, Duration::from_millis(5000));
        assert!(config.groups().is_empty());
    }

    #[test]
    fn test_new_keeps_other_defaults() {
        let config = DistroConfig::new(Duration::from_millis(200), Duration::from_millis(800));
        assert_eq!(config.sync_delay, Duration::from_millis(200));
        assert_eq!(config.verify_interval, Duration::from_millis(800));
        assert_eq!(config.sync_timeout, Duration::from_millis(3000));
        assert!(config.members().is_empty());
    }

    #[test]
    fn test_members_injection() {
        let mut config = DistroConfig::default();
        config.set_members(
            "10.0.0.1:8848".to_string(),
            HashSet::from(["10.0.0.2:8848".to_string()]),
        );
        assert_eq!(config.self_member(), "10.0.0.1:8848");
        assert!(config.members().contains("10.0.0.2:8848"));
    }
}
