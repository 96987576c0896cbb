// Distro (AP) protocol settings
// Eventually consistent replication for ephemeral data

pub mod config;

pub use config::DistroConfig;
