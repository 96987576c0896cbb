// Main library module for the Batata server node
// Wires cluster membership and the consistency protocol lifecycle into a runnable process

// Module declarations
pub mod config; // Command line handling
pub mod metrics; // Metrics and observability
pub mod startup; // Application startup utilities

// Re-export common functions from batata-common
pub use batata_common::local_ip;
