//! Application startup utilities module.
//!
//! Logging, protocol wiring and shutdown handling used by the server binary.

mod logging;
mod protocol;
mod shutdown;

pub use logging::{LogRotation, LoggingConfig, LoggingGuard, init_logging};
pub use protocol::protocol_registry;
pub use shutdown::{ShutdownSignal, wait_for_shutdown_signal};
