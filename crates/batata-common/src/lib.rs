//! Batata Common - Shared types and utilities
//!
//! This crate provides the foundational types used across all Batata components:
//! - Error types
//! - Utility functions

pub mod error;
pub mod utils;

// Re-exports for convenience
pub use error::{BatataError, Result};
pub use utils::local_ip;
