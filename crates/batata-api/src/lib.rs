//! Batata API - cluster model definitions
//!
//! This crate provides the cluster member model shared by the membership
//! layer and the consistency protocols.

pub mod model;

// Re-export commonly used types
pub use model::*;
