//! Log processor contract
//!
//! Business modules register a log processor per group; the protocol routes
//! committed logs and read requests for that group to it.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::{ConsistencyError, Result};

/// A replicated write
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Log {
    pub group: String,
    pub key: String,
    pub data: Vec<u8>,
    pub operation: String,
    #[serde(default)]
    pub extend_info: HashMap<String, String>,
}

impl Log {
    pub fn new(group: impl Into<String>, key: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            group: group.into(),
            key: key.into(),
            data,
            ..Default::default()
        }
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = operation.into();
        self
    }
}

/// A read routed to a group's processor
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadRequest {
    pub group: String,
    pub data: Vec<u8>,
    #[serde(default)]
    pub extend_info: HashMap<String, String>,
}

impl ReadRequest {
    pub fn new(group: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            group: group.into(),
            data,
            extend_info: HashMap::new(),
        }
    }
}

/// Result of applying a log or serving a read
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub success: bool,
    #[serde(default)]
    pub data: Vec<u8>,
    #[serde(default)]
    pub err_msg: Option<String>,
}

impl Response {
    pub fn ok(data: Vec<u8>) -> Self {
        Self {
            success: true,
            data,
            err_msg: None,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Vec::new(),
            err_msg: Some(message.into()),
        }
    }
}

/// Handler for the replicated logs of one group
#[async_trait]
pub trait LogProcessor: Send + Sync {
    /// The group this processor owns
    fn group(&self) -> &str;

    /// Serve a read request
    async fn on_request(&self, request: &ReadRequest) -> Result<Response>;

    /// Apply a committed log
    async fn on_apply(&self, log: &Log) -> Result<Response>;

    /// Called when applying or serving failed
    fn on_error(&self, error: &ConsistencyError) {
        error!(group = self.group(), "Log processor error: {}", error);
    }
}
