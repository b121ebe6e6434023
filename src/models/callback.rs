//! Payload delivered to the caller's evaluation URL.

use serde::{Deserialize, Serialize};

/// Outcome of a deployment as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub task: String,
    pub round: u32,
    pub nonce: String,
    pub status: DeployStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_sha: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages_url: Option<String>,
    pub updated: bool,
    /// Seconds elapsed since the request arrived
    pub processing_time: f64,
}
