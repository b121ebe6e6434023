//! Persisted deployment state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Last known deployment outcome for one task identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub repo_name: String,
    pub round: u32,
    /// Commit produced by the last successful write
    #[serde(default)]
    pub commit_sha: Option<String>,
    #[serde(default)]
    pub repo_url: Option<String>,
    #[serde(default)]
    pub pages_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
