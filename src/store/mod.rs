//! Deployment state persistence.
//!
//! The state document maps a task identifier to its last successful deployment.
//! Callers go through the [`StateStore`] trait so the backing store can change
//! without touching the pipeline.

mod json_file;

pub use json_file::*;

use async_trait::async_trait;

use crate::errors::StateError;
use crate::models::DeploymentRecord;

/// Key-value access to deployment records.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Look up the record for a task.
    async fn get(&self, task_id: &str) -> Result<Option<DeploymentRecord>, StateError>;

    /// Insert or replace the record for a task.
    async fn put(&self, task_id: &str, record: DeploymentRecord) -> Result<(), StateError>;
}
