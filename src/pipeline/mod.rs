//! Deployment pipeline: validate, look up state, generate, publish, record, notify.
//!
//! Stages run strictly in that order. A failing stage short-circuits the ones
//! after it, except notification, which always runs once a request is valid.

mod validate;

pub use validate::*;

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::errors::{AppError, ValidationError};
use crate::generation::{CodeGenerator, GenerationInput};
use crate::hosting::{site_files, AttachmentResolver, HostingService, INDEX_PATH};
use crate::models::{
    CallbackPayload, DeployStatus, DeploymentRecord, DeploymentRequest, PublishedSite,
    RawDeploymentRequest,
};
use crate::notify::{CallbackNotifier, NotificationOutcome};
use crate::store::StateStore;

/// Longest slug taken from a task identifier when naming repositories.
const MAX_SLUG_LEN: usize = 60;

/// Result of a deployment as returned to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct DeployReport {
    pub status: DeployStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    pub message: String,
    pub task: String,
    pub round: u32,
    /// Seconds spent handling the request
    pub processing_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_sha: Option<String>,
    pub updated: bool,
    pub notification: NotificationOutcome,
    pub warnings: Vec<String>,
}

/// Why a deployment did not succeed.
#[derive(Debug)]
pub enum DeployError {
    /// Request rejected before any external call
    Invalid(ValidationError),
    /// A later stage failed; the report carries the notification outcome
    Failed { error: AppError, report: Box<DeployReport> },
}

/// Sequences the external services for one request.
pub struct Pipeline {
    store: Arc<dyn StateStore>,
    generator: Arc<dyn CodeGenerator>,
    hosting: Arc<dyn HostingService>,
    attachments: AttachmentResolver,
    notifier: CallbackNotifier,
    secret: String,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn StateStore>,
        generator: Arc<dyn CodeGenerator>,
        hosting: Arc<dyn HostingService>,
        attachments: AttachmentResolver,
        notifier: CallbackNotifier,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            store,
            generator,
            hosting,
            attachments,
            notifier,
            secret: secret.into(),
        }
    }

    pub fn validate(&self, raw: RawDeploymentRequest) -> Result<DeploymentRequest, ValidationError> {
        validate(raw, &self.secret)
    }

    pub async fn deploy(&self, raw: RawDeploymentRequest) -> Result<DeployReport, DeployError> {
        let started = Instant::now();
        let request = self.validate(raw).map_err(DeployError::Invalid)?;
        info!(
            task = %request.task,
            round = request.round,
            stage = "validate",
            checks = request.checks.len(),
            browser_checks = request.checks.iter().filter(|c| c.is_browser_check()).count(),
            attachments = request.attachments.len(),
            "Deployment request accepted"
        );

        let mut warnings = Vec::new();
        let (site, result) = match self.run_stages(&request, &mut warnings).await {
            Ok((site, record)) => {
                let recorded = self.record(&request, &site, record).await;
                (Some(site), recorded)
            }
            Err(err) => (None, Err(err)),
        };

        let (status, message) = match &result {
            Ok(()) => {
                let message = if site.as_ref().is_some_and(|s| s.updated) {
                    format!("Repository updated for round {}", request.round)
                } else {
                    "Deployment completed successfully".to_string()
                };
                (DeployStatus::Success, message)
            }
            Err(err) => {
                error!(
                    task = %request.task,
                    round = request.round,
                    stage = err.stage(),
                    repo = ?site.as_ref().map(|s| &s.repo_name),
                    "Deployment failed: {}",
                    err
                );
                (DeployStatus::Error, err.to_string())
            }
        };
        let site = site.as_ref();

        let payload = CallbackPayload {
            email: request.email.clone(),
            task: request.task.clone(),
            round: request.round,
            nonce: request.nonce.clone(),
            status,
            message: message.clone(),
            repo_name: site.map(|s| s.repo_name.clone()),
            repo_url: site.map(|s| s.repo_url.clone()),
            commit_sha: site.and_then(|s| s.commit_sha.clone()),
            pages_url: site.map(|s| s.pages_url.clone()),
            updated: site.is_some_and(|s| s.updated),
            processing_time: started.elapsed().as_secs_f64(),
        };
        let notification = self
            .notifier
            .notify(request.evaluation_url.as_deref(), &payload)
            .await;

        let report = DeployReport {
            status,
            code: None,
            message,
            task: payload.task,
            round: payload.round,
            processing_time: started.elapsed().as_secs_f64(),
            repo_name: payload.repo_name,
            repo_url: payload.repo_url,
            pages_url: payload.pages_url,
            commit_sha: payload.commit_sha,
            updated: payload.updated,
            notification,
            warnings,
        };

        match result {
            Ok(()) => {
                info!(
                    task = %report.task,
                    round = report.round,
                    stage = "done",
                    processing_time = report.processing_time,
                    "Deployment finished"
                );
                Ok(report)
            }
            Err(error) => Err(DeployError::Failed {
                report: Box::new(DeployReport {
                    code: Some(error.error_code()),
                    ..report
                }),
                error,
            }),
        }
    }

    async fn run_stages(
        &self,
        request: &DeploymentRequest,
        warnings: &mut Vec<String>,
    ) -> Result<(PublishedSite, DeploymentRecord), AppError> {
        let task = request.task.as_str();
        let round = request.round;

        let previous = self.store.get(task).await?;
        if request.is_update() && previous.is_none() {
            return Err(AppError::NoPriorDeployment(task.to_string()));
        }
        info!(
            task,
            round,
            stage = "state",
            existing = ?previous.as_ref().map(|r| &r.repo_name),
            "State lookup complete"
        );

        let resolved = self.attachments.resolve_all(&request.attachments).await;
        warnings.extend(resolved.warnings);

        let previous_document = match (&previous, request.is_update()) {
            (Some(record), true) => self.previous_document(request, &record.repo_name).await,
            _ => None,
        };

        info!(task, round, stage = "generate", "Generating application");
        let artifact = self
            .generator
            .generate(GenerationInput {
                brief: &request.brief,
                checks: &request.checks,
                attachments: &resolved.files,
                round,
                previous_document: previous_document.as_deref(),
            })
            .await?;
        info!(
            task,
            round,
            stage = "generate",
            model = %artifact.model,
            chars = artifact.document.len(),
            "Application generated"
        );

        let files = site_files(
            task,
            round,
            request.email.as_deref(),
            &artifact,
            &resolved.files,
        );

        info!(task, round, stage = "publish", files = files.len(), "Publishing site");
        let site = match &previous {
            Some(record) if request.is_update() => {
                self.hosting.update_site(&record.repo_name, &files).await?
            }
            _ => {
                let name = repository_name(task);
                let description = format!("Generated application for task {}", task);
                self.hosting.create_site(&name, &description, &files).await?
            }
        };

        let now = Utc::now();
        let record = DeploymentRecord {
            repo_name: site.repo_name.clone(),
            round,
            commit_sha: site.commit_sha.clone(),
            repo_url: Some(site.repo_url.clone()),
            pages_url: Some(site.pages_url.clone()),
            created_at: previous
                .filter(|_| request.is_update())
                .map(|r| r.created_at)
                .unwrap_or(now),
            updated_at: now,
        };

        Ok((site, record))
    }

    /// Persist the record of a published site. The site stays live when this fails.
    async fn record(
        &self,
        request: &DeploymentRequest,
        site: &PublishedSite,
        record: DeploymentRecord,
    ) -> Result<(), AppError> {
        self.store.put(&request.task, record).await?;
        info!(
            task = %request.task,
            round = request.round,
            stage = "record",
            repo = %site.repo_name,
            "Deployment recorded"
        );
        Ok(())
    }

    /// Published document of the previous round; `None` when it cannot be read.
    async fn previous_document(&self, request: &DeploymentRequest, repo_name: &str) -> Option<String> {
        match self.hosting.fetch_file(repo_name, INDEX_PATH).await {
            Ok(Some(bytes)) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            Ok(None) => {
                warn!(
                    task = %request.task,
                    round = request.round,
                    stage = "generate",
                    "No previous {} in {}; generating without it",
                    INDEX_PATH,
                    repo_name
                );
                None
            }
            Err(e) => {
                warn!(
                    task = %request.task,
                    round = request.round,
                    stage = "generate",
                    "Could not fetch previous document: {}",
                    e
                );
                None
            }
        }
    }
}

/// Fresh repository name for a task: slug, timestamp, and a random suffix.
pub fn repository_name(task: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}-{}",
        slugify(task),
        Utc::now().timestamp(),
        &suffix[..6]
    )
}

fn slugify(task: &str) -> String {
    let mut slug = String::with_capacity(task.len());
    for c in task.chars() {
        if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug: String = slug.trim_matches(['-', '.']).chars().take(MAX_SLUG_LEN).collect();
    let slug = slug.trim_end_matches(['-', '.']);

    if slug.is_empty() {
        "app".to_string()
    } else {
        slug.to_string()
    }
}
