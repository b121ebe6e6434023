//! Deployment request models.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A file the caller wants published next to the generated page.
///
/// `url` is either a `data:` URL or a remote http(s) URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
}

/// Nested task description accepted in place of a bare task identifier.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskSpec {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub brief: Option<String>,
    #[serde(default)]
    pub checks: Option<Vec<Value>>,
    #[serde(default)]
    pub attachments: Option<Vec<Attachment>>,
    #[serde(default)]
    pub evaluation_url: Option<String>,
}

/// The `task` field: either an identifier or a nested task description.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TaskField {
    Id(String),
    Spec(TaskSpec),
}

/// Deploy request body exactly as received, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDeploymentRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub task: Option<TaskField>,
    /// Integer or numeric string
    #[serde(default)]
    pub round: Option<Value>,
    #[serde(default)]
    pub nonce: Option<String>,
    #[serde(default)]
    pub brief: Option<String>,
    /// Strings or `{description, js}` objects
    #[serde(default)]
    pub checks: Option<Vec<Value>>,
    #[serde(default)]
    pub evaluation_url: Option<String>,
    #[serde(default)]
    pub attachments: Option<Vec<Attachment>>,
}

impl RawDeploymentRequest {
    /// Hoist fields of a nested task description to the top level.
    ///
    /// Top-level values win over nested ones.
    pub fn flatten_task(mut self) -> Self {
        if let Some(TaskField::Spec(spec)) = self.task.take() {
            self.brief = self.brief.or(spec.brief);
            self.checks = self.checks.or(spec.checks);
            self.attachments = self.attachments.or(spec.attachments);
            self.evaluation_url = self.evaluation_url.or(spec.evaluation_url);
            self.task = spec.id.map(TaskField::Id);
        }
        self
    }

    /// Task identifier, if one is present.
    pub fn task_id(&self) -> Option<&str> {
        match &self.task {
            Some(TaskField::Id(id)) => Some(id.as_str()),
            Some(TaskField::Spec(spec)) => spec.id.as_deref(),
            None => None,
        }
    }
}

/// A single assertion the generated app should satisfy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Check {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Expression evaluated in the browser by the grader
    #[serde(skip_serializing_if = "Option::is_none")]
    pub js: Option<String>,
}

/// Prefix marking a string check as browser-executable.
pub const BROWSER_CHECK_PREFIX: &str = "js:";

impl Check {
    /// Parse a plain string check.
    pub fn from_text(text: &str) -> Self {
        let text = text.trim();
        match text.strip_prefix(BROWSER_CHECK_PREFIX) {
            Some(expr) => Self {
                description: None,
                js: Some(expr.trim().to_string()),
            },
            None => Self {
                description: Some(text.to_string()),
                js: None,
            },
        }
    }

    pub fn is_browser_check(&self) -> bool {
        self.js.is_some()
    }

    /// One-line rendering used in prompts.
    pub fn render(&self) -> String {
        match (&self.description, &self.js) {
            (Some(desc), Some(js)) => format!("{} (browser check: `{}`)", desc, js),
            (Some(desc), None) => desc.clone(),
            (None, Some(js)) => format!("Must satisfy browser check: `{}`", js),
            (None, None) => "General functionality requirement".to_string(),
        }
    }
}

/// A request that passed validation.
#[derive(Debug, Clone)]
pub struct DeploymentRequest {
    pub email: Option<String>,
    pub task: String,
    pub round: u32,
    pub nonce: String,
    pub brief: String,
    pub checks: Vec<Check>,
    pub evaluation_url: Option<String>,
    pub attachments: Vec<Attachment>,
}

impl DeploymentRequest {
    /// Round 1 creates a repository; later rounds update it.
    pub fn is_update(&self) -> bool {
        self.round > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_check_from_text() {
        let check = Check::from_text("js: document.querySelector('button') !== null");
        assert!(check.is_browser_check());
        assert_eq!(
            check.js.as_deref(),
            Some("document.querySelector('button') !== null")
        );

        let check = Check::from_text("Page has a title");
        assert!(!check.is_browser_check());
        assert_eq!(check.render(), "Page has a title");
    }

    #[test]
    fn test_nested_task_is_flattened() {
        let raw: RawDeploymentRequest = serde_json::from_value(json!({
            "secret": "s",
            "round": 1,
            "task": {
                "id": "captcha-solver",
                "brief": "Solve captchas",
                "checks": ["has an input"],
                "evaluation_url": "https://example.com/cb"
            }
        }))
        .unwrap();

        let raw = raw.flatten_task();
        assert_eq!(raw.task_id(), Some("captcha-solver"));
        assert_eq!(raw.brief.as_deref(), Some("Solve captchas"));
        assert_eq!(raw.checks.as_ref().map(Vec::len), Some(1));
        assert_eq!(raw.evaluation_url.as_deref(), Some("https://example.com/cb"));
    }

    #[test]
    fn test_top_level_fields_win_over_nested() {
        let raw: RawDeploymentRequest = serde_json::from_value(json!({
            "brief": "top level",
            "task": { "id": "t", "brief": "nested" }
        }))
        .unwrap();

        let raw = raw.flatten_task();
        assert_eq!(raw.brief.as_deref(), Some("top level"));
    }
}
