//! Request validation. Runs before any external call.

use serde_json::Value;
use url::Url;

use crate::auth::secret_matches;
use crate::errors::ValidationError;
use crate::models::{Check, DeploymentRequest, RawDeploymentRequest};

/// Normalize and validate a raw request against the configured secret.
pub fn validate(raw: RawDeploymentRequest, expected_secret: &str) -> Result<DeploymentRequest, ValidationError> {
    let raw = raw.flatten_task();

    let secret = raw
        .secret
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or(ValidationError::MissingField("secret"))?;
    let task = raw
        .task_id()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(ValidationError::MissingField("task"))?
        .to_string();
    let round = raw
        .round
        .as_ref()
        .ok_or(ValidationError::MissingField("round"))?;
    let brief = raw
        .brief
        .as_deref()
        .ok_or(ValidationError::MissingField("brief"))?;
    let checks = raw
        .checks
        .as_deref()
        .filter(|c| !c.is_empty())
        .ok_or(ValidationError::MissingField("checks"))?;

    if !secret_matches(secret, expected_secret) {
        tracing::warn!(task = %task, secret_len = secret.len(), "Secret mismatch");
        return Err(ValidationError::InvalidSecret);
    }

    let round = parse_round(round)?;

    let brief = brief.trim();
    if brief.is_empty() {
        return Err(ValidationError::EmptyBrief);
    }

    let checks = checks
        .iter()
        .enumerate()
        .map(|(index, value)| parse_check(value).ok_or(ValidationError::InvalidCheck(index)))
        .collect::<Result<Vec<_>, _>>()?;

    let email = match raw.email.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
        Some(email) if looks_like_email(email) => Some(email.to_string()),
        Some(email) => return Err(ValidationError::InvalidEmail(email.to_string())),
        None => None,
    };

    let evaluation_url = match raw
        .evaluation_url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
    {
        Some(url) if is_http_url(url) => Some(url.to_string()),
        Some(url) => return Err(ValidationError::InvalidCallbackUrl(url.to_string())),
        None => None,
    };

    let nonce = raw
        .nonce
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    Ok(DeploymentRequest {
        email,
        task,
        round,
        nonce,
        brief: brief.to_string(),
        checks,
        evaluation_url,
        attachments: raw.attachments.unwrap_or_default(),
    })
}

fn parse_round(value: &Value) -> Result<u32, ValidationError> {
    let parsed = match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse::<u32>().ok(),
        _ => None,
    };
    parsed
        .filter(|&round| round >= 1)
        .ok_or_else(|| ValidationError::InvalidRound(value.to_string()))
}

fn parse_check(value: &Value) -> Option<Check> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(Check::from_text(text)),
        Value::Object(map) => {
            let field = |name: &str| {
                map.get(name)
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            };
            let check = Check {
                description: field("description"),
                js: field("js"),
            };
            (check.description.is_some() || check.js.is_some()).then_some(check)
        }
        _ => None,
    }
}

fn looks_like_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}

fn is_http_url(raw: &str) -> bool {
    Url::parse(raw)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.host_str().is_some())
        .unwrap_or(false)
}
