//! GitHub REST client for repositories, contents, and Pages.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::{HostingService, SiteFile};
use crate::config::Config;
use crate::errors::HostingError;
use crate::models::PublishedSite;
use crate::retry::RetryPolicy;

const USER_AGENT: &str = concat!("pagesmith/", env!("CARGO_PKG_VERSION"));

/// Branch the page service publishes from.
pub const PAGES_BRANCH: &str = "main";

#[derive(Debug, Deserialize)]
struct RepoResponse {
    name: String,
    html_url: String,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    login: String,
}

#[derive(Debug, Deserialize)]
struct ContentResponse {
    sha: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommitRef {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct PutContentResponse {
    commit: CommitRef,
}

#[derive(Debug, Serialize)]
struct PutContentRequest<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<String>,
}

/// Outcome of a Pages enable call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagesStatus {
    Enabled,
    AlreadyEnabled,
}

/// Failure of a single HTTP attempt, before retry classification.
#[derive(Debug)]
enum AttemptError {
    Transport(reqwest::Error),
    Transient { status: u16, body: String },
}

impl std::fmt::Display for AttemptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptError::Transport(e) => write!(f, "{}", e),
            AttemptError::Transient { status, body } => write!(f, "HTTP {}: {}", status, body),
        }
    }
}

/// GitHub API client.
pub struct GitHubClient {
    http: Client,
    api_url: String,
    token: String,
    owner: OnceCell<String>,
    retry: RetryPolicy,
}

impl GitHubClient {
    pub fn new(config: &Config) -> Result<Self, HostingError> {
        let retry = RetryPolicy::new(config.hosting_max_attempts, config.retry_base_delay);
        let client = Self::with_retry(&config.github_api_url, &config.github_token, retry)?;
        if let Some(owner) = &config.github_owner {
            let _ = client.owner.set(owner.clone());
        }
        Ok(client)
    }

    pub fn with_retry(api_url: &str, token: &str, retry: RetryPolicy) -> Result<Self, HostingError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            owner: OnceCell::new(),
            retry,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.api_url, path);
        debug!("{} {}", method, url);
        self.http
            .request(method, url)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
            .header(header::ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    /// Send a request, retrying network failures and transient statuses.
    ///
    /// Any other status is returned to the caller for interpretation.
    async fn send<F>(&self, operation: &str, build: F) -> Result<Response, HostingError>
    where
        F: Fn() -> RequestBuilder,
    {
        self.send_counted(operation, build)
            .await
            .map(|(response, _)| response)
    }

    /// [`send`](Self::send), also returning how many attempts it took.
    async fn send_counted<F>(&self, operation: &str, build: F) -> Result<(Response, u32), HostingError>
    where
        F: Fn() -> RequestBuilder,
    {
        let build = &build;
        let outcome = self
            .retry
            .run(
                operation,
                move || async move {
                    let response = build().send().await.map_err(AttemptError::Transport)?;
                    if is_transient(&response) {
                        let status = response.status().as_u16();
                        let body = response.text().await.unwrap_or_default();
                        return Err(AttemptError::Transient { status, body });
                    }
                    Ok(response)
                },
                |err| match err {
                    AttemptError::Transport(e) => e.is_timeout() || e.is_connect(),
                    AttemptError::Transient { .. } => true,
                },
            )
            .await;

        let attempts = outcome.attempts;
        outcome.result.map(|response| (response, attempts)).map_err(|err| match err {
            AttemptError::Transport(e) => HostingError::Request(e),
            AttemptError::Transient { status, body } => HostingError::Upstream {
                operation: operation.to_string(),
                status,
                body,
            },
        })
    }

    /// Account that owns generated repositories.
    pub async fn owner(&self) -> Result<&str, HostingError> {
        let owner = self
            .owner
            .get_or_try_init(|| async {
                let response = self
                    .send("get authenticated user", || self.request(reqwest::Method::GET, "/user"))
                    .await?;
                let user: UserResponse = expect_json(response, "get authenticated user").await?;
                info!("GitHub authenticated as: {}", user.login);
                Ok::<_, HostingError>(user.login)
            })
            .await?;
        Ok(owner.as_str())
    }

    async fn create_repository(&self, name: &str, description: &str) -> Result<RepoResponse, HostingError> {
        let body = json!({
            "name": name,
            "description": description,
            "private": false,
            "has_issues": true,
            "has_wiki": false,
            "auto_init": false,
        });
        let (response, attempts) = self
            .send_counted("create repository", || {
                self.request(reqwest::Method::POST, "/user/repos").json(&body)
            })
            .await?;

        if response.status() == StatusCode::UNPROCESSABLE_ENTITY {
            let body = response.text().await.unwrap_or_default();
            if body.contains("already exists") {
                // An earlier attempt can create the repository and still fail on the wire
                if attempts > 1 {
                    warn!(
                        "Repository {} exists after {} create attempts; adopting it",
                        name, attempts
                    );
                    return self.get_repository(name).await;
                }
                return Err(HostingError::NameTaken(name.to_string()));
            }
            return Err(HostingError::Upstream {
                operation: "create repository".to_string(),
                status: 422,
                body,
            });
        }

        let repo: RepoResponse = expect_json(response, "create repository").await?;
        info!("Repository created: {}", repo.html_url);
        Ok(repo)
    }

    async fn get_repository(&self, repo_name: &str) -> Result<RepoResponse, HostingError> {
        let owner = self.owner().await?;
        let path = format!("/repos/{}/{}", owner, repo_name);
        let response = self
            .send("get repository", || self.request(reqwest::Method::GET, &path))
            .await?;
        expect_json(response, "get repository").await
    }

    async fn get_content(&self, repo_name: &str, file_path: &str) -> Result<Option<ContentResponse>, HostingError> {
        let owner = self.owner().await?;
        let path = format!("/repos/{}/{}/contents/{}", owner, repo_name, file_path);
        let response = self
            .send("get file", || {
                self.request(reqwest::Method::GET, &path)
                    .query(&[("ref", PAGES_BRANCH)])
            })
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        expect_json(response, "get file").await.map(Some)
    }

    /// Create or overwrite one file; returns the resulting commit sha.
    async fn put_file(&self, repo_name: &str, file: &SiteFile) -> Result<String, HostingError> {
        let existing_sha = self
            .get_content(repo_name, &file.path)
            .await?
            .map(|content| content.sha);

        let owner = self.owner().await?;
        let path = format!("/repos/{}/{}/contents/{}", owner, repo_name, file.path);
        let body = PutContentRequest {
            message: &file.message,
            content: BASE64.encode(&file.content),
            branch: PAGES_BRANCH,
            sha: existing_sha,
        };
        let response = self
            .send("write file", || self.request(reqwest::Method::PUT, &path).json(&body))
            .await?;

        let written: PutContentResponse = expect_json(response, "write file").await?;
        debug!("Wrote {} to {} ({})", file.path, repo_name, written.commit.sha);
        Ok(written.commit.sha)
    }

    async fn write_files(&self, repo_name: &str, files: &[SiteFile]) -> Result<Option<String>, HostingError> {
        let mut last_commit = None;
        for file in files {
            last_commit = Some(self.put_file(repo_name, file).await?);
        }
        Ok(last_commit)
    }

    pub async fn enable_pages(&self, repo_name: &str) -> Result<PagesStatus, HostingError> {
        let owner = self.owner().await?;
        let path = format!("/repos/{}/{}/pages", owner, repo_name);
        let body = json!({ "source": { "branch": PAGES_BRANCH, "path": "/" } });
        let response = self
            .send("enable pages", || self.request(reqwest::Method::POST, &path).json(&body))
            .await?;

        match response.status() {
            StatusCode::CREATED => {
                info!("GitHub Pages enabled for {}", repo_name);
                Ok(PagesStatus::Enabled)
            }
            StatusCode::CONFLICT => {
                info!("GitHub Pages already enabled for {}", repo_name);
                Ok(PagesStatus::AlreadyEnabled)
            }
            status => Err(HostingError::Upstream {
                operation: "enable pages".to_string(),
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }

    fn pages_url(owner: &str, repo_name: &str) -> String {
        format!("https://{}.github.io/{}/", owner.to_lowercase(), repo_name)
    }
}

#[async_trait]
impl HostingService for GitHubClient {
    async fn create_site(
        &self,
        name: &str,
        description: &str,
        files: &[SiteFile],
    ) -> Result<PublishedSite, HostingError> {
        let repo = match self.create_repository(name, description).await {
            Err(HostingError::NameTaken(taken)) => {
                let alternate = format!("{}-{}", taken, short_suffix());
                warn!("Repository {} already exists, retrying as {}", taken, alternate);
                self.create_repository(&alternate, description).await?
            }
            other => other?,
        };

        let commit_sha = self.write_files(&repo.name, files).await?;
        self.enable_pages(&repo.name).await?;

        let owner = self.owner().await?;
        Ok(PublishedSite {
            pages_url: Self::pages_url(owner, &repo.name),
            repo_name: repo.name,
            repo_url: repo.html_url,
            commit_sha,
            updated: false,
        })
    }

    async fn update_site(&self, repo_name: &str, files: &[SiteFile]) -> Result<PublishedSite, HostingError> {
        let repo = self.get_repository(repo_name).await?;
        info!("Updating repository: {}", repo.name);

        let commit_sha = self.write_files(&repo.name, files).await?;

        let owner = self.owner().await?;
        Ok(PublishedSite {
            pages_url: Self::pages_url(owner, &repo.name),
            repo_name: repo.name,
            repo_url: repo.html_url,
            commit_sha,
            updated: true,
        })
    }

    async fn fetch_file(&self, repo_name: &str, path: &str) -> Result<Option<Vec<u8>>, HostingError> {
        let Some(content) = self.get_content(repo_name, path).await? else {
            return Ok(None);
        };
        let encoded: String = content
            .content
            .unwrap_or_default()
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        BASE64
            .decode(encoded.as_bytes())
            .map(Some)
            .map_err(|e| HostingError::MalformedResponse(format!("file content is not base64: {}", e)))
    }

    async fn ping(&self) -> Result<(), HostingError> {
        let response = self
            .http
            .get(format!("{}/rate_limit", self.api_url))
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
            .timeout(Duration::from_secs(5))
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(HostingError::Upstream {
                operation: "ping".to_string(),
                status: status.as_u16(),
                body: String::new(),
            })
        }
    }
}

/// Rate limiting and server-side failures are worth another attempt.
fn is_transient(response: &Response) -> bool {
    match response.status() {
        StatusCode::TOO_MANY_REQUESTS
        | StatusCode::INTERNAL_SERVER_ERROR
        | StatusCode::BAD_GATEWAY
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::GATEWAY_TIMEOUT => true,
        StatusCode::FORBIDDEN => response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.trim() == "0"),
        _ => false,
    }
}

async fn expect_json<T: serde::de::DeserializeOwned>(
    response: Response,
    operation: &str,
) -> Result<T, HostingError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(HostingError::Upstream {
            operation: operation.to_string(),
            status: status.as_u16(),
            body,
        });
    }
    response
        .json()
        .await
        .map_err(|e| HostingError::MalformedResponse(format!("{}: {}", operation, e)))
}

fn short_suffix() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..6].to_string()
}
