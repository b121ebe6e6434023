//! OpenAI-compatible chat completion client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use super::{build_prompt, extract_document, CodeGenerator, GenerationInput, SYSTEM_PROMPT};
use crate::config::Config;
use crate::errors::GenerationError;
use crate::models::GeneratedArtifact;

const USER_AGENT: &str = concat!("pagesmith/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    presence_penalty: f32,
    frequency_penalty: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat completion client for any OpenAI-compatible endpoint.
pub struct OpenAiGenerator {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl OpenAiGenerator {
    pub fn new(config: &Config) -> Result<Self, GenerationError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(120))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            http,
            base_url: config.llm_base_url.clone(),
            api_key: config.llm_api_key.clone(),
            model: config.llm_model.clone(),
            max_tokens: 4000,
        })
    }

    async fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: self.max_tokens,
            temperature: 0.1,
            presence_penalty: 0.1,
            frequency_penalty: 0.1,
        };
        debug!("POST {}", url);

        let response = self
            .http
            .post(&url)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("LLM API call failed: {} - {}", status, body);
            return Err(GenerationError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::MalformedResponse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| GenerationError::MalformedResponse("response has no choices".to_string()))
    }
}

#[async_trait]
impl CodeGenerator for OpenAiGenerator {
    async fn generate(&self, input: GenerationInput<'_>) -> Result<GeneratedArtifact, GenerationError> {
        let prompt = build_prompt(&input);
        info!(
            round = input.round,
            prompt_chars = prompt.len(),
            "Requesting generation from {}",
            self.model
        );

        let raw = self.complete(&prompt).await?;
        let document = extract_document(&raw)?;
        info!("Generated {} characters of HTML", document.len());

        Ok(GeneratedArtifact {
            document,
            model: self.model.clone(),
        })
    }

    async fn ping(&self) -> Result<(), GenerationError> {
        let response = self
            .http
            .get(format!("{}/models", self.base_url))
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
            .timeout(Duration::from_secs(5))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(GenerationError::Upstream {
                status: status.as_u16(),
                body: String::new(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::post, Json, Router};
    use serde_json::{json, Value};

    use crate::models::Check;

    async fn spawn_llm(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn generator(base_url: String) -> OpenAiGenerator {
        OpenAiGenerator {
            http: Client::new(),
            base_url,
            api_key: "sk-test".to_string(),
            model: "gpt-4o".to_string(),
            max_tokens: 4000,
        }
    }

    fn input<'a>(checks: &'a [Check]) -> GenerationInput<'a> {
        GenerationInput {
            brief: "single page with a button that shows an alert",
            checks,
            attachments: &[],
            round: 1,
            previous_document: None,
        }
    }

    #[tokio::test]
    async fn test_generate_extracts_fenced_document() {
        let router = Router::new().route(
            "/chat/completions",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["model"], "gpt-4o");
                assert_eq!(body["messages"][0]["role"], "system");
                let prompt = body["messages"][1]["content"].as_str().unwrap_or_default();
                assert!(prompt.contains("button that shows an alert"));
                Json(json!({
                    "choices": [{
                        "message": {
                            "content": "```html\n<!DOCTYPE html><html><body><button>Hi</button></body></html>\n```"
                        }
                    }]
                }))
            }),
        );
        let base_url = spawn_llm(router).await;

        let checks = vec![Check::from_text("js: document.querySelector('button') !== null")];
        let artifact = generator(base_url).generate(input(&checks)).await.unwrap();
        assert_eq!(
            artifact.document,
            "<!DOCTYPE html><html><body><button>Hi</button></body></html>"
        );
        assert_eq!(artifact.model, "gpt-4o");
    }

    #[tokio::test]
    async fn test_upstream_error_is_surfaced() {
        let router = Router::new().route(
            "/chat/completions",
            post(|| async { (StatusCode::UNAUTHORIZED, "bad key") }),
        );
        let base_url = spawn_llm(router).await;

        let err = generator(base_url).generate(input(&[])).await.unwrap_err();
        assert!(matches!(err, GenerationError::Upstream { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_empty_choices_is_malformed() {
        let router = Router::new().route(
            "/chat/completions",
            post(|| async { Json(json!({ "choices": [] })) }),
        );
        let base_url = spawn_llm(router).await;

        let err = generator(base_url).generate(input(&[])).await.unwrap_err();
        assert!(matches!(err, GenerationError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_truncated_generation_is_a_failure() {
        let router = Router::new().route(
            "/chat/completions",
            post(|| async {
                Json(json!({
                    "choices": [{ "message": { "content": "<!DOCTYPE html><html><body>" } }]
                }))
            }),
        );
        let base_url = spawn_llm(router).await;

        let err = generator(base_url).generate(input(&[])).await.unwrap_err();
        assert!(matches!(err, GenerationError::InvalidDocument(_)));
    }
}
