//! Code generation through an LLM completion API.

mod extract;
mod openai;
mod prompt;

pub use extract::*;
pub use openai::*;
pub use prompt::*;

use async_trait::async_trait;

use crate::errors::GenerationError;
use crate::models::{Check, GeneratedArtifact, ResolvedAttachment};

/// Everything the generator needs to produce one document.
#[derive(Debug, Clone, Copy)]
pub struct GenerationInput<'a> {
    pub brief: &'a str,
    pub checks: &'a [Check],
    pub attachments: &'a [ResolvedAttachment],
    pub round: u32,
    /// Document published by the previous round, if any
    pub previous_document: Option<&'a str>,
}

/// Produces a self-contained HTML document from a brief.
#[async_trait]
pub trait CodeGenerator: Send + Sync {
    async fn generate(&self, input: GenerationInput<'_>) -> Result<GeneratedArtifact, GenerationError>;

    /// Cheap reachability probe for the health endpoint.
    async fn ping(&self) -> Result<(), GenerationError>;
}
