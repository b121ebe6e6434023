//! In-memory artifacts produced while handling one request.

use serde::Serialize;

/// The document returned by the code generator.
#[derive(Debug, Clone)]
pub struct GeneratedArtifact {
    /// Complete, self-contained HTML document
    pub document: String,
    /// Model that produced the document
    pub model: String,
}

/// An attachment decoded into bytes, ready to publish under `assets/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAttachment {
    /// Sanitized file name
    pub name: String,
    pub original_name: String,
    pub media_type: String,
    pub content: Vec<u8>,
}

/// Repository and page coordinates returned by the hosting service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishedSite {
    pub repo_name: String,
    pub repo_url: String,
    pub pages_url: String,
    pub commit_sha: Option<String>,
    /// True when an existing repository was updated
    pub updated: bool,
}
