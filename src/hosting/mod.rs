//! Publishing generated sites to a source-hosting platform.

mod attachments;
mod github;
mod templates;

pub use attachments::*;
pub use github::*;
pub use templates::*;

use async_trait::async_trait;
use chrono::Utc;

use crate::errors::HostingError;
use crate::models::{GeneratedArtifact, PublishedSite, ResolvedAttachment};

pub const INDEX_PATH: &str = "index.html";
pub const README_PATH: &str = "README.md";
pub const LICENSE_PATH: &str = "LICENSE";
/// Directory attachments are published under
pub const ASSETS_DIR: &str = "assets";

/// A file to write into the repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteFile {
    pub path: String,
    pub content: Vec<u8>,
    /// Commit message for this write
    pub message: String,
}

/// Repository and page-service operations used by the pipeline.
#[async_trait]
pub trait HostingService: Send + Sync {
    /// Create a public repository named `name`, write `files`, and enable the
    /// page service. A name collision is resolved by one retry under a
    /// suffixed name.
    async fn create_site(
        &self,
        name: &str,
        description: &str,
        files: &[SiteFile],
    ) -> Result<PublishedSite, HostingError>;

    /// Overwrite `files` in an existing repository.
    async fn update_site(&self, repo_name: &str, files: &[SiteFile]) -> Result<PublishedSite, HostingError>;

    /// Read a file from a repository; `None` when it does not exist.
    async fn fetch_file(&self, repo_name: &str, path: &str) -> Result<Option<Vec<u8>>, HostingError>;

    /// Cheap reachability probe for the health endpoint.
    async fn ping(&self) -> Result<(), HostingError>;
}

/// Assemble the full file set for one deployment.
pub fn site_files(
    task: &str,
    round: u32,
    email: Option<&str>,
    artifact: &GeneratedArtifact,
    attachments: &[ResolvedAttachment],
) -> Vec<SiteFile> {
    let now = Utc::now();
    let verb = if round > 1 { "Update" } else { "Add" };

    let mut files = vec![
        SiteFile {
            path: INDEX_PATH.to_string(),
            content: artifact.document.clone().into_bytes(),
            message: format!("{} application for {} (round {})", verb, task, round),
        },
        SiteFile {
            path: README_PATH.to_string(),
            content: render_readme(task, round, email, &artifact.document, now).into_bytes(),
            message: format!("{} README", verb),
        },
        SiteFile {
            path: LICENSE_PATH.to_string(),
            content: render_mit_license(now).into_bytes(),
            message: format!("{} MIT License", verb),
        },
    ];

    files.extend(attachments.iter().map(|attachment| SiteFile {
        path: format!("{}/{}", ASSETS_DIR, attachment.name),
        content: attachment.content.clone(),
        message: format!("{} attachment: {}", verb, attachment.original_name),
    }));

    files
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_files_layout() {
        let artifact = GeneratedArtifact {
            document: "<html></html>".to_string(),
            model: "gpt-4o".to_string(),
        };
        let attachments = vec![ResolvedAttachment {
            name: "logo.png".to_string(),
            original_name: "logo.png".to_string(),
            media_type: "image/png".to_string(),
            content: vec![0x89, 0x50],
        }];

        let files = site_files("hello-world", 1, None, &artifact, &attachments);
        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["index.html", "README.md", "LICENSE", "assets/logo.png"]
        );
        assert_eq!(files[0].content, b"<html></html>");
        assert_eq!(files[3].content, vec![0x89, 0x50]);
        assert!(files[0].message.starts_with("Add application"));

        let updated = site_files("hello-world", 2, None, &artifact, &[]);
        assert_eq!(updated.len(), 3);
        assert!(updated[0].message.starts_with("Update application"));
    }
}
