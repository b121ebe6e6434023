//! Decoding declared attachments into publishable bytes.
//!
//! Attachments arrive as `data:` URLs or remote http(s) URLs. Anything that
//! cannot be decoded or fetched is skipped with a warning; it never fails the
//! deployment.

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::{header, Client};
use tracing::{info, warn};

use crate::models::{Attachment, ResolvedAttachment};

/// Largest remote attachment that will be downloaded.
pub const MAX_REMOTE_ATTACHMENT_BYTES: usize = 10 * 1024 * 1024;

/// Attachments that were resolved plus warnings for the ones that were skipped.
#[derive(Debug, Default)]
pub struct ResolvedAttachments {
    pub files: Vec<ResolvedAttachment>,
    pub warnings: Vec<String>,
}

/// Turns declared attachments into bytes.
pub struct AttachmentResolver {
    http: Client,
    max_bytes: usize,
}

impl AttachmentResolver {
    pub fn new() -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            http,
            max_bytes: MAX_REMOTE_ATTACHMENT_BYTES,
        })
    }

    #[cfg(test)]
    fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub async fn resolve_all(&self, attachments: &[Attachment]) -> ResolvedAttachments {
        let mut resolved = ResolvedAttachments::default();

        for attachment in attachments {
            match self.resolve(attachment).await {
                Ok(file) => {
                    info!(
                        "Resolved attachment {} ({} bytes)",
                        file.name,
                        file.content.len()
                    );
                    resolved.files.push(file);
                }
                Err(reason) => {
                    let message = format!("Skipped attachment '{}': {}", attachment.name, reason);
                    warn!("{}", message);
                    resolved.warnings.push(message);
                }
            }
        }

        resolved
    }

    async fn resolve(&self, attachment: &Attachment) -> Result<ResolvedAttachment, String> {
        let name = sanitize_file_name(&attachment.name)
            .ok_or_else(|| "name is empty or unusable".to_string())?;
        let url = attachment.url.trim();

        let (media_type, content) = if url.starts_with("data:") {
            decode_data_url(url)?
        } else if url.starts_with("http://") || url.starts_with("https://") {
            self.fetch_remote(url).await?
        } else if url.is_empty() {
            return Err("url is empty".to_string());
        } else {
            return Err("url must be a data: URL or an http(s) URL".to_string());
        };

        Ok(ResolvedAttachment {
            name,
            original_name: attachment.name.clone(),
            media_type,
            content,
        })
    }

    async fn fetch_remote(&self, url: &str) -> Result<(String, Vec<u8>), String> {
        let mut response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| format!("fetch failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("fetch returned {}", status));
        }
        if response
            .content_length()
            .is_some_and(|len| len > self.max_bytes as u64)
        {
            return Err("remote file exceeds the size limit".to_string());
        }

        let media_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "application/octet-stream".to_string());

        // Chunked responses carry no length up front
        let mut content = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| format!("download failed: {}", e))?
        {
            if content.len() + chunk.len() > self.max_bytes {
                return Err("remote file exceeds the size limit".to_string());
            }
            content.extend_from_slice(&chunk);
        }

        Ok((media_type, content))
    }
}

/// Decode `data:[<media type>][;base64],<data>`.
pub fn decode_data_url(url: &str) -> Result<(String, Vec<u8>), String> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| "not a data: URL".to_string())?;
    let (header, data) = rest
        .split_once(',')
        .ok_or_else(|| "data: URL has no ',' separator".to_string())?;

    let mut params = header.split(';');
    let media_type = params
        .next()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or("text/plain")
        .to_string();
    let is_base64 = params.any(|p| p.trim().eq_ignore_ascii_case("base64"));

    let content = if is_base64 {
        let compact: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        BASE64
            .decode(compact.as_bytes())
            .map_err(|e| format!("invalid base64 payload: {}", e))?
    } else {
        data.as_bytes().to_vec()
    };

    Ok((media_type, content))
}

/// Reduce a caller-supplied name to a safe single path segment.
pub fn sanitize_file_name(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .trim()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();

    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Router};

    #[test]
    fn test_decode_base64_data_url() {
        let (media, bytes) = decode_data_url("data:text/csv;base64,YSxiCjEsMgo=").unwrap();
        assert_eq!(media, "text/csv");
        assert_eq!(bytes, b"a,b\n1,2\n");
    }

    #[test]
    fn test_decode_plain_data_url() {
        let (media, bytes) = decode_data_url("data:,hello").unwrap();
        assert_eq!(media, "text/plain");
        assert_eq!(bytes, b"hello");
    }

    #[test]
    fn test_decode_rejects_bad_base64() {
        assert!(decode_data_url("data:image/png;base64,***").is_err());
        assert!(decode_data_url("data:image/png;base64").is_err());
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("../../etc/passwd").as_deref(), Some("passwd"));
        assert_eq!(sanitize_file_name("my data.csv").as_deref(), Some("my_data.csv"));
        assert_eq!(sanitize_file_name(".hidden").as_deref(), Some("hidden"));
        assert_eq!(sanitize_file_name("C:\\x\\logo.png").as_deref(), Some("logo.png"));
        assert_eq!(sanitize_file_name("///"), None);
        assert_eq!(sanitize_file_name("   "), None);
    }

    #[tokio::test]
    async fn test_resolve_all_skips_bad_attachments() {
        let router = Router::new()
            .route(
                "/sample.json",
                get(|| async { ([(header::CONTENT_TYPE, "application/json; charset=utf-8")], "{}") }),
            )
            .route(
                "/missing.txt",
                get(|| async { (axum::http::StatusCode::NOT_FOUND, "") }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let attachments = vec![
            Attachment {
                name: "data.csv".into(),
                url: "data:text/csv;base64,YSxiCjEsMgo=".into(),
            },
            Attachment {
                name: "sample.json".into(),
                url: format!("http://{}/sample.json", addr),
            },
            Attachment {
                name: "broken.png".into(),
                url: "data:image/png;base64,!!!".into(),
            },
            Attachment {
                name: "missing.txt".into(),
                url: format!("http://{}/missing.txt", addr),
            },
            Attachment {
                name: "ftp.bin".into(),
                url: "ftp://example.com/x".into(),
            },
        ];

        let resolved = AttachmentResolver::new()
            .unwrap()
            .resolve_all(&attachments)
            .await;

        let names: Vec<&str> = resolved.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["data.csv", "sample.json"]);
        assert_eq!(resolved.files[1].media_type, "application/json");
        assert_eq!(resolved.files[1].content, b"{}");
        assert_eq!(resolved.warnings.len(), 3);
        assert!(resolved.warnings[0].contains("broken.png"));
    }

    /// Serves one chunked response of `chunks` x 256 bytes with no Content-Length.
    async fn chunked_server(chunks: usize) -> std::net::SocketAddr {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    return;
                }
                request.extend_from_slice(&buf[..n]);
            }

            let head = "HTTP/1.1 200 OK\r\ncontent-type: text/plain\r\ntransfer-encoding: chunked\r\n\r\n";
            if socket.write_all(head.as_bytes()).await.is_err() {
                return;
            }
            let chunk = format!("100\r\n{}\r\n", "x".repeat(256));
            for _ in 0..chunks {
                if socket.write_all(chunk.as_bytes()).await.is_err() {
                    return;
                }
            }
            let _ = socket.write_all(b"0\r\n\r\n").await;
        });
        addr
    }

    #[tokio::test]
    async fn test_chunked_download_stops_at_size_limit() {
        let addr = chunked_server(64).await;
        let attachments = vec![Attachment {
            name: "big.txt".into(),
            url: format!("http://{}/big.txt", addr),
        }];

        let resolved = AttachmentResolver::new()
            .unwrap()
            .with_max_bytes(4096)
            .resolve_all(&attachments)
            .await;

        assert!(resolved.files.is_empty());
        assert_eq!(resolved.warnings.len(), 1);
        assert!(resolved.warnings[0].contains("size limit"));
    }

    #[tokio::test]
    async fn test_chunked_download_under_limit() {
        let addr = chunked_server(4).await;
        let attachments = vec![Attachment {
            name: "small.txt".into(),
            url: format!("http://{}/small.txt", addr),
        }];

        let resolved = AttachmentResolver::new()
            .unwrap()
            .with_max_bytes(4096)
            .resolve_all(&attachments)
            .await;

        assert!(resolved.warnings.is_empty());
        assert_eq!(resolved.files[0].content.len(), 1024);
        assert_eq!(resolved.files[0].media_type, "text/plain");
    }
}
