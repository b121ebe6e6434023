//! Pulls a single HTML document out of a model response.

use crate::errors::GenerationError;

/// Strip markdown fences and surrounding chatter, then check the document shape.
pub fn extract_document(raw: &str) -> Result<String, GenerationError> {
    let body = strip_code_fence(raw.trim());
    let lower = body.to_ascii_lowercase();

    let start = lower
        .find("<!doctype html")
        .or_else(|| lower.find("<html"))
        .ok_or_else(|| {
            if body.is_empty() {
                GenerationError::InvalidDocument("model returned an empty document".to_string())
            } else {
                GenerationError::InvalidDocument("no <html> document root found".to_string())
            }
        })?;

    let end = lower
        .rfind("</html>")
        .filter(|&end| end > start)
        .map(|end| end + "</html>".len())
        .ok_or_else(|| {
            GenerationError::InvalidDocument(
                "document has no closing </html>; the generation looks truncated".to_string(),
            )
        })?;

    Ok(body[start..end].to_string())
}

/// Unwrap a fenced block that encloses the document. Fences that open after the
/// document root belong to the page itself and are left alone.
fn strip_code_fence(text: &str) -> &str {
    let Some(open) = text.find("```") else {
        return text;
    };
    let lower = text.to_ascii_lowercase();
    let root = lower.find("<!doctype html").or_else(|| lower.find("<html"));
    if root.is_some_and(|root| root < open) {
        return text;
    }

    let after_open = &text[open + 3..];
    // Skip the info string (e.g. "html") up to the end of the fence line
    let content_start = after_open.find('\n').map(|i| i + 1).unwrap_or(after_open.len());
    let content = &after_open[content_start..];
    match content.rfind("```") {
        Some(close) => content[..close].trim(),
        None => content.trim(),
    }
}
