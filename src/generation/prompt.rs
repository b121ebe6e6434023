//! Prompt construction.

use std::fmt::Write;

use super::GenerationInput;

pub const SYSTEM_PROMPT: &str = "You are an expert web developer who creates complete, \
functional, production-ready web applications. You always generate valid, working HTML with \
inline CSS and JavaScript. Generate ONLY the HTML code without any markdown formatting or \
explanations.";

/// Build the user prompt for a generation request.
pub fn build_prompt(input: &GenerationInput<'_>) -> String {
    let mut prompt = String::new();

    if input.previous_document.is_some() {
        prompt.push_str(
            "Revise the existing single-page web application below so that it satisfies the \
             updated brief and requirements. Keep working features intact and return the full \
             revised document.\n\n",
        );
    } else {
        prompt.push_str(
            "Create a single-page static web application contained in one HTML file with \
             embedded CSS and JavaScript.\n\n",
        );
    }

    let _ = writeln!(prompt, "ROUND: {}", input.round);
    let _ = writeln!(prompt, "BRIEF: {}\n", input.brief);

    prompt.push_str("REQUIREMENTS TO SATISFY:\n");
    for check in input.checks {
        let _ = writeln!(prompt, "- {}", check.render());
    }

    if !input.attachments.is_empty() {
        let _ = writeln!(
            prompt,
            "\nATTACHMENTS PROVIDED ({} files, served from the \"assets/\" folder):",
            input.attachments.len()
        );
        for attachment in input.attachments {
            let _ = writeln!(
                prompt,
                "- assets/{} ({}, {} bytes)",
                attachment.name,
                attachment.media_type,
                attachment.content.len()
            );
        }
    }

    if let Some(previous) = input.previous_document {
        prompt.push_str("\nCURRENT DOCUMENT:\n");
        prompt.push_str(previous);
        prompt.push('\n');
    }

    prompt.push_str(
        "\nSPECIFICATIONS:\n\
         1. A single index.html that works standalone when opened in a browser\n\
         2. All CSS and JavaScript inline; major CDNs are the only allowed external dependencies\n\
         3. Load attachments with fetch() from the \"assets/\" folder and handle fetch errors\n\
         4. Responsive, accessible, modern HTML5/ES6+/CSS3\n\
         5. Every element referenced by the requirements must exist in the initial DOM\n\
         \n\
         IMPORTANT:\n\
         - Generate ONLY the complete HTML code\n\
         - Do not include markdown formatting or code blocks\n\
         - Start directly with <!DOCTYPE html>\n",
    );

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Check, ResolvedAttachment};

    #[test]
    fn test_prompt_embeds_brief_and_checks_verbatim() {
        let checks = vec![
            Check::from_text("js: document.querySelector('button') !== null"),
            Check::from_text("Shows an alert when clicked"),
        ];
        let input = GenerationInput {
            brief: "single page with a button that shows an alert",
            checks: &checks,
            attachments: &[],
            round: 1,
            previous_document: None,
        };

        let prompt = build_prompt(&input);
        assert!(prompt.contains("BRIEF: single page with a button that shows an alert"));
        assert!(prompt.contains("document.querySelector('button') !== null"));
        assert!(prompt.contains("- Shows an alert when clicked"));
        assert!(!prompt.contains("CURRENT DOCUMENT"));
        assert!(!prompt.contains("ATTACHMENTS"));
    }

    #[test]
    fn test_update_prompt_carries_previous_document_and_assets() {
        let attachments = vec![ResolvedAttachment {
            name: "data.csv".to_string(),
            original_name: "data.csv".to_string(),
            media_type: "text/csv".to_string(),
            content: b"a,b\n1,2\n".to_vec(),
        }];
        let input = GenerationInput {
            brief: "add a chart",
            checks: &[],
            attachments: &attachments,
            round: 2,
            previous_document: Some("<html><body>v1</body></html>"),
        };

        let prompt = build_prompt(&input);
        assert!(prompt.starts_with("Revise the existing"));
        assert!(prompt.contains("CURRENT DOCUMENT:\n<html><body>v1</body></html>"));
        assert!(prompt.contains("- assets/data.csv (text/csv, 8 bytes)"));
        assert!(prompt.contains("ROUND: 2"));
    }
}
