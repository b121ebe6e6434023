//! README and LICENSE templates written next to every generated page.

use chrono::{DateTime, Datelike, Utc};

/// Render the repository README.
pub fn render_readme(
    task: &str,
    round: u32,
    email: Option<&str>,
    document: &str,
    generated_at: DateTime<Utc>,
) -> String {
    let title = title_case(task);
    let timestamp = generated_at.to_rfc3339();
    let lines = document.lines().count();

    format!(
        "# {title}\n\
         \n\
         ## Project Overview\n\
         \n\
         This application was generated automatically from a task brief and published as a \
         static page.\n\
         \n\
         ## Generated Application\n\
         \n\
         - **Task ID:** `{task}`\n\
         - **Round:** {round}\n\
         - **Generated:** {timestamp}\n\
         - **Requested by:** {requester}\n\
         - **Code Size:** {lines} lines, {chars} characters\n\
         \n\
         ## Quick Start\n\
         \n\
         1. **View the live application** through the repository's Pages URL.\n\
         2. **Run locally:**\n\
         \n\
         ```bash\n\
         git clone <repository-url>\n\
         cd <repository-name>\n\
         open index.html\n\
         ```\n\
         \n\
         ## Technical Details\n\
         \n\
         - **Framework:** single-page HTML application\n\
         - **Styling:** inline CSS\n\
         - **Functionality:** vanilla JavaScript (ES6+)\n\
         - **Dependencies:** self-contained, no build step\n\
         - **Assets:** files under `assets/` are loaded at runtime\n\
         \n\
         ## License\n\
         \n\
         This project is licensed under the MIT License - see the [LICENSE](LICENSE) file for \
         details.\n",
        requester = email.unwrap_or("Anonymous"),
        chars = document.chars().count(),
    )
}

/// Render an MIT license for the current year.
pub fn render_mit_license(now: DateTime<Utc>) -> String {
    format!(
        "MIT License\n\
         \n\
         Copyright (c) {} Pagesmith generated project\n\
         \n\
         Permission is hereby granted, free of charge, to any person obtaining a copy\n\
         of this software and associated documentation files (the \"Software\"), to deal\n\
         in the Software without restriction, including without limitation the rights\n\
         to use, copy, modify, merge, publish, distribute, sublicense, and/or sell\n\
         copies of the Software, and to permit persons to whom the Software is\n\
         furnished to do so, subject to the following conditions:\n\
         \n\
         The above copyright notice and this permission notice shall be included in all\n\
         copies or substantial portions of the Software.\n\
         \n\
         THE SOFTWARE IS PROVIDED \"AS IS\", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR\n\
         IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,\n\
         FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE\n\
         AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER\n\
         LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,\n\
         OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE\n\
         SOFTWARE.\n",
        now.year()
    )
}

/// "hello-world_app" -> "Hello World App"
fn title_case(task: &str) -> String {
    task.split(['-', '_', ' '])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("hello-world_app"), "Hello World App");
        assert_eq!(title_case("--"), "");
    }

    #[test]
    fn test_readme_mentions_task_and_size() {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let readme = render_readme("hello-world", 1, Some("dev@example.com"), "<html>\n</html>", at);
        assert!(readme.starts_with("# Hello World\n"));
        assert!(readme.contains("`hello-world`"));
        assert!(readme.contains("dev@example.com"));
        assert!(readme.contains("2 lines, 14 characters"));
    }

    #[test]
    fn test_license_uses_current_year() {
        let at = Utc.with_ymd_and_hms(2031, 1, 1, 0, 0, 0).unwrap();
        let license = render_mit_license(at);
        assert!(license.starts_with("MIT License"));
        assert!(license.contains("Copyright (c) 2031"));
    }
}
