/// Page retrieval: HTTP GET plus HTML-to-text extraction.
///
/// Extraction goes through `html2text` with the trivial decorator, so markup is parsed by a
/// real HTML parser (quoted attributes, the full named-entity table) and no link footnotes or
/// emphasis markers end up in the archived text. Paragraph structure survives as blank-line
/// separated blocks so hot-section matching can segment the text later. Pages that need
/// client-side rendering are not supported.
use std::time::Duration;

use async_trait::async_trait;
use html2text::render::TrivialDecorator;

use crate::error::FetchError;

const USER_AGENT: &str = "Mozilla/5.0 (compatible; tos-monitor/0.1; terms-of-service change tracker)";

/// Wide enough that html2text never wraps a paragraph.
const RENDER_WIDTH: usize = 10_000;

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch the page at `url` and return its visible text.
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

pub struct HttpFetcher {
    http: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = resp.text().await?;
        let text = html_to_text(&body)?;
        if text.is_empty() {
            return Err(FetchError::Empty(url.to_string()));
        }
        Ok(text)
    }
}

/// Convert an HTML document to plain text with blank lines between block elements.
///
/// Lines are trimmed and runs of blank lines collapse to one, so the same markup always
/// yields the same bytes.
pub fn html_to_text(html: &str) -> Result<String, FetchError> {
    let rendered =
        html2text::from_read_with_decorator(html.as_bytes(), RENDER_WIDTH, TrivialDecorator::new())
            .map_err(|e| FetchError::Extract(e.to_string()))?;
    Ok(tidy_lines(&rendered))
}

fn tidy_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_blank = false;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            pending_blank = !out.is_empty();
            continue;
        }
        if !out.is_empty() {
            out.push_str(if pending_blank { "\n\n" } else { "\n" });
        }
        out.push_str(line);
        pending_blank = false;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::paragraphs;

    #[test]
    fn test_blocks_become_paragraphs() {
        let html = "<html><body><h1>Terms</h1><p>First paragraph.</p>\
            <p>Second<br>line</p></body></html>";
        let text = html_to_text(html).unwrap();
        assert!(text.starts_with("Terms\n\n"), "{text:?}");
        assert!(text.contains("First paragraph.\n\nSecond\nline"), "{text:?}");
        assert_eq!(paragraphs(&text).len(), 3);
    }

    #[test]
    fn test_quoted_angle_bracket_stays_inside_attribute() {
        let html = r#"<div data-note="a>b">Terms apply.</div><p>Caf&eacute; &hellip; &trade;</p>"#;
        let text = html_to_text(html).unwrap();
        assert!(!text.contains("b\""), "{text:?}");
        assert!(text.starts_with("Terms apply."), "{text:?}");
        assert!(text.contains("Caf\u{e9} \u{2026} \u{2122}"), "{text:?}");
        assert!(!text.contains('&'), "{text:?}");
    }

    #[test]
    fn test_script_and_style_dropped() {
        let html = "<html><body><style>p { color: red }</style><p>Visible clause.</p>\
            <script>var tracking = 1;</script></body></html>";
        let text = html_to_text(html).unwrap();
        assert_eq!(text, "Visible clause.");
    }

    #[test]
    fn test_links_render_without_footnotes() {
        let html = r#"<p>See the <a href="https://example.test/privacy?utm=1">privacy policy</a>.</p>"#;
        assert_eq!(html_to_text(html).unwrap(), "See the privacy policy.");
    }

    #[test]
    fn test_empty_document_yields_empty_text() {
        assert_eq!(html_to_text("<html><body>  </body></html>").unwrap(), "");
    }

    #[test]
    fn test_tidy_lines_collapses_blank_runs() {
        let text = "  Line one  \n\n\n\n  Line two\n";
        assert_eq!(tidy_lines(text), "Line one\n\nLine two");
    }

    #[test]
    fn test_same_markup_same_bytes() {
        let html = "<p>One</p><ul><li>alpha</li><li>beta</li></ul>";
        assert_eq!(html_to_text(html).unwrap(), html_to_text(html).unwrap());
    }
}
