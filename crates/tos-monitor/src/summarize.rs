/// Summary generation through an OpenAI-compatible chat endpoint.
///
/// Two modes:
/// - overview: the whole document, used the first time a source is seen
/// - diff: a unified diff of the previous and current versions plus the classifier reason
use async_trait::async_trait;
use similar::TextDiff;

use crate::error::SummaryError;
use tos_common::openai::OpenAiClient;

pub const AI_TOS_SUMMARY_PROMPT: &str = "You are a legal summarizer for Terms of Service documents. \
Focus on data rights: how user data is collected, shared or sold, whether user content is used \
to train AI models, changes that reduce user privacy, and liability or dispute-resolution terms. \
Answer in plain language in at most 30 words. Start with a severity of High, Medium, or Low.";

/// Diff lines sent to the model at most.
const MAX_DIFF_LINES: usize = 500;
/// Characters of full text sent in overview mode at most.
const MAX_OVERVIEW_CHARS: usize = 24_000;
const MAX_TOKENS: u32 = 256;
const TEMPERATURE: f32 = 0.3;

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize_overview(&self, text: &str) -> Result<String, SummaryError>;

    async fn summarize_diff(
        &self,
        old_text: &str,
        new_text: &str,
        reason: &str,
    ) -> Result<String, SummaryError>;
}

pub struct OpenAiSummarizer {
    client: OpenAiClient,
}

impl OpenAiSummarizer {
    pub fn new(client: OpenAiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Summarizer for OpenAiSummarizer {
    async fn summarize_overview(&self, text: &str) -> Result<String, SummaryError> {
        let prompt = format!(
            "Summarize the following Terms of Service.\n\n{}",
            truncate_chars(text, MAX_OVERVIEW_CHARS)
        );
        Ok(self
            .client
            .complete(AI_TOS_SUMMARY_PROMPT, &prompt, MAX_TOKENS, TEMPERATURE)
            .await?)
    }

    async fn summarize_diff(
        &self,
        old_text: &str,
        new_text: &str,
        reason: &str,
    ) -> Result<String, SummaryError> {
        let prompt = format!(
            "The Terms of Service changed ({reason}). Summarize what the change means for users.\n\n{}",
            build_diff(old_text, new_text)
        );
        Ok(self
            .client
            .complete(AI_TOS_SUMMARY_PROMPT, &prompt, MAX_TOKENS, TEMPERATURE)
            .await?)
    }
}

/// Unified diff (`previous` -> `current`, 3 lines of context), capped at 500 lines.
pub fn build_diff(old_text: &str, new_text: &str) -> String {
    let diff = TextDiff::from_lines(old_text, new_text)
        .unified_diff()
        .context_radius(3)
        .header("previous", "current")
        .to_string();
    let mut lines: Vec<&str> = diff.lines().take(MAX_DIFF_LINES + 1).collect();
    if lines.len() > MAX_DIFF_LINES {
        lines.truncate(MAX_DIFF_LINES);
        lines.push("... (diff truncated)");
    }
    lines.join("\n")
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
