use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

static NON_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\-]").expect("valid regex"));

/// A monitored legal-text page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub slug: String,
    pub name: String,
    pub category: Option<String>,
    pub url: String,
}

impl Source {
    pub fn new(name: &str, category: Option<String>, url: &str) -> Self {
        Self {
            slug: slugify(name),
            name: name.to_string(),
            category,
            url: url.to_string(),
        }
    }
}

/// Derive the archive slug from a display name: every character that is not a word
/// character or `-` becomes `_`.
pub fn slugify(name: &str) -> String {
    NON_WORD_RE.replace_all(name, "_").into_owned()
}

/// One archived raw-text version of a source. Never mutated once written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub slug: String,
    pub date: NaiveDate,
    /// 0 means no filename suffix; 1.. map to `_1`, `_2`, ...
    pub sequence: u32,
    pub content: String,
    /// SHA-256 hex of `content`.
    pub fingerprint: String,
}

impl Snapshot {
    pub fn file_name(&self) -> String {
        snapshot_file_name(self.date, self.sequence)
    }
}

pub fn snapshot_file_name(date: NaiveDate, sequence: u32) -> String {
    let day = date.format("%Y-%m-%d");
    if sequence == 0 {
        format!("{day}.txt")
    } else {
        format!("{day}_{sequence}.txt")
    }
}

/// Per-source status as published in the results document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub tos_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl ResultRecord {
    /// A record carrying only the source identity, used when a source has never completed
    /// a run.
    pub fn bare(source: &Source) -> Self {
        Self {
            name: source.name.clone(),
            category: source.category.clone(),
            tos_url: source.url.clone(),
            last_checked: None,
            changed: None,
            change_reason: None,
            summary: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsDocument {
    pub updated_at: DateTime<Utc>,
    pub companies: Vec<ResultRecord>,
}

impl ResultsDocument {
    /// Look up the record for a source by display name.
    pub fn record_for(&self, name: &str) -> Option<&ResultRecord> {
        self.companies.iter().find(|r| r.name == name)
    }
}
