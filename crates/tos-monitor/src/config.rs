use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use tos_common::openai::OpenAiClientConfig;

use crate::classifier::{
    ClassifierConfig, DEFAULT_PERCENT_CHANGE_THRESHOLD, DEFAULT_SIMILARITY_THRESHOLD,
};
use crate::error::AppError;
use crate::hot_section::{default_hot_sections, HotSection, HotSectionSpec, NewSectionPolicy};
use crate::model::Source;

/// Application configuration loaded explicitly from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Sources file listing the monitored companies.
    pub sources_path: PathBuf,
    /// Root directory of the snapshot archive.
    pub archive_dir: PathBuf,
    /// Every location the results document is written to. The first is read back as the
    /// prior document.
    pub results_paths: Vec<PathBuf>,
    pub similarity_threshold: f64,
    pub percent_change_threshold: f64,
    pub new_section_policy: NewSectionPolicy,
    /// Sources processed concurrently.
    pub concurrency: usize,
    pub fetch_timeout: Duration,
    pub summary_timeout: Duration,
    /// Try to load the embedding model for semantic scoring.
    pub semantic_enabled: bool,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// All optional:
    /// - `TOS_CONFIG_PATH` (default "config.json")
    /// - `TOS_ARCHIVE_DIR` (default "terms_of_service")
    /// - `TOS_RESULTS_PATHS` comma-separated (default "public/data/results.json,data/results.json")
    /// - `TOS_SIMILARITY_THRESHOLD` (default 0.97), `TOS_PERCENT_CHANGE_THRESHOLD` (default 0.02)
    /// - `TOS_NEW_SECTION_POLICY` "score" | "flag" (default "score")
    /// - `TOS_CONCURRENCY` (default 4)
    /// - `TOS_FETCH_TIMEOUT_SECS` (default 20), `TOS_SUMMARY_TIMEOUT_SECS` (default 90)
    /// - `TOS_SEMANTIC` on/off (default on)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let sources_path = PathBuf::from(var("TOS_CONFIG_PATH").unwrap_or_else(|| "config.json".to_string()));
        let archive_dir =
            PathBuf::from(var("TOS_ARCHIVE_DIR").unwrap_or_else(|| "terms_of_service".to_string()));

        let results_paths: Vec<PathBuf> = var("TOS_RESULTS_PATHS")
            .unwrap_or_else(|| "public/data/results.json,data/results.json".to_string())
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .collect();
        if results_paths.is_empty() {
            return Err(AppError::Config(
                "TOS_RESULTS_PATHS must name at least one path".to_string(),
            ));
        }

        let similarity_threshold = parse_var(
            "TOS_SIMILARITY_THRESHOLD",
            var("TOS_SIMILARITY_THRESHOLD"),
            DEFAULT_SIMILARITY_THRESHOLD,
        )?;
        let percent_change_threshold = parse_var(
            "TOS_PERCENT_CHANGE_THRESHOLD",
            var("TOS_PERCENT_CHANGE_THRESHOLD"),
            DEFAULT_PERCENT_CHANGE_THRESHOLD,
        )?;
        for (key, value) in [
            ("TOS_SIMILARITY_THRESHOLD", similarity_threshold),
            ("TOS_PERCENT_CHANGE_THRESHOLD", percent_change_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(AppError::Config(format!(
                    "{key} must be within [0, 1], got {value}"
                )));
            }
        }

        let new_section_policy = match var("TOS_NEW_SECTION_POLICY") {
            Some(v) => v.parse()?,
            None => NewSectionPolicy::default(),
        };

        let concurrency: usize = parse_var("TOS_CONCURRENCY", var("TOS_CONCURRENCY"), 4)?;
        if concurrency == 0 {
            return Err(AppError::Config("TOS_CONCURRENCY must be at least 1".to_string()));
        }

        let fetch_timeout = Duration::from_secs(parse_var(
            "TOS_FETCH_TIMEOUT_SECS",
            var("TOS_FETCH_TIMEOUT_SECS"),
            20,
        )?);
        let summary_timeout = Duration::from_secs(parse_var(
            "TOS_SUMMARY_TIMEOUT_SECS",
            var("TOS_SUMMARY_TIMEOUT_SECS"),
            90,
        )?);

        let semantic_enabled = match var("TOS_SEMANTIC").map(|v| v.trim().to_ascii_lowercase()) {
            None => true,
            Some(v) => match v.as_str() {
                "on" | "1" | "true" | "yes" => true,
                "off" | "0" | "false" | "no" => false,
                other => {
                    return Err(AppError::Config(format!(
                        "TOS_SEMANTIC must be on or off, got {other:?}"
                    )))
                }
            },
        };

        Ok(Self {
            sources_path,
            archive_dir,
            results_paths,
            similarity_threshold,
            percent_change_threshold,
            new_section_policy,
            concurrency,
            fetch_timeout,
            summary_timeout,
            semantic_enabled,
        })
    }

    /// Reject a summary timeout that would cut the client's retries short.
    pub fn check_summary_budget(&self, openai: &OpenAiClientConfig) -> Result<(), AppError> {
        let needed = openai.worst_case_duration();
        if self.summary_timeout < needed {
            return Err(AppError::Config(format!(
                "TOS_SUMMARY_TIMEOUT_SECS ({}s) is shorter than the summarizer's retry budget \
                 ({:.1}s for {} attempts of {}s); raise it or lower OPENAI_TIMEOUT_SECS",
                self.summary_timeout.as_secs(),
                needed.as_secs_f64(),
                openai.retry.max_retries + 1,
                openai.request_timeout.as_secs(),
            )));
        }
        Ok(())
    }

    /// Combine the thresholds with a hot-section table into the classifier's config.
    pub fn classifier_config(&self, hot_sections: &[HotSectionSpec]) -> Result<ClassifierConfig, AppError> {
        Ok(ClassifierConfig {
            similarity_threshold: self.similarity_threshold,
            percent_change_threshold: self.percent_change_threshold,
            hot_sections: hot_sections
                .iter()
                .map(HotSection::compile)
                .collect::<Result<Vec<_>, _>>()?,
            new_section_policy: self.new_section_policy,
        })
    }
}

fn parse_var<T>(key: &str, value: Option<String>, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(v) => v
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("invalid {key}={v:?}: {e}"))),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SourcesFile {
    #[serde(default)]
    companies: Vec<SourceEntry>,
    #[serde(default)]
    hot_sections: Option<Vec<HotSectionSpec>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SourceEntry {
    name: String,
    #[serde(default)]
    category: Option<String>,
    tos_url: String,
}

/// Parsed sources file: the monitored sources in file order and the hot-section table.
#[derive(Debug)]
pub struct Sources {
    pub sources: Vec<Source>,
    pub hot_sections: Vec<HotSectionSpec>,
}

impl Sources {
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let content = std::fs::read_to_string(path).map_err(|source| AppError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|e| match e {
            SourcesParseError::Json(source) => AppError::Json {
                path: path.to_path_buf(),
                source,
            },
            SourcesParseError::Invalid(message) => {
                AppError::Config(format!("{}: {message}", path.display()))
            }
        })
    }

    fn parse(content: &str) -> Result<Self, SourcesParseError> {
        let file: SourcesFile = serde_json::from_str(content).map_err(SourcesParseError::Json)?;

        let mut seen = HashSet::new();
        let mut sources = Vec::with_capacity(file.companies.len());
        for entry in file.companies {
            if entry.name.trim().is_empty() {
                return Err(SourcesParseError::Invalid("company with empty name".to_string()));
            }
            let source = Source::new(&entry.name, entry.category, &entry.tos_url);
            if !seen.insert(source.slug.clone()) {
                return Err(SourcesParseError::Invalid(format!(
                    "company {:?} maps to archive slug {:?} which is already in use",
                    source.name, source.slug
                )));
            }
            sources.push(source);
        }

        Ok(Self {
            sources,
            hot_sections: file.hot_sections.unwrap_or_else(default_hot_sections),
        })
    }
}

#[derive(Debug)]
enum SourcesParseError {
    Json(serde_json::Error),
    Invalid(String),
}
