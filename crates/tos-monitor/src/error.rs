use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use tos_common::openai::OpenAiClientError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

/// Storage failures in the snapshot archive.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("archive root unusable at {path}: {source}")]
    Unavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("archive i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("snapshot name collision persisted past {attempts} attempts in {dir}")]
    Collision { dir: PathBuf, attempts: u32 },
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected status {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("page at {0} contained no text")]
    Empty(String),

    #[error("html extraction failed: {0}")]
    Extract(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SummaryError {
    #[error(transparent)]
    Client(#[from] OpenAiClientError),

    #[error("summary generation timed out after {0:?}")]
    Timeout(Duration),
}

/// The pipeline stage a per-source failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Archive,
    Classify,
    Summarize,
    Persist,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Fetch => "fetch",
            Stage::Archive => "archive",
            Stage::Classify => "classify",
            Stage::Summarize => "summarize",
            Stage::Persist => "persist",
        };
        f.write_str(s)
    }
}

/// A failure that aborts one source's run. Other sources are unaffected.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("classification task failed: {0}")]
    Classify(String),
}

impl SourceError {
    pub fn stage(&self) -> Stage {
        match self {
            SourceError::Fetch(_) => Stage::Fetch,
            SourceError::Archive(_) => Stage::Archive,
            SourceError::Classify(_) => Stage::Classify,
        }
    }
}
