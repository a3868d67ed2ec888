/// Reading and writing the results document.
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::error::AppError;
use crate::model::ResultsDocument;

/// Load the previous run's document from the first path that holds one.
///
/// Missing files are skipped silently; unreadable or malformed ones are skipped with a
/// warning so that a corrupt copy never blocks a run.
pub fn load_prior(paths: &[PathBuf]) -> Option<ResultsDocument> {
    for path in paths {
        match read_document(path) {
            Ok(Some(doc)) => {
                info!(path = %path.display(), records = doc.companies.len(), "loaded prior results");
                return Some(doc);
            }
            Ok(None) => continue,
            Err(e) => warn!(error = %e, "ignoring unreadable prior results"),
        }
    }
    None
}

fn read_document(path: &Path) -> Result<Option<ResultsDocument>, AppError> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(AppError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|source| AppError::Json {
            path: path.to_path_buf(),
            source,
        })
}

/// Write the document as pretty JSON to every path, each replaced atomically.
pub fn write_all(doc: &ResultsDocument, paths: &[PathBuf]) -> Result<(), AppError> {
    let json = serde_json::to_string_pretty(doc).map_err(|source| AppError::Json {
        path: PathBuf::from("<results>"),
        source,
    })?;
    for path in paths {
        write_atomic(path, &json)?;
        info!(path = %path.display(), records = doc.companies.len(), "results written");
    }
    Ok(())
}

fn write_atomic(path: &Path, content: &str) -> Result<(), AppError> {
    let io_err = |source| AppError::Io {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(io_err)?;
    let mut tmp = NamedTempFile::new_in(&dir).map_err(io_err)?;
    tmp.write_all(content.as_bytes()).map_err(io_err)?;
    tmp.write_all(b"\n").map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}
