/// Append-only snapshot archive on the local filesystem.
///
/// Layout under the archive root:
/// - `{slug}/{YYYY-MM-DD}.txt`: first distinct version captured on a date
/// - `{slug}/{YYYY-MM-DD}_{n}.txt`: further distinct versions on the same date
/// - `{slug}/summary.txt`: latest persisted summary (overwritten, not versioned)
///
/// Snapshot files are written through a temp file in the same directory and persisted with
/// no-clobber semantics, so a reader sees either no file or the complete content, and an
/// existing snapshot is never replaced. There is no update or delete path.
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::ArchiveError;
use crate::model::{snapshot_file_name, Snapshot};

const SUMMARY_FILE: &str = "summary.txt";
const MAX_PERSIST_ATTEMPTS: u32 = 8;

static SNAPSHOT_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4}-\d{2}-\d{2})(?:_([1-9][0-9]*))?\.txt$").expect("valid regex")
});

/// What `ArchiveStore::archive` did with the offered text.
#[derive(Debug, Clone, PartialEq)]
pub enum ArchiveOutcome {
    /// Bytes equal the latest snapshot; nothing written.
    Unchanged { latest: Snapshot },
    /// No prior snapshot existed; this is the first one.
    First { current: Snapshot },
    /// A new distinct version was written after `previous`.
    Changed { previous: Snapshot, current: Snapshot },
}

impl ArchiveOutcome {
    pub fn wrote_snapshot(&self) -> bool {
        !matches!(self, ArchiveOutcome::Unchanged { .. })
    }
}

/// A snapshot file found on disk, not yet read.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct SnapshotEntry {
    date: NaiveDate,
    sequence: u32,
    path: PathBuf,
}

pub struct ArchiveStore {
    root: PathBuf,
}

impl ArchiveStore {
    /// Open (creating if needed) the archive root and check that it is writable.
    ///
    /// Failure here is fatal for the whole run.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, ArchiveError> {
        let root = root.into();
        let unavailable = |source| ArchiveError::Unavailable {
            path: root.clone(),
            source,
        };
        fs::create_dir_all(&root).map_err(unavailable)?;
        // Probe file is removed when dropped.
        NamedTempFile::new_in(&root).map_err(unavailable)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn source_dir(&self, slug: &str) -> PathBuf {
        self.root.join(slug)
    }

    /// Archive `raw` for `slug` if it differs byte-wise from the most recent snapshot.
    ///
    /// Returns `true` when a new snapshot was written (always the case for the first one).
    pub fn archive_if_changed(
        &self,
        slug: &str,
        raw: &str,
        date: NaiveDate,
    ) -> Result<bool, ArchiveError> {
        Ok(self.archive(slug, raw, date)?.wrote_snapshot())
    }

    /// Like `archive_if_changed`, but also hands back the snapshots involved so the caller
    /// does not need a second lookup.
    pub fn archive(
        &self,
        slug: &str,
        raw: &str,
        date: NaiveDate,
    ) -> Result<ArchiveOutcome, ArchiveError> {
        let entries = self.entries(slug)?;
        let previous = match entries.last() {
            Some(entry) => Some(read_snapshot(slug, entry)?),
            None => None,
        };

        if let Some(previous) = &previous {
            if previous.content.as_bytes() == raw.as_bytes() {
                debug!(slug, file = %previous.file_name(), "content unchanged");
                return Ok(ArchiveOutcome::Unchanged {
                    latest: previous.clone(),
                });
            }
        }

        // A capture date behind the newest snapshot would sort before it and never become
        // the latest, so it is moved forward onto the newest snapshot's date.
        let date = match entries.last() {
            Some(newest) if newest.date > date => {
                warn!(
                    slug,
                    requested = %date,
                    newest = %newest.date,
                    "capture date precedes newest snapshot, archiving under newest date"
                );
                newest.date
            }
            _ => date,
        };
        let sequence = entries
            .iter()
            .filter(|e| e.date == date)
            .map(|e| e.sequence + 1)
            .max()
            .unwrap_or(0);
        let current = self.write_snapshot(slug, raw, date, sequence)?;

        Ok(match previous {
            None => ArchiveOutcome::First { current },
            Some(previous) => ArchiveOutcome::Changed { previous, current },
        })
    }

    /// The most recent snapshot by (date, sequence), if any.
    pub fn latest(&self, slug: &str) -> Result<Option<Snapshot>, ArchiveError> {
        match self.entries(slug)?.last() {
            Some(entry) => Ok(Some(read_snapshot(slug, entry)?)),
            None => Ok(None),
        }
    }

    /// Every snapshot for `slug`, oldest first.
    pub fn snapshots(&self, slug: &str) -> Result<Vec<Snapshot>, ArchiveError> {
        self.entries(slug)?
            .iter()
            .map(|entry| read_snapshot(slug, entry))
            .collect()
    }

    pub fn read_summary(&self, slug: &str) -> Result<Option<String>, ArchiveError> {
        let path = self.source_dir(slug).join(SUMMARY_FILE);
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(ArchiveError::Io { path, source }),
        }
    }

    /// Replace the persisted summary atomically.
    pub fn write_summary(&self, slug: &str, summary: &str) -> Result<(), ArchiveError> {
        let dir = self.source_dir(slug);
        let path = dir.join(SUMMARY_FILE);
        let tmp = write_temp(&dir, summary)?;
        tmp.persist(&path).map_err(|e| ArchiveError::Io {
            path,
            source: e.error,
        })?;
        Ok(())
    }

    fn entries(&self, slug: &str) -> Result<Vec<SnapshotEntry>, ArchiveError> {
        let dir = self.source_dir(slug);
        let read_dir = match fs::read_dir(&dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(ArchiveError::Io { path: dir, source }),
        };

        let mut entries = Vec::new();
        for item in read_dir {
            let item = item.map_err(|source| ArchiveError::Io {
                path: dir.clone(),
                source,
            })?;
            let name = item.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some((date, sequence)) = parse_snapshot_name(name) {
                entries.push(SnapshotEntry {
                    date,
                    sequence,
                    path: item.path(),
                });
            }
        }
        entries.sort();
        Ok(entries)
    }

    fn write_snapshot(
        &self,
        slug: &str,
        raw: &str,
        date: NaiveDate,
        first_sequence: u32,
    ) -> Result<Snapshot, ArchiveError> {
        let dir = self.source_dir(slug);
        fs::create_dir_all(&dir).map_err(|source| ArchiveError::Io {
            path: dir.clone(),
            source,
        })?;

        let mut tmp = write_temp(&dir, raw)?;
        let mut sequence = first_sequence;
        for _ in 0..MAX_PERSIST_ATTEMPTS {
            let path = dir.join(snapshot_file_name(date, sequence));
            match tmp.persist_noclobber(&path) {
                Ok(_) => {
                    let snapshot = Snapshot {
                        slug: slug.to_string(),
                        date,
                        sequence,
                        content: raw.to_string(),
                        fingerprint: fingerprint(raw),
                    };
                    info!(
                        slug,
                        file = %snapshot.file_name(),
                        fingerprint = %snapshot.fingerprint,
                        bytes = raw.len(),
                        "snapshot archived"
                    );
                    return Ok(snapshot);
                }
                Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
                    debug!(slug, sequence, "snapshot name taken, advancing sequence");
                    tmp = e.file;
                    sequence += 1;
                }
                Err(e) => {
                    return Err(ArchiveError::Io {
                        path,
                        source: e.error,
                    })
                }
            }
        }
        Err(ArchiveError::Collision {
            dir,
            attempts: MAX_PERSIST_ATTEMPTS,
        })
    }
}

fn write_temp(dir: &Path, content: &str) -> Result<NamedTempFile, ArchiveError> {
    let io_err = |source| ArchiveError::Io {
        path: dir.to_path_buf(),
        source,
    };
    fs::create_dir_all(dir).map_err(io_err)?;
    let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(content.as_bytes()).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    Ok(tmp)
}

fn read_snapshot(slug: &str, entry: &SnapshotEntry) -> Result<Snapshot, ArchiveError> {
    let content = fs::read_to_string(&entry.path).map_err(|source| ArchiveError::Io {
        path: entry.path.clone(),
        source,
    })?;
    Ok(Snapshot {
        slug: slug.to_string(),
        date: entry.date,
        sequence: entry.sequence,
        fingerprint: fingerprint(&content),
        content,
    })
}

fn parse_snapshot_name(name: &str) -> Option<(NaiveDate, u32)> {
    let caps = SNAPSHOT_NAME_RE.captures(name)?;
    let date = NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d").ok()?;
    let sequence = match caps.get(2) {
        Some(m) => m.as_str().parse().ok()?,
        None => 0,
    };
    Some((date, sequence))
}

/// SHA-256 hex digest of the raw bytes.
pub fn fingerprint(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
