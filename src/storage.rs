//! Writes exported entities below the export root.
//!
//! Files are named `<YYYYMMDDHHMM>.<sanitized name>.<ext>` after the entity's
//! own date, and their access and modification times are set to that date.

use std::fs::{self, File, FileTimes};
use std::path::PathBuf;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::document::Document;

const STAMP_FORMAT: &str = "%Y%m%d%H%M";

/// Punctuation kept as-is by [`sanitize`].
const KEPT_PUNCTUATION: &[char] = &[
    '-', '_', ',', '.', '!', '?', '(', ')', '"', '\'', '…', '—',
];

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Make a name safe to use as a file or directory name.
///
/// Trims surrounding whitespace, maps `&` to `+`, opening brackets to `(` and
/// closing brackets to `)`, then replaces anything that is neither
/// alphanumeric nor in the kept punctuation set with `_`. Note that `+` is not
/// kept, so `&` ends up as `_` as well.
pub fn sanitize(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| match c {
            '&' => '+',
            '[' | '{' | '<' => '(',
            ']' | '}' | '>' => ')',
            other => other,
        })
        .map(|c| {
            if c.is_alphanumeric() || KEPT_PUNCTUATION.contains(&c) {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// [`sanitize`] for a single directory component. Names that would resolve
/// to the current or parent directory, or to nothing, become `_`.
pub fn sanitize_dir(name: &str) -> String {
    match sanitize(name).as_str() {
        "" | "." | ".." => "_".to_string(),
        safe => safe.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Document),
    Bytes(Vec<u8>),
}

impl Payload {
    fn extension(&self) -> &'static str {
        match self {
            Payload::Json(_) => "json",
            Payload::Bytes(_) => "jpg",
        }
    }
}

/// Everything needed to place one entity on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportTarget {
    pub payload: Payload,
    /// Directory relative to the export root.
    pub directory: String,
    /// Human-readable name, sanitized when the file name is built.
    pub name: String,
    /// The entity's own date, not the time of export.
    pub timestamp: DateTime<Utc>,
}

impl ExportTarget {
    pub fn json(
        document: Document,
        directory: impl Into<String>,
        name: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            payload: Payload::Json(document),
            directory: directory.into(),
            name: name.into(),
            timestamp,
        }
    }

    pub fn image(
        bytes: Vec<u8>,
        directory: impl Into<String>,
        name: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            payload: Payload::Bytes(bytes),
            directory: directory.into(),
            name: name.into(),
            timestamp,
        }
    }

    pub fn file_name(&self) -> String {
        format!(
            "{}.{}.{}",
            self.timestamp.format(STAMP_FORMAT),
            sanitize(&self.name),
            self.payload.extension()
        )
    }
}

/// Filesystem sink rooted at the export directory.
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, target: &ExportTarget) -> PathBuf {
        self.root.join(&target.directory).join(target.file_name())
    }

    /// Write the target, replacing any file of the same name, and stamp it
    /// with the entity's timestamp. Returns the written path.
    pub fn write(&self, target: &ExportTarget) -> Result<PathBuf, StorageError> {
        let path = self.path_for(target);
        tracing::info!("Writing to {}", path.display());

        let io_err = |source| StorageError::Io {
            path: path.clone(),
            source,
        };

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(io_err)?;
        }

        let bytes = match &target.payload {
            Payload::Json(document) => {
                serde_json::to_vec_pretty(document).map_err(|source| StorageError::Serialize {
                    path: path.clone(),
                    source,
                })?
            }
            Payload::Bytes(bytes) => bytes.clone(),
        };
        fs::write(&path, bytes).map_err(io_err)?;

        let time = SystemTime::from(target.timestamp);
        let times = FileTimes::new().set_accessed(time).set_modified(time);
        File::options()
            .write(true)
            .open(&path)
            .and_then(|file| file.set_times(times))
            .map_err(io_err)?;

        Ok(path)
    }
}
