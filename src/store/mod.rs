//! Durable state shared by dispatch runs: the per-sender daily counter and
//! the audit log of send attempts.
//!
//! Both stores are plain JSON documents. Every mutation rewrites the whole
//! document into a sibling `.tmp` file and renames it over the original, so
//! an interrupted write leaves either the previous or the new version behind.

mod audit_log;
mod counter;

use std::path::{Path, PathBuf};

use serde::{Serialize, de::DeserializeOwned};

pub use audit_log::{AuditLog, DeliveryStatus, JsonAuditLog, LogEntry};
pub use counter::{CounterStore, DailyCounter, JsonCounterStore, today};

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("couldn't access {}, io error {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{} is not a valid store document, json error {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("couldn't serialize store document, json error {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Reads a JSON document, treating a missing or empty file as `T::default()`.
pub(crate) async fn read_document<T>(path: &Path) -> Result<T, StoreError>
where
    T: DeserializeOwned + Default,
{
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_owned(),
                source,
            });
        }
    };

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }

    serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt {
        path: path.to_owned(),
        source,
    })
}

pub(crate) async fn write_document<T>(path: &Path, document: &T) -> Result<(), StoreError>
where
    T: Serialize,
{
    let bytes = serde_json::to_vec_pretty(document)?;
    let io_err = |source| StoreError::Io {
        path: path.to_owned(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, &bytes).await.map_err(io_err)?;
    tokio::fs::rename(&tmp, path).await.map_err(io_err)?;
    Ok(())
}
