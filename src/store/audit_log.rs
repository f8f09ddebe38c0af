use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::{StoreError, read_document, write_document};

/// One send attempt. Entries are appended in attempt order and never changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StoredEntry")]
pub struct LogEntry {
    pub email: String,
    pub subject: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub status: DeliveryStatus,
}

impl LogEntry {
    pub fn new(email: impl Into<String>, subject: impl Into<String>, status: DeliveryStatus) -> Self {
        Self {
            email: email.into(),
            subject: subject.into(),
            timestamp: Utc::now(),
            status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    Failed { reason: String },
}

impl DeliveryStatus {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent)
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryStatus::Sent => write!(f, "sent"),
            DeliveryStatus::Failed { reason } => write!(f, "failed: {}", reason),
        }
    }
}

// Older logs were written with local, zone-less timestamps and free-text
// statuses ("Poslano", "Greska: <reason>"). Both shapes are read.
const LEGACY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const LEGACY_SENT: &str = "Poslano";
const LEGACY_FAILED_PREFIX: &str = "Greska:";

#[derive(Deserialize)]
struct StoredEntry {
    email: String,
    subject: String,
    timestamp: String,
    status: String,
    #[serde(default)]
    reason: Option<String>,
}

impl TryFrom<StoredEntry> for LogEntry {
    type Error = String;

    fn try_from(stored: StoredEntry) -> Result<Self, Self::Error> {
        let timestamp = parse_timestamp(&stored.timestamp)?;
        let status = match stored.status.as_str() {
            "sent" | LEGACY_SENT => DeliveryStatus::Sent,
            "failed" => DeliveryStatus::failed(stored.reason.unwrap_or_default()),
            other => match other.strip_prefix(LEGACY_FAILED_PREFIX) {
                Some(reason) => DeliveryStatus::failed(reason.trim()),
                None => return Err(format!("unknown delivery status {:?}", other)),
            },
        };
        Ok(Self {
            email: stored.email,
            subject: stored.subject,
            timestamp,
            status,
        })
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(s) {
        return Ok(timestamp.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(s, LEGACY_TIMESTAMP_FORMAT)
        .map_err(|e| format!("invalid timestamp {:?}, {}", s, e))?;
    Ok(Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .unwrap_or_else(|| naive.and_utc()))
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(&self, entry: LogEntry) -> Result<(), StoreError>;

    /// The full history, oldest first.
    async fn entries(&self) -> Result<Vec<LogEntry>, StoreError>;

    /// Fails if the log could not be appended to right now.
    async fn verify(&self) -> Result<(), StoreError> {
        self.entries().await.map(|_| ())
    }
}

#[derive(Debug)]
pub struct JsonAuditLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonAuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AuditLog for JsonAuditLog {
    #[tracing::instrument(
        name = "Appending to the audit log",
        skip(self, entry),
        fields(email = %entry.email, status = %entry.status)
    )]
    async fn append(&self, entry: LogEntry) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut entries: Vec<LogEntry> = read_document(&self.path).await?;
        entries.push(entry);
        write_document(&self.path, &entries).await
    }

    async fn entries(&self) -> Result<Vec<LogEntry>, StoreError> {
        let _guard = self.lock.lock().await;
        read_document(&self.path).await
    }
}
