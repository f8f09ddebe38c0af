use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use tokio::sync::Mutex;

use super::{StoreError, read_document, write_document};

/// ISO date (`YYYY-MM-DD`) -> sender identity -> successful sends that day.
pub type DailyCounter = BTreeMap<String, BTreeMap<String, u64>>;

/// The calendar date sends are counted against.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Number of successful sends recorded for `sender` on `date`.
    ///
    /// An unreadable store counts as empty; the count only feeds the quota
    /// warning, never the send itself.
    async fn get_count(&self, sender: &str, date: NaiveDate) -> u64;

    /// Adds `delta` to the count for `sender` on `date`, persists, and
    /// returns the new value.
    async fn increment(&self, sender: &str, date: NaiveDate, delta: u64)
    -> Result<u64, StoreError>;

    /// Fails if `increment` could not succeed right now.
    async fn verify(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[derive(Debug)]
pub struct JsonCounterStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within the process.
    lock: Mutex<()>,
}

impl JsonCounterStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<DailyCounter, StoreError> {
        read_document(&self.path).await
    }
}

#[async_trait]
impl CounterStore for JsonCounterStore {
    #[tracing::instrument(name = "Reading the daily counter", skip(self))]
    async fn get_count(&self, sender: &str, date: NaiveDate) -> u64 {
        let _guard = self.lock.lock().await;
        match self.load().await {
            Ok(counter) => counter
                .get(&date_key(date))
                .and_then(|senders| senders.get(sender))
                .copied()
                .unwrap_or(0),
            Err(e) => {
                tracing::warn!(error = %e, "daily counter is unreadable, treating it as empty");
                0
            }
        }
    }

    #[tracing::instrument(name = "Incrementing the daily counter", skip(self))]
    async fn increment(
        &self,
        sender: &str,
        date: NaiveDate,
        delta: u64,
    ) -> Result<u64, StoreError> {
        let _guard = self.lock.lock().await;
        // A corrupt document is an error here: rewriting it would drop history.
        let mut counter = self.load().await?;

        let count = counter
            .entry(date_key(date))
            .or_default()
            .entry(sender.to_owned())
            .or_insert(0);
        *count = count.saturating_add(delta);
        let count = *count;

        write_document(&self.path, &counter).await?;
        Ok(count)
    }

    async fn verify(&self) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        self.load().await.map(|_| ())
    }
}
