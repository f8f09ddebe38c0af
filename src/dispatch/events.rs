use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::QuotaWarning;
use crate::store::DeliveryStatus;

/// Progress observations sent from a run back to whoever started it.
/// They are advisory; the audit log is the durable record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchEvent {
    QuotaExceeded(QuotaWarning),
    BatchStarted {
        /// 1-based.
        batch: usize,
        size: usize,
    },
    Attempted {
        /// 1-based position in the recipient list.
        position: usize,
        email: String,
        status: DeliveryStatus,
    },
    /// The message went out but the daily counter could not be updated.
    CounterNotUpdated { email: String, reason: String },
    BatchFinished { batch: usize, sent_today: u64 },
}

/// The caller's side channels into a run: where progress goes and how to
/// stop it between recipients.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    progress: Option<mpsc::UnboundedSender<DispatchEvent>>,
    cancel: CancellationToken,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_progress(mut self, progress: mpsc::UnboundedSender<DispatchEvent>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub(crate) fn emit(&self, event: DispatchEvent) {
        if let Some(progress) = &self.progress {
            // Nobody listening is fine.
            let _ = progress.send(event);
        }
    }
}
