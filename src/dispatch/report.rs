use uuid::Uuid;

use super::QuotaWarning;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub attempted: usize,
    pub sent: usize,
    pub failed: usize,
    /// The sender's counter for today before the first send.
    pub initial_counter_value: u64,
    pub final_counter_value: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// The caller declined to go over the daily limit.
    QuotaWarning(QuotaWarning),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    Aborted(AbortReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub summary: RunSummary,
}

impl RunReport {
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }
}
