use async_trait::async_trait;

/// Raised before a run when the sends it asks for would push the sender past
/// the daily limit. Nothing is sent until the caller confirms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaWarning {
    pub sender: String,
    pub sent_today: u64,
    pub requested: u64,
    pub daily_limit: u64,
}

impl QuotaWarning {
    /// `None` when `sent_today + requested` stays within `daily_limit`.
    pub fn evaluate(
        sender: &str,
        sent_today: u64,
        requested: u64,
        daily_limit: u64,
    ) -> Option<QuotaWarning> {
        if sent_today.saturating_add(requested) > daily_limit {
            Some(Self {
                sender: sender.to_owned(),
                sent_today,
                requested,
                daily_limit,
            })
        } else {
            None
        }
    }

    /// How many sends beyond the limit the run would make.
    pub fn overshoot(&self) -> u64 {
        self.sent_today
            .saturating_add(self.requested)
            .saturating_sub(self.daily_limit)
    }
}

impl std::fmt::Display for QuotaWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} has sent {} emails today; sending {} more exceeds the daily limit of {} by {}",
            self.sender,
            self.sent_today,
            self.requested,
            self.daily_limit,
            self.overshoot()
        )
    }
}

/// Asked once per run, and only when a [`QuotaWarning`] is raised.
#[async_trait]
pub trait QuotaConfirmation: Send + Sync {
    async fn confirm(&self, warning: &QuotaWarning) -> bool;
}

/// A decision made up front, e.g. from a `--yes` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDecision {
    Proceed,
    Abort,
}

#[async_trait]
impl QuotaConfirmation for QuotaDecision {
    async fn confirm(&self, _warning: &QuotaWarning) -> bool {
        *self == QuotaDecision::Proceed
    }
}
