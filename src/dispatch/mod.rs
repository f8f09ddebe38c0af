//! Quota-aware batched dispatch.
//!
//! A run checks the sender's daily quota once, then walks the recipients in
//! input order, batch by batch, one send at a time. Each attempt is written to
//! the audit log; each successful send bumps the daily counter. The pause
//! between recipients is the only rate control.

mod events;
mod quota;
mod report;

use std::{sync::Arc, time::Duration};

use chrono::NaiveDate;
use secrecy::SecretString;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

pub use events::{DispatchEvent, RunControl};
pub use quota::{QuotaConfirmation, QuotaDecision, QuotaWarning};
pub use report::{AbortReason, RunReport, RunStatus, RunSummary};

use crate::{
    configuration::DispatchSettings,
    domain::{Message, Recipient, RecipientEmail, ValidRecipient},
    store::{AuditLog, CounterStore, DeliveryStatus, LogEntry, StoreError, today},
    transport::{MailTransport, OutgoingEmail},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunConfig {
    pub batch_size: usize,
    pub pause: Duration,
    pub daily_limit: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        (&DispatchSettings::default()).into()
    }
}

impl From<&DispatchSettings> for RunConfig {
    fn from(settings: &DispatchSettings) -> Self {
        Self {
            batch_size: settings.batch_size,
            pause: settings.pause(),
            daily_limit: settings.daily_limit,
        }
    }
}

/// One dispatch run's inputs. Consumed by the run.
#[derive(Debug)]
pub struct DispatchRequest {
    pub sender: String,
    pub credentials: SecretString,
    pub message: Message,
    pub recipients: Vec<Recipient>,
    pub config: RunConfig,
}

#[derive(thiserror::Error, Debug)]
pub enum DispatchError {
    #[error("invalid dispatch request, {0}")]
    InvalidRequest(String),
    #[error("couldn't record dispatch state after {} attempts, {source}", .summary.attempted)]
    Persistence {
        summary: RunSummary,
        source: StoreError,
    },
    #[error("dispatch task failed, {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl DispatchError {
    /// What the run got through before it failed, if it started at all.
    pub fn summary(&self) -> Option<&RunSummary> {
        match self {
            Self::Persistence { summary, .. } => Some(summary),
            Self::InvalidRequest(_) | Self::Task(_) => None,
        }
    }
}

pub struct Dispatcher {
    transport: Arc<dyn MailTransport>,
    counter: Arc<dyn CounterStore>,
    audit_log: Arc<dyn AuditLog>,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn MailTransport>,
        counter: Arc<dyn CounterStore>,
        audit_log: Arc<dyn AuditLog>,
    ) -> Self {
        Self {
            transport,
            counter,
            audit_log,
        }
    }

    /// Runs on a background task. Progress arrives on the handle's event
    /// channel, which closes when the run ends.
    pub fn spawn(
        self: Arc<Self>,
        request: DispatchRequest,
        confirmation: Arc<dyn QuotaConfirmation>,
    ) -> DispatchHandle {
        let (progress, events) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let control = RunControl::new()
            .with_progress(progress)
            .with_cancellation(cancel.clone());

        let task =
            tokio::spawn(async move { self.run(request, confirmation.as_ref(), &control).await });

        DispatchHandle {
            events,
            cancel,
            task,
        }
    }

    pub async fn run(
        &self,
        request: DispatchRequest,
        confirmation: &dyn QuotaConfirmation,
        control: &RunControl,
    ) -> Result<RunReport, DispatchError> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "dispatch_run",
            run_id = %run_id,
            sender = %request.sender,
            recipients = request.recipients.len()
        );
        self.run_inner(run_id, request, confirmation, control)
            .instrument(span)
            .await
    }

    async fn run_inner(
        &self,
        run_id: Uuid,
        request: DispatchRequest,
        confirmation: &dyn QuotaConfirmation,
        control: &RunControl,
    ) -> Result<RunReport, DispatchError> {
        let sender = validate(&request)?;
        let config = request.config;
        let date = today();

        // Nothing is sent unless both stores can take the outcome.
        if let Err(source) = self.verify_stores().await {
            tracing::error!(error = %source, "dispatch state is unusable, nothing was sent");
            return Err(DispatchError::Persistence {
                summary: RunSummary::default(),
                source,
            });
        }

        let sent_today = self.counter.get_count(sender.as_ref(), date).await;
        let summary = RunSummary {
            initial_counter_value: sent_today,
            final_counter_value: sent_today,
            ..RunSummary::default()
        };

        if let Some(warning) = QuotaWarning::evaluate(
            sender.as_ref(),
            sent_today,
            request.recipients.len() as u64,
            config.daily_limit,
        ) {
            tracing::warn!(%warning, "daily limit would be exceeded");
            control.emit(DispatchEvent::QuotaExceeded(warning.clone()));
            if !confirmation.confirm(&warning).await {
                tracing::info!("run declined at the quota warning");
                return Ok(RunReport {
                    run_id,
                    status: RunStatus::Aborted(AbortReason::QuotaWarning(warning)),
                    summary,
                });
            }
        }

        let mut run = Run {
            dispatcher: self,
            sender: &sender,
            credentials: &request.credentials,
            message: &request.message,
            date,
            control,
            summary,
        };

        let total = request.recipients.len();
        for (index, batch) in request.recipients.chunks(config.batch_size).enumerate() {
            let batch_number = index + 1;
            tracing::info!(batch = batch_number, size = batch.len(), "sending batch");
            control.emit(DispatchEvent::BatchStarted {
                batch: batch_number,
                size: batch.len(),
            });

            for (offset, recipient) in batch.iter().enumerate() {
                if control.cancellation().is_cancelled() {
                    tracing::info!(attempted = run.summary.attempted, "run cancelled");
                    let summary = run.summary;
                    return Ok(RunReport {
                        run_id,
                        status: RunStatus::Aborted(AbortReason::Cancelled),
                        summary,
                    });
                }

                let position = index * config.batch_size + offset + 1;
                run.attempt(position, recipient).await?;

                if position < total {
                    run.pause(config.pause).await;
                }
            }

            control.emit(DispatchEvent::BatchFinished {
                batch: batch_number,
                sent_today: run.summary.final_counter_value,
            });
        }

        let summary = run.summary;
        tracing::info!(
            attempted = summary.attempted,
            sent = summary.sent,
            failed = summary.failed,
            sent_today = summary.final_counter_value,
            "run completed"
        );
        Ok(RunReport {
            run_id,
            status: RunStatus::Completed,
            summary,
        })
    }

    async fn verify_stores(&self) -> Result<(), StoreError> {
        self.audit_log.verify().await?;
        self.counter.verify().await
    }
}

fn validate(request: &DispatchRequest) -> Result<RecipientEmail, DispatchError> {
    if request.recipients.is_empty() {
        return Err(DispatchError::InvalidRequest(
            "there are no recipients".to_string(),
        ));
    }
    if request.config.batch_size == 0 {
        return Err(DispatchError::InvalidRequest(
            "batch size must be at least 1".to_string(),
        ));
    }
    RecipientEmail::parse(request.sender.clone())
        .map_err(|e| DispatchError::InvalidRequest(format!("sender {}", e)))
}

/// State of a run in progress.
struct Run<'a> {
    dispatcher: &'a Dispatcher,
    sender: &'a RecipientEmail,
    credentials: &'a SecretString,
    message: &'a Message,
    date: NaiveDate,
    control: &'a RunControl,
    summary: RunSummary,
}

impl Run<'_> {
    #[tracing::instrument(
        name = "Attempting a recipient",
        skip(self, recipient),
        fields(email = %recipient.email)
    )]
    async fn attempt(&mut self, position: usize, recipient: &Recipient) -> Result<(), DispatchError> {
        self.summary.attempted += 1;

        let status = match ValidRecipient::try_from(recipient) {
            Ok(valid) => self.send(&valid).await,
            Err(e) => {
                tracing::warn!(error = %e, "skipping invalid recipient");
                DeliveryStatus::failed(format!("invalid recipient: {}", e))
            }
        };

        let counter_update = if status.is_sent() {
            self.summary.sent += 1;
            self.dispatcher
                .counter
                .increment(self.sender.as_ref(), self.date, 1)
                .await
                .map(|count| self.summary.final_counter_value = count)
        } else {
            self.summary.failed += 1;
            Ok(())
        };

        // The message is out either way, so the attempt is logged before any
        // counter failure is reported.
        let entry = LogEntry::new(
            recipient.email.clone(),
            self.message.subject.clone(),
            status.clone(),
        );
        let logged = self.dispatcher.audit_log.append(entry).await;

        self.control.emit(DispatchEvent::Attempted {
            position,
            email: recipient.email.clone(),
            status,
        });

        if let Err(source) = counter_update {
            tracing::error!(error = %source, "daily counter was not updated after a send");
            self.control.emit(DispatchEvent::CounterNotUpdated {
                email: recipient.email.clone(),
                reason: source.to_string(),
            });
            return Err(self.persistence_failure(source));
        }
        if let Err(source) = logged {
            tracing::error!(error = %source, "send attempt was not written to the audit log");
            return Err(self.persistence_failure(source));
        }
        Ok(())
    }

    async fn send(&self, recipient: &ValidRecipient) -> DeliveryStatus {
        let body = self.message.personalize(recipient.name.as_ref());
        let email = OutgoingEmail {
            sender: self.sender,
            credentials: self.credentials,
            recipient: &recipient.email,
            subject: &self.message.subject,
            body: &body,
            attachments: &self.message.attachments,
        };

        match self.dispatcher.transport.send(email).await {
            Ok(()) => {
                tracing::info!("email sent");
                DeliveryStatus::Sent
            }
            Err(e) => {
                tracing::warn!(error = %e, "email could not be sent");
                DeliveryStatus::failed(format!("transport failure: {}", e))
            }
        }
    }

    /// Waits out the pause unless the run is cancelled meanwhile.
    async fn pause(&self, pause: Duration) {
        if pause.is_zero() {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(pause) => {}
            _ = self.control.cancellation().cancelled() => {}
        }
    }

    fn persistence_failure(&self, source: StoreError) -> DispatchError {
        DispatchError::Persistence {
            summary: self.summary,
            source,
        }
    }
}

/// A run started with [`Dispatcher::spawn`].
pub struct DispatchHandle {
    events: mpsc::UnboundedReceiver<DispatchEvent>,
    cancel: CancellationToken,
    task: JoinHandle<Result<RunReport, DispatchError>>,
}

impl DispatchHandle {
    /// Stops the run before its next recipient.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// `None` once the run has ended and every event was received.
    pub async fn next_event(&mut self) -> Option<DispatchEvent> {
        self.events.recv().await
    }

    pub async fn join(self) -> Result<RunReport, DispatchError> {
        self.task.await?
    }
}
