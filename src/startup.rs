use std::sync::Arc;

use secrecy::SecretString;

use crate::{
    configuration::{Settings, TransportKind},
    dispatch::{DispatchRequest, Dispatcher, RunConfig},
    domain::{Message, Recipient, RecipientEmail},
    email_client::EmailClient,
    smtp_client::SmtpClient,
    store::{CounterStore, JsonAuditLog, JsonCounterStore, today},
    transport::MailTransport,
};

/// Process-wide state: one counter store, one audit log and one transport,
/// created here and shared by every run.
pub struct Application {
    settings: Settings,
    counter: Arc<JsonCounterStore>,
    audit_log: Arc<JsonAuditLog>,
    dispatcher: Arc<Dispatcher>,
}

impl Application {
    pub fn build(configuration: Settings) -> anyhow::Result<Self> {
        let email_client = &configuration.email_client;
        let policy = configuration.dispatch.attachment_policy;
        let transport: Arc<dyn MailTransport> = match email_client.transport {
            TransportKind::Http => Arc::new(EmailClient::new(
                email_client.base_url.clone(),
                email_client.timeout(),
                policy,
            )?),
            TransportKind::Smtp => Arc::new(SmtpClient::new(
                &email_client.smtp,
                email_client.timeout(),
                policy,
            )),
        };

        let counter = Arc::new(JsonCounterStore::new(
            &configuration.storage.counter_path,
        ));
        let audit_log = Arc::new(JsonAuditLog::new(&configuration.storage.log_path));
        let dispatcher = Arc::new(Dispatcher::new(
            transport,
            counter.clone(),
            audit_log.clone(),
        ));

        tracing::debug!(
            transport = ?configuration.email_client.transport,
            counter = %counter.path().display(),
            audit_log = %audit_log.path().display(),
            "application initialized"
        );

        Ok(Self {
            settings: configuration,
            counter,
            audit_log,
            dispatcher,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        self.dispatcher.clone()
    }

    pub fn counter(&self) -> &JsonCounterStore {
        &self.counter
    }

    pub fn audit_log(&self) -> &JsonAuditLog {
        &self.audit_log
    }

    /// The configured sender unless `sender` overrides it.
    pub fn sender(&self, sender: Option<String>) -> String {
        sender.unwrap_or_else(|| self.settings.email_client.sender_email.clone())
    }

    /// Today's count for the configured sender, or for `sender` if given.
    pub async fn sent_today(&self, sender: Option<String>) -> anyhow::Result<(RecipientEmail, u64)> {
        let sender = RecipientEmail::parse(self.sender(sender)).map_err(anyhow::Error::msg)?;
        let count = self.counter.get_count(sender.as_ref(), today()).await;
        Ok((sender, count))
    }

    /// Whether runs must bring the sender's own password.
    pub fn needs_sender_password(&self) -> bool {
        self.settings.email_client.transport == TransportKind::Smtp
    }

    /// Builds a run. `credentials` replaces the configured API token.
    pub fn request(
        &self,
        sender: Option<String>,
        credentials: Option<SecretString>,
        message: Message,
        recipients: Vec<Recipient>,
        config: RunConfig,
    ) -> DispatchRequest {
        DispatchRequest {
            sender: self.sender(sender),
            credentials: credentials
                .unwrap_or_else(|| self.settings.email_client.authorization_token.clone()),
            message,
            recipients,
            config,
        }
    }
}
