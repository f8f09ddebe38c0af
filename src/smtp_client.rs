//! SMTP transport. Each send logs in as the sender with the credentials of
//! the run, so the relay's own per-account limits apply.

use std::time::Duration;

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Attachment, Mailbox, MultiPart, SinglePart, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use secrecy::ExposeSecret;

use crate::{
    configuration::{AttachmentPolicy, SmtpSecurity, SmtpSettings},
    transport::{
        ATTACHMENT_CONTENT_TYPE, LoadedAttachment, MailTransport, OutgoingEmail, TransportError,
        load_attachments,
    },
};

#[derive(Debug, Clone)]
pub struct SmtpClient {
    host: String,
    port: u16,
    security: SmtpSecurity,
    timeout: Duration,
    attachment_policy: AttachmentPolicy,
}

impl SmtpClient {
    pub fn new(
        settings: &SmtpSettings,
        timeout: Duration,
        attachment_policy: AttachmentPolicy,
    ) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            security: settings.security,
            timeout,
            attachment_policy,
        }
    }

    fn mailer(
        &self,
        email: &OutgoingEmail<'_>,
    ) -> Result<AsyncSmtpTransport<Tokio1Executor>, TransportError> {
        let credentials = Credentials::new(
            email.sender.as_ref().to_owned(),
            email.credentials.expose_secret().to_owned(),
        );

        let builder = match self.security {
            SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&self.host)?,
            SmtpSecurity::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.host)?
            }
            SmtpSecurity::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.host),
        };

        Ok(builder
            .port(self.port)
            .timeout(Some(self.timeout))
            .credentials(credentials)
            .build())
    }
}

fn compose(
    email: &OutgoingEmail<'_>,
    attachments: Vec<LoadedAttachment>,
) -> Result<Message, TransportError> {
    let from: Mailbox = email
        .sender
        .as_ref()
        .parse()
        .map_err(|e| TransportError::Compose(format!("invalid sender address, {}", e)))?;
    let to: Mailbox = email
        .recipient
        .as_ref()
        .parse()
        .map_err(|e| TransportError::Compose(format!("invalid recipient address, {}", e)))?;

    let builder = Message::builder().from(from).to(to).subject(email.subject);
    let text = SinglePart::plain(email.body.to_owned());

    let message = if attachments.is_empty() {
        builder.singlepart(text)
    } else {
        let content_type = ContentType::parse(ATTACHMENT_CONTENT_TYPE)
            .map_err(|e| TransportError::Compose(e.to_string()))?;
        let parts = attachments
            .into_iter()
            .fold(MultiPart::mixed().singlepart(text), |parts, attachment| {
                parts.singlepart(
                    Attachment::new(attachment.file_name)
                        .body(attachment.content, content_type.clone()),
                )
            });
        builder.multipart(parts)
    };
    message.map_err(|e| TransportError::Compose(e.to_string()))
}

#[async_trait]
impl MailTransport for SmtpClient {
    #[tracing::instrument(
        name = "Sending an email over SMTP",
        skip(self, email),
        fields(relay = %self.host, recipient = %email.recipient, attachments = email.attachments.len())
    )]
    async fn send(&self, email: OutgoingEmail<'_>) -> Result<(), TransportError> {
        let attachments = load_attachments(email.attachments, self.attachment_policy).await?;
        let message = compose(&email, attachments)?;
        self.mailer(&email)?.send(message).await?;
        Ok(())
    }
}
