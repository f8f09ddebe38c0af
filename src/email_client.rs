use async_trait::async_trait;
use base64::{Engine, engine::general_purpose};
use reqwest::Client;
use secrecy::ExposeSecret;

use crate::{
    configuration::AttachmentPolicy,
    transport::{
        ATTACHMENT_CONTENT_TYPE, LoadedAttachment, MailTransport, OutgoingEmail, TransportError,
        load_attachments,
    },
};

/// Sends mail through a Postmark-style HTTP API.
#[derive(Debug, Clone)]
pub struct EmailClient {
    http_client: Client,
    base_url: String,
    attachment_policy: AttachmentPolicy,
}

impl EmailClient {
    pub fn new(
        base_url: String,
        timeout: std::time::Duration,
        attachment_policy: AttachmentPolicy,
    ) -> Result<Self, reqwest::Error> {
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            base_url,
            attachment_policy,
        })
    }
}

#[async_trait]
impl MailTransport for EmailClient {
    #[tracing::instrument(
        name = "Sending an email through the mail API",
        skip(self, email),
        fields(recipient = %email.recipient, attachments = email.attachments.len())
    )]
    async fn send(&self, email: OutgoingEmail<'_>) -> Result<(), TransportError> {
        let attachments = load_attachments(email.attachments, self.attachment_policy)
            .await?
            .into_iter()
            .map(Attachment::from)
            .collect();

        let url = format!("{}/email", self.base_url);
        let request_body = SendEmailRequest {
            from: email.sender.as_ref(),
            to: email.recipient.as_ref(),
            subject: email.subject,
            text_body: email.body,
            attachments,
        };

        let response = self
            .http_client
            .post(&url)
            .header(
                "X-Postmark-Server-Token",
                email.credentials.expose_secret(),
            )
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let detail = response.text().await.unwrap_or_default();
        let detail = detail.trim();
        Err(TransportError::Rejected(if detail.is_empty() {
            status.to_string()
        } else {
            format!("{} {}", status.as_u16(), detail)
        }))
    }
}

#[derive(serde::Serialize)]
#[serde(rename_all = "PascalCase")]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text_body: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<Attachment>,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "PascalCase")]
struct Attachment {
    name: String,
    content: String,
    content_type: &'static str,
}

impl From<LoadedAttachment> for Attachment {
    fn from(attachment: LoadedAttachment) -> Self {
        Self {
            name: attachment.file_name,
            content: general_purpose::STANDARD.encode(&attachment.content),
            content_type: ATTACHMENT_CONTENT_TYPE,
        }
    }
}
