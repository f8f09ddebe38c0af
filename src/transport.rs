//! The seam between the dispatcher and whatever actually hands mail to a relay.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use secrecy::SecretString;

use crate::{configuration::AttachmentPolicy, domain::RecipientEmail};

pub const ATTACHMENT_CONTENT_TYPE: &str = "application/octet-stream";

/// Everything a transport needs for a single message to a single recipient.
#[derive(Debug, Clone, Copy)]
pub struct OutgoingEmail<'a> {
    pub sender: &'a RecipientEmail,
    pub credentials: &'a SecretString,
    pub recipient: &'a RecipientEmail,
    pub subject: &'a str,
    pub body: &'a str,
    pub attachments: &'a [PathBuf],
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, email: OutgoingEmail<'_>) -> Result<(), TransportError>;
}

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("couldn't read attachment {}, io error {source}", .path.display())]
    Attachment {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("couldn't send email, reqwest error {0}")]
    Request(#[from] reqwest::Error),
    #[error("couldn't send email, smtp error {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error("couldn't build the message, {0}")]
    Compose(String),
    #[error("relay rejected the message: {0}")]
    Rejected(String),
}

impl TransportError {
    pub fn attachment(path: &Path, source: std::io::Error) -> Self {
        Self::Attachment {
            path: path.to_owned(),
            source,
        }
    }
}

/// An attachment read from disk at send time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedAttachment {
    pub file_name: String,
    pub content: Vec<u8>,
}

impl LoadedAttachment {
    fn new(path: &Path, content: Vec<u8>) -> Self {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self { file_name, content }
    }
}

/// Reads every attachment, either failing on the first unreadable one or
/// dropping it with a warning, depending on `policy`.
pub async fn load_attachments(
    paths: &[PathBuf],
    policy: AttachmentPolicy,
) -> Result<Vec<LoadedAttachment>, TransportError> {
    let mut attachments = Vec::with_capacity(paths.len());
    for path in paths {
        match tokio::fs::read(path).await {
            Ok(content) => attachments.push(LoadedAttachment::new(path, content)),
            Err(e) => match policy {
                AttachmentPolicy::FailSend => return Err(TransportError::attachment(path, e)),
                AttachmentPolicy::SkipAttachment => {
                    tracing::warn!(
                        attachment = %path.display(),
                        error = %e,
                        "skipping unreadable attachment"
                    );
                }
            },
        }
    }
    Ok(attachments)
}
