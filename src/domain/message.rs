use std::path::PathBuf;

pub const NAME_PLACEHOLDER: &str = "{name}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub subject: String,
    pub body: String,
    pub attachments: Vec<PathBuf>,
}

impl Message {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
            attachments: Vec::new(),
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<PathBuf>) -> Self {
        self.attachments = attachments;
        self
    }

    /// Replaces every `{name}` in the body with `name`.
    pub fn personalize(&self, name: &str) -> String {
        self.body.replace(NAME_PLACEHOLDER, name)
    }
}
