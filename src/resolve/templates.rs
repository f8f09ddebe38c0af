use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::ResolveError;
use crate::domain::Message;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Template {
    pub id: u32,
    pub subject: String,
    pub body: String,
}

impl Template {
    pub fn into_message(self, attachments: Vec<PathBuf>) -> Message {
        Message::new(self.subject, self.body).with_attachments(attachments)
    }
}

#[derive(Deserialize)]
struct TemplatesFile {
    templates: Vec<Template>,
}

/// Reads `{"templates": [{"id", "subject", "body"}, ...]}`.
pub fn load_templates(path: &Path) -> Result<Vec<Template>, ResolveError> {
    let bytes = std::fs::read(path).map_err(|source| ResolveError::Io {
        path: path.to_owned(),
        source,
    })?;
    let file: TemplatesFile =
        serde_json::from_slice(&bytes).map_err(|source| ResolveError::Json {
            path: path.to_owned(),
            source,
        })?;
    Ok(file.templates)
}

pub fn find_template(templates: &[Template], id: u32) -> Option<&Template> {
    templates.iter().find(|t| t.id == id)
}
