use std::{io::Read, path::Path};

use super::ResolveError;
use crate::domain::Recipient;

/// Reads recipients from a CSV file with `email` and `name` columns.
/// Extra columns are ignored; a missing `name` column means empty names.
#[tracing::instrument(name = "Loading recipients from CSV")]
pub fn load_csv(path: &Path) -> Result<Vec<Recipient>, ResolveError> {
    let file = std::fs::File::open(path).map_err(|source| ResolveError::Io {
        path: path.to_owned(),
        source,
    })?;
    read_csv(file).map_err(|source| ResolveError::Csv {
        path: path.to_owned(),
        source,
    })
}

pub fn read_csv<R: Read>(reader: R) -> Result<Vec<Recipient>, csv::Error> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader)
        .deserialize()
        .collect()
}

/// Reads recipients from a JSON array of `{"email": .., "name": ..}` records.
#[tracing::instrument(name = "Loading recipients from JSON")]
pub fn load_json(path: &Path) -> Result<Vec<Recipient>, ResolveError> {
    let bytes = std::fs::read(path).map_err(|source| ResolveError::Io {
        path: path.to_owned(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| ResolveError::Json {
        path: path.to_owned(),
        source,
    })
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ManualRecipients {
    pub recipients: Vec<Recipient>,
    /// Pieces that were not of the form `email:name`.
    pub rejected: Vec<String>,
}

/// Parses `email:name, email:name, ...`.
pub fn parse_manual(input: &str) -> ManualRecipients {
    let mut parsed = ManualRecipients::default();
    for pair in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match pair.split_once(':') {
            Some((email, name)) if !name.contains(':') => {
                parsed.recipients.push(Recipient::new(email.trim(), name.trim()));
            }
            _ => {
                tracing::warn!(input = pair, "ignoring malformed recipient");
                parsed.rejected.push(pair.to_owned());
            }
        }
    }
    parsed
}
