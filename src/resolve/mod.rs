//! Turning files and command-line input into recipients and messages.

mod recipients;
mod templates;

use std::path::PathBuf;

pub use recipients::{ManualRecipients, load_csv, load_json, parse_manual, read_csv};
pub use templates::{Template, find_template, load_templates};

#[derive(thiserror::Error, Debug)]
pub enum ResolveError {
    #[error("couldn't read {}, io error {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("couldn't parse {}, csv error {source}", .path.display())]
    Csv { path: PathBuf, source: csv::Error },
    #[error("couldn't parse {}, json error {source}", .path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}
