use std::io;

use crate::models::DropCounts;

#[derive(Debug, thiserror::Error)]
pub enum PacingError {
    #[error("required columns missing: {missing:?} (found: {found:?})")]
    Schema {
        missing: Vec<&'static str>,
        found: Vec<String>,
    },
    #[error("no flights left to analyze: {drops}")]
    EmptyResult { drops: DropCounts },
    #[error("IO error: {message}: {cause}")]
    Io { message: String, cause: io::Error },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("XLSX error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PacingError>;

impl PacingError {
    pub fn io(message: impl Into<String>, cause: io::Error) -> Self {
        PacingError::Io {
            message: message.into(),
            cause,
        }
    }
}
