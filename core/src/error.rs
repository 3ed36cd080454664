use thiserror::Error;

#[derive(Error, Debug)]
pub enum SynthError {
    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("Reconciliation of '{column}' needs {needed} rows but only {available} qualify")]
    Reconciliation {
        column: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("Malformed table '{table}': {reason}")]
    MalformedTable { table: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Report rendering error: {0}")]
    Render(#[from] std::fmt::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SynthError {
    pub fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn malformed(table: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedTable {
            table: table.into(),
            reason: reason.into(),
        }
    }
}

pub type SynthResult<T> = Result<T, SynthError>;
