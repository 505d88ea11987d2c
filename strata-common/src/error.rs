use std::sync::Arc;

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum StrataError {
    #[error("JSON Parsing Error: {0}")]
    Json(#[from] Arc<serde_json::Error>),

    #[error("Format Error in {0}: {1}")]
    Format(&'static str, String),

    #[error("Version error: {0}")]
    VersionError(String),

    #[error("Storage Configuration Error: {0}")]
    Config(String),

    #[error("Bundle Unavailable: {0}")]
    Unavailable(String),

    #[error("Dependency Unsatisfied: {0} ({n} underlying failures)", n = .1.len())]
    Unsatisfied(String, Vec<StrataError>),

    #[error("Configuration is closed")]
    Closed,

    #[error("Change Detection Error: {0}")]
    ChangeState(String),
}

impl StrataError {
    /// Attaches collected lookup failures to an `Unsatisfied` error.
    ///
    /// Other variants are returned unchanged.
    pub fn with_suppressed(self, suppressed: Vec<StrataError>) -> Self {
        match self {
            StrataError::Unsatisfied(msg, mut prev) => {
                prev.extend(suppressed);
                StrataError::Unsatisfied(msg, prev)
            }
            other => other,
        }
    }

    pub fn unsatisfied(msg: impl Into<String>) -> Self {
        StrataError::Unsatisfied(msg.into(), Vec::new())
    }

    /// The lookup failures that contributed to this error, if any.
    pub fn suppressed(&self) -> &[StrataError] {
        match self {
            StrataError::Unsatisfied(_, suppressed) => suppressed,
            _ => &[],
        }
    }
}

impl From<serde_json::Error> for StrataError {
    fn from(err: serde_json::Error) -> Self {
        StrataError::Json(Arc::new(err))
    }
}

pub type Result<T> = std::result::Result<T, StrataError>;
