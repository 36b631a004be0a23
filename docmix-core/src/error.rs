use thiserror::Error;

use crate::engine::EngineError;

#[derive(Error, Debug)]
pub enum DocMixError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Cannot open template: {0}")]
    FatalInit(String),

    #[error("Cannot fill field '{field}': {message}")]
    Fill { field: String, message: String },

    #[error("Cannot close document: {0}")]
    FatalClose(String),

    #[error("Cannot decode date: {0}")]
    Decode(String),

    #[error("Cannot {operation} while binder is {stage}")]
    InvalidState {
        operation: &'static str,
        stage: &'static str,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot fetch template: {0}")]
    Remote(String),
}

pub type Result<T> = std::result::Result<T, DocMixError>;

impl DocMixError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        DocMixError::InvalidArgument(message.into())
    }

    pub(crate) fn fill(field: &str, err: EngineError) -> Self {
        DocMixError::Fill {
            field: field.to_string(),
            message: err.to_string(),
        }
    }
}
