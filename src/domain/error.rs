use thiserror::Error;

use super::knowledge_base::FilterError;
use super::workflow::WorkflowError;

/// Core domain errors
#[derive(Debug, Error)]
pub enum DomainError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    /// A failed admin API call; `message` is the backend's text, shown verbatim
    #[error("{message}")]
    Network {
        status: Option<u16>,
        message: String,
    },

    #[error("Parse error: {message}")]
    Parse { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DomainError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            status: None,
            message: message.into(),
        }
    }

    pub fn http_status(status: u16, message: impl Into<String>) -> Self {
        Self::Network {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the error was caught locally, before any request was sent
    pub fn is_validation(&self) -> bool {
        match self {
            Self::Workflow(e) => e.is_validation(),
            Self::Filter(_) | Self::Parse { .. } => true,
            _ => false,
        }
    }

    /// HTTP status of a failed API call, if the backend answered
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Network { status, .. } => *status,
            _ => None,
        }
    }
}
