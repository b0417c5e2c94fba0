//! Workflow authoring error types

use thiserror::Error;

/// Errors raised while authoring, validating or assembling a workflow document
#[derive(Debug, Clone, Error, PartialEq)]
pub enum WorkflowError {
    #[error("Workflow must have at least one step")]
    EmptySteps,

    #[error("Duplicate step name: '{name}'")]
    DuplicateName { name: String },

    #[error("Invalid JSON in {field}: {message}")]
    InvalidJson { field: String, message: String },

    #[error("Step type '{step_type}' requires field '{field}'")]
    MissingField { step_type: String, field: String },

    #[error("Unknown step type: {0}")]
    UnknownStepType(String),

    #[error("Step index {0} is out of range")]
    StepIndexOutOfRange(usize),

    #[error("Invalid workflow ID: {0}")]
    InvalidId(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl WorkflowError {
    pub fn duplicate_name(name: impl Into<String>) -> Self {
        Self::DuplicateName { name: name.into() }
    }

    pub fn invalid_json(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidJson {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn missing_field(step_type: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MissingField {
            step_type: step_type.into(),
            field: field.into(),
        }
    }

    pub fn unknown_step_type(step_type: impl Into<String>) -> Self {
        Self::UnknownStepType(step_type.into())
    }

    pub fn invalid_id(message: impl Into<String>) -> Self {
        Self::InvalidId(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Whether the error is caught before any network call and blocks submission
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::EmptySteps | Self::DuplicateName { .. } | Self::InvalidJson { .. }
        )
    }
}
