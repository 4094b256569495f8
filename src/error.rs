use serde_json::{json, Value};
use thiserror::Error;

use crate::artifact::ArtifactError;
use crate::chem::{CifError, FormulaError};
use crate::collaborators::CollaboratorError;
use crate::envelope::{make_err, ErrorType, Envelope, Fields};
use crate::sandbox::PathResolutionError;

/// A tool failure already classified into the closed [`ErrorType`] set.
///
/// Every component error converts into this with a fixed mapping; tools
/// compute `Result<T, ToolFailure>` and turn it into an envelope once.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{error_type}: {message}")]
pub struct ToolFailure {
    pub error_type: ErrorType,
    pub message: String,
    pub details: Value,
}

impl ToolFailure {
    pub fn new(error_type: ErrorType, message: impl Into<String>) -> Self {
        Self {
            error_type,
            message: message.into(),
            details: Value::Null,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorType::InvalidInput, message)
    }

    pub fn missing_env(message: impl Into<String>) -> Self {
        Self::new(ErrorType::MissingEnv, message)
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(ErrorType::RuntimeError, message)
    }

    /// Wrap a lower-level error as a `runtime_error` under a fixed message.
    pub fn runtime_from(message: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::runtime(message).with_details(Value::String(cause.to_string()))
    }

    /// Re-label a collaborator failure under a tool-specific message, keeping
    /// its classification.
    pub fn from_collaborator(message: &str, err: CollaboratorError) -> Self {
        let mut failure = Self::from(err);
        failure.details = Value::String(failure.message.clone());
        failure.message = message.to_string();
        failure
    }

    pub fn into_envelope(self, meta: Fields) -> Envelope {
        make_err(self.error_type, self.message, self.details, meta, Fields::new())
    }
}

impl From<PathResolutionError> for ToolFailure {
    fn from(err: PathResolutionError) -> Self {
        Self {
            error_type: err.error_type,
            message: err.message,
            details: err.details,
        }
    }
}

impl From<ArtifactError> for ToolFailure {
    fn from(err: ArtifactError) -> Self {
        Self::runtime_from("Failed to write report artifact.", err)
    }
}

impl From<FormulaError> for ToolFailure {
    fn from(err: FormulaError) -> Self {
        Self::invalid_input("Invalid formula.").with_details(Value::String(err.to_string()))
    }
}

impl From<CifError> for ToolFailure {
    fn from(err: CifError) -> Self {
        Self::invalid_input("Failed to parse CIF text.").with_details(Value::String(err.to_string()))
    }
}

impl From<CollaboratorError> for ToolFailure {
    fn from(err: CollaboratorError) -> Self {
        let error_type = match &err {
            CollaboratorError::MissingEnv(_) => ErrorType::MissingEnv,
            CollaboratorError::DatasetNotFound(_) => ErrorType::FileNotFound,
            CollaboratorError::InvalidInput(_) => ErrorType::InvalidInput,
            CollaboratorError::Timeout(_) => ErrorType::UpstreamTimeout,
            CollaboratorError::RateLimited(_) => ErrorType::UpstreamRateLimited,
            CollaboratorError::MaterialsApi(_) => ErrorType::MpApiError,
            CollaboratorError::Dataset(_) | CollaboratorError::Upstream(_) => {
                ErrorType::RuntimeError
            }
        };
        Self::new(error_type, err.to_string())
    }
}

impl From<serde_json::Error> for ToolFailure {
    fn from(err: serde_json::Error) -> Self {
        Self::invalid_input("Invalid arguments.").with_details(json!(err.to_string()))
    }
}
