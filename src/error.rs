use serde::ser::{SerializeStruct, Serializer};
use serde::Serialize;
use thiserror::Error;

/// Local, pre-network input errors. Never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid session type '{0}': expected one of implementation, analysis, testing, review, coordination, documentation")]
    InvalidType(String),

    #[error("invalid repository '{0}': expected \"owner/name\"")]
    InvalidRepository(String),

    #[error("requirements must not be empty")]
    EmptyRequirements,

    #[error("session id must not be empty")]
    EmptySessionId,

    #[error("orchestration group has no tasks")]
    EmptyGroup,

    #[error("task name '{0}' is declared more than once")]
    DuplicateTaskName(String),

    #[error("task {task} depends on unknown sibling '{reference}'")]
    UnknownDependency { task: usize, reference: String },

    #[error("task {task} depends on '{reference}', which is not declared before it")]
    ForwardDependency { task: usize, reference: String },

    #[error("task {task}: {source}")]
    InvalidTask {
        task: usize,
        #[source]
        source: Box<ValidationError>,
    },
}

/// Failure categories carried by a normalized envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    Validation(ValidationError),
    Transport,
    Remote,
    MalformedResponse,
    MissingEntityId,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Validation(_) => "validation",
            FailureKind::Transport => "transport",
            FailureKind::Remote => "remote",
            FailureKind::MalformedResponse => "malformed_response",
            FailureKind::MissingEntityId => "missing_entity_id",
        }
    }
}

/// A failed lifecycle operation, as reported inside an envelope.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}: {message}", .kind.as_str())]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Transport, message)
    }

    pub fn remote(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Remote, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(FailureKind::MalformedResponse, message)
    }

    pub fn missing_id(message: impl Into<String>) -> Self {
        Self::new(FailureKind::MissingEntityId, message)
    }

    pub fn is_transport(&self) -> bool {
        self.kind == FailureKind::Transport
    }
}

impl Serialize for Failure {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Failure", 2)?;
        state.serialize_field("kind", self.kind.as_str())?;
        state.serialize_field("message", &self.message)?;
        state.end()
    }
}

impl From<ValidationError> for Failure {
    fn from(err: ValidationError) -> Self {
        let message = err.to_string();
        Self::new(FailureKind::Validation(err), message)
    }
}

/// Conditions that unwind instead of being folded into an envelope.
#[derive(Error, Debug)]
pub enum HubError {
    #[error("failed to construct HTTP transport: {0}")]
    TransportInit(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, HubError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_display_includes_kind() {
        let failure = Failure::transport("connection refused");
        assert_eq!(failure.to_string(), "transport: connection refused");
    }

    #[test]
    fn test_validation_error_converts_to_failure() {
        let failure: Failure = ValidationError::EmptyRequirements.into();
        assert_eq!(
            failure.kind,
            FailureKind::Validation(ValidationError::EmptyRequirements)
        );
        assert_eq!(failure.message, "requirements must not be empty");
    }
}
