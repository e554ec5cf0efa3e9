use std::fmt;
use std::time::Duration;

use thiserror::Error;

pub type TeamResult<T> = Result<T, TeamError>;

/// What a `NotFound` error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    Agent,
    Project,
    File,
    Directory,
    Task,
    Provider,
    Model,
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Missing::Agent => "Agent",
            Missing::Project => "Project",
            Missing::File => "File",
            Missing::Directory => "Directory",
            Missing::Task => "Task",
            Missing::Provider => "Provider",
            Missing::Model => "Model",
        };
        f.write_str(label)
    }
}

#[derive(Error, Debug)]
pub enum TeamError {
    #[error("{kind} {name} not found")]
    NotFound { kind: Missing, name: String },

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Generation for {role} timed out after {after:?}")]
    Timeout { role: String, after: Duration },

    #[error("Generated output rejected: {0}")]
    InvalidOutput(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

impl TeamError {
    pub fn not_found(kind: Missing, name: impl Into<String>) -> Self {
        TeamError::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Short machine-readable label used by the request surface.
    pub fn kind(&self) -> &'static str {
        match self {
            TeamError::NotFound { .. } => "not_found",
            TeamError::Generation(_) | TeamError::Timeout { .. } => "generation_failure",
            TeamError::InvalidOutput(_) => "invalid_output",
            TeamError::Persistence(_) => "persistence_failure",
            TeamError::Configuration(_) => "configuration_failure",
            TeamError::InvalidInput(_) => "invalid_input",
            TeamError::Conflict(_) => "conflict",
        }
    }

    /// Whether repeating the same call might succeed. Nothing is retried
    /// automatically; callers decide.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TeamError::Generation(_) | TeamError::Timeout { .. })
    }
}

impl From<std::io::Error> for TeamError {
    fn from(e: std::io::Error) -> Self {
        TeamError::Persistence(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message_names_the_thing() {
        let err = TeamError::not_found(Missing::Agent, "ghostWriter");
        assert_eq!(err.to_string(), "Agent ghostWriter not found");
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn timeout_is_a_generation_failure() {
        let err = TeamError::Timeout {
            role: "architect".into(),
            after: Duration::from_secs(30),
        };
        assert_eq!(err.kind(), "generation_failure");
        assert_eq!(err.to_string(), "Generation for architect timed out after 30s");
        assert!(err.is_retryable());
        assert!(!TeamError::Persistence("disk full".into()).is_retryable());
    }

    #[test]
    fn io_errors_become_persistence_failures() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: TeamError = io.into();
        assert_eq!(err.kind(), "persistence_failure");
    }
}
