//! Error types for the JSON agent
//!
//! Three layers of errors exist:
//! - [`SchemaError`]: loading or applying a JSON Schema
//! - [`AgentError`]: the delegated mutating agent
//! - [`MutationError`]: everything a caller of the mutation workflow can see

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading a schema or validating against one.
///
/// None of these describe a document that fails validation; that is a
/// [`crate::schema::ValidationOutcome`] with `is_valid == false`.
#[derive(Error, Debug)]
pub enum SchemaError {
    /// The schema path does not resolve to a readable file
    #[error("Schema file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The schema file exists but its content is not JSON
    #[error("Malformed schema file {}: {message}", .path.display())]
    Malformed { path: PathBuf, message: String },

    /// The schema parses as JSON but is not a valid JSON Schema
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// Validation was requested on a validator that has no schema
    #[error("No schema provided. Please set a schema using set_schema() first.")]
    NoSchema,
}

/// Errors raised by the delegated mutating agent
#[derive(Error, Debug)]
pub enum AgentError {
    /// The agent has no credentials or endpoint configured
    #[error("Agent not configured: {0}")]
    NotConfigured(String),

    /// Transport-level failure talking to the model service
    #[error("HTTP error: {0}")]
    Http(String),

    /// The model service answered with a non-success status
    #[error("Model API returned {status}: {message}")]
    Api { status: u16, message: String },

    /// The model called a tool incorrectly or answered with an unusable payload
    #[error("Malformed tool use: {0}")]
    MalformedToolUse(String),

    /// The document handed back by the agent is not valid JSON
    #[error("Agent produced malformed JSON: {0}")]
    MalformedOutput(String),

    /// The conversation did not finish within the configured number of turns
    #[error("Agent did not finish within {0} turns")]
    TurnLimit(usize),

    /// The agent call exceeded its deadline
    #[error("Agent call timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Scratch file handling failed
    #[error("Scratch file error: {0}")]
    Scratch(#[from] std::io::Error),
}

impl AgentError {
    /// Whether retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            AgentError::Http(_) | AgentError::Timeout(_) => true,
            AgentError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Typed failure of a mutation request.
///
/// Each variant maps to a distinct HTTP status at the request boundary.
#[derive(Error, Debug)]
pub enum MutationError {
    /// The submitted document is not valid JSON
    #[error("Invalid JSON format: {0}")]
    MalformedInput(String),

    /// Both or neither of the document sources were supplied
    #[error("{0}")]
    AmbiguousInput(String),

    /// The referenced schema file does not exist
    #[error("Schema file not found: {}", .0.display())]
    SchemaNotFound(PathBuf),

    /// The referenced schema file is not JSON
    #[error("Malformed schema file {}: {message}", .path.display())]
    MalformedSchema { path: PathBuf, message: String },

    /// The referenced schema is not a valid JSON Schema
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// The input document failed schema validation
    #[error("Input JSON validation failed: {0}")]
    InputValidationFailed(String),

    /// The agent's output failed schema validation
    #[error("Output JSON validation failed: {0}")]
    OutputValidationFailed(String),

    /// The delegated agent failed
    #[error("Agent error: {0}")]
    AgentFailure(#[from] AgentError),

    /// Anything else
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl MutationError {
    /// Create a malformed input error
    pub fn malformed_input(msg: impl Into<String>) -> Self {
        MutationError::MalformedInput(msg.into())
    }

    /// Create an ambiguous input error
    pub fn ambiguous_input(msg: impl Into<String>) -> Self {
        MutationError::AmbiguousInput(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        MutationError::InternalError(msg.into())
    }

    /// Stable error code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            MutationError::MalformedInput(_) => "MALFORMED_INPUT",
            MutationError::AmbiguousInput(_) => "AMBIGUOUS_INPUT",
            MutationError::SchemaNotFound(_) => "SCHEMA_NOT_FOUND",
            MutationError::MalformedSchema { .. } => "MALFORMED_SCHEMA",
            MutationError::InvalidSchema(_) => "INVALID_SCHEMA",
            MutationError::InputValidationFailed(_) => "INPUT_VALIDATION_FAILED",
            MutationError::OutputValidationFailed(_) => "OUTPUT_VALIDATION_FAILED",
            MutationError::AgentFailure(_) => "AGENT_FAILURE",
            MutationError::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether this is a schema validation failure on either side of the agent
    pub fn is_validation_failure(&self) -> bool {
        matches!(
            self,
            MutationError::InputValidationFailed(_) | MutationError::OutputValidationFailed(_)
        )
    }

    /// Check if this is a user-facing error (vs internal)
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            MutationError::MalformedInput(_)
                | MutationError::AmbiguousInput(_)
                | MutationError::SchemaNotFound(_)
                | MutationError::MalformedSchema { .. }
                | MutationError::InputValidationFailed(_)
                | MutationError::OutputValidationFailed(_)
        )
    }
}

impl From<SchemaError> for MutationError {
    fn from(err: SchemaError) -> Self {
        match err {
            SchemaError::NotFound(path) => MutationError::SchemaNotFound(path),
            SchemaError::Malformed { path, message } => {
                MutationError::MalformedSchema { path, message }
            }
            SchemaError::InvalidSchema(msg) => MutationError::InvalidSchema(msg),
            err @ SchemaError::NoSchema => MutationError::InternalError(err.to_string()),
        }
    }
}

/// Result type alias for mutation operations
pub type Result<T> = std::result::Result<T, MutationError>;
