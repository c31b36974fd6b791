//! Delegated mutating agents
//!
//! The mutation workflow never edits documents itself. It hands the
//! instruction and document to a [`JsonMutator`] and treats the answer as an
//! untrusted candidate.
//!
//! - `scratch`: per-call temporary files for path-based agents
//! - `gemini`: Gemini `generateContent` client with local file tools

pub mod gemini;
pub mod scratch;

pub use gemini::{GeminiAgent, GeminiConfig};
pub use scratch::ScratchFile;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::AgentError;

/// Capability to apply a natural-language edit to a JSON document.
///
/// Implementations must not share conversational state between calls:
/// every call starts a fresh session.
#[async_trait]
pub trait JsonMutator: Send + Sync {
    /// Short name used in logs and health output
    fn name(&self) -> &str;

    /// Whether the agent has what it needs to run (credentials, endpoint)
    fn is_configured(&self) -> bool {
        true
    }

    /// Apply `instruction` to `document`, returning the edited document
    async fn mutate(&self, instruction: &str, document: Value) -> Result<Value, AgentError>;
}
