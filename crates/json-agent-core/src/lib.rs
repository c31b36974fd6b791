//! JSON Agent Core
//!
//! Schema-gated editing of JSON documents by a language-model agent.
//!
//! ## Features
//!
//! - **Schema Validation**: JSON Schema checks reporting the first violation
//!   with its location in the document
//! - **Gated Workflow**: input is validated before the agent runs and the
//!   agent's answer is validated before it is returned
//! - **Agent Seam**: any [`JsonMutator`] can do the editing; [`GeminiAgent`]
//!   drives Gemini with local file tools
//! - **Scratch Files**: per-call temporary files removed on every exit path
//! - **Deadline and Retries**: bounded agent calls with opt-in retry of
//!   transient failures
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use json_agent_core::{GeminiAgent, GeminiConfig, MutationWorkflow, Schema};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let agent = GeminiAgent::new(GeminiConfig::from_env())?;
//!     let workflow = MutationWorkflow::new(Arc::new(agent));
//!
//!     let schema = Schema::new(json!({"type": "object", "required": ["name"]}));
//!     let updated = workflow
//!         .run("Set age to 30", json!({"name": "Ada", "age": 29}), Some(&schema))
//!         .await?;
//!
//!     println!("{updated}");
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod schema;
pub mod workflow;

pub use agent::{GeminiAgent, GeminiConfig, JsonMutator, ScratchFile};
pub use config::{load_dotenv, ConfigError};
pub use error::{AgentError, MutationError, Result, SchemaError};
pub use schema::{load_schema, validate, Schema, SchemaStore, SchemaValidator, ValidationOutcome};
pub use workflow::{AgentPolicy, MutationRequest, MutationWorkflow};

/// Crate version (from Cargo.toml)
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
