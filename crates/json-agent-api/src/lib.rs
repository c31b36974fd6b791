//! JSON Agent API
//!
//! HTTP front end for [`json_agent_core`]: a multipart `POST /api/modify`
//! endpoint that validates a JSON document, lets an agent edit it according
//! to a prompt, and validates the result.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use json_agent_api::{create_router, AppState, ServerSettings};
//! use json_agent_core::{GeminiAgent, GeminiConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let agent = Arc::new(GeminiAgent::new(GeminiConfig::from_env())?);
//!     let state = AppState::new(agent, ServerSettings::default())?;
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8002").await?;
//!     axum::serve(listener, create_router(Arc::new(state))).await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod handler;
pub mod telemetry;

pub use error::ApiError;
pub use handler::{
    create_router, AppState, HealthResponse, HealthStatus, ModifyForm, ModifyResponse,
    ServerSettings,
};
pub use telemetry::{MeteredMutator, ServiceMetrics};

/// Service version (from Cargo.toml)
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
