//! HTTP handlers for the JSON agent service
//!
//! - `GET /` - landing page
//! - `POST /api/modify` - schema-gated JSON edit
//! - `GET /health` - health check
//! - `GET /metrics` - Prometheus metrics

pub mod input;
pub mod middleware;
pub mod routes;

pub use input::{ModifyForm, Upload};
pub use middleware::request_logging_middleware;
pub use routes::create_router;

use json_agent_core::{
    AgentPolicy, JsonMutator, MutationError, MutationWorkflow, Schema, SchemaStore,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::telemetry::{MeteredMutator, ServiceMetrics};

/// Default request body limit (10 MiB)
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Server-level settings
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Base directory for relative `schema_path` values
    pub schema_root: PathBuf,
    /// Schema applied when a request names none
    pub default_schema: Option<PathBuf>,
    /// Directory holding `index.html`
    pub static_dir: PathBuf,
    pub max_body_bytes: usize,
    pub cache_schemas: bool,
    pub policy: AgentPolicy,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            schema_root: PathBuf::from("."),
            default_schema: None,
            static_dir: PathBuf::from("static"),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            cache_schemas: false,
            policy: AgentPolicy::default(),
        }
    }
}

/// State shared by all handlers
pub struct AppState {
    pub workflow: MutationWorkflow,
    pub schemas: SchemaStore,
    pub default_schema: Option<PathBuf>,
    pub static_dir: PathBuf,
    pub max_body_bytes: usize,
    pub metrics: Arc<ServiceMetrics>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        agent: Arc<dyn JsonMutator>,
        settings: ServerSettings,
    ) -> Result<Self, prometheus::Error> {
        let metrics = Arc::new(ServiceMetrics::new()?);
        let metered: Arc<dyn JsonMutator> = Arc::new(MeteredMutator::new(agent, metrics.clone()));

        Ok(Self {
            workflow: MutationWorkflow::new(metered).with_policy(settings.policy),
            schemas: SchemaStore::new(settings.schema_root, settings.cache_schemas),
            default_schema: settings.default_schema,
            static_dir: settings.static_dir,
            max_body_bytes: settings.max_body_bytes,
            metrics,
            start_time: Instant::now(),
        })
    }

    /// Load the schema a request asks for, or the configured default
    pub fn resolve_schema(&self, requested: Option<&str>) -> Result<Option<Schema>, MutationError> {
        let path: Option<&Path> = match requested {
            Some(path) => Some(Path::new(path)),
            None => self.default_schema.as_deref(),
        };

        match path {
            Some(path) => Ok(Some(self.schemas.load(path)?)),
            None => Ok(None),
        }
    }
}

/// Successful modify response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModifyResponse {
    pub status: String,
    pub data: Value,
}

impl ModifyResponse {
    pub fn success(data: Value) -> Self {
        Self {
            status: "success".to_string(),
            data,
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub agent: AgentHealth,
    pub default_schema: Option<String>,
    pub uptime_seconds: u64,
    pub timestamp: String,
    pub version: String,
}

/// Health status enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentHealth {
    pub name: String,
    pub configured: bool,
}
