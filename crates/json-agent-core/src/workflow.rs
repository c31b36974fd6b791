//! Schema-gated mutation workflow
//!
//! ```text
//! document ──► [validate input] ──► agent.mutate ──► [validate output] ──► document'
//!                    │                   │                  │
//!        InputValidationFailed     AgentFailure    OutputValidationFailed
//! ```
//!
//! Both gates run only when a schema is supplied. When the input gate fails
//! the agent is never called. When a schema is supplied, every returned
//! document has passed the output gate.

use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::agent::JsonMutator;
use crate::config::env_or;
use crate::error::{AgentError, MutationError, Result};
use crate::schema::{Schema, SchemaValidator};

/// Deadline and retry policy for the delegated agent call
#[derive(Debug, Clone)]
pub struct AgentPolicy {
    /// Upper bound for a single agent call
    pub deadline: Duration,

    /// Extra attempts after a transient failure
    pub max_retries: u32,

    /// Delay before the first retry; doubles on each further retry
    pub retry_backoff: Duration,
}

impl Default for AgentPolicy {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(120),
            max_retries: 0,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

impl AgentPolicy {
    /// Create policy from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            deadline: Duration::from_secs(env_or(
                "JSON_AGENT_AGENT_TIMEOUT_SECS",
                defaults.deadline.as_secs(),
            )),
            max_retries: env_or("JSON_AGENT_AGENT_RETRIES", defaults.max_retries),
            retry_backoff: defaults.retry_backoff,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_retries(mut self, max_retries: u32, backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_backoff = backoff;
        self
    }
}

/// One mutation request
#[derive(Debug, Clone)]
pub struct MutationRequest {
    pub instruction: String,
    pub document: Value,
    pub schema: Option<Schema>,
}

impl MutationRequest {
    pub fn new(instruction: impl Into<String>, document: Value) -> Self {
        Self {
            instruction: instruction.into(),
            document,
            schema: None,
        }
    }

    pub fn with_schema(mut self, schema: Option<Schema>) -> Self {
        self.schema = schema;
        self
    }
}

/// Validate → mutate → validate
#[derive(Clone)]
pub struct MutationWorkflow {
    agent: Arc<dyn JsonMutator>,
    policy: AgentPolicy,
}

impl MutationWorkflow {
    pub fn new(agent: Arc<dyn JsonMutator>) -> Self {
        Self {
            agent,
            policy: AgentPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: AgentPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn agent(&self) -> &dyn JsonMutator {
        self.agent.as_ref()
    }

    pub fn policy(&self) -> &AgentPolicy {
        &self.policy
    }

    /// Run a [`MutationRequest`]
    pub async fn execute(&self, request: MutationRequest) -> Result<Value> {
        self.run(&request.instruction, request.document, request.schema.as_ref())
            .await
    }

    /// Apply `instruction` to `document`, gated by `schema` when present
    pub async fn run(
        &self,
        instruction: &str,
        document: Value,
        schema: Option<&Schema>,
    ) -> Result<Value> {
        let start = Instant::now();
        let validator = schema.map(|s| SchemaValidator::new(Some(s.clone())));

        if let Some(validator) = &validator {
            if let Some(error) = validator.validate_json(&document)?.into_error() {
                tracing::info!(error = %error, "Input document rejected before delegation");
                return Err(MutationError::InputValidationFailed(error));
            }
        }

        let candidate = self.delegate(instruction, document).await?;

        if let Some(validator) = &validator {
            if let Some(error) = validator.validate_json(&candidate)?.into_error() {
                tracing::warn!(error = %error, agent = self.agent.name(), "Agent output rejected");
                return Err(MutationError::OutputValidationFailed(error));
            }
        }

        tracing::info!(
            agent = self.agent.name(),
            validated = validator.is_some(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Mutation completed"
        );

        Ok(candidate)
    }

    async fn delegate(
        &self,
        instruction: &str,
        mut document: Value,
    ) -> std::result::Result<Value, AgentError> {
        let mut attempt = 0;
        let mut backoff = self.policy.retry_backoff;

        loop {
            let input = if attempt < self.policy.max_retries {
                document.clone()
            } else {
                std::mem::take(&mut document)
            };

            let result = match tokio::time::timeout(
                self.policy.deadline,
                self.agent.mutate(instruction, input),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(AgentError::Timeout(self.policy.deadline)),
            };

            match result {
                Ok(candidate) => return Ok(candidate),
                Err(e) if attempt < self.policy.max_retries && e.is_transient() => {
                    attempt += 1;
                    tracing::warn!(
                        attempt = attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Retrying agent call"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                }
                Err(e) => {
                    tracing::error!(agent = self.agent.name(), error = %e, "Agent call failed");
                    return Err(e);
                }
            }
        }
    }
}
