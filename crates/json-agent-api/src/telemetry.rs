//! Prometheus metrics for the JSON agent service
//!
//! - `json_agent_modify_requests_total` (counter) - modify requests by outcome
//! - `json_agent_modify_duration_seconds` (histogram) - end-to-end modify latency
//! - `json_agent_agent_calls_total` (counter) - delegated agent calls by result
//!   (`success`, `error`, or `cancelled` when the call is dropped unfinished,
//!   as happens when the workflow deadline expires)

use async_trait::async_trait;
use json_agent_core::{AgentError, JsonMutator};
use prometheus::{CounterVec, Histogram, HistogramOpts, Opts, Registry};
use serde_json::Value;
use std::sync::Arc;

const NAMESPACE: &str = "json_agent";

/// Service metrics registered on a private registry
pub struct ServiceMetrics {
    registry: Registry,
    requests_total: CounterVec,
    duration_seconds: Histogram,
    agent_calls_total: CounterVec,
}

impl ServiceMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests_total = CounterVec::new(
            Opts::new("modify_requests_total", "Total number of modify requests")
                .namespace(NAMESPACE),
            &["outcome"],
        )?;

        let duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "modify_duration_seconds",
                "Modify request duration in seconds",
            )
            .namespace(NAMESPACE)
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
        )?;

        let agent_calls_total = CounterVec::new(
            Opts::new("agent_calls_total", "Total number of delegated agent calls")
                .namespace(NAMESPACE),
            &["result"],
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(duration_seconds.clone()))?;
        registry.register(Box::new(agent_calls_total.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            duration_seconds,
            agent_calls_total,
        })
    }

    /// Record a finished modify request
    pub fn record_request(&self, outcome: &str, duration_secs: f64) {
        self.requests_total.with_label_values(&[outcome]).inc();
        self.duration_seconds.observe(duration_secs);
    }

    /// Record a finished agent call
    pub fn record_agent_call(&self, result: &str) {
        self.agent_calls_total.with_label_values(&[result]).inc();
    }

    pub fn requests(&self, outcome: &str) -> u64 {
        self.requests_total.with_label_values(&[outcome]).get() as u64
    }

    pub fn agent_calls(&self, result: &str) -> u64 {
        self.agent_calls_total.with_label_values(&[result]).get() as u64
    }

    /// Encode metrics as text for scraping
    pub fn encode_text(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// [`JsonMutator`] wrapper counting agent calls
pub struct MeteredMutator {
    inner: Arc<dyn JsonMutator>,
    metrics: Arc<ServiceMetrics>,
}

impl MeteredMutator {
    pub fn new(inner: Arc<dyn JsonMutator>, metrics: Arc<ServiceMetrics>) -> Self {
        Self { inner, metrics }
    }
}

#[async_trait]
impl JsonMutator for MeteredMutator {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn is_configured(&self) -> bool {
        self.inner.is_configured()
    }

    async fn mutate(&self, instruction: &str, document: Value) -> Result<Value, AgentError> {
        let mut call = CallRecord {
            metrics: &self.metrics,
            result: "cancelled",
        };
        let result = self.inner.mutate(instruction, document).await;
        call.result = if result.is_ok() { "success" } else { "error" };
        result
    }
}

/// Records one agent call when dropped, so calls cancelled mid-flight count too
struct CallRecord<'a> {
    metrics: &'a ServiceMetrics,
    result: &'static str,
}

impl Drop for CallRecord<'_> {
    fn drop(&mut self) {
        self.metrics.record_agent_call(self.result);
    }
}
