//! Gemini-backed JSON agent
//!
//! Drives the Gemini `generateContent` REST API with two locally executed
//! tools, `read_json_file` and `write_json_file`. The document is exchanged
//! through a per-call [`ScratchFile`]; the model reads it, applies the
//! instruction and writes it back, and the file content becomes the result.
//!
//! # Session isolation
//!
//! The agent itself is stateless and can be shared across requests. Each
//! [`JsonMutator::mutate`] call builds a brand-new conversation, and tool
//! calls are confined to that call's scratch file.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

use super::scratch::{ScratchFile, DEFAULT_INDENT};
use super::JsonMutator;
use crate::config::{env_opt, env_or};
use crate::error::AgentError;

const SYSTEM_INSTRUCTION: &str = "When a file path to a JSON file is provided, read it first \
using read_json_file, then apply the requested changes and write the updated JSON back using \
write_json_file.";

const MAX_INDENT: usize = 8;

/// Configuration for the Gemini agent
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// API key (`GEMINI_API_KEY`, falling back to `GOOGLE_API_KEY`)
    pub api_key: Option<String>,

    /// Model name
    pub model: String,

    /// API base URL
    pub base_url: String,

    /// Per-request HTTP timeout in milliseconds
    pub request_timeout_ms: u64,

    /// Maximum model turns per call
    pub max_turns: usize,

    /// Directory for scratch files (system temp dir when unset)
    pub scratch_dir: Option<PathBuf>,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-2.5-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            request_timeout_ms: 60_000,
            max_turns: 8,
            scratch_dir: None,
        }
    }
}

impl GeminiConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_key: env_opt("GEMINI_API_KEY").or_else(|| env_opt("GOOGLE_API_KEY")),
            model: env_opt("GEMINI_MODEL").unwrap_or(defaults.model),
            base_url: env_opt("GEMINI_BASE_URL").unwrap_or(defaults.base_url),
            request_timeout_ms: env_or("GEMINI_TIMEOUT_MS", defaults.request_timeout_ms),
            max_turns: env_or("JSON_AGENT_MAX_TURNS", defaults.max_turns),
            scratch_dir: env_opt("JSON_AGENT_SCRATCH_DIR").map(PathBuf::from),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }
}

/// Gemini tool-calling agent
pub struct GeminiAgent {
    client: Client,
    config: GeminiConfig,
}

impl GeminiAgent {
    pub fn new(config: GeminiConfig) -> Result<Self, AgentError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AgentError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    /// Run one conversation against `scratch`, returning once the model
    /// stops calling tools
    async fn run_session(
        &self,
        api_key: &str,
        scratch: &ScratchFile,
        instruction: &str,
    ) -> Result<(), AgentError> {
        let session_id = Uuid::new_v4();
        let system_instruction = Content::text(None, SYSTEM_INSTRUCTION);
        let tools = vec![tool_declarations()];
        let mut contents = vec![Content::text(
            Some("user"),
            task_prompt(scratch.path(), instruction),
        )];
        let mut wrote = false;

        for turn in 0..self.config.max_turns {
            let request = GenerateRequest {
                system_instruction: &system_instruction,
                contents: &contents,
                tools: &tools,
            };
            let response = self.generate(api_key, &request).await?;

            let candidate = response.candidates.into_iter().next().ok_or_else(|| {
                AgentError::MalformedToolUse(format!(
                    "model returned no candidates (prompt feedback: {})",
                    response.prompt_feedback.unwrap_or(Value::Null)
                ))
            })?;

            let mut content = candidate.content.unwrap_or_default();
            content.role = Some("model".to_string());

            let calls: Vec<FunctionCall> = content
                .parts
                .iter()
                .filter_map(|part| part.function_call.clone())
                .collect();

            for text in content.parts.iter().filter_map(|part| part.text.as_deref()) {
                tracing::debug!(session_id = %session_id, turn, text, "Agent output");
            }
            contents.push(content);

            if calls.is_empty() {
                if !wrote {
                    tracing::warn!(session_id = %session_id, "Agent finished without writing the document");
                }
                tracing::info!(session_id = %session_id, turns = turn + 1, "Agent session finished");
                return Ok(());
            }

            let mut responses = Vec::with_capacity(calls.len());
            for call in calls {
                tracing::debug!(session_id = %session_id, turn, tool = %call.name, "Tool call");
                let result = dispatch_tool(scratch, &call);
                if call.name == "write_json_file" && result.get("error").is_none() {
                    wrote = true;
                }
                responses.push(Part::function_response(call.name, result));
            }
            contents.push(Content {
                role: Some("user".to_string()),
                parts: responses,
            });
        }

        Err(AgentError::TurnLimit(self.config.max_turns))
    }

    async fn generate(
        &self,
        api_key: &str,
        request: &GenerateRequest<'_>,
    ) -> Result<GenerateResponse, AgentError> {
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| AgentError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Api {
                status: status.as_u16(),
                message: api_error_message(&body),
            });
        }

        response
            .json()
            .await
            .map_err(|e| AgentError::MalformedToolUse(format!("Failed to parse response: {}", e)))
    }
}

#[async_trait]
impl JsonMutator for GeminiAgent {
    fn name(&self) -> &str {
        "gemini"
    }

    fn is_configured(&self) -> bool {
        self.config.api_key.is_some()
    }

    async fn mutate(&self, instruction: &str, document: Value) -> Result<Value, AgentError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                AgentError::NotConfigured("GEMINI_API_KEY is not set".to_string())
            })?;

        let scratch = ScratchFile::create(self.config.scratch_dir.as_deref(), &document)?;
        tracing::debug!(path = %scratch.path().display(), model = %self.config.model, "Invoking agent");

        self.run_session(api_key, &scratch, instruction).await?;

        scratch.read().map_err(|e| match e.kind() {
            std::io::ErrorKind::InvalidData => AgentError::MalformedOutput(e.to_string()),
            _ => AgentError::Scratch(e),
        })
    }
}

fn task_prompt(path: &Path, instruction: &str) -> String {
    format!(
        "You are given a JSON file at: {}.\n\
         Task: {}.\n\
         Steps:\n\
         1) Call read_json_file to load it.\n\
         2) Apply the requested changes precisely.\n\
         3) Call write_json_file to save the updated JSON back to the same path, \
         passing the whole document as JSON text in `data`.\n",
        path.display(),
        instruction
    )
}

fn tool_declarations() -> Tool {
    Tool {
        function_declarations: vec![
            json!({
                "name": "read_json_file",
                "description": "Read a JSON file and return its content.",
                "parameters": {
                    "type": "OBJECT",
                    "properties": {
                        "path": {"type": "STRING", "description": "Path of the JSON file"}
                    },
                    "required": ["path"]
                }
            }),
            json!({
                "name": "write_json_file",
                "description": "Write a JSON document to a file.",
                "parameters": {
                    "type": "OBJECT",
                    "properties": {
                        "path": {"type": "STRING", "description": "Path of the JSON file"},
                        "data": {
                            "type": "STRING",
                            "description": "The complete JSON document to write, encoded as JSON text"
                        },
                        "indent": {"type": "INTEGER", "description": "Indentation width"}
                    },
                    "required": ["path", "data"]
                }
            }),
        ],
    }
}

/// Execute one tool call against the scratch file.
///
/// Tool failures are reported back to the model as `{"error": ...}`.
fn dispatch_tool(scratch: &ScratchFile, call: &FunctionCall) -> Value {
    let result = match call.name.as_str() {
        "read_json_file" => confined_path(scratch, &call.args)
            .and_then(|_| scratch.read().map_err(|e| e.to_string())),
        "write_json_file" => confined_path(scratch, &call.args).and_then(|_| {
            let data = call
                .args
                .get("data")
                .cloned()
                .ok_or_else(|| "missing required argument 'data'".to_string())?;
            let indent = call
                .args
                .get("indent")
                .and_then(Value::as_u64)
                .map(|i| (i as usize).min(MAX_INDENT))
                .unwrap_or(DEFAULT_INDENT);
            scratch
                .write(&decode_data(data), indent)
                .map(|_| Value::String("written".to_string()))
                .map_err(|e| e.to_string())
        }),
        other => Err(format!("unknown tool '{}'", other)),
    };

    match result {
        Ok(value) => json!({ "result": value }),
        Err(message) => {
            tracing::warn!(tool = %call.name, error = %message, "Tool call rejected");
            json!({ "error": message })
        }
    }
}

fn confined_path(scratch: &ScratchFile, args: &Value) -> Result<(), String> {
    let requested = args
        .get("path")
        .and_then(Value::as_str)
        .ok_or_else(|| "missing required argument 'path'".to_string())?;

    if Path::new(requested) == scratch.path() {
        Ok(())
    } else {
        Err(format!(
            "access denied: only {} may be accessed",
            scratch.path().display()
        ))
    }
}

/// `data` is declared as JSON text so any document root can be written.
///
/// Structured values are accepted as given, and text that does not parse is
/// stored as a JSON string.
fn decode_data(data: Value) -> Value {
    match data {
        Value::String(raw) => serde_json::from_str(&raw).unwrap_or(Value::String(raw)),
        other => other,
    }
}

fn api_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.chars().take(512).collect())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: &'a Content,
    contents: &'a [Content],
    tools: &'a [Tool],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Tool {
    function_declarations: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn text(role: Option<&str>, text: impl Into<String>) -> Self {
        Self {
            role: role.map(str::to_string),
            parts: vec![Part {
                text: Some(text.into()),
                ..Default::default()
            }],
        }
    }
}

/// One content part; unknown fields (e.g. thought signatures) are echoed back verbatim
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<FunctionResponse>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl Part {
    fn function_response(name: String, response: Value) -> Self {
        Self {
            function_response: Some(FunctionResponse { name, response }),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FunctionResponse {
    name: String,
    response: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    /// Plays a model that reads the file, sets `a` to 2 and finishes
    struct SetAToTwo;

    impl Respond for SetAToTwo {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            let body: Value = serde_json::from_slice(&request.body).unwrap();
            let contents = body["contents"].as_array().unwrap();
            let path = prompt_path(&body);

            let parts = match contents.len() {
                1 => json!([{"functionCall": {"name": "read_json_file", "args": {"path": path}}}]),
                3 => {
                    let read = &contents[2]["parts"][0]["functionResponse"]["response"]["result"];
                    let mut doc = read.clone();
                    doc["a"] = json!(2);
                    json!([{"functionCall": {"name": "write_json_file", "args": {"path": path, "data": doc}}}])
                }
                _ => json!([{"text": "Done."}]),
            };

            ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"role": "model", "parts": parts}}]
            }))
        }
    }

    /// Plays a model that appends 3 to an array document, honouring the
    /// declared type of `data`
    struct AppendThree;

    impl Respond for AppendThree {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            let body: Value = serde_json::from_slice(&request.body).unwrap();
            let declared = &body["tools"][0]["functionDeclarations"][1]["parameters"]["properties"]
                ["data"]["type"];
            if *declared != "STRING" {
                return ResponseTemplate::new(400).set_body_json(json!({
                    "error": {"code": 400, "message": "data must be declared as STRING"}
                }));
            }

            let contents = body["contents"].as_array().unwrap();
            let path = prompt_path(&body);
            let parts = match contents.len() {
                1 => json!([{"functionCall": {"name": "read_json_file", "args": {"path": path}}}]),
                3 => {
                    let read = &contents[2]["parts"][0]["functionResponse"]["response"]["result"];
                    let mut items = read.as_array().unwrap().clone();
                    items.push(json!(3));
                    let data = Value::Array(items).to_string();
                    json!([{"functionCall": {"name": "write_json_file", "args": {"path": path, "data": data}}}])
                }
                _ => json!([{"text": "Done."}]),
            };

            ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"role": "model", "parts": parts}}]
            }))
        }
    }

    /// Plays a model that never stops reading
    struct EndlessReader;

    impl Respond for EndlessReader {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            let body: Value = serde_json::from_slice(&request.body).unwrap();
            let path = prompt_path(&body);
            ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [
                    {"functionCall": {"name": "read_json_file", "args": {"path": path}}}
                ]}}]
            }))
        }
    }

    fn prompt_path(body: &Value) -> String {
        let text = body["contents"][0]["parts"][0]["text"].as_str().unwrap();
        let start = text.find("at: ").unwrap() + 4;
        let end = text[start..].find(".\n").unwrap();
        text[start..start + end].to_string()
    }

    fn agent_for(server: &MockServer, scratch_dir: &Path) -> GeminiAgent {
        let config = GeminiConfig::default()
            .with_api_key("test-key")
            .with_base_url(server.uri())
            .with_scratch_dir(scratch_dir)
            .with_max_turns(4);
        GeminiAgent::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_tool_loop_applies_edit_and_cleans_up() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .respond_with(SetAToTwo)
            .expect(3)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let agent = agent_for(&server, dir.path());

        let result = agent.mutate("set a to 2", json!({"a": 1, "b": "x"})).await.unwrap();

        assert_eq!(result, json!({"a": 2, "b": "x"}));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_array_document_written_as_json_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(AppendThree)
            .expect(3)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let agent = agent_for(&server, dir.path());

        let result = agent.mutate("append 3", json!([1, 2])).await.unwrap();

        assert_eq!(result, json!([1, 2, 3]));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_decode_data() {
        assert_eq!(decode_data(json!("[1, 2]")), json!([1, 2]));
        assert_eq!(decode_data(json!("7")), json!(7));
        assert_eq!(decode_data(json!("\"text\"")), json!("text"));
        assert_eq!(decode_data(json!("not json")), json!("not json"));
        assert_eq!(decode_data(json!({"a": 1})), json!({"a": 1}));
    }

    #[tokio::test]
    async fn test_api_error_surfaces_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_json(json!({
                "error": {"code": 503, "message": "model overloaded", "status": "UNAVAILABLE"}
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let agent = agent_for(&server, dir.path());

        let err = agent.mutate("anything", json!({})).await.unwrap_err();
        match err {
            AgentError::Api { status, message } => {
                assert_eq!(status, 503);
                assert_eq!(message, "model overloaded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_turn_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(EndlessReader)
            .expect(4)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let agent = agent_for(&server, dir.path());

        let err = agent.mutate("loop forever", json!({})).await.unwrap_err();
        assert!(matches!(err, AgentError::TurnLimit(4)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_deadline_cancellation_removes_scratch_file() {
        use crate::error::MutationError;
        use crate::workflow::{AgentPolicy, MutationWorkflow};
        use std::sync::Arc;

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let workflow = MutationWorkflow::new(Arc::new(agent_for(&server, dir.path())))
            .with_policy(AgentPolicy::default().with_deadline(Duration::from_millis(200)));

        let err = workflow.run("slow", json!({"a": 1}), None).await.unwrap_err();

        assert!(matches!(
            err,
            MutationError::AgentFailure(AgentError::Timeout(_))
        ));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_from_env_numeric_settings() {
        std::env::set_var("GEMINI_TIMEOUT_MS", " 1500 ");
        std::env::set_var("JSON_AGENT_MAX_TURNS", "many");

        let config = GeminiConfig::from_env();
        assert_eq!(config.request_timeout_ms, 1500);
        assert_eq!(config.max_turns, GeminiConfig::default().max_turns);

        std::env::remove_var("GEMINI_TIMEOUT_MS");
        std::env::remove_var("JSON_AGENT_MAX_TURNS");
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let agent = GeminiAgent::new(GeminiConfig::default()).unwrap();
        assert!(!agent.is_configured());

        let err = agent.mutate("x", json!({})).await.unwrap_err();
        assert!(matches!(err, AgentError::NotConfigured(_)));
    }

    #[test]
    fn test_tools_are_confined_to_scratch_file() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchFile::create(Some(dir.path()), &json!({"a": 1})).unwrap();

        let call = FunctionCall {
            name: "read_json_file".to_string(),
            args: json!({"path": "/etc/passwd"}),
        };
        let result = dispatch_tool(&scratch, &call);
        assert!(result["error"].as_str().unwrap().starts_with("access denied"));

        let call = FunctionCall {
            name: "read_json_file".to_string(),
            args: json!({"path": scratch.path().display().to_string()}),
        };
        assert_eq!(dispatch_tool(&scratch, &call), json!({"result": {"a": 1}}));
    }

    #[test]
    fn test_write_accepts_json_encoded_string() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchFile::create(Some(dir.path()), &json!({})).unwrap();

        let call = FunctionCall {
            name: "write_json_file".to_string(),
            args: json!({
                "path": scratch.path().display().to_string(),
                "data": "{\"a\": [1, 2]}",
                "indent": 4
            }),
        };
        assert_eq!(dispatch_tool(&scratch, &call), json!({"result": "written"}));
        assert_eq!(scratch.read().unwrap(), json!({"a": [1, 2]}));
    }

    #[test]
    fn test_unknown_tool() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchFile::create(Some(dir.path()), &json!({})).unwrap();
        let call = FunctionCall {
            name: "delete_everything".to_string(),
            args: json!({}),
        };
        assert!(dispatch_tool(&scratch, &call)["error"].is_string());
    }

    #[test]
    fn test_part_preserves_unknown_fields() {
        let part: Part = serde_json::from_value(json!({
            "functionCall": {"name": "read_json_file", "args": {"path": "/tmp/x.json"}},
            "thoughtSignature": "abc"
        }))
        .unwrap();

        let echoed = serde_json::to_value(&part).unwrap();
        assert_eq!(echoed["thoughtSignature"], "abc");
        assert_eq!(echoed["functionCall"]["name"], "read_json_file");
    }
}
