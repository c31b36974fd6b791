//! JSON Agent entry point
//!
//! Serves the HTTP API, validates files against schemas, and runs one-off
//! edits from the terminal.

use clap::{Args, Parser, Subcommand, ValueEnum};
use json_agent_api::{create_router, AppState, ServerSettings};
use json_agent_core::agent::scratch::{read_json_file, write_json_file, DEFAULT_INDENT};
use json_agent_core::{
    load_dotenv, AgentPolicy, GeminiAgent, GeminiConfig, MutationWorkflow, Schema,
    SchemaValidator,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_ENV_FILE: &str = ".env";

/// Exit codes for the `validate` command
const EXIT_INVALID: i32 = 1;
const EXIT_SCHEMA_ERROR: i32 = 3;

#[derive(Parser)]
#[command(name = "json-agent")]
#[command(about = "JSON Agent - schema-gated JSON editing with a language model")]
#[command(version)]
struct Cli {
    /// .env file loaded before reading configuration
    #[arg(long, global = true, default_value = DEFAULT_ENV_FILE)]
    env_file: PathBuf,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value = "json", env = "JSON_AGENT_LOG_FORMAT")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
enum LogFormat {
    Json,
    Pretty,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8002", env = "PORT")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0", env = "HOST")]
        host: String,

        /// Base directory for relative schema paths
        #[arg(long, default_value = ".", env = "JSON_AGENT_SCHEMA_ROOT")]
        schema_root: PathBuf,

        /// Schema applied when a request names none
        #[arg(long, env = "JSON_AGENT_DEFAULT_SCHEMA")]
        default_schema: Option<PathBuf>,

        /// Directory holding index.html
        #[arg(long, default_value = "static", env = "JSON_AGENT_STATIC_DIR")]
        static_dir: PathBuf,

        /// Request body limit in bytes
        #[arg(long, default_value_t = json_agent_api::handler::DEFAULT_MAX_BODY_BYTES, env = "JSON_AGENT_MAX_BODY_BYTES")]
        max_body_bytes: usize,

        /// Reuse compiled schemas until their file changes
        #[arg(long, env = "JSON_AGENT_CACHE_SCHEMAS")]
        cache_schemas: bool,

        #[command(flatten)]
        agent: AgentArgs,
    },

    /// Validate a JSON file against a schema
    Validate {
        /// Path to the JSON Schema
        #[arg(short, long)]
        schema: PathBuf,

        /// Path to the JSON document
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Apply a prompt to a JSON file once
    Modify {
        /// Instruction for the agent
        #[arg(short, long)]
        prompt: String,

        /// Path to the JSON document
        #[arg(short, long)]
        file: PathBuf,

        /// Schema gating input and output
        #[arg(short, long)]
        schema: Option<PathBuf>,

        /// Write the result here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        agent: AgentArgs,
    },
}

#[derive(Args)]
struct AgentArgs {
    /// Gemini model name
    #[arg(long, default_value = "gemini-2.5-flash", env = "GEMINI_MODEL")]
    model: String,

    /// Gemini API base URL
    #[arg(long, default_value = "https://generativelanguage.googleapis.com", env = "GEMINI_BASE_URL")]
    base_url: String,

    /// Deadline for one agent call, in seconds
    #[arg(long, default_value = "120", env = "JSON_AGENT_AGENT_TIMEOUT_SECS")]
    agent_timeout_secs: u64,

    /// Retries after transient agent failures
    #[arg(long, default_value = "0", env = "JSON_AGENT_AGENT_RETRIES")]
    agent_retries: u32,

    /// Maximum model turns per call
    #[arg(long, default_value = "8", env = "JSON_AGENT_MAX_TURNS")]
    max_turns: usize,

    /// Directory for scratch files
    #[arg(long, env = "JSON_AGENT_SCRATCH_DIR")]
    scratch_dir: Option<PathBuf>,
}

impl AgentArgs {
    fn gemini_config(&self) -> GeminiConfig {
        let mut config = GeminiConfig::from_env()
            .with_base_url(self.base_url.clone())
            .with_max_turns(self.max_turns);
        config.model = self.model.clone();
        if let Some(dir) = &self.scratch_dir {
            config = config.with_scratch_dir(dir.clone());
        }
        config
    }

    fn policy(&self) -> AgentPolicy {
        AgentPolicy::default()
            .with_deadline(Duration::from_secs(self.agent_timeout_secs))
            .with_retries(self.agent_retries, AgentPolicy::default().retry_backoff)
    }

    fn build_agent(&self) -> anyhow::Result<Arc<GeminiAgent>> {
        Ok(Arc::new(GeminiAgent::new(self.gemini_config())?))
    }
}

/// Find `--env-file` before clap runs, so `.env` values can feed `env = ...` defaults
fn env_file_from_args(args: &[String]) -> PathBuf {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if let Some(path) = arg.strip_prefix("--env-file=") {
            return PathBuf::from(path);
        }
        if arg == "--env-file" {
            if let Some(path) = iter.next() {
                return PathBuf::from(path);
            }
        }
    }
    PathBuf::from(DEFAULT_ENV_FILE)
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
    );
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let env_file = env_file_from_args(&args);
    let dotenv = load_dotenv(&env_file);

    let cli = Cli::parse_from(args);
    init_tracing(cli.log_format);

    match dotenv {
        Ok(0) => {}
        Ok(applied) => tracing::info!(path = %cli.env_file.display(), applied, "Loaded .env file"),
        Err(e) => tracing::warn!(error = %e, "Ignoring .env file"),
    }

    match cli.command {
        Commands::Serve {
            port,
            host,
            schema_root,
            default_schema,
            static_dir,
            max_body_bytes,
            cache_schemas,
            agent,
        } => {
            let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
            let mutator = agent.build_agent()?;

            if mutator.config().api_key.is_none() {
                tracing::warn!("GEMINI_API_KEY is not set; modify requests will fail");
            }

            let settings = ServerSettings {
                schema_root,
                default_schema,
                static_dir,
                max_body_bytes,
                cache_schemas,
                policy: agent.policy(),
            };
            let state = Arc::new(AppState::new(mutator, settings)?);
            let router = create_router(state);

            tracing::info!("Starting JSON Agent on {}", addr);
            tracing::info!(
                model = %agent.model,
                version = json_agent_api::VERSION,
                "Agent configured"
            );

            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, router).await?;
        }

        Commands::Validate { schema, file } => {
            let validator = match SchemaValidator::from_file(&schema) {
                Ok(validator) => validator,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(EXIT_SCHEMA_ERROR);
                }
            };

            let outcome = match validator.validate_json_file(&file) {
                Ok(outcome) => outcome,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(EXIT_SCHEMA_ERROR);
                }
            };

            println!("{}", serde_json::to_string_pretty(&outcome)?);

            if !outcome.is_valid() {
                std::process::exit(EXIT_INVALID);
            }
        }

        Commands::Modify {
            prompt,
            file,
            schema,
            output,
            agent,
        } => {
            let document = read_json_file(&file)
                .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", file.display(), e))?;
            let schema = schema.map(Schema::load).transpose()?;

            let workflow = MutationWorkflow::new(agent.build_agent()?).with_policy(agent.policy());
            let updated = workflow.run(&prompt, document, schema.as_ref()).await?;

            match output {
                Some(path) => {
                    write_json_file(&path, &updated, DEFAULT_INDENT)?;
                    tracing::info!(path = %path.display(), "Wrote updated document");
                }
                None => println!("{}", serde_json::to_string_pretty(&updated)?),
            }
        }
    }

    Ok(())
}
