//! Staffing query CLI
//!
//! Command-line interface for serving and querying the staffing search service.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

use staffing_query::api::handlers::HealthResponse;
use staffing_query::{
    create_embedder, responder, telemetry, ApiConfig, ApiServer, AppState, EmbeddingBackend,
    Error, RetrievalEngine, Result, Roster, ServiceConfig,
};

#[derive(Parser)]
#[command(name = "staffing-query")]
#[command(author, version, about = "Semantic staffing search service", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum BackendArg {
    Hash,
    Fastembed,
}

impl From<BackendArg> for EmbeddingBackend {
    fn from(value: BackendArg) -> Self {
        match value {
            BackendArg::Hash => EmbeddingBackend::Hash,
            BackendArg::Fastembed => EmbeddingBackend::FastEmbed,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "config.toml")]
        output: String,
    },

    /// Build the search engine and start the HTTP API
    Serve {
        /// HTTP API listen address
        #[arg(long)]
        api_addr: Option<String>,

        /// Roster JSON file
        #[arg(long)]
        roster: Option<PathBuf>,

        /// Embedding backend
        #[arg(long, value_enum)]
        backend: Option<BackendArg>,

        /// Do not expose /metrics
        #[arg(long)]
        no_metrics: bool,
    },

    /// Answer a single query and print the reply
    Query {
        /// Free-text staffing request
        text: String,

        /// Number of candidates
        #[arg(short, long)]
        k: Option<usize>,

        /// Drop candidates scoring below this value
        #[arg(long)]
        min_score: Option<f32>,

        /// Roster JSON file
        #[arg(long)]
        roster: Option<PathBuf>,

        /// Embedding backend
        #[arg(long, value_enum)]
        backend: Option<BackendArg>,

        /// Print scored matches as JSON instead of the chat reply
        #[arg(long)]
        json: bool,
    },

    /// Check service health
    Health {
        /// API endpoint to check
        #[arg(long, default_value = "http://localhost:8000")]
        endpoint: String,
    },
}

fn load_config(path: &str) -> Result<ServiceConfig> {
    let mut config = if Path::new(path).exists() {
        info!("Loading configuration from: {}", path);
        ServiceConfig::load(path)?
    } else {
        info!("Using default configuration");
        ServiceConfig::default()
    };
    config.apply_env();
    Ok(config)
}

async fn build_engine(config: &ServiceConfig) -> Result<RetrievalEngine> {
    let roster = Roster::load(&config.roster.path)?;
    let embedder = create_embedder(&config.embedding).await?;
    RetrievalEngine::build(roster, embedder, config.retrieval.clone()).await
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    telemetry::init_logging(cli.verbose, cli.json_logs);
    telemetry::install_tracing_panic_hook("staffing-query");

    match cli.command {
        Commands::Init { output } => {
            info!("Writing default configuration to: {}", output);
            let config = ServiceConfig::default();
            config.save(&output)?;
            info!("Configuration saved successfully");
        }

        Commands::Serve {
            api_addr,
            roster,
            backend,
            no_metrics,
        } => {
            info!("Starting staffing query service...");

            // 1. Configuration, with CLI flags taking precedence
            let mut config = load_config(&cli.config)?;
            if let Some(addr) = api_addr {
                config.server.listen_address = addr;
            }
            if let Some(path) = roster {
                config.roster.path = path;
            }
            if let Some(backend) = backend {
                config.embedding.backend = backend.into();
            }
            config.validate()?;

            // 2. Roster, embeddings and index
            let engine = match build_engine(&config).await {
                Ok(engine) => Arc::new(engine),
                Err(e) => {
                    error!("Failed to build search engine: {}", e);
                    return Err(e);
                }
            };

            // 3. Shared state
            let mut state = AppState::new(engine);
            if !no_metrics {
                if let Some(handle) = telemetry::install_metrics_recorder() {
                    state = state.with_metrics(handle);
                }
            }
            if let Some(rate) = config.server.rate_limit_per_sec {
                info!("Rate limit: {} requests/second", rate);
                state = state.with_rate_limit(rate);
            }

            // 4. HTTP API, until shutdown
            let api_config = ApiConfig {
                listen_address: config.server.listen_address.clone(),
                cors_enabled: config.server.cors_enabled,
                cors_origins: config.server.cors_origins.clone(),
            };
            let addr = api_config.listen_address.clone();
            ApiServer::with_state(api_config, state).run(&addr).await?;
        }

        Commands::Query {
            text,
            k,
            min_score,
            roster,
            backend,
            json,
        } => {
            let mut config = load_config(&cli.config)?;
            if let Some(path) = roster {
                config.roster.path = path;
            }
            if let Some(backend) = backend {
                config.embedding.backend = backend.into();
            }
            config.validate()?;

            let engine = build_engine(&config).await?;
            if json {
                let matches = engine.retrieve_scored(&text, k, min_score).await?;
                println!("{}", serde_json::to_string_pretty(&matches)?);
            } else {
                let matches = engine.retrieve(&text, k, min_score).await?;
                println!("{}", responder::format(&matches, &text));
            }
        }

        Commands::Health { endpoint } => {
            info!("Checking service health at: {}", endpoint);

            let health_url = format!("{}/health", endpoint.trim_end_matches('/'));

            match tokio::time::timeout(std::time::Duration::from_secs(5), check_health(&health_url))
                .await
            {
                Ok(Ok(response)) => {
                    info!("Service status: {}", response.status);
                    info!("Version: {}", response.version);
                    info!("Employees: {}", response.employees);
                    info!("Embedder: {} / index: {}", response.embedder, response.index);
                    info!("Uptime: {} seconds", response.uptime);
                }
                Ok(Err(e)) => {
                    error!("Health check failed: {}", e);
                    std::process::exit(1);
                }
                Err(_) => {
                    error!("Health check timed out");
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

/// Perform a health check against the API endpoint.
async fn check_health(url: &str) -> Result<HealthResponse> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    let url = url.trim_start_matches("http://");
    let (host_port, path) = url
        .split_once('/')
        .map(|(h, p)| (h, format!("/{}", p)))
        .unwrap_or((url, "/health".to_string()));

    let mut stream = TcpStream::connect(host_port)
        .await
        .map_err(|e| Error::Api(format!("Connection failed: {}", e)))?;

    // HTTP/1.0 keeps the reply unchunked and closes the connection after it.
    let request = format!("GET {} HTTP/1.0\r\nHost: {}\r\n\r\n", path, host_port);
    stream
        .write_all(request.as_bytes())
        .await
        .map_err(|e| Error::Api(format!("Write failed: {}", e)))?;

    let mut response = Vec::new();
    stream
        .read_to_end(&mut response)
        .await
        .map_err(|e| Error::Api(format!("Read failed: {}", e)))?;

    let response_str = String::from_utf8_lossy(&response);

    let (head, body) = response_str
        .split_once("\r\n\r\n")
        .ok_or_else(|| Error::Api("Invalid HTTP response".to_string()))?;
    let status = head.lines().next().unwrap_or("unknown status");
    if status.split_whitespace().nth(1) != Some("200") {
        return Err(Error::Api(format!("Unexpected response: {}", status)));
    }

    serde_json::from_str(body).map_err(|e| Error::Api(format!("JSON parse error: {}", e)))
}
