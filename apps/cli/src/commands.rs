//! CLI command definitions, routing, and tracing setup.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use repoquery_core::{
    Pipeline, PipelineState, ProgressReporter, QueryRequest, Retriever, Stage, answer_query,
};
use repoquery_shared::{AppConfig, RepoId, init_config, load_config, resolve_token};

use crate::server;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// RepoQuery: ask questions about a GitHub repository.
#[derive(Parser)]
#[command(
    name = "repoquery",
    version,
    about = "Answer questions about a GitHub repository from its README, issues, and pull requests.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// GitHub token (overrides the env var named in the config file).
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true, global = true)]
    pub token: Option<String>,

    /// Cache store URL: `memory:`, a local path, or a libsql:// remote.
    #[arg(long, env = "REPOQUERY_CACHE_URL", global = true)]
    pub cache_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run a question through the query pipeline.
    Ask {
        /// Repository as `owner/name`.
        repo: String,
        /// Question to answer.
        question: String,
        /// Print the full response as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the repository README.
    Readme {
        repo: String,
    },

    /// List open issues.
    Issues {
        repo: String,
        #[arg(long)]
        json: bool,
    },

    /// List open pull requests.
    Pulls {
        repo: String,
        #[arg(long)]
        json: bool,
    },

    /// Show context service entries.
    Context {
        repo: String,
        #[arg(long)]
        json: bool,
    },

    /// Start the HTTP server.
    Serve {
        /// Bind address (defaults to `[server].host`).
        #[arg(long)]
        host: Option<String>,

        /// Port (defaults to `[server].port`).
        #[arg(long, env = "PORT")]
        port: Option<u16>,
    },

    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "repoquery=info",
        1 => "repoquery=debug",
        _ => "repoquery=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let overrides = Overrides {
        token: cli.token,
        cache_url: cli.cache_url,
    };

    match cli.command {
        Command::Ask {
            repo,
            question,
            json,
        } => cmd_ask(&overrides, repo, question, json).await,
        Command::Readme { repo } => cmd_readme(&overrides, &repo).await,
        Command::Issues { repo, json } => cmd_issues(&overrides, &repo, json, false).await,
        Command::Pulls { repo, json } => cmd_issues(&overrides, &repo, json, true).await,
        Command::Context { repo, json } => cmd_context(&overrides, &repo, json).await,
        Command::Serve { host, port } => cmd_serve(&overrides, host, port).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(&overrides),
        },
    }
}

/// Global flags layered over the config file.
struct Overrides {
    token: Option<String>,
    cache_url: Option<String>,
}

impl Overrides {
    /// File config with the flags applied, plus the resolved token.
    fn load(&self) -> Result<(AppConfig, Option<String>)> {
        let mut config = load_config()?;
        self.apply(&mut config);
        let token = self.token.clone().or_else(|| resolve_token(&config));
        Ok((config, token))
    }

    fn apply(&self, config: &mut AppConfig) {
        if let Some(url) = &self.cache_url {
            config.cache.url = Some(url.clone());
        }
    }

    async fn retriever(&self) -> Result<Retriever> {
        let (config, token) = self.load()?;
        build_retriever(&config, token).await
    }
}

async fn build_retriever(config: &AppConfig, token: Option<String>) -> Result<Retriever> {
    let retriever = Retriever::from_config(config, token)
        .await
        .wrap_err("failed to set up retriever")?;
    info!(cache = retriever.cache_backend(), "retriever ready");
    Ok(retriever)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_ask(overrides: &Overrides, repo: String, question: String, json: bool) -> Result<()> {
    let pipeline = Pipeline::new(Arc::new(overrides.retriever().await?));
    let request = QueryRequest {
        question: Some(question),
        repo: Some(repo),
    };

    let reporter = CliProgress::new();
    let response = answer_query(&pipeline, request, &reporter).await?;

    if json {
        print_json(&response)?;
        return Ok(());
    }

    println!();
    println!("  {}", response.answer.as_deref().unwrap_or("(no answer)"));
    println!();
    println!("  Steps:     {}", response.steps.join(" → "));
    println!("  Retrieved: {} bytes", response.retrieved_content.len());
    println!();

    Ok(())
}

async fn cmd_readme(overrides: &Overrides, repo: &str) -> Result<()> {
    let repo = RepoId::new(repo)?;
    let readme = overrides.retriever().await?.get_readme(&repo).await?;
    println!("{readme}");
    Ok(())
}

async fn cmd_issues(overrides: &Overrides, repo: &str, json: bool, pulls: bool) -> Result<()> {
    let repo = RepoId::new(repo)?;
    let retriever = overrides.retriever().await?;
    let records = if pulls {
        retriever.get_pull_requests(&repo).await?
    } else {
        retriever.get_issues(&repo).await?
    };

    if json {
        return print_json(&records);
    }
    if records.is_empty() {
        println!("No open {}.", if pulls { "pull requests" } else { "issues" });
    }
    for record in &records {
        println!("{}", record_line(record));
    }
    Ok(())
}

async fn cmd_context(overrides: &Overrides, repo: &str, json: bool) -> Result<()> {
    let repo = RepoId::new(repo)?;
    let entries = overrides.retriever().await?.get_mcp_context(&repo).await?;

    if json {
        return print_json(&entries);
    }
    if entries.is_empty() {
        println!("No context entries.");
    }
    for entry in &entries {
        let text = entry.text().unwrap_or_default();
        let first_line = text.lines().next().unwrap_or_default();
        println!("[{}] {first_line}", entry.kind().unwrap_or("?"));
    }
    Ok(())
}

async fn cmd_serve(overrides: &Overrides, host: Option<String>, port: Option<u16>) -> Result<()> {
    let (config, token) = overrides.load()?;
    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);

    let pipeline = Pipeline::new(Arc::new(build_retriever(&config, token).await?));
    println!("Listening on http://{host}:{port}");
    server::serve(pipeline, &host, port)
        .await
        .wrap_err_with(|| format!("server on {host}:{port} failed"))
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

/// Print the config as commands see it. The token is never part of it.
fn cmd_config_show(overrides: &Overrides) -> Result<()> {
    let (config, _) = overrides.load()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// `#<number> <title>` for an issue or pull request record.
fn record_line(record: &Value) -> String {
    let number = record.get("number").and_then(Value::as_u64);
    let title = record
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or("(untitled)");
    match number {
        Some(n) => format!("#{n} {title}"),
        None => title.to_string(),
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn stage(&self, stage: Stage) {
        let label = match stage {
            Stage::Retrieve => "Retrieving README",
            Stage::Plan => "Planning",
            Stage::Summarize => "Summarising",
            Stage::Log => "Logging",
        };
        self.spinner.set_message(label);
    }

    fn done(&self, _state: &PipelineState) {
        self.spinner.finish_and_clear();
    }
}
