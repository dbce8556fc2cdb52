//! aggview - search aggregation response inspector
//!
//! A CLI tool that rebuilds the bucket tree of an aggregation response
//! and prints it in one of several serialization modes.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Invalid arguments, unreadable input or serialization failure

mod cli;
mod config;

use aggview::aggs::AggTree;
use aggview::models::SearchResponse;
use aggview::report;
use anyhow::{Context, Result};
use cli::Args;
use config::{Config, DEFAULT_CONFIG_FILE};
use serde_json::Value;
use std::path::Path;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Load configuration before logging so the file can enable verbose output
    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(&args, &config);

    debug!("aggview v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    if let Err(e) = run(&args, config) {
        error!("aggview failed: {:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
    Ok(())
}

/// Handle --init-config: generate a default .aggview.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!("{} already exists. Remove it first or edit it manually.", DEFAULT_CONFIG_FILE);
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("Created {} with default settings.", DEFAULT_CONFIG_FILE);
    Ok(())
}

/// Initialize logging based on verbosity settings. Logs go to stderr.
///
/// `RUST_LOG`, when set, takes precedence over the flags and config file.
fn init_logging(args: &Args, config: &Config) {
    let level = if !args.quiet && config.general.verbose {
        tracing::Level::DEBUG
    } else {
        args.log_level()
    };
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(log_filter(rust_log.as_deref(), level))
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Filter from a `RUST_LOG` value, falling back to `level` when unset or invalid.
fn log_filter(rust_log: Option<&str>, level: tracing::Level) -> EnvFilter {
    rust_log
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(level.as_str()))
}

/// Parse both inputs, serialize, and print or save the rendering.
fn run(args: &Args, mut config: Config) -> Result<()> {
    config.merge_with_args(args);
    config.validate()?;

    let aggs_path = args.aggs.as_deref().context("Missing --aggs")?;
    let response_path = args.response.as_deref().context("Missing --response")?;

    let aggs = load_aggs(aggs_path)?;
    info!("Loaded {} aggregations from {}", aggs.len(), aggs_path.display());

    let text = std::fs::read_to_string(response_path)
        .with_context(|| format!("Failed to read response file: {}", response_path.display()))?;
    let response = SearchResponse::from_json(&text)
        .with_context(|| format!("Failed to parse response file: {}", response_path.display()))?;
    info!("{}", response);
    if !response.success() {
        warn!("Response is partial: some shards failed or the search timed out");
    }

    let mode = config.mode()?;
    let serialized = response
        .aggregations(&aggs)
        .serialize_as(mode, &config.serialize_options())
        .with_context(|| format!("Failed to serialize aggregations as {}", mode))?;
    let mut output = report::render(&serialized, config.tree.line_width);
    if !output.ends_with('\n') {
        output.push('\n');
    }

    match args.out {
        Some(ref path) => {
            std::fs::write(path, &output)
                .with_context(|| format!("Failed to write output to {}", path.display()))?;
            info!("Output saved to {}", path.display());
        }
        None => print!("{}", output),
    }
    Ok(())
}

/// Read an aggregation request, either bare or wrapped in a search body.
fn load_aggs(path: &Path) -> Result<AggTree> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read aggregations file: {}", path.display()))?;
    let body: Value = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse aggregations file: {}", path.display()))?;

    AggTree::from_body(&body)
        .with_context(|| format!("Invalid aggregations in {}", path.display()))
}

/// Load configuration from file or use defaults.
///
/// Runs before the subscriber is installed, so problems go straight to stderr.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok(config),
        Ok(None) => Ok(Config::default()),
        Err(e) => {
            eprintln!("Warning: ignoring {}: {:#}", DEFAULT_CONFIG_FILE, e);
            Ok(Config::default())
        }
    }
}
