//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use aggview::serialize::OutputMode;
use clap::Parser;
use std::path::PathBuf;

/// aggview - inspect search aggregation responses
///
/// Rebuild the bucket tree of an aggregation response and print it as an
/// indented tree, normalized JSON, grouped rows or a Markdown table.
///
/// Examples:
///   aggview --aggs request.json --response response.json
///   aggview --aggs request.json --response response.json --output tree
///   aggview --aggs request.json --response response.json --output dict-rows --grouped-by by_color
///   aggview --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Aggregation request file (JSON)
    ///
    /// Either the aggregations mapping itself or a full search body with an
    /// `aggs`/`aggregations` key.
    #[arg(short, long, value_name = "FILE", required_unless_present = "init_config")]
    pub aggs: Option<PathBuf>,

    /// Search response file (JSON)
    #[arg(short, long, value_name = "FILE", required_unless_present = "init_config")]
    pub response: Option<PathBuf>,

    /// Output mode
    ///
    /// Defaults to the config file setting, or dataframe.
    #[arg(short, long, value_name = "MODE", env = "AGGVIEW_OUTPUT")]
    pub output: Option<OutputFormatArg>,

    /// Last aggregation used to group rows (dict-rows and dataframe modes)
    ///
    /// Defaults to the deepest aggregation reachable through single bucket children.
    #[arg(short, long, value_name = "NAME")]
    pub grouped_by: Option<String>,

    /// Emit row keys as tuples instead of {level: key} mappings
    #[arg(long)]
    pub row_as_tuple: bool,

    /// Keep bucket children columns as raw response fragments
    #[arg(long)]
    pub no_normalize_children: bool,

    /// Line width budget of the tree rendering
    #[arg(long, value_name = "COLS")]
    pub line_width: Option<usize>,

    /// Write the output to a file instead of stdout
    #[arg(long, value_name = "FILE")]
    pub out: Option<PathBuf>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .aggview.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (errors only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .aggview.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output mode accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormatArg {
    /// Response payload as received
    Raw,
    /// Indented bucket tree
    Tree,
    /// Indented bucket tree, navigable from the library
    InteractiveTree,
    /// Nested {level, key, value, children} JSON
    NormalizedTree,
    /// Grouped rows as JSON
    DictRows,
    /// Grouped rows as a Markdown table
    #[value(name = "dataframe")]
    DataFrame,
}

impl From<OutputFormatArg> for OutputMode {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Raw => OutputMode::Raw,
            OutputFormatArg::Tree => OutputMode::Tree,
            OutputFormatArg::InteractiveTree => OutputMode::InteractiveTree,
            OutputFormatArg::NormalizedTree => OutputMode::NormalizedTree,
            OutputFormatArg::DictRows => OutputMode::DictRows,
            OutputFormatArg::DataFrame => OutputMode::DataFrame,
        }
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.line_width == Some(0) {
            return Err("Line width must be at least 1".to_string());
        }

        if let Some(ref grouped_by) = self.grouped_by {
            if grouped_by.trim().is_empty() {
                return Err("Grouping aggregation name cannot be empty".to_string());
            }
        }

        for path in [&self.aggs, &self.response].into_iter().flatten() {
            if !path.is_file() {
                return Err(format!("Input file does not exist: {}", path.display()));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
