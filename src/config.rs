//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.aggview.toml` files.

use aggview::serialize::{OutputMode, SerializeOptions};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Name of the configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = ".aggview.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Serialization settings.
    #[serde(default)]
    pub output: OutputConfig,

    /// Tree rendering settings.
    #[serde(default)]
    pub tree: TreeConfig,
}

/// General application settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

/// Serialization settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Default output mode.
    #[serde(default = "default_mode")]
    pub mode: String,

    /// Emit row keys as tuples.
    #[serde(default)]
    pub row_as_tuple: bool,

    /// Express bucket children columns as normalized trees.
    #[serde(default = "default_true")]
    pub normalize_children: bool,

    /// Grouping aggregation for row-based modes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grouped_by: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            row_as_tuple: false,
            normalize_children: true,
            grouped_by: None,
        }
    }
}

fn default_mode() -> String {
    OutputMode::DataFrame.as_str().to_string()
}

fn default_true() -> bool {
    true
}

/// Tree rendering settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Width budget used to right-align bucket values.
    #[serde(default = "default_line_width")]
    pub line_width: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            line_width: default_line_width(),
        }
    }
}

fn default_line_width() -> usize {
    60
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// This method only overrides config when CLI provides explicit values.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(output) = args.output {
            self.output.mode = OutputMode::from(output).as_str().to_string();
        }
        if let Some(ref grouped_by) = args.grouped_by {
            self.output.grouped_by = Some(grouped_by.clone());
        }
        if let Some(line_width) = args.line_width {
            self.tree.line_width = line_width;
        }

        // Flags always override
        if args.row_as_tuple {
            self.output.row_as_tuple = true;
        }
        if args.no_normalize_children {
            self.output.normalize_children = false;
        }
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Check values that the file format alone cannot constrain.
    pub fn validate(&self) -> Result<()> {
        self.mode()?;
        if self.tree.line_width == 0 {
            bail!("tree.line_width must be at least 1");
        }
        Ok(())
    }

    /// Configured output mode.
    pub fn mode(&self) -> Result<OutputMode> {
        self.output
            .mode
            .parse()
            .with_context(|| format!("Invalid output.mode in config: {}", self.output.mode))
    }

    /// Serialization options derived from the `[output]` section.
    pub fn serialize_options(&self) -> SerializeOptions {
        SerializeOptions {
            grouped_by: self.output.grouped_by.clone(),
            row_as_tuple: self.output.row_as_tuple,
            normalize_children: self.output.normalize_children,
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
