//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

/// Hard ceiling on any result list, regardless of what a caller asks for
pub const HARD_RESULT_CAP: usize = 1000;

/// Sage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseSettings,
    pub graph: GraphConfig,
    pub review: ReviewConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Database file; `None` uses the platform data directory
    pub path: Option<PathBuf>,
    pub max_connections: u32,
}

/// Defaults and bounds for graph traversal
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub related_depth: usize,
    /// Upper bound on every traversal result list
    pub max_results: usize,
    pub path_max_depth: usize,
    pub ancestor_depth: usize,
    pub descendant_depth: usize,
    pub search_limit: usize,
    pub top_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    pub due_limit: usize,
    pub session_list_limit: usize,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: None,
            max_connections: 5,
        }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            related_depth: 1,
            max_results: HARD_RESULT_CAP,
            path_max_depth: 6,
            ancestor_depth: 5,
            descendant_depth: 5,
            search_limit: 20,
            top_limit: 10,
        }
    }
}

impl GraphConfig {
    /// Resolve a caller-supplied limit against the configured cap
    pub fn effective_limit(&self, requested: Option<usize>, default: usize) -> usize {
        requested.unwrap_or(default).min(self.max_results)
    }
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            due_limit: 20,
            session_list_limit: 20,
        }
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("SAGE_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("sage")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, or fall back to defaults if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;

        if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::from_toml(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.validate()?;

        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

        let path = Self::config_path()?;
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database.max_connections == 0 {
            return Err(anyhow!("database.max_connections must be at least 1"));
        }
        if self.graph.max_results == 0 || self.graph.max_results > HARD_RESULT_CAP {
            return Err(anyhow!(
                "graph.max_results must be between 1 and {}",
                HARD_RESULT_CAP
            ));
        }
        if self.graph.path_max_depth == 0 {
            return Err(anyhow!("graph.path_max_depth must be at least 1"));
        }
        Ok(())
    }

    /// All keys understood by `get` and `set`
    pub fn keys() -> &'static [&'static str] {
        &[
            "database.path",
            "database.max_connections",
            "graph.related_depth",
            "graph.max_results",
            "graph.path_max_depth",
            "graph.ancestor_depth",
            "graph.descendant_depth",
            "graph.search_limit",
            "graph.top_limit",
            "review.due_limit",
            "review.session_list_limit",
        ]
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            "database.path" => Ok(self
                .database
                .path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(default)".to_string())),
            "database.max_connections" => Ok(self.database.max_connections.to_string()),

            "graph.related_depth" => Ok(self.graph.related_depth.to_string()),
            "graph.max_results" => Ok(self.graph.max_results.to_string()),
            "graph.path_max_depth" => Ok(self.graph.path_max_depth.to_string()),
            "graph.ancestor_depth" => Ok(self.graph.ancestor_depth.to_string()),
            "graph.descendant_depth" => Ok(self.graph.descendant_depth.to_string()),
            "graph.search_limit" => Ok(self.graph.search_limit.to_string()),
            "graph.top_limit" => Ok(self.graph.top_limit.to_string()),

            "review.due_limit" => Ok(self.review.due_limit.to_string()),
            "review.session_list_limit" => Ok(self.review.session_list_limit.to_string()),

            _ => Err(anyhow!(
                "Unknown configuration key: {}. Use `sage config list` to see available keys.",
                key
            )),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        fn parse_usize(key: &str, value: &str) -> anyhow::Result<usize> {
            value
                .parse()
                .with_context(|| format!("Invalid {} value: {}", key, value))
        }

        match key {
            "database.path" => {
                self.database.path = if value.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                };
            }
            "database.max_connections" => {
                self.database.max_connections = value
                    .parse()
                    .with_context(|| format!("Invalid max_connections value: {}", value))?;
            }
            "graph.related_depth" => self.graph.related_depth = parse_usize(key, value)?,
            "graph.max_results" => self.graph.max_results = parse_usize(key, value)?,
            "graph.path_max_depth" => self.graph.path_max_depth = parse_usize(key, value)?,
            "graph.ancestor_depth" => self.graph.ancestor_depth = parse_usize(key, value)?,
            "graph.descendant_depth" => self.graph.descendant_depth = parse_usize(key, value)?,
            "graph.search_limit" => self.graph.search_limit = parse_usize(key, value)?,
            "graph.top_limit" => self.graph.top_limit = parse_usize(key, value)?,
            "review.due_limit" => self.review.due_limit = parse_usize(key, value)?,
            "review.session_list_limit" => {
                self.review.session_list_limit = parse_usize(key, value)?
            }
            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `sage config list` to see available keys.",
                    key
                ));
            }
        }
        self.validate()
    }
}
