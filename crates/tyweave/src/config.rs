//! `tyweave.toml` settings

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tyweave_core::InferOptions;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub inference: InferOptions,
    pub output: OutputSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub color: bool,
    /// Print each statement next to its type
    pub show_source: bool,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            color: true,
            show_source: true,
        }
    }
}

impl CliConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: Self =
            toml::from_str(&content).with_context(|| format!("failed to parse config {}", path.display()))?;
        Ok(config)
    }
}
