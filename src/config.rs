use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::paths;

// ============================================================================
// Config Schema
// ============================================================================

/// The sonda configuration, read from `config.toml` in the config directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SondaConfig {
    /// Query evaluation settings
    #[serde(default)]
    pub eval: EvalConfig,

    /// Which provider resources are resolved against
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Output settings
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalConfig {
    /// Passes before pending fields are reported as not ready
    #[serde(default = "default_max_passes")]
    pub max_passes: usize,
}

fn default_max_passes() -> usize {
    querygraph::DEFAULT_MAX_PASSES
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            max_passes: default_max_passes(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Local,
    Mock,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProviderConfig {
    #[serde(default)]
    pub kind: ProviderKind,

    /// Fixture used when `kind = "mock"` (supports `~` and `$VARS`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mock: Option<String>,
}

impl ProviderConfig {
    /// Expanded fixture path, if one is configured
    pub fn mock_path(&self) -> Option<PathBuf> {
        self.mock.as_deref().map(paths::expand)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
}

impl SondaConfig {
    /// Load the config from the config directory. A missing file yields the
    /// defaults.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_file()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid TOML format in {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Write the config, creating the directory if needed
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Could not create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Could not write {}", path.display()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.eval.max_passes == 0 {
            bail!("eval.max_passes must be at least 1");
        }
        if self.provider.kind == ProviderKind::Mock && self.provider.mock.is_none() {
            bail!("provider.kind = \"mock\" requires provider.mock = \"<fixture.toml>\"");
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
