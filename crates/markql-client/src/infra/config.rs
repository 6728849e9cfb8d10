//! Configuration management utilities.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dirs_next::config_dir;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::app::agent::{DEFAULT_AGENT_URL, DEFAULT_TOKEN_HEADER, OptionBounds};
use crate::app::export::ExportFormat;
use crate::domain::model::ScopeSelection;

static DEFAULT_CONFIG: Lazy<&'static str> =
    Lazy::new(|| include_str!("../../assets/default-config.toml"));
static DEFAULT_WORKSPACE_CONFIG_PATH: &str = ".markql/config.toml";

/// Default byte quota of the session cache (10 MiB).
pub const DEFAULT_SESSION_QUOTA_BYTES: usize = 10 * 1024 * 1024;

/// Layered configuration loaded from defaults, user, workspace, and env.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub agent: Agent,
    #[serde(default)]
    pub query: Query,
    #[serde(default)]
    pub capture: Capture,
    #[serde(default)]
    pub export: Export,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Agent {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    token_header: Option<String>,
}

impl Agent {
    pub fn url(&self) -> &str {
        self.url.as_deref().unwrap_or(DEFAULT_AGENT_URL)
    }

    pub fn token_header(&self) -> &str {
        self.token_header.as_deref().unwrap_or(DEFAULT_TOKEN_HEADER)
    }
}

/// Defaults for the numeric request options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Query {
    #[serde(default)]
    max_rows: Option<u64>,
    #[serde(default)]
    timeout_ms: Option<u64>,
}

impl Query {
    pub fn max_rows(&self) -> OptionBounds {
        let bounds = OptionBounds::MAX_ROWS;
        self.max_rows
            .map_or(bounds, |default| bounds.with_default(default))
    }

    pub fn timeout_ms(&self) -> OptionBounds {
        let bounds = OptionBounds::TIMEOUT_MS;
        self.timeout_ms
            .map_or(bounds, |default| bounds.with_default(default))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Capture {
    #[serde(default)]
    primary_scope: Option<ScopeSelection>,
    #[serde(default)]
    fallback_scope: Option<ScopeSelection>,
    #[serde(default)]
    session_quota_bytes: Option<usize>,
}

impl Capture {
    pub fn primary_scope(&self) -> ScopeSelection {
        self.primary_scope.unwrap_or(ScopeSelection::Full)
    }

    pub fn fallback_scope(&self) -> ScopeSelection {
        self.fallback_scope.unwrap_or(ScopeSelection::Main)
    }

    pub fn session_quota_bytes(&self) -> usize {
        self.session_quota_bytes.unwrap_or(DEFAULT_SESSION_QUOTA_BYTES)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Export {
    #[serde(default)]
    format: Option<String>,
}

impl Export {
    /// Configured format; unknown names fall back to CSV.
    pub fn format(&self) -> ExportFormat {
        match self.format.as_deref().map(str::parse::<ExportFormat>) {
            None => ExportFormat::Csv,
            Some(Ok(format)) => format,
            Some(Err(err)) => {
                warn!(error = %err, "ignoring configured export format");
                ExportFormat::Csv
            }
        }
    }
}

/// Environment overrides for critical settings.
#[derive(Debug, Default, Clone)]
pub struct EnvOverrides {
    agent_url: Option<String>,
    export_format: Option<String>,
}

impl EnvOverrides {
    fn from_env() -> Self {
        Self {
            agent_url: env::var("MARKQL_AGENT_URL").ok(),
            export_format: env::var("MARKQL_EXPORT_FORMAT").ok(),
        }
    }

    #[cfg(test)]
    fn for_tests(agent_url: &str, export_format: &str) -> Self {
        Self {
            agent_url: Some(agent_url.to_owned()),
            export_format: Some(export_format.to_owned()),
        }
    }
}

impl Config {
    /// Load configuration from defaults, user/global config, workspace config, and env overrides.
    pub fn load() -> Result<Self> {
        let env = EnvOverrides::from_env();
        let global = global_config_path();
        let workspace = workspace_config_path()?;
        Self::load_with_layers(global, workspace, env)
    }

    fn load_with_layers(
        global: Option<PathBuf>,
        workspace: Option<PathBuf>,
        env_overrides: EnvOverrides,
    ) -> Result<Self> {
        let mut layers: Vec<Config> = Vec::new();

        layers.push(Self::from_str(&DEFAULT_CONFIG)?);

        if let Some(global_path) = global.filter(|path| path.exists()) {
            layers.push(Self::from_file(&global_path)?);
        }

        if let Some(workspace_path) = workspace.filter(|path| path.exists()) {
            layers.push(Self::from_file(&workspace_path)?);
        }

        let merged = layers.into_iter().reduce(Config::merge).unwrap_or_default();
        Ok(apply_env_overrides(merged, env_overrides))
    }

    fn from_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_str(&data).with_context(|| format!("in config file {}", path.display()))
    }

    fn from_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("failed to parse TOML config")
    }

    fn merge(self, other: Self) -> Self {
        Self {
            agent: Agent {
                url: other.agent.url.or(self.agent.url),
                token_header: other.agent.token_header.or(self.agent.token_header),
            },
            query: Query {
                max_rows: other.query.max_rows.or(self.query.max_rows),
                timeout_ms: other.query.timeout_ms.or(self.query.timeout_ms),
            },
            capture: Capture {
                primary_scope: other.capture.primary_scope.or(self.capture.primary_scope),
                fallback_scope: other.capture.fallback_scope.or(self.capture.fallback_scope),
                session_quota_bytes: other
                    .capture
                    .session_quota_bytes
                    .or(self.capture.session_quota_bytes),
            },
            export: Export {
                format: other.export.format.or(self.export.format),
            },
        }
    }
}

fn global_config_path() -> Option<PathBuf> {
    config_dir().map(|base| base.join("markql/config.toml"))
}

fn workspace_config_path() -> Result<Option<PathBuf>> {
    let cwd = env::current_dir()?;
    let root = find_repo_root(&cwd).unwrap_or(cwd);
    Ok(Some(root.join(DEFAULT_WORKSPACE_CONFIG_PATH)))
}

fn find_repo_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(".git").exists())
        .map(Path::to_path_buf)
}

fn apply_env_overrides(mut config: Config, env: EnvOverrides) -> Config {
    if let Some(url) = env.agent_url.filter(|url| !url.trim().is_empty()) {
        config.agent.url = Some(url);
    }
    if let Some(format) = env.export_format {
        config.export.format = Some(format);
    }
    config
}
