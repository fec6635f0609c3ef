use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment-sourced settings. Only secrets live here; everything about
/// the import itself comes from the TOML [`FileConfig`].
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
        };

        config.log_keys();
        Ok(config)
    }

    fn log_keys(&self) {
        // Drop credentials from the URL before it reaches the log.
        let redacted = match self.database_url.rsplit_once('@') {
            Some((_, host)) => format!("postgres://***@{host}"),
            None => "<unparsed>".to_string(),
        };
        tracing::info!(database = %redacted, "Config loaded");
    }
}

/// TOML-backed configuration loaded from disk.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub site: SiteConfig,
    pub export: ExportConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SiteConfig {
    /// Short name of the site being imported. Also the origin title.
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Lower-case key identifying the destination site.
    pub subdomain_key: String,
    /// Legacy profile ID of the user who will own the destination site.
    pub owner_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExportConfig {
    /// Directory containing the exported data.
    pub root_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
        }
    }
}

fn default_max_connections() -> u32 {
    10
}

/// Per-stage worker counts. Unset stages use the pipeline defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConcurrencyConfig {
    pub accounts: Option<usize>,
    pub containers: Option<usize>,
    pub threads: Option<usize>,
    pub posts: Option<usize>,
    pub messages: Option<usize>,
    pub attachments: Option<usize>,
    pub relationships: Option<usize>,
    pub finalization: Option<usize>,
}

/// Load and parse a TOML config file.
pub fn load_config(path: &Path) -> Result<FileConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

pub fn parse_config(content: &str) -> Result<FileConfig> {
    let config: FileConfig = toml::from_str(content)?;
    if config.site.subdomain_key.trim().is_empty() {
        anyhow::bail!("site.subdomain_key must not be empty");
    }
    if config.site.owner_id <= 0 {
        anyhow::bail!("site.owner_id must be a positive legacy profile ID");
    }
    Ok(config)
}
