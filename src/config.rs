use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::retry::RetryConfig;
use crate::types::LogLevel;

/// Credential context for one platform environment.
///
/// Immutable once loaded. The optional `*_url` fields override the
/// subdomain-derived endpoint roots (sandboxes, proxies, tests).
#[derive(Clone, PartialEq, Eq)]
pub struct Environment {
    pub name: String,
    pub subdomain: String,
    pub client_id: String,
    pub client_secret: String,
    pub account_id: String,
    pub catalog_url: String,
    pub auth_url: Option<String>,
    pub rest_url: Option<String>,
    pub soap_url: Option<String>,
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("name", &self.name)
            .field("subdomain", &self.subdomain)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("account_id", &self.account_id)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct EnvironmentEntry {
    name: String,
    subdomain: String,
    client_id: String,
    #[serde(default)]
    client_secret: Option<String>,
    account_id: String,
    catalog_url: String,
    #[serde(default)]
    auth_url: Option<String>,
    #[serde(default)]
    rest_url: Option<String>,
    #[serde(default)]
    soap_url: Option<String>,
}

#[derive(Deserialize)]
struct EnvironmentsFile {
    #[serde(default, rename = "environment")]
    environments: Vec<EnvironmentEntry>,
}

/// All configured environments, keyed by name.
#[derive(Debug, Default)]
pub struct Environments {
    by_name: BTreeMap<String, Environment>,
}

/// Name of the variable that can carry an environment's client secret,
/// e.g. `prod-eu` → `SFMC_PROD_EU_CLIENT_SECRET`.
pub fn secret_env_var(name: &str) -> String {
    let upper: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("SFMC_{upper}_CLIENT_SECRET")
}

impl Environments {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read environments file {}", path.display()))?;
        Self::from_toml_str(&contents, |var| std::env::var(var).ok())
            .with_context(|| format!("Invalid environments file {}", path.display()))
    }

    /// Parse the TOML body. `lookup` resolves secrets missing from the file.
    pub fn from_toml_str(
        contents: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        let file: EnvironmentsFile = toml::from_str(contents)?;
        let mut by_name = BTreeMap::new();

        for entry in file.environments {
            if entry.name.trim().is_empty() {
                anyhow::bail!("Environment with empty name");
            }
            let var = secret_env_var(&entry.name);
            let client_secret = match entry.client_secret.or_else(|| lookup(&var)) {
                Some(secret) => secret,
                None => anyhow::bail!(
                    "Environment '{}' has no client_secret and {} is not set",
                    entry.name,
                    var
                ),
            };
            let env = Environment {
                name: entry.name.clone(),
                subdomain: entry.subdomain,
                client_id: entry.client_id,
                client_secret,
                account_id: entry.account_id,
                catalog_url: entry.catalog_url,
                auth_url: entry.auth_url,
                rest_url: entry.rest_url,
                soap_url: entry.soap_url,
            };
            if by_name.insert(entry.name.clone(), env).is_some() {
                anyhow::bail!("Environment '{}' is defined more than once", entry.name);
            }
        }

        Ok(Self { by_name })
    }

    pub fn get(&self, name: &str) -> anyhow::Result<&Environment> {
        self.by_name.get(name).ok_or_else(|| {
            let available: Vec<&String> = self.by_name.keys().collect();
            anyhow::anyhow!(
                "Environment '{}' not found. Available environments: {:?}",
                name,
                available
            )
        })
    }

    /// Resolve an (origin, target) pair for a transfer.
    pub fn pair(&self, origin: &str, target: &str) -> anyhow::Result<(&Environment, &Environment)> {
        if origin == target {
            anyhow::bail!("Origin and target must be different environments (got '{origin}' twice)");
        }
        Ok((self.get(origin)?, self.get(target)?))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Environment> {
        self.by_name.values()
    }
}

/// Runtime settings shared by every command.
#[derive(Debug)]
pub struct Config {
    pub environments_path: PathBuf,
    pub db_path: PathBuf,
    pub workers: usize,
    pub retry: RetryConfig,
    pub log_level: LogLevel,
    pub no_progress_bar: bool,
}

pub(crate) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

impl Config {
    pub fn from_cli(cli: &crate::cli::Cli) -> anyhow::Result<Self> {
        let workers = match cli.workers {
            Some(0) => anyhow::bail!("--workers must be at least 1"),
            Some(n) => n,
            None => crate::pipeline::pool::default_workers(),
        };

        Ok(Self {
            environments_path: expand_tilde(&cli.config),
            db_path: expand_tilde(&cli.db),
            workers,
            retry: RetryConfig {
                max_retries: cli.max_retries,
                base_delay: Duration::from_secs(cli.retry_delay),
                max_delay: Duration::from_secs(60),
            },
            log_level: cli.log_level,
            no_progress_bar: cli.no_progress_bar,
        })
    }
}
