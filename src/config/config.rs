use std::time::Duration;

use config::{Config, ConfigError, File};
use serde::Deserialize;
use url::Url;

/// Environment variables that override the `database` section.
///
/// Names follow the warehouse credentials convention used by the deployment
/// (`DB_NAME`, `DB_USER`, ...), so a `.env` file or exported variables work
/// without a config file.
const DATABASE_ENV_OVERRIDES: &[(&str, &str)] = &[
    ("database.name", "DB_NAME"),
    ("database.user", "DB_USER"),
    ("database.password", "DB_PASS"),
    ("database.host", "DB_HOST"),
    ("database.port", "DB_PORT"),
    ("database.environment", "DB_ENV"),
];

/// Warehouse (PostgreSQL) connection configuration.
///
/// Tables live in per-chain schemas named `{environment}_{chain}`, so the
/// environment is part of the connection settings.
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseSettings {
    #[serde(default = "default_scheme")]
    pub scheme: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
    #[serde(default = "default_environment")]
    pub environment: String,
    // Baseline connections
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    // Extra connections allowed under load
    #[serde(default = "default_max_overflow")]
    pub max_overflow: usize,
}

fn default_scheme() -> String {
    "postgresql".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_environment() -> String {
    "prod".to_string()
}

fn default_pool_size() -> usize {
    5
}

fn default_max_overflow() -> usize {
    10
}

impl DatabaseSettings {
    /// Hard ceiling on open connections.
    pub fn max_connections(&self) -> usize {
        self.pool_size + self.max_overflow
    }

    /// `{scheme}://{user}:{password}@{host}:{port}/{dbname}`
    pub fn connection_url(&self) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(&format!("{}://{}:{}", self.scheme, self.host, self.port))?;
        // set_username/set_password only fail for cannot-be-a-base URLs,
        // which a scheme://host:port string never is
        let _ = url.set_username(&self.user);
        let _ = url.set_password(Some(&self.password));
        url.set_path(&self.name);
        Ok(url)
    }

    /// Connection URL with the password masked, safe for logs.
    pub fn redacted_url(&self) -> String {
        match self.connection_url() {
            Ok(mut url) => {
                let _ = url.set_password(Some("***"));
                url.to_string()
            },
            Err(_) => format!("{}://{}@{}:{}/{}", self.scheme, self.user, self.host, self.port, self.name),
        }
    }
}

/// Result cache configuration.
///
/// Entries expire `ttl_secs` after insertion; there is no explicit
/// invalidation.
#[derive(Debug, Deserialize, Clone)]
pub struct CacheSettings {
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_cache_max_capacity")]
    pub max_capacity: u64,
}

fn default_cache_ttl_secs() -> u64 {
    1800 // 30 minutes
}

fn default_cache_max_capacity() -> u64 {
    1_000
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
            max_capacity: default_cache_max_capacity(),
        }
    }
}

/// Query benchmark configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct BenchmarkSettings {
    /// Repetitions per scenario
    #[serde(default = "default_benchmark_runs")]
    pub runs: usize,
}

fn default_benchmark_runs() -> usize {
    3
}

impl Default for BenchmarkSettings {
    fn default() -> Self {
        Self {
            runs: default_benchmark_runs(),
        }
    }
}

/// Root application configuration.
///
/// Loaded from an optional `config.yaml` (or `.toml`/`.json`) in the working
/// directory, with `DB_*` environment variables taking precedence.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub benchmark: BenchmarkSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // A missing .env is fine, variables may come from the real environment
        let _ = dotenvy::dotenv();

        Self::from_sources(File::with_name("config").required(false), |var| {
            std::env::var(var).ok()
        })
    }

    /// Builds settings from a file source plus an environment lookup.
    ///
    /// The lookup is injected so tests do not depend on process state.
    pub fn from_sources<S, F>(file: S, lookup: F) -> Result<Self, ConfigError>
    where
        S: config::Source + Send + Sync + 'static,
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Config::builder().add_source(file);

        for (key, var) in DATABASE_ENV_OVERRIDES {
            builder = builder.set_override_option(*key, lookup(var))?;
        }

        let settings: Settings = builder.build()?.try_deserialize()?;

        Ok(settings)
    }
}
