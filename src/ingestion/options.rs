//! Controller configuration.
//!
//! [`IngestionOptions`] has sensible defaults, can be loaded from TOML, and can be overridden
//! from `CSV_INGEST_*` environment variables:
//!
//! ```toml
//! fetch_timeout_secs = 10
//! user_agent = "my-app/1.0"
//! example_file_name = "example.csv"
//! example_csv = """
//! name,age
//! Alice,30
//! """
//! alert_at_or_above = "critical"
//! ```

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{IngestionError, IngestionResult};

use super::fetch::{DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_USER_AGENT};
use super::observability::{IngestionObserver, IngestionSeverity, TracingObserver};

/// Environment variable overriding [`IngestionOptions::fetch_timeout_secs`].
pub const ENV_FETCH_TIMEOUT_SECS: &str = "CSV_INGEST_FETCH_TIMEOUT_SECS";
/// Environment variable overriding [`IngestionOptions::user_agent`].
pub const ENV_USER_AGENT: &str = "CSV_INGEST_USER_AGENT";
/// Environment variable overriding [`IngestionOptions::example_csv`].
pub const ENV_EXAMPLE_CSV: &str = "CSV_INGEST_EXAMPLE_CSV";

/// Options controlling the ingestion controller.
///
/// Use [`Default`] for common cases.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct IngestionOptions {
    /// Timeout applied to remote fetches.
    pub fetch_timeout_secs: u64,
    /// `User-Agent` header sent with remote fetches.
    pub user_agent: String,
    /// Bundled example text offered as a one-click source.
    pub example_csv: Option<String>,
    /// Display name of the bundled example.
    pub example_file_name: String,
    /// Severity threshold at which `on_alert` is invoked.
    pub alert_at_or_above: IngestionSeverity,
    /// Observer for logging/alerts. Defaults to [`TracingObserver`].
    #[serde(skip, default = "default_observer")]
    pub observer: Option<Arc<dyn IngestionObserver>>,
}

impl fmt::Debug for IngestionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestionOptions")
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("user_agent", &self.user_agent)
            .field("example_csv_len", &self.example_csv.as_ref().map(String::len))
            .field("example_file_name", &self.example_file_name)
            .field("alert_at_or_above", &self.alert_at_or_above)
            .field("observer_set", &self.observer.is_some())
            .finish()
    }
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            example_csv: None,
            example_file_name: "example.csv".to_string(),
            alert_at_or_above: IngestionSeverity::Critical,
            observer: default_observer(),
        }
    }
}

fn default_observer() -> Option<Arc<dyn IngestionObserver>> {
    Some(Arc::new(TracingObserver))
}

impl IngestionOptions {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Parse options from TOML. Missing keys keep their defaults.
    pub fn from_toml_str(s: &str) -> IngestionResult<Self> {
        toml::from_str(s).map_err(|e| IngestionError::Config {
            message: format!("failed to parse TOML config: {e}"),
        })
    }

    /// Read and parse a TOML file. A missing file yields the defaults.
    pub fn from_toml_path(path: impl AsRef<Path>) -> IngestionResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| IngestionError::Config {
            message: format!("failed to read config file '{}': {e}", path.display()),
        })?;
        Self::from_toml_str(&content)
    }

    /// Apply `CSV_INGEST_*` overrides from the process environment.
    pub fn apply_env_overrides(self) -> IngestionResult<Self> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply `CSV_INGEST_*` overrides using `lookup` as the variable source.
    pub fn apply_overrides_from<F>(mut self, lookup: F) -> IngestionResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_FETCH_TIMEOUT_SECS) {
            self.fetch_timeout_secs = raw.trim().parse().map_err(|_| IngestionError::Config {
                message: format!("invalid {ENV_FETCH_TIMEOUT_SECS} value '{raw}'"),
            })?;
        }
        if let Some(agent) = lookup(ENV_USER_AGENT) {
            self.user_agent = agent;
        }
        if let Some(text) = lookup(ENV_EXAMPLE_CSV) {
            self.example_csv = Some(text);
        }
        Ok(self)
    }

    pub fn with_observer(mut self, observer: Arc<dyn IngestionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }
}
