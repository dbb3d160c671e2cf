//! Process configuration for job processors.
//!
//! [`Settings`] is built once by startup code and handed to the processor,
//! dispatcher and registry. Raw named parameters come from a [`ParamSource`]:
//! a TOML parameter snapshot in production, `<APP>_<name>` environment
//! variables elsewhere. Missing parameters fall back to defaults.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing::level_filters::LevelFilter;

use crate::error::JobsetError;

/// Variable selecting the deployment environment.
pub const ENV_VAR: &str = "JOBSET_ENV";
/// Variable overriding the parameter snapshot location in production.
pub const PARAMS_FILE_VAR: &str = "JOBSET_PARAMS_FILE";
const DEFAULT_PARAMS_FILE: &str = "jobset.toml";

/// Looks up named configuration parameters.
pub trait ParamSource: Send + Sync {
    fn get_param(&self, name: &str) -> Option<String>;
}

/// Reads `<APP>_<name>` from the process environment.
#[derive(Debug, Clone)]
pub struct EnvParams {
    app_name: String,
}

impl EnvParams {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
        }
    }

    pub fn key_for(&self, name: &str) -> String {
        format!("{}_{name}", self.app_name.to_uppercase())
    }
}

impl ParamSource for EnvParams {
    fn get_param(&self, name: &str) -> Option<String> {
        std::env::var(self.key_for(name)).ok().filter(|v| !v.is_empty())
    }
}

/// An in-memory parameter snapshot, e.g. fetched from a remote store by the host
/// or loaded from a TOML file.
#[derive(Debug, Clone, Default)]
pub struct MapParams {
    params: HashMap<String, String>,
}

impl MapParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Parse a flat TOML table. Non-string values are kept in their TOML form.
    pub fn from_toml_str(contents: &str) -> Result<Self, JobsetError> {
        let table: toml::Table = toml::from_str(contents)?;
        let params = table
            .into_iter()
            .map(|(k, v)| {
                let value = match v {
                    toml::Value::String(s) => s,
                    other => other.to_string(),
                };
                (k, value)
            })
            .collect();
        Ok(Self { params })
    }

    /// Load a TOML parameter file; an absent file yields an empty snapshot.
    pub fn load(path: &Path) -> Result<Self, JobsetError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

impl ParamSource for MapParams {
    fn get_param(&self, name: &str) -> Option<String> {
        self.params.get(name).cloned()
    }
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Production,
    Development,
}

impl Environment {
    /// `prod` (the default when unset) is production; anything else is development.
    pub fn from_env() -> Self {
        Self::parse(std::env::var(ENV_VAR).ok().as_deref())
    }

    fn parse(value: Option<&str>) -> Self {
        match value {
            None | Some("prod") => Environment::Production,
            Some(_) => Environment::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

/// Settings shared by every component of one process.
#[derive(Clone)]
pub struct Settings {
    /// Selects the parameter source and the log format.
    pub environment: Environment,
    /// Retries after the first attempt; total attempts are `max_attempts + 1`.
    pub max_attempts: u32,
    /// Exposed for handlers; the retry schedule itself is quadratic.
    pub backoff_factor: f64,
    /// Fallback verbosity when `RUST_LOG` is unset.
    pub log_level: LevelFilter,
    params: Arc<dyn ParamSource>,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("environment", &self.environment)
            .field("max_attempts", &self.max_attempts)
            .field("backoff_factor", &self.backoff_factor)
            .field("log_level", &self.log_level)
            .finish_non_exhaustive()
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_log_level() -> LevelFilter {
    LevelFilter::INFO
}

/// Map a `log_level` parameter onto a tracing level.
///
/// Accepts tracing's names and the conventional aliases `warning`,
/// `critical`, `fatal` and `notset`, case-insensitively.
pub fn parse_log_level(raw: &str) -> Result<LevelFilter, JobsetError> {
    match raw.trim().to_lowercase().as_str() {
        "trace" | "notset" => Ok(LevelFilter::TRACE),
        "debug" => Ok(LevelFilter::DEBUG),
        "info" => Ok(LevelFilter::INFO),
        "warn" | "warning" => Ok(LevelFilter::WARN),
        "error" | "critical" | "fatal" => Ok(LevelFilter::ERROR),
        "off" => Ok(LevelFilter::OFF),
        _ => Err(JobsetError::Config(format!("invalid value for `log_level`: {raw}"))),
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            max_attempts: default_max_attempts(),
            backoff_factor: default_backoff_factor(),
            log_level: default_log_level(),
            params: Arc::new(MapParams::default()),
        }
    }
}

impl Settings {
    /// Resolve settings for `app_name` from the current environment.
    pub fn load(app_name: &str) -> Result<Self, JobsetError> {
        let environment = Environment::from_env();
        let source: Arc<dyn ParamSource> = if environment.is_production() {
            let path = std::env::var(PARAMS_FILE_VAR)
                .unwrap_or_else(|_| DEFAULT_PARAMS_FILE.to_string());
            Arc::new(MapParams::load(Path::new(&path))?)
        } else {
            Arc::new(EnvParams::new(app_name))
        };
        Self::from_source(environment, source)
    }

    pub fn from_source(
        environment: Environment,
        params: Arc<dyn ParamSource>,
    ) -> Result<Self, JobsetError> {
        let max_attempts = parse_param(params.as_ref(), "max_attempts")?
            .unwrap_or_else(default_max_attempts);
        let backoff_factor = parse_param(params.as_ref(), "backoff_factor")?
            .unwrap_or_else(default_backoff_factor);
        let log_level = params
            .get_param("log_level")
            .map(|l| parse_log_level(&l))
            .transpose()?
            .unwrap_or_else(default_log_level);

        Ok(Self {
            environment,
            max_attempts,
            backoff_factor,
            log_level,
            params,
        })
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Raw access to any named parameter.
    pub fn get_param(&self, name: &str) -> Option<String> {
        self.params.get_param(name)
    }
}

fn parse_param<T: std::str::FromStr>(
    source: &dyn ParamSource,
    name: &str,
) -> Result<Option<T>, JobsetError> {
    match source.get_param(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| JobsetError::Config(format!("invalid value for `{name}`: {raw}"))),
    }
}
