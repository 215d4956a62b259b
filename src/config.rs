use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Deserializer};
use thiserror::Error as ThisError;
use tokio::time::Duration;

use crate::cache::{LookupCache, TtlCache};
use crate::codec::MAX_REQUEST_SIZE;
use crate::composite::{ExpandedMap, DEFAULT_CACHE_TTL, DEFAULT_TTL};
use crate::store::{Settings, DEFAULT_MAX_RETRIES};

pub const DEFAULT_LISTEN: &str = "127.0.0.1:6379";
pub const DEFAULT_SET: &str = "redis";
pub const DEFAULT_STATSD_PREFIX: &str = "redigate";

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("unable to read configuration file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Proto {
    #[default]
    Tcp,
    Unix,
}

/// Gateway configuration, read from a JSON file.
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default = "default_sets")]
    pub sets: Vec<SetConfig>,
    /// `host:port` of a statsd daemon.
    #[serde(default)]
    pub statsd: Option<String>,
    #[serde(default = "default_statsd_prefix")]
    pub statsd_prefix: String,
}

/// One listener and the set it serves.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct SetConfig {
    #[serde(default)]
    pub proto: Proto,
    pub listen: String,
    pub set: String,
    #[serde(default, deserialize_with = "flag")]
    pub expanded_map: bool,
    #[serde(default, deserialize_with = "integer")]
    pub default_ttl: Option<u32>,
    /// Capacity of the composite-key lookup cache, in entries. No cache when unset.
    #[serde(default, deserialize_with = "integer")]
    pub cache_size: Option<usize>,
    /// Seconds a cached lookup stays valid.
    #[serde(default, deserialize_with = "integer")]
    pub cache_ttl: Option<u64>,
    #[serde(default, deserialize_with = "flag")]
    pub log_commands: bool,
    #[serde(default, deserialize_with = "flag")]
    pub legacy_encoding: bool,
    #[serde(default, deserialize_with = "integer")]
    pub max_retries: Option<usize>,
    #[serde(default, deserialize_with = "integer")]
    pub max_request_size: Option<usize>,
    #[serde(default)]
    pub write_back_target: Option<String>,
    #[serde(default, rename = "write_back_setTimeout", deserialize_with = "flag")]
    pub write_back_set_timeout: bool,
    #[serde(default, rename = "write_back_hIncrBy", deserialize_with = "flag")]
    pub write_back_hincrby: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            sets: default_sets(),
            statsd: None,
            statsd_prefix: default_statsd_prefix(),
        }
    }
}

impl Config {
    /// Reads the configuration file at `path`, or returns the default configuration: a single
    /// TCP listener on `127.0.0.1:6379` serving the `redis` set.
    pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        let Some(path) = path else {
            return Ok(Config::default());
        };

        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Config::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Config, ConfigError> {
        let config: Config = serde_json::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.sets.is_empty() {
            return Err(ConfigError::Invalid("no set to serve".to_string()));
        }

        for set in &self.sets {
            if set.set.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "listener {} has an empty set name",
                    set.listen
                )));
            }
            if set.cache_size == Some(0) {
                return Err(ConfigError::Invalid(format!(
                    "{}: cache_size must be positive",
                    set.set
                )));
            }
        }

        Ok(())
    }
}

impl SetConfig {
    pub fn new(listen: impl Into<String>, set: impl Into<String>) -> SetConfig {
        SetConfig {
            listen: listen.into(),
            set: set.into(),
            ..Default::default()
        }
    }

    pub fn max_request_size(&self) -> usize {
        self.max_request_size.unwrap_or(MAX_REQUEST_SIZE)
    }

    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_CACHE_TTL)
    }

    /// Store settings of this listener. Builds the lookup cache when one is configured.
    pub fn settings(&self, namespace: &str) -> Settings {
        let mut settings = Settings::new(namespace, &*self.set);
        settings.legacy_encoding = self.legacy_encoding;
        settings.max_retries = self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES);

        if self.expanded_map {
            settings.expanded = Some(ExpandedMap {
                default_ttl: self.default_ttl.unwrap_or(DEFAULT_TTL),
                cache: self
                    .cache_size
                    .map(|capacity| Arc::new(TtlCache::new(capacity)) as Arc<dyn LookupCache>),
                cache_ttl: self.cache_ttl(),
            });
        }

        settings
    }
}

fn default_sets() -> Vec<SetConfig> {
    vec![SetConfig::new(DEFAULT_LISTEN, DEFAULT_SET)]
}

fn default_statsd_prefix() -> String {
    DEFAULT_STATSD_PREFIX.to_string()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(u64),
    String(String),
}

/// Integer settings are accepted both as JSON numbers and as numeric strings.
fn integer<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<u64>,
{
    use serde::de::Error;

    let number = match Option::<NumberOrString>::deserialize(deserializer)? {
        None => return Ok(None),
        Some(NumberOrString::Number(number)) => number,
        Some(NumberOrString::String(s)) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| D::Error::custom(format!("'{s}' is not a valid integer")))?,
    };

    T::try_from(number)
        .map(Some)
        .map_err(|_| D::Error::custom(format!("{number} is out of range")))
}

/// Switches are enabled by their presence; only `false` and `null` turn them off.
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;

    Ok(!matches!(
        value,
        serde_json::Value::Null | serde_json::Value::Bool(false)
    ))
}
