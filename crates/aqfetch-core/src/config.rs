//! Run configuration. Process environment is read once, at the edge, into a
//! [`Config`]; everything below takes the struct.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use aqfetch_bucket::S3Config;
use chrono_tz::Tz;
use serde::Deserialize;
use thiserror::Error;

use crate::fetch::FileDescriptor;
use crate::generic::ClientKeys;
use crate::measurand::ParameterLookup;

pub const DEFAULT_MAX_CONCURRENCY: usize = 10;
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: String, reason: String },

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Toml {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("no source named '{0}' is configured")]
    UnknownSource(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Target bucket. Only optional for dry runs.
    pub bucket: Option<String>,
    /// Key prefix separating deployments that share a bucket.
    pub stack: String,
    pub region: String,
    pub bucket_endpoint: Option<String>,
    pub force_path_style: bool,
    pub dry_run: bool,
    pub sources_path: PathBuf,
    pub max_concurrency: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let dry_run = match get("AQFETCH_DRYRUN") {
            Some(value) => parse_bool("AQFETCH_DRYRUN", &value)?,
            None => false,
        };

        let bucket = get("AQFETCH_BUCKET");
        if bucket.is_none() && !dry_run {
            return Err(ConfigError::Missing("AQFETCH_BUCKET"));
        }

        let max_concurrency = match get("AQFETCH_MAX_CONCURRENCY") {
            Some(value) => value
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| ConfigError::Invalid {
                    name: "AQFETCH_MAX_CONCURRENCY".to_string(),
                    reason: format!("'{value}' is not a positive integer"),
                })?,
            None => DEFAULT_MAX_CONCURRENCY,
        };

        let force_path_style = match get("AQFETCH_FORCE_PATH_STYLE") {
            Some(value) => parse_bool("AQFETCH_FORCE_PATH_STYLE", &value)?,
            None => false,
        };

        Ok(Self {
            bucket,
            stack: get("AQFETCH_STACK").unwrap_or_else(|| "local".to_string()),
            region: get("AQFETCH_REGION").unwrap_or_else(|| "us-east-1".to_string()),
            bucket_endpoint: get("AQFETCH_BUCKET_ENDPOINT"),
            force_path_style,
            dry_run,
            sources_path: get("AQFETCH_SOURCES")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("sources.toml")),
            max_concurrency,
        })
    }

    pub fn s3_config(&self) -> Option<S3Config> {
        let bucket = self.bucket.clone()?;
        Some(S3Config {
            bucket,
            region: self.region.clone(),
            endpoint: self.bucket_endpoint.clone(),
            access_key_id: None,
            secret_access_key: None,
            force_path_style: self.force_path_style,
        })
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::Invalid {
            name: name.to_string(),
            reason: format!("'{other}' is not a boolean"),
        }),
    }
}

/// Where a generic source's files live.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceFiles {
    #[serde(default)]
    pub locations: Option<FileDescriptor>,
    #[serde(default)]
    pub sensors: Option<FileDescriptor>,
    #[serde(default)]
    pub measurements: Vec<FileDescriptor>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    /// Key into the processor registry.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub timezone: Option<String>,
    /// Logical secret name used to authenticate URL fetches.
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub keys: ClientKeys,
    #[serde(default)]
    pub parameters: ParameterLookup,
    #[serde(default)]
    pub files: SourceFiles,
}

fn default_provider() -> String {
    "generic".to_string()
}

fn default_timeout_seconds() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

impl SourceConfig {
    pub fn timezone(&self) -> Result<Option<Tz>, ConfigError> {
        self.timezone
            .as_deref()
            .map(|name| {
                name.parse::<Tz>().map_err(|err| ConfigError::Invalid {
                    name: format!("source '{}' timezone", self.name),
                    reason: err.to_string(),
                })
            })
            .transpose()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Sources {
    #[serde(default, rename = "source")]
    pub sources: Vec<SourceConfig>,
}

impl Sources {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&contents, &path.display().to_string())
    }

    pub fn parse(contents: &str, origin: &str) -> Result<Self, ConfigError> {
        let sources: Sources = toml::from_str(contents).map_err(|source| ConfigError::Toml {
            path: origin.to_string(),
            source,
        })?;
        for source in &sources.sources {
            source.timezone()?;
        }
        Ok(sources)
    }

    pub fn find(&self, name: &str) -> Result<&SourceConfig, ConfigError> {
        self.sources
            .iter()
            .find(|source| source.name == name)
            .ok_or_else(|| ConfigError::UnknownSource(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn bucket_is_required_outside_dry_run() {
        let err = Config::from_lookup(lookup(&[])).expect_err("bucket missing");
        assert!(matches!(err, ConfigError::Missing("AQFETCH_BUCKET")));
        assert_eq!(err.to_string(), "AQFETCH_BUCKET must be set");
    }

    #[test]
    fn dry_run_needs_no_bucket() {
        let config = Config::from_lookup(lookup(&[("AQFETCH_DRYRUN", "true")])).expect("config");
        assert!(config.dry_run);
        assert_eq!(config.bucket, None);
        assert_eq!(config.stack, "local");
        assert_eq!(config.max_concurrency, DEFAULT_MAX_CONCURRENCY);
        assert!(config.s3_config().is_none());
    }

    #[test]
    fn reads_every_setting() {
        let config = Config::from_lookup(lookup(&[
            ("AQFETCH_BUCKET", "aq-bucket"),
            ("AQFETCH_STACK", "prod"),
            ("AQFETCH_REGION", "eu-west-1"),
            ("AQFETCH_BUCKET_ENDPOINT", "http://localhost:9000"),
            ("AQFETCH_FORCE_PATH_STYLE", "1"),
            ("AQFETCH_SOURCES", "/etc/aqfetch/sources.toml"),
            ("AQFETCH_MAX_CONCURRENCY", "4"),
        ]))
        .expect("config");

        assert_eq!(config.stack, "prod");
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.sources_path, PathBuf::from("/etc/aqfetch/sources.toml"));
        let s3 = config.s3_config().expect("s3 config");
        assert_eq!(s3.bucket, "aq-bucket");
        assert_eq!(s3.region, "eu-west-1");
        assert!(s3.force_path_style);
    }

    #[test]
    fn rejects_bad_numbers_and_booleans() {
        let err = Config::from_lookup(lookup(&[
            ("AQFETCH_BUCKET", "b"),
            ("AQFETCH_MAX_CONCURRENCY", "0"),
        ]))
        .expect_err("zero concurrency");
        assert!(matches!(err, ConfigError::Invalid { .. }));

        let err = Config::from_lookup(lookup(&[("AQFETCH_DRYRUN", "maybe")])).expect_err("bool");
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn parses_sources_file() {
        let sources = Sources::parse(
            r#"
[[source]]
name = "testing"
timezone = "America/Denver"

[source.keys]
location_key = "site"

[source.parameters]
co = ["co", "ppb"]
ws = { parameter = "wind_speed", unit = "m/s" }

[source.files]
locations = { path = "data/locations.csv" }
measurements = [{ key = "drops/measurements.csv" }, { url = "https://example.org/m.json" }]
"#,
            "inline",
        )
        .expect("sources");

        let source = sources.find("testing").expect("testing source");
        assert_eq!(source.provider, "generic");
        assert_eq!(source.timeout(), Duration::from_secs(DEFAULT_TIMEOUT_SECONDS));
        assert_eq!(source.keys.location_key, "site");
        assert_eq!(source.keys.value_key, "value");
        assert_eq!(source.parameters["co"].unit, "ppb");
        assert_eq!(source.parameters["ws"].parameter, "wind_speed");
        assert_eq!(source.timezone().unwrap(), Some(chrono_tz::America::Denver));
        assert!(source.files.locations.is_some());
        assert_eq!(source.files.measurements.len(), 2);
        assert!(matches!(sources.find("other"), Err(ConfigError::UnknownSource(_))));
    }

    #[test]
    fn example_sources_file_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../sources.example.toml");
        let sources = Sources::load(&path).expect("example sources");

        let names: Vec<&str> = sources.sources.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["testing", "partner-feed"]);

        let partner = sources.find("partner-feed").unwrap();
        assert_eq!(partner.secret.as_deref(), Some("partner-feed"));
        assert_eq!(partner.timeout(), Duration::from_secs(15));
        assert_eq!(partner.keys.location_key, "station_id");
        assert_eq!(partner.timezone().unwrap(), None);
    }

    #[test]
    fn unknown_timezone_fails_at_load() {
        let err = Sources::parse(
            "[[source]]\nname = \"x\"\ntimezone = \"Mars/Olympus_Mons\"\n",
            "inline",
        )
        .expect_err("bad tz");
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }
}
