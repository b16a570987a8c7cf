use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

pub const SECRET_ENV_PREFIX: &str = "AQFETCH_SECRET_";

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secret '{0}' is not configured")]
    NotFound(String),
    #[error("secret '{name}' is malformed: {reason}")]
    Malformed { name: String, reason: String },
}

/// Provider credentials. A bare token is stored under `token`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Credentials(BTreeMap<String, String>);

impl Credentials {
    pub fn from_token(token: impl Into<String>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert("token".to_string(), token.into());
        Self(fields)
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn token(&self) -> Option<&str> {
        self.get("token")
            .or_else(|| self.get("api_key"))
            .or_else(|| self.get("apiKey"))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[async_trait]
pub trait SecretFetcher: Send + Sync {
    async fn fetch_secret(&self, name: &str) -> Result<Credentials, SecretError>;
}

/// Reads `AQFETCH_SECRET_<NAME>`, where `<NAME>` is the logical name
/// uppercased with `-` and `.` turned into `_`.
#[derive(Debug, Clone, Default)]
pub struct EnvSecretFetcher;

impl EnvSecretFetcher {
    pub fn variable_name(name: &str) -> String {
        let suffix: String = name
            .trim()
            .chars()
            .map(|c| match c {
                '-' | '.' | ' ' => '_',
                other => other.to_ascii_uppercase(),
            })
            .collect();
        format!("{SECRET_ENV_PREFIX}{suffix}")
    }
}

#[async_trait]
impl SecretFetcher for EnvSecretFetcher {
    async fn fetch_secret(&self, name: &str) -> Result<Credentials, SecretError> {
        let raw = std::env::var(Self::variable_name(name))
            .map_err(|_| SecretError::NotFound(name.to_string()))?;
        parse_secret(name, &raw)
    }
}

/// Fixed secrets, keyed by logical name.
#[derive(Debug, Clone, Default)]
pub struct StaticSecretFetcher {
    secrets: BTreeMap<String, Credentials>,
}

impl StaticSecretFetcher {
    pub fn with_secret(mut self, name: impl Into<String>, credentials: Credentials) -> Self {
        self.secrets.insert(name.into(), credentials);
        self
    }
}

#[async_trait]
impl SecretFetcher for StaticSecretFetcher {
    async fn fetch_secret(&self, name: &str) -> Result<Credentials, SecretError> {
        self.secrets
            .get(name)
            .cloned()
            .ok_or_else(|| SecretError::NotFound(name.to_string()))
    }
}

/// A JSON object of string (or scalar) fields, or a bare token.
pub fn parse_secret(name: &str, raw: &str) -> Result<Credentials, SecretError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(SecretError::Malformed {
            name: name.to_string(),
            reason: "value is empty".to_string(),
        });
    }

    if !raw.starts_with('{') {
        return Ok(Credentials::from_token(raw));
    }

    let object: BTreeMap<String, Value> =
        serde_json::from_str(raw).map_err(|err| SecretError::Malformed {
            name: name.to_string(),
            reason: err.to_string(),
        })?;

    let fields = object
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::String(s) => Some((key, s)),
            Value::Number(n) => Some((key, n.to_string())),
            Value::Bool(b) => Some((key, b.to_string())),
            _ => None,
        })
        .collect();
    Ok(Credentials(fields))
}
