//! Turns source file descriptors into parsed rows. Payloads may come from
//! disk, the bucket, a URL, or be written inline in the sources file, and
//! are decoded (gzip first, when present) by `aqfetch-files`.

use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use aqfetch_bucket::{BucketError, BucketStore};
use aqfetch_files::{parse_rows, ParserError, Row};
use async_trait::async_trait;
use flate2::read::GzDecoder;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::http::{HttpClient, HttpError, HttpRequest};
use crate::secrets::Credentials;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid glob pattern '{pattern}': {reason}")]
    Glob { pattern: String, reason: String },

    #[error("no files match '{0}'")]
    NoMatches(String),

    #[error("descriptor '{0}' needs a bucket but none is configured")]
    NoBucket(String),

    #[error(transparent)]
    Bucket(#[from] BucketError),

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("{url} responded with status {status_code}")]
    Status { url: String, status_code: u16 },

    #[error("{origin} is not valid UTF-8 text")]
    Encoding { origin: String },

    #[error("failed to decode {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: ParserError,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum InlineData {
    Rows(Vec<Row>),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FileDescriptor {
    /// Local file, or a glob matching several.
    Path { path: String },
    /// Object key in the configured bucket.
    Key { key: String },
    Url { url: String },
    Inline { data: InlineData },
}

impl fmt::Display for FileDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileDescriptor::Path { path } => write!(f, "path:{path}"),
            FileDescriptor::Key { key } => write!(f, "key:{key}"),
            FileDescriptor::Url { url } => write!(f, "url:{url}"),
            FileDescriptor::Inline { .. } => write!(f, "inline"),
        }
    }
}

#[async_trait]
pub trait FileFetcher: Send + Sync {
    async fn fetch_file(&self, descriptor: &FileDescriptor) -> Result<Vec<Row>, FetchError>;
}

pub struct DefaultFileFetcher {
    bucket: Option<Arc<dyn BucketStore>>,
    http: Arc<dyn HttpClient>,
    credentials: Option<Credentials>,
    timeout: Duration,
    base_dir: Option<PathBuf>,
}

impl DefaultFileFetcher {
    pub fn new(http: Arc<dyn HttpClient>, timeout: Duration) -> Self {
        Self {
            bucket: None,
            http,
            credentials: None,
            timeout,
            base_dir: None,
        }
    }

    pub fn with_bucket(mut self, bucket: Arc<dyn BucketStore>) -> Self {
        self.bucket = Some(bucket);
        self
    }

    /// Sent with URL fetches: as `header` when the secret names one,
    /// otherwise as a bearer token.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Relative paths resolve against this directory.
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(base_dir.into());
        self
    }

    fn resolve_path(&self, path: &str) -> PathBuf {
        let candidate = PathBuf::from(path);
        match &self.base_dir {
            Some(base) if candidate.is_relative() => base.join(candidate),
            _ => candidate,
        }
    }

    /// Splits a glob path into one descriptor per matched file, in sorted
    /// order, so each file is fetched and classified on its own. Anything
    /// else comes back unchanged.
    pub fn expand(&self, descriptor: &FileDescriptor) -> Result<Vec<FileDescriptor>, FetchError> {
        match descriptor {
            FileDescriptor::Path { path } if is_glob(path) => Ok(self
                .glob_matches(path)?
                .into_iter()
                .map(|file| FileDescriptor::Path {
                    path: file.to_string_lossy().into_owned(),
                })
                .collect()),
            other => Ok(vec![other.clone()]),
        }
    }

    fn glob_matches(&self, path: &str) -> Result<Vec<PathBuf>, FetchError> {
        let pattern = self.resolve_path(path).to_string_lossy().into_owned();
        let mut matches: Vec<PathBuf> = glob::glob(&pattern)
            .map_err(|err| FetchError::Glob {
                pattern: pattern.clone(),
                reason: err.to_string(),
            })?
            .filter_map(Result::ok)
            .collect();
        if matches.is_empty() {
            return Err(FetchError::NoMatches(pattern));
        }
        matches.sort();
        debug!(pattern = %pattern, files = matches.len(), "expanded glob");
        Ok(matches)
    }

    async fn fetch_paths(&self, path: &str) -> Result<Vec<Row>, FetchError> {
        if !is_glob(path) {
            return read_path(&self.resolve_path(path)).await;
        }

        let mut rows = Vec::new();
        for file in self.glob_matches(path)? {
            rows.extend(read_path(&file).await?);
        }
        Ok(rows)
    }

    async fn fetch_key(&self, key: &str) -> Result<Vec<Row>, FetchError> {
        let bucket = self
            .bucket
            .as_ref()
            .ok_or_else(|| FetchError::NoBucket(key.to_string()))?;
        let bytes = bucket.get_object(key).await?;
        decode_payload(key, &bytes)
    }

    async fn fetch_url(&self, url: &str) -> Result<Vec<Row>, FetchError> {
        let mut request = HttpRequest::get(url).timeout(self.timeout);
        if let Some(credentials) = &self.credentials {
            if let Some(token) = credentials.token() {
                request = match credentials.get("header") {
                    Some(header) => request.header(header, token),
                    None => request.header("Authorization", format!("Bearer {token}")),
                };
            }
        }

        let response = self.http.request(request).await?;
        if !response.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status_code: response.status_code,
            });
        }
        parse_text(url, &response.body)
    }
}

#[async_trait]
impl FileFetcher for DefaultFileFetcher {
    async fn fetch_file(&self, descriptor: &FileDescriptor) -> Result<Vec<Row>, FetchError> {
        let rows = match descriptor {
            FileDescriptor::Path { path } => self.fetch_paths(path).await?,
            FileDescriptor::Key { key } => self.fetch_key(key).await?,
            FileDescriptor::Url { url } => self.fetch_url(url).await?,
            FileDescriptor::Inline { data } => match data {
                InlineData::Rows(rows) => rows.clone(),
                InlineData::Text(text) => parse_text("inline", text)?,
            },
        };
        info!(descriptor = %descriptor, rows = rows.len(), "fetched file");
        Ok(rows)
    }
}

/// Fetches every descriptor with at most `limit` in flight. Results come
/// back in input order.
pub async fn fetch_many(
    fetcher: &dyn FileFetcher,
    descriptors: &[FileDescriptor],
    limit: usize,
) -> Vec<Result<Vec<Row>, FetchError>> {
    let pending: Vec<_> = descriptors
        .iter()
        .map(|descriptor| fetcher.fetch_file(descriptor))
        .collect();
    stream::iter(pending)
        .buffered(limit.max(1))
        .collect()
        .await
}

fn is_glob(path: &str) -> bool {
    path.contains(['*', '?', '['])
}

async fn read_path(path: &Path) -> Result<Vec<Row>, FetchError> {
    let origin = path.display().to_string();
    let bytes = tokio::fs::read(path).await.map_err(|source| FetchError::Io {
        path: origin.clone(),
        source,
    })?;
    decode_payload(&origin, &bytes)
}

pub fn decode_payload(origin: &str, bytes: &[u8]) -> Result<Vec<Row>, FetchError> {
    let text = if bytes.starts_with(&[0x1f, 0x8b]) {
        let mut text = String::new();
        GzDecoder::new(bytes)
            .read_to_string(&mut text)
            .map_err(|source| FetchError::Io {
                path: origin.to_string(),
                source,
            })?;
        text
    } else {
        String::from_utf8(bytes.to_vec()).map_err(|_| FetchError::Encoding {
            origin: origin.to_string(),
        })?
    };
    parse_text(origin, &text)
}

fn parse_text(origin: &str, text: &str) -> Result<Vec<Row>, FetchError> {
    parse_rows(text).map_err(|source| FetchError::Parse {
        origin: origin.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::write::GzEncoder;
    use flate2::Compression;

    use super::*;

    #[test]
    fn descriptors_deserialize_by_shape() {
        let descriptors: Vec<FileDescriptor> = serde_json::from_str(
            r#"[
                {"path": "data/*.csv"},
                {"key": "drops/a.csv"},
                {"url": "https://example.org/a.json"},
                {"data": "location,lat,lng\nx,1,2\n"},
                {"data": [{"location": "x"}]}
            ]"#,
        )
        .unwrap();

        assert!(matches!(&descriptors[0], FileDescriptor::Path { path } if path == "data/*.csv"));
        assert!(matches!(&descriptors[1], FileDescriptor::Key { .. }));
        assert!(matches!(&descriptors[2], FileDescriptor::Url { .. }));
        assert!(matches!(
            &descriptors[3],
            FileDescriptor::Inline {
                data: InlineData::Text(_)
            }
        ));
        assert!(matches!(
            &descriptors[4],
            FileDescriptor::Inline {
                data: InlineData::Rows(rows)
            } if rows.len() == 1
        ));
        assert_eq!(descriptors[1].to_string(), "key:drops/a.csv");
    }

    #[test]
    fn gzip_payloads_are_inflated() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"location,value\nsite,1.5\n").unwrap();
        let bytes = encoder.finish().unwrap();

        let rows = decode_payload("a.csv.gz", &bytes).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].text("location").as_deref(), Some("site"));
    }

    #[test]
    fn non_utf8_payloads_are_rejected() {
        let err = decode_payload("bad.csv", &[0xff, 0xfe, 0x00]).unwrap_err();
        assert!(matches!(err, FetchError::Encoding { .. }));
    }

    #[test]
    fn glob_detection() {
        assert!(is_glob("data/m-*.csv"));
        assert!(is_glob("data/m-[0-9].csv"));
        assert!(!is_glob("data/measurements.csv"));
    }

    /// Answers after a per-descriptor delay so later descriptors finish
    /// first, and records the peak number of fetches in flight.
    #[derive(Default)]
    struct SlowFetcher {
        in_flight: std::sync::atomic::AtomicUsize,
        peak: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl FileFetcher for SlowFetcher {
        async fn fetch_file(&self, descriptor: &FileDescriptor) -> Result<Vec<Row>, FetchError> {
            use std::sync::atomic::Ordering;

            let FileDescriptor::Key { key } = descriptor else {
                return Err(FetchError::NoBucket(descriptor.to_string()));
            };
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let delay = match key.as_str() {
                "first" => 60,
                "second" => 20,
                _ => 1,
            };
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(vec![[("key", key.as_str())].into_iter().collect()])
        }
    }

    #[tokio::test]
    async fn fetch_many_keeps_input_order_under_a_limit() {
        let fetcher = SlowFetcher::default();
        let descriptors: Vec<FileDescriptor> = ["first", "second", "third"]
            .into_iter()
            .map(|key| FileDescriptor::Key {
                key: key.to_string(),
            })
            .collect();

        let results = fetch_many(&fetcher, &descriptors, 2).await;

        let keys: Vec<String> = results
            .into_iter()
            .map(|rows| rows.unwrap()[0].text("key").unwrap())
            .collect();
        assert_eq!(keys, ["first", "second", "third"]);
        assert!(fetcher.peak.load(std::sync::atomic::Ordering::SeqCst) <= 2);
    }

    #[test]
    fn globs_expand_to_one_sorted_descriptor_per_file() {
        let dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/data");
        let http = Arc::new(crate::http::ReqwestHttpClient::default());
        let fetcher =
            DefaultFileFetcher::new(http, Duration::from_secs(1)).with_base_dir(dir.clone());

        let expanded = fetcher
            .expand(&FileDescriptor::Path {
                path: "mixed/m-*.csv".to_string(),
            })
            .unwrap();
        let paths: Vec<String> = expanded
            .iter()
            .map(|descriptor| match descriptor {
                FileDescriptor::Path { path } => path.clone(),
                other => panic!("unexpected descriptor {other}"),
            })
            .collect();
        assert_eq!(
            paths,
            [
                dir.join("mixed/m-1-long.csv").to_string_lossy().into_owned(),
                dir.join("mixed/m-2-wide.csv").to_string_lossy().into_owned(),
            ]
        );

        let plain = FileDescriptor::Path {
            path: "locations.csv".to_string(),
        };
        assert_eq!(fetcher.expand(&plain).unwrap(), vec![plain.clone()]);

        let err = fetcher
            .expand(&FileDescriptor::Path {
                path: "mixed/none-*.csv".to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, FetchError::NoMatches(_)));
    }
}
