//! Writes normalized stations and measures to the bucket as gzip objects.

use std::io::{Read, Write};
use std::sync::Arc;

use aqfetch_bucket::{BucketError, BucketStore, PutOptions};
use bytes::Bytes;
use chrono::Utc;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::MeasureError;
use crate::generic::IngestDocument;
use crate::measures::Measures;
use crate::station::SensorNode;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Bucket(#[from] BucketError),

    #[error("failed to serialize {what}: {source}")]
    Json {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Measures(#[from] MeasureError),

    #[error("gzip failure: {0}")]
    Compression(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutOutcome {
    Written { key: String },
    /// Stored object already matches.
    Unchanged { key: String },
    /// Dry run: logged, not written.
    Logged { key: String },
    /// Nothing to write.
    Skipped,
}

impl PutOutcome {
    pub fn key(&self) -> Option<&str> {
        match self {
            PutOutcome::Written { key }
            | PutOutcome::Unchanged { key }
            | PutOutcome::Logged { key } => Some(key),
            PutOutcome::Skipped => None,
        }
    }
}

#[derive(Clone)]
pub struct Storage {
    bucket: Arc<dyn BucketStore>,
    prefix: String,
    dry_run: bool,
}

impl Storage {
    pub fn new(bucket: Arc<dyn BucketStore>, prefix: impl Into<String>) -> Self {
        Self {
            bucket,
            prefix: prefix.into().trim_matches('/').to_string(),
            dry_run: false,
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    fn object_key(&self, rest: String) -> String {
        if self.prefix.is_empty() {
            rest
        } else {
            format!("{}/{rest}", self.prefix)
        }
    }

    pub fn station_key(&self, provider: &str, sensor_node_id: &str) -> String {
        self.object_key(format!("stations/{provider}/{sensor_node_id}.json.gz"))
    }

    pub fn measures_key(&self, provider: &str, key: &str) -> String {
        self.object_key(format!("measures/{provider}/{key}.csv.gz"))
    }

    pub fn ingest_key(&self, provider: &str, key: &str) -> String {
        self.object_key(format!("ingest/{provider}/{key}.json.gz"))
    }

    /// Writes the node unless the stored copy is already identical.
    pub async fn put_station(
        &self,
        provider: &str,
        node: &SensorNode,
    ) -> Result<PutOutcome, StorageError> {
        let key = self.station_key(provider, &node.sensor_node_id);
        let current = node.json();

        if let Some(stored) = self.stored_json(&key).await? {
            if stored == current {
                debug!(key = %key, "station unchanged");
                return Ok(PutOutcome::Unchanged { key });
            }
        }

        let body = serde_json::to_vec(&current).map_err(|source| StorageError::Json {
            what: format!("station {}", node.sensor_node_id),
            source,
        })?;
        self.put_gzip(key, &body, "application/json").await
    }

    /// Uploads the batch as gzip CSV. `key` defaults to
    /// `<unix-seconds>-<random>`. An empty batch is skipped with a warning.
    pub async fn put_measures(
        &self,
        provider: &str,
        measures: &Measures,
        key: Option<&str>,
    ) -> Result<PutOutcome, StorageError> {
        if measures.is_empty() {
            warn!(provider, "no measures found, skipping upload");
            return Ok(PutOutcome::Skipped);
        }

        let name = match key {
            Some(key) => key.to_string(),
            None => format!("{}-{}", Utc::now().timestamp(), Uuid::new_v4().simple()),
        };
        let key = self.measures_key(provider, &name);
        let csv = measures.to_csv()?;
        info!(provider, key = %key, measures = measures.len(), "uploading measures");
        self.put_gzip(key, csv.as_bytes(), "text/csv").await
    }

    /// Stores a generic client document. `key` defaults to the content hash,
    /// so re-running an unchanged batch rewrites the same object.
    pub async fn put_ingest_document(
        &self,
        provider: &str,
        document: &IngestDocument<'_>,
        key: Option<&str>,
    ) -> Result<PutOutcome, StorageError> {
        let body = serde_json::to_vec(document).map_err(|source| StorageError::Json {
            what: format!("{provider} ingest document"),
            source,
        })?;
        let name = match key {
            Some(key) => key.to_string(),
            None => blake3::hash(&body).to_hex().as_str()[..16].to_string(),
        };
        let key = self.ingest_key(provider, &name);
        self.put_gzip(key, &body, "application/json").await
    }

    async fn stored_json(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let bytes = match self.bucket.get_object(key).await {
            Ok(bytes) => bytes,
            Err(BucketError::NotFound(_)) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let raw = gunzip(&bytes)?;
        match serde_json::from_slice(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                warn!(key, error = %err, "stored object is not valid JSON, overwriting");
                Ok(None)
            }
        }
    }

    async fn put_gzip(
        &self,
        key: String,
        body: &[u8],
        content_type: &str,
    ) -> Result<PutOutcome, StorageError> {
        if self.dry_run {
            info!(key = %key, bytes = body.len(), content_type, "dry run, not writing");
            return Ok(PutOutcome::Logged { key });
        }

        let compressed = gzip(body)?;
        self.bucket
            .put_object(&key, Bytes::from(compressed), PutOptions::gzip(content_type))
            .await?;
        debug!(key = %key, "object written");
        Ok(PutOutcome::Written { key })
    }
}

pub fn gzip(body: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(body)?;
    encoder.finish()
}

pub fn gunzip(body: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoded = Vec::new();
    GzDecoder::new(body).read_to_end(&mut decoded)?;
    Ok(decoded)
}
