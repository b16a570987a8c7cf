//! Source processors. Each configured source names a processor in its
//! `provider` field; the registry is filled explicitly at start-up.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use aqfetch_bucket::BucketStore;
use aqfetch_files::Row;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{SourceConfig, DEFAULT_MAX_CONCURRENCY};
use crate::fetch::{fetch_many, DefaultFileFetcher, FileDescriptor, FileFetcher};
use crate::generic::GenericClient;
use crate::http::{HttpClient, ReqwestHttpClient};
use crate::secrets::{EnvSecretFetcher, SecretFetcher};
use crate::storage::Storage;

/// Outcome of one source run. Returned even when some files or rows failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub source_name: String,
    pub locations: usize,
    pub measures: usize,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub skipped_rows: usize,
    pub failed_files: usize,
}

/// Collaborators shared by every processor in a run.
#[derive(Clone)]
pub struct RunContext {
    pub storage: Storage,
    pub bucket: Option<Arc<dyn BucketStore>>,
    pub http: Arc<dyn HttpClient>,
    pub secrets: Arc<dyn SecretFetcher>,
    pub max_concurrency: usize,
    /// Relative `path` descriptors resolve against this directory.
    pub base_dir: Option<PathBuf>,
}

impl RunContext {
    pub fn new(storage: Storage) -> Self {
        Self {
            storage,
            bucket: None,
            http: Arc::new(ReqwestHttpClient::default()),
            secrets: Arc::new(EnvSecretFetcher),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            base_dir: None,
        }
    }

    pub fn with_bucket(mut self, bucket: Arc<dyn BucketStore>) -> Self {
        self.bucket = Some(bucket);
        self
    }

    pub fn with_http(mut self, http: Arc<dyn HttpClient>) -> Self {
        self.http = http;
        self
    }

    pub fn with_secrets(mut self, secrets: Arc<dyn SecretFetcher>) -> Self {
        self.secrets = secrets;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(base_dir.into());
        self
    }
}

#[async_trait]
pub trait Processor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn process(&self, ctx: &RunContext, source: &SourceConfig) -> Result<RunSummary>;
}

#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    processors: BTreeMap<String, Arc<dyn Processor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in processor.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(GenericProcessor));
        registry
    }

    /// Replaces any processor already registered under the same name.
    pub fn register(&mut self, processor: Arc<dyn Processor>) {
        self.processors
            .insert(processor.name().to_string(), processor);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Processor>> {
        self.processors.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.processors.keys().map(String::as_str)
    }

    pub async fn run(&self, ctx: &RunContext, source: &SourceConfig) -> Result<RunSummary> {
        let processor = self.get(&source.provider).ok_or_else(|| {
            anyhow!(
                "source '{}' uses unknown provider '{}'",
                source.name,
                source.provider
            )
        })?;
        info!(source = %source.name, provider = processor.name(), "starting run");
        processor
            .process(ctx, source)
            .await
            .with_context(|| format!("run for source '{}' failed", source.name))
    }
}

/// Ingests locations, sensors and measurement files through [`GenericClient`].
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericProcessor;

impl GenericProcessor {
    pub const NAME: &'static str = "generic";

    async fn fetcher(&self, ctx: &RunContext, source: &SourceConfig) -> Result<DefaultFileFetcher> {
        let mut fetcher = DefaultFileFetcher::new(ctx.http.clone(), source.timeout());
        if let Some(bucket) = &ctx.bucket {
            fetcher = fetcher.with_bucket(bucket.clone());
        }
        if let Some(base_dir) = &ctx.base_dir {
            fetcher = fetcher.with_base_dir(base_dir.clone());
        }
        if let Some(secret) = &source.secret {
            let credentials = ctx
                .secrets
                .fetch_secret(secret)
                .await
                .with_context(|| format!("failed to load secret '{secret}'"))?;
            fetcher = fetcher.with_credentials(credentials);
        }
        Ok(fetcher)
    }
}

#[async_trait]
impl Processor for GenericProcessor {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn process(&self, ctx: &RunContext, source: &SourceConfig) -> Result<RunSummary> {
        let timezone = source.timezone()?;
        let fetcher = self.fetcher(ctx, source).await?;
        let mut failed_files = 0;

        let mut client = GenericClient::new(
            source.name.clone(),
            source.parameters.clone(),
            source.keys.clone(),
        );
        if let Some(tz) = timezone {
            client = client.with_timezone(tz);
        }

        if let Some(rows) =
            fetch_optional(&fetcher, source, "locations", source.files.locations.as_ref()).await
        {
            client.process_locations(&rows);
        } else if source.files.locations.is_some() {
            failed_files += 1;
        }

        if let Some(rows) =
            fetch_optional(&fetcher, source, "sensors", source.files.sensors.as_ref()).await
        {
            client.process_sensors(&rows);
        } else if source.files.sensors.is_some() {
            failed_files += 1;
        }

        let mut measurements = Vec::new();
        for descriptor in &source.files.measurements {
            match fetcher.expand(descriptor) {
                Ok(expanded) => measurements.extend(expanded),
                Err(err) => {
                    failed_files += 1;
                    warn!(
                        source = %source.name,
                        descriptor = %descriptor,
                        error = %err,
                        "skipping measurements file"
                    );
                }
            }
        }

        let results = fetch_many(&fetcher, &measurements, ctx.max_concurrency).await;
        for (descriptor, result) in measurements.iter().zip(results) {
            match result {
                // Files are processed one at a time; each may have its own layout.
                Ok(rows) => client.process_measurements(&rows),
                Err(err) => {
                    failed_files += 1;
                    warn!(
                        source = %source.name,
                        descriptor = %descriptor,
                        error = %err,
                        "skipping measurements file"
                    );
                }
            }
        }

        ctx.storage
            .put_ingest_document(&source.name, &client.data(), None)
            .await
            .context("failed to store ingest document")?;
        ctx.storage
            .put_measures(&source.name, client.measures(), None)
            .await
            .context("failed to store measures")?;

        let measures = client.measures();
        let summary = RunSummary {
            source_name: source.name.clone(),
            locations: client.locations().len(),
            measures: measures.len(),
            from: measures.from(),
            to: measures.to(),
            skipped_rows: client.skipped_rows(),
            failed_files,
        };
        info!(
            source = %summary.source_name,
            locations = summary.locations,
            measures = summary.measures,
            skipped_rows = summary.skipped_rows,
            failed_files = summary.failed_files,
            "run complete"
        );
        Ok(summary)
    }
}

async fn fetch_optional(
    fetcher: &dyn FileFetcher,
    source: &SourceConfig,
    kind: &'static str,
    descriptor: Option<&FileDescriptor>,
) -> Option<Vec<Row>> {
    let descriptor = descriptor?;
    match fetcher.fetch_file(descriptor).await {
        Ok(rows) => Some(rows),
        Err(err) => {
            warn!(
                source = %source.name,
                kind,
                descriptor = %descriptor,
                error = %err,
                "skipping {kind} file"
            );
            None
        }
    }
}
