//! Persistence seam for crawl output.
//!
//! Site-specific schemas live with the callers; this module only defines the
//! generic record shape, the sink trait the crawl aggregator writes through,
//! and a flat-file implementation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Records are flushed to the sink in batches of this size during a crawl.
pub const BATCH_SIZE: usize = 50;

/// One fetched page, ready for persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRecord {
    pub url: String,
    pub status: u16,
    pub body: String,
    /// Capture time, milliseconds since the Unix epoch (UTC).
    pub fetched_at_ms: u64,
}

impl FetchRecord {
    pub fn new(url: impl Into<String>, status: u16, body: String) -> Self {
        let fetched_at_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            url: url.into(),
            status,
            body,
            fetched_at_ms,
        }
    }
}

/// Where crawl records end up. The aggregator owns the sink and is the only
/// writer; implementations don't need interior synchronization.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordSink: Send {
    async fn write_batch(&mut self, records: Vec<FetchRecord>) -> Result<()>;
}

/// Appends records to a file, one JSON document per line.
pub struct JsonLinesSink {
    file: File,
    path: PathBuf,
}

impl JsonLinesSink {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open record file {}", path.display()))?;
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RecordSink for JsonLinesSink {
    async fn write_batch(&mut self, records: Vec<FetchRecord>) -> Result<()> {
        for record in &records {
            let line = serde_json::to_string(record)
                .context("Failed to serialize fetch record")?;
            writeln!(self.file, "{}", line)
                .with_context(|| format!("Failed to write to {}", self.path.display()))?;
        }
        self.file
            .flush()
            .with_context(|| format!("Failed to flush {}", self.path.display()))?;
        debug!(
            "Wrote batch of {} records to {}",
            records.len(),
            self.path.display()
        );
        Ok(())
    }
}

/// Accumulate-and-flush wrapper: hands records to the sink every `capacity`
/// items, plus a final partial batch at the end of the crawl.
pub struct BufferedRecords<S: RecordSink> {
    sink: S,
    buffer: Vec<FetchRecord>,
    capacity: usize,
}

impl<S: RecordSink> BufferedRecords<S> {
    pub fn new(sink: S, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            sink,
            buffer: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub async fn push(&mut self, record: FetchRecord) -> Result<()> {
        self.buffer.push(record);
        if self.buffer.len() >= self.capacity {
            self.flush().await?;
        }
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.buffer);
        self.sink.write_batch(batch).await
    }

    /// Flushes the remainder and returns the sink.
    pub async fn finish(mut self) -> Result<S> {
        self.flush().await?;
        Ok(self.sink)
    }
}
