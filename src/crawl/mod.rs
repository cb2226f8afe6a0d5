//! Crawl runners: the caller-side concurrency shapes layered over the
//! fetch core.
//!
//! All three modes share the same retry logic; they differ only in how many
//! fetches are in flight at once. Workers hand successful pages to a single
//! aggregating task over a channel, which batches them into the record sink.

mod report;

pub use report::CrawlReport;

use anyhow::{Context, Result};
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use rand::RngExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::http::{DEFAULT_TIMEOUT, FetchClient, Outcome, RequestDescriptor, RetryPolicy};
use crate::sink::{BATCH_SIZE, BufferedRecords, FetchRecord, RecordSink};

/// In-flight fetches per batch in batched mode.
pub const DEFAULT_BATCH_CONCURRENCY: usize = 5;

/// Pause bounds between batches. Randomized so repeated crawls don't hit the
/// target on a fixed cadence.
pub const BATCH_PAUSE_MIN: Duration = Duration::from_secs(3);
pub const BATCH_PAUSE_MAX: Duration = Duration::from_secs(6);

/// Worker cap for pool mode: half the cores, at most 4, at least 1.
pub fn default_pool_workers() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2);
    (cpus / 2).clamp(1, 4)
}

/// How a crawl walks its URL list.
#[derive(Debug, Clone)]
pub enum CrawlMode {
    /// One URL after another on the current task.
    Sequential,
    /// Up to `workers` fetches in flight, completing in arbitrary order.
    /// One URL's retry exhaustion neither aborts nor delays its siblings.
    Pool { workers: usize },
    /// Fixed-size concurrent batches with a randomized pause in between,
    /// to stay under rate limiting and cookie-based blocking.
    Batched {
        size: usize,
        pause: (Duration, Duration),
    },
}

impl CrawlMode {
    pub fn pool() -> Self {
        CrawlMode::Pool {
            workers: default_pool_workers(),
        }
    }

    pub fn batched() -> Self {
        CrawlMode::Batched {
            size: DEFAULT_BATCH_CONCURRENCY,
            pause: (BATCH_PAUSE_MIN, BATCH_PAUSE_MAX),
        }
    }
}

/// Drives one crawl: fetches every URL under the configured mode and streams
/// successful pages into a [`RecordSink`].
pub struct Crawler {
    client: Arc<FetchClient>,
    policy: RetryPolicy,
    mode: CrawlMode,
    record_batch: usize,
    timeout: Duration,
}

impl Crawler {
    pub fn new(client: FetchClient, policy: RetryPolicy, mode: CrawlMode) -> Self {
        Self {
            client: Arc::new(client),
            policy,
            mode,
            record_batch: BATCH_SIZE,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Overrides how many records accumulate before a sink write.
    pub fn with_record_batch(mut self, record_batch: usize) -> Self {
        self.record_batch = record_batch.max(1);
        self
    }

    /// Overrides the per-request timeout applied to every fetched URL.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Runs the crawl to completion. A failed URL is tallied and the crawl
    /// moves on; only sink/aggregator breakage aborts the run.
    #[tracing::instrument(skip(self, urls, sink), fields(urls = urls.len()))]
    pub async fn run<S>(&self, urls: Vec<String>, sink: S) -> Result<CrawlReport>
    where
        S: RecordSink + 'static,
    {
        info!("Crawling {} urls ({:?})", urls.len(), self.mode);

        let (tx, rx) = mpsc::channel::<FetchRecord>(self.record_batch.max(BATCH_SIZE));
        let aggregator = tokio::spawn(aggregate(rx, sink, self.record_batch));

        let mut report = CrawlReport::default();
        match self.mode.clone() {
            CrawlMode::Sequential => {
                for url in urls {
                    if fetch_into(&self.client, &self.policy, self.timeout, &url, &tx).await {
                        report.record_success();
                    } else {
                        report.record_failure(url);
                    }
                }
            }
            CrawlMode::Pool { workers } => {
                let results = futures_util::stream::iter(urls.into_iter().map(|url| {
                    let client = Arc::clone(&self.client);
                    let policy = self.policy.clone();
                    let timeout = self.timeout;
                    let tx = tx.clone();
                    async move {
                        let ok = fetch_into(&client, &policy, timeout, &url, &tx).await;
                        (url, ok)
                    }
                }))
                .buffer_unordered(workers.max(1))
                .collect::<Vec<_>>()
                .await;
                for (url, ok) in results {
                    if ok {
                        report.record_success();
                    } else {
                        report.record_failure(url);
                    }
                }
            }
            CrawlMode::Batched { size, pause } => {
                let size = size.max(1);
                let total = urls.len();
                let mut done = 0;
                for chunk in urls.chunks(size) {
                    let futures = chunk.iter().map(|url| {
                        let tx = tx.clone();
                        async move {
                            let ok =
                                fetch_into(&self.client, &self.policy, self.timeout, url, &tx)
                                    .await;
                            (url.clone(), ok)
                        }
                    });
                    for (url, ok) in futures_util::future::join_all(futures).await {
                        if ok {
                            report.record_success();
                        } else {
                            report.record_failure(url);
                        }
                    }
                    done += chunk.len();
                    if done < total {
                        let pause = sample_pause(pause);
                        debug!(
                            "Batch complete ({}/{}), pausing {:.1}s",
                            done,
                            total,
                            pause.as_secs_f64()
                        );
                        tokio::time::sleep(pause).await;
                    }
                }
            }
        }

        // Closing the channel lets the aggregator flush and exit.
        drop(tx);
        aggregator.await.context("Record aggregator panicked")?;

        info!(
            "Crawl complete: {} succeeded, {} failed",
            report.succeeded, report.failed
        );
        Ok(report)
    }
}

/// Fetches one URL and forwards the page to the aggregator. Returns whether
/// the fetch succeeded. Bad URLs in a crawl list are tallied like any other
/// failure rather than aborting the run.
async fn fetch_into(
    client: &FetchClient,
    policy: &RetryPolicy,
    timeout: Duration,
    url: &str,
    tx: &mpsc::Sender<FetchRecord>,
) -> bool {
    debug!("Processing {}", url);
    let descriptor = RequestDescriptor::get(url).timeout(timeout);
    match client.fetch(&descriptor, policy).await {
        Ok(Outcome::Success(response)) => {
            let record =
                FetchRecord::new(url, response.status.as_u16(), response.text().into_owned());
            if tx.send(record).await.is_err() {
                warn!("Record channel closed, dropping result for {}", url);
            }
            true
        }
        Ok(Outcome::Failure(failure)) => {
            error!("Giving up on {}: {}", url, failure);
            false
        }
        Err(err) => {
            error!("Error processing {}: {:#}", url, err);
            false
        }
    }
}

/// Single owner of the sink: receives records from all workers and writes
/// them in batches. Write failures are logged and the crawl keeps going.
async fn aggregate<S: RecordSink>(mut rx: mpsc::Receiver<FetchRecord>, sink: S, batch: usize) {
    let mut buffer = BufferedRecords::new(sink, batch);
    while let Some(record) = rx.recv().await {
        if let Err(err) = buffer.push(record).await {
            error!("Batch write failed: {:#}", err);
        }
    }
    if let Err(err) = buffer.finish().await {
        error!("Final batch write failed: {:#}", err);
    }
}

fn sample_pause(range: (Duration, Duration)) -> Duration {
    let low = range.0.min(range.1).as_millis() as u64;
    let high = range.0.max(range.1).as_millis() as u64;
    if high == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(low..=high))
}
