use anyhow::{Context, Result, bail};
use clap::Parser;
use log::info;
use std::path::PathBuf;
use std::time::Duration;

use refetch::crawl::{
    BATCH_PAUSE_MAX, BATCH_PAUSE_MIN, CrawlMode, Crawler, DEFAULT_BATCH_CONCURRENCY,
    default_pool_workers,
};
use refetch::http::{
    ClientConfig, FetchClient, Method, Outcome, RequestDescriptor, RetryPolicy, basic_headers,
};
use refetch::sink::JsonLinesSink;

/// refetch - resilient fetching for scraping runs
///
/// Fetch single pages or whole URL lists with linear-backoff retries.
/// Failed URLs never stop a crawl; they are collected into an
/// "<output>_errored.json" file for a later pass.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Fetch a single URL with retries and print the body
    Get(GetArgs),

    /// Fetch every URL in a file and append the pages to a record file
    Crawl(CrawlArgs),
}

/// Knobs shared by both subcommands.
#[derive(clap::Args, Debug)]
struct FetchOpts {
    /// Attempt budget per URL, including the first try
    #[arg(long, default_value_t = 4)]
    attempts: u32,

    /// Backoff base in seconds; the delay before attempt n is n * base
    #[arg(long, default_value_t = 2.0, value_name = "SECONDS", value_parser = parse_seconds)]
    backoff: f64,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 10.0, value_name = "SECONDS", value_parser = parse_seconds)]
    timeout: f64,

    /// Verify TLS certificates (off by default: scraping targets often
    /// serve broken chains)
    #[arg(long)]
    verify_tls: bool,

    /// Proxy URL for all requests (also via REFETCH_PROXY)
    #[arg(long, env = "REFETCH_PROXY", value_name = "URL")]
    proxy: Option<String>,

    /// Default header as "name: value"; repeatable. Replaces the
    /// browser-shaped baseline when given
    #[arg(long = "header", short = 'H', value_name = "NAME: VALUE")]
    headers: Vec<String>,
}

impl FetchOpts {
    fn client(&self) -> Result<FetchClient> {
        let default_headers = if self.headers.is_empty() {
            basic_headers()
        } else {
            parse_headers(&self.headers)?
        };
        FetchClient::new(ClientConfig {
            default_headers,
            proxy: self.proxy.clone(),
            verify_tls: self.verify_tls,
            ..ClientConfig::default()
        })
    }

    fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.attempts, Duration::from_secs_f64(self.backoff))
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout)
    }
}

#[derive(clap::Args, Debug)]
struct GetArgs {
    /// The URL to fetch
    url: String,

    /// HTTP method
    #[arg(long, short = 'X', default_value = "GET")]
    method: String,

    /// Query parameter as "key=value"; repeatable
    #[arg(long, short = 'q', value_name = "KEY=VALUE")]
    query: Vec<String>,

    /// JSON request body
    #[arg(long, value_name = "JSON", conflicts_with = "form")]
    json: Option<String>,

    /// Form field as "key=value"; repeatable
    #[arg(long, value_name = "KEY=VALUE")]
    form: Vec<String>,

    #[command(flatten)]
    fetch: FetchOpts,
}

#[derive(clap::Args, Debug)]
struct CrawlArgs {
    /// File with one URL per line ('#' lines are skipped)
    urls_file: PathBuf,

    /// Concurrency shape
    #[arg(long, value_enum, default_value_t = ModeArg::Pool)]
    mode: ModeArg,

    /// Worker cap for pool mode (default: half the cores, at most 4)
    #[arg(long)]
    workers: Option<usize>,

    /// In-flight fetches per batch in batched mode
    #[arg(long, default_value_t = DEFAULT_BATCH_CONCURRENCY)]
    batch_size: usize,

    /// Output file for fetched pages, one JSON document per line
    #[arg(long, short = 'o', default_value = "records.jsonl")]
    out: PathBuf,

    #[command(flatten)]
    fetch: FetchOpts,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum ModeArg {
    Sequential,
    Pool,
    Batched,
}

impl std::fmt::Display for ModeArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModeArg::Sequential => write!(f, "sequential"),
            ModeArg::Pool => write!(f, "pool"),
            ModeArg::Batched => write!(f, "batched"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Get(args) => run_get(args).await,
        Commands::Crawl(args) => run_crawl(args).await,
    }
}

async fn run_get(args: GetArgs) -> Result<()> {
    let method: Method = args.method.parse()?;
    let mut descriptor =
        RequestDescriptor::new(method, &args.url).timeout(args.fetch.timeout());
    for (key, value) in parse_pairs(&args.query)? {
        descriptor = descriptor.query(key, value);
    }
    if let Some(json) = &args.json {
        let value: serde_json::Value =
            serde_json::from_str(json).context("Invalid JSON body")?;
        descriptor = descriptor.json(value);
    } else if !args.form.is_empty() {
        descriptor = descriptor.form(parse_pairs(&args.form)?);
    }

    let client = args.fetch.client()?;
    match client.fetch(&descriptor, &args.fetch.policy()).await? {
        Outcome::Success(response) => {
            info!(
                "Fetched {} in {:.2}s (attempt {})",
                args.url,
                response.elapsed.as_secs_f64(),
                response.attempt
            );
            print!("{}", response.text());
            Ok(())
        }
        Outcome::Failure(failure) => bail!("{}: {}", args.url, failure),
    }
}

async fn run_crawl(args: CrawlArgs) -> Result<()> {
    let contents = std::fs::read_to_string(&args.urls_file)
        .with_context(|| format!("Failed to read {}", args.urls_file.display()))?;
    let urls: Vec<String> = contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect();
    if urls.is_empty() {
        bail!("No URLs found in {}", args.urls_file.display());
    }

    let mode = match args.mode {
        ModeArg::Sequential => CrawlMode::Sequential,
        ModeArg::Pool => CrawlMode::Pool {
            workers: args.workers.unwrap_or_else(default_pool_workers),
        },
        ModeArg::Batched => CrawlMode::Batched {
            size: args.batch_size,
            pause: (BATCH_PAUSE_MIN, BATCH_PAUSE_MAX),
        },
    };

    let sink = JsonLinesSink::create(&args.out)?;
    let crawler = Crawler::new(args.fetch.client()?, args.fetch.policy(), mode)
        .with_timeout(args.fetch.timeout());
    let report = crawler.run(urls, sink).await?;

    println!(
        "Crawled {} urls: {} succeeded, {} failed",
        report.total(),
        report.succeeded,
        report.failed
    );
    if let Some(path) = report.write_errored(&args.out)? {
        println!("Errored urls saved to {}", path.display());
    }
    Ok(())
}

/// Seconds from the command line. `Duration::from_secs_f64` panics on
/// negative or non-finite input, so those are rejected here.
fn parse_seconds(value: &str) -> Result<f64, String> {
    let seconds: f64 = value
        .parse()
        .map_err(|_| format!("\"{}\" is not a number", value))?;
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(format!("expected a non-negative number of seconds, got \"{}\"", value));
    }
    Ok(seconds)
}

fn parse_pairs(pairs: &[String]) -> Result<Vec<(String, String)>> {
    pairs
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(key, value)| (key.trim().to_string(), value.to_string()))
                .with_context(|| format!("Expected \"key=value\", got \"{}\"", pair))
        })
        .collect()
}

fn parse_headers(headers: &[String]) -> Result<Vec<(String, String)>> {
    headers
        .iter()
        .map(|header| {
            header
                .split_once(':')
                .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
                .with_context(|| format!("Expected \"name: value\", got \"{}\"", header))
        })
        .collect()
}
