//! HTTP fetch client with linear-backoff retry and outcome classification.

use anyhow::{Context, Result};
use log::{debug, error, warn};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode, Url};
use std::time::Instant;

use super::outcome::{FailureReason, FetchFailure, Outcome, ResponseData, snippet};
use super::request::{DescriptorError, RequestBody, RequestDescriptor};
use super::retry::RetryPolicy;

/// Transport configuration, resolved once at client construction.
///
/// Default headers are immutable after construction; per-request headers on a
/// descriptor replace them wholesale for that call.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub default_headers: Vec<(String, String)>,
    /// Proxy URL applied to all schemes, e.g. `http://127.0.0.1:8080`.
    pub proxy: Option<String>,
    /// TLS certificate verification. Off by default: scraping targets
    /// routinely serve broken certificate chains. Turn it on for anything
    /// that handles credentials.
    pub verify_tls: bool,
    /// When on, one transport (and its connection pool) is built at
    /// construction and shared by every fetch. When off, each fetch builds
    /// a transient transport scoped to that single call.
    pub connection_reuse: bool,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            default_headers: Vec::new(),
            proxy: None,
            verify_tls: false,
            connection_reuse: true,
            user_agent: concat!(
                "Mozilla/5.0 (Windows NT 6.1; WOW64; rv:40.0) ",
                "Gecko/20100101 Firefox/40.0"
            )
            .to_string(),
        }
    }
}

/// The browser-shaped header baseline the scraper modules send when a site
/// needs nothing special.
pub fn basic_headers() -> Vec<(String, String)> {
    [
        ("accept", "*/*"),
        ("accept-language", "en-GB,en-US;q=0.9,en;q=0.8"),
        ("cache-control", "no-cache"),
        ("pragma", "no-cache"),
        ("sec-fetch-dest", "empty"),
        ("sec-fetch-mode", "cors"),
        ("sec-fetch-site", "same-origin"),
    ]
    .into_iter()
    .map(|(name, value)| (name.to_string(), value.to_string()))
    .collect()
}

/// Fetch client with built-in retry for scraping workloads.
///
/// Every network result comes back as an [`Outcome`]; `Err` is reserved for
/// malformed descriptors and broken configuration.
pub struct FetchClient {
    config: ClientConfig,
    default_headers: HeaderMap,
    transport: Option<Client>,
}

impl FetchClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let default_headers = build_header_map(&config.default_headers)?;
        let transport = if config.connection_reuse {
            Some(build_transport(&config)?)
        } else {
            None
        };
        Ok(Self {
            config,
            default_headers,
            transport,
        })
    }

    /// Performs the request with retries and returns a terminal [`Outcome`].
    ///
    /// Only status 200 counts as success. Every other status and every
    /// transport error is retried identically until the policy's attempt
    /// budget runs out; the failure then carries the last observed reason.
    #[tracing::instrument(skip(self, descriptor, policy), fields(url = %descriptor.url, method = %descriptor.method))]
    pub async fn fetch(
        &self,
        descriptor: &RequestDescriptor,
        policy: &RetryPolicy,
    ) -> Result<Outcome> {
        match &self.transport {
            Some(shared) => self.run_attempts(shared, descriptor, policy).await,
            None => {
                // Transient transport: lives exactly as long as this call,
                // dropped on every exit path.
                let transport = build_transport(&self.config)?;
                self.run_attempts(&transport, descriptor, policy).await
            }
        }
    }

    /// Like [`fetch`](Self::fetch), but through a caller-owned transport.
    /// The transport is only borrowed; it is never rebuilt or torn down here.
    #[tracing::instrument(skip(self, transport, descriptor, policy), fields(url = %descriptor.url))]
    pub async fn fetch_with(
        &self,
        transport: &Client,
        descriptor: &RequestDescriptor,
        policy: &RetryPolicy,
    ) -> Result<Outcome> {
        self.run_attempts(transport, descriptor, policy).await
    }

    async fn run_attempts(
        &self,
        transport: &Client,
        descriptor: &RequestDescriptor,
        policy: &RetryPolicy,
    ) -> Result<Outcome> {
        let url = Url::parse(&descriptor.url).map_err(|e| {
            DescriptorError::InvalidUrl(format!("{}: {}", descriptor.url, e))
        })?;
        let headers = if descriptor.headers.is_empty() {
            self.default_headers.clone()
        } else {
            build_header_map(&descriptor.headers)?
        };

        debug!("Requesting {} ...", descriptor.url);

        let max_attempts = policy.max_attempts.max(1);
        let mut last = FailureReason::Transport("no attempt made".to_string());

        for attempt in 1..=max_attempts {
            let delay = policy.delay_before(attempt);
            if !delay.is_zero() {
                debug!(
                    "Waiting {:.1}s before attempt {}/{}",
                    delay.as_secs_f64(),
                    attempt,
                    max_attempts
                );
                tokio::time::sleep(delay).await;
            }

            let started = Instant::now();
            let request = build_request(transport, &url, headers.clone(), descriptor);

            match request.send().await {
                Ok(response) if response.status() == StatusCode::OK => {
                    let status = response.status();
                    let response_headers = response.headers().clone();
                    match response.bytes().await {
                        Ok(body) => {
                            let elapsed = started.elapsed();
                            debug!(
                                "Attempt {}/{}: status {}, {:.2} MB in {:.2}s",
                                attempt,
                                max_attempts,
                                status.as_u16(),
                                body.len() as f64 / 1024.0 / 1024.0,
                                elapsed.as_secs_f64()
                            );
                            return Ok(Outcome::Success(ResponseData {
                                status,
                                headers: response_headers,
                                body: body.to_vec(),
                                elapsed,
                                attempt,
                            }));
                        }
                        Err(err) => {
                            // Body read failed mid-stream: treat like any
                            // other transport failure and keep retrying.
                            error!(
                                "Attempt {}/{} failed after {:.2}s reading body: {}",
                                attempt,
                                max_attempts,
                                started.elapsed().as_secs_f64(),
                                err
                            );
                            last = classify_transport(&err);
                        }
                    }
                }
                Ok(response) => {
                    let status = response.status();
                    let elapsed = started.elapsed();
                    let body = response.text().await.unwrap_or_default();
                    let body_snippet = snippet(&body);
                    warn!(
                        "Attempt {}/{} failed: status {}, body: {}, {:.2}s",
                        attempt,
                        max_attempts,
                        status.as_u16(),
                        body_snippet,
                        elapsed.as_secs_f64()
                    );
                    last = FailureReason::Status {
                        code: status.as_u16(),
                        body_snippet,
                    };
                }
                Err(err) => {
                    error!(
                        "Attempt {}/{} errored after {:.2}s: {}",
                        attempt,
                        max_attempts,
                        started.elapsed().as_secs_f64(),
                        err
                    );
                    last = classify_transport(&err);
                }
            }
        }

        warn!(
            "All {} attempts failed for {}: {}",
            max_attempts, descriptor.url, last
        );
        Ok(Outcome::Failure(FetchFailure {
            attempts: max_attempts,
            last,
        }))
    }
}

fn classify_transport(err: &reqwest::Error) -> FailureReason {
    if err.is_timeout() {
        FailureReason::Timeout
    } else {
        FailureReason::Transport(err.to_string())
    }
}

fn build_transport(config: &ClientConfig) -> Result<Client> {
    let mut builder = Client::builder()
        .danger_accept_invalid_certs(!config.verify_tls)
        .user_agent(&config.user_agent);
    if let Some(proxy) = &config.proxy {
        builder = builder.proxy(
            reqwest::Proxy::all(proxy)
                .with_context(|| format!("Invalid proxy URL: {}", proxy))?,
        );
    }
    builder.build().context("Failed to build HTTP transport")
}

fn build_header_map(pairs: &[(String, String)]) -> Result<HeaderMap, DescriptorError> {
    let mut map = HeaderMap::with_capacity(pairs.len());
    for (name, value) in pairs {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| DescriptorError::InvalidHeader(name.clone()))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| DescriptorError::InvalidHeader(format!("value for {}", name)))?;
        map.append(name, value);
    }
    Ok(map)
}

fn build_request(
    transport: &Client,
    url: &Url,
    headers: HeaderMap,
    descriptor: &RequestDescriptor,
) -> reqwest::RequestBuilder {
    let mut request = transport
        .request(descriptor.method.as_reqwest(), url.clone())
        .headers(headers)
        .timeout(descriptor.timeout);
    if !descriptor.query.is_empty() {
        request = request.query(&descriptor.query);
    }
    match &descriptor.body {
        Some(RequestBody::Json(value)) => request = request.json(value),
        Some(RequestBody::Form(fields)) => request = request.form(fields),
        None => {}
    }
    request
}
