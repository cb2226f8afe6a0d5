//! Tagged fetch results: terminal success or definitive failure.

use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use std::borrow::Cow;
use std::time::Duration;

/// How much of a failing response body is kept for diagnosis.
pub const BODY_SNIPPET_LEN: usize = 300;

/// A successful response: status 200 and the collected body.
#[derive(Debug)]
pub struct ResponseData {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    /// Wall time of the winning attempt, including body collection.
    pub elapsed: Duration,
    /// 1-based index of the attempt that succeeded.
    pub attempt: u32,
}

impl ResponseData {
    /// Body as text, with invalid UTF-8 replaced.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// Why a single attempt failed. A terminal failure carries the last of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Response arrived with a non-200 status.
    Status { code: u16, body_snippet: String },
    /// The attempt hit the request timeout.
    Timeout,
    /// Connection-level failure: DNS, reset, refused, TLS.
    Transport(String),
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::Status { code, body_snippet } => {
                if body_snippet.is_empty() {
                    write!(f, "status {}", code)
                } else {
                    write!(f, "status {}: {}", code, body_snippet)
                }
            }
            FailureReason::Timeout => write!(f, "request timed out"),
            FailureReason::Transport(msg) => write!(f, "transport error: {}", msg),
        }
    }
}

/// Terminal failure after the retry budget is spent.
#[derive(Debug)]
pub struct FetchFailure {
    pub attempts: u32,
    pub last: FailureReason,
}

impl std::fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed after {} attempts, last: {}", self.attempts, self.last)
    }
}

/// The value every fetch returns. Network trouble is data, not an error;
/// only malformed descriptors escape as `Err` at the operation boundary.
#[derive(Debug)]
pub enum Outcome {
    Success(ResponseData),
    Failure(FetchFailure),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn success(self) -> Option<ResponseData> {
        match self {
            Outcome::Success(response) => Some(response),
            Outcome::Failure(_) => None,
        }
    }
}

/// Truncates a response body for log lines and failure reasons.
/// Cuts on a char boundary so multibyte bodies can't panic.
pub(crate) fn snippet(text: &str) -> String {
    text.chars().take(BODY_SNIPPET_LEN).collect()
}
