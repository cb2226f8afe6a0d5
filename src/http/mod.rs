//! Resilient fetch client: request descriptors, retry policy, outcomes.

mod client;
mod outcome;
mod request;
mod retry;

pub use client::{ClientConfig, FetchClient, basic_headers};
pub use outcome::{BODY_SNIPPET_LEN, FailureReason, FetchFailure, Outcome, ResponseData};
pub use request::{DEFAULT_TIMEOUT, DescriptorError, Method, RequestBody, RequestDescriptor};
pub use retry::{BACKOFF_BASE, MAX_ATTEMPTS, RetryPolicy};
