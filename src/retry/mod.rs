//! Retry policy for backend requests
//!
//! This module decides whether a failed fetch is worth another attempt and
//! how long to wait before making it:
//! - HTTP outcome classification (success / retryable / permanent)
//! - Capped exponential backoff
//! - Request-level retryable status codes used by the API client

mod backoff;
mod classify;

pub use backoff::{backoff_delay, BASE_BACKOFF};
pub use classify::{classify, is_permanent, is_success_status, Classification};

/// HTTP status codes the API client retries at the request level
///
/// This is narrower than [`classify`]: the API client only retries codes that
/// are known to be transient, and surfaces everything else immediately.
pub const REQUEST_RETRYABLE_STATUS: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Returns true if the API client should retry a request that got this status
pub fn is_request_retryable(status: u16) -> bool {
    REQUEST_RETRYABLE_STATUS.contains(&status)
}
