/// Classification of an HTTP outcome for retry purposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    /// 2xx response
    Success,
    /// Transient failure: network error, timeout, rate limit, server error
    Retryable,
    /// Client error that will not change on retry (404, 403, 400, ...)
    Permanent,
}

impl Classification {
    /// Returns true if a retry may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable)
    }
}

/// Classifies an HTTP status code
///
/// | Status | Classification |
/// |--------|----------------|
/// | none (network failure) | Retryable |
/// | 200-299 | Success |
/// | 408, 429 | Retryable |
/// | other 400-499 | Permanent |
/// | 500 and above, anything else | Retryable |
///
/// `Success` only describes the status code. Whether a fetch actually
/// succeeded also depends on it carrying content, see
/// [`FetchOutcome::is_success`](crate::client::FetchOutcome::is_success).
pub fn classify(status: Option<u16>) -> Classification {
    match status {
        None => Classification::Retryable,
        Some(code) if is_success_status(code) => Classification::Success,
        Some(408) | Some(429) => Classification::Retryable,
        Some(400..=499) => Classification::Permanent,
        Some(_) => Classification::Retryable,
    }
}

/// Returns true if the status is a permanent error that should never be retried
pub fn is_permanent(status: Option<u16>) -> bool {
    classify(status) == Classification::Permanent
}

/// Returns true if the status code is in the 2xx range
pub fn is_success_status(code: u16) -> bool {
    (200..300).contains(&code)
}
