//! Retry and backoff policy for connection establishment.
//!
//! Only request-establishment failures are retried. Once bytes are flowing,
//! a failure is terminal for the current cycle; the partial file on disk is
//! the resume point for the next delivered command.

use std::time::Duration;

/// High-level classification of a transfer failure for retry purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Connection establishment failed (DNS, TCP connect, TLS handshake,
    /// or a dial timeout before any data arrived).
    Connect,
    /// Remote answered with an unexpected HTTP status.
    Protocol,
    /// Failure after the response body started flowing.
    Stream,
    /// Local write or any other terminal error.
    Other,
}

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    NoRetry,
    RetryAfter(Duration),
}

/// Exponential backoff over a bounded number of connection attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubles per attempt.
    pub base_delay: Duration,
    /// Upper bound on the backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Compute the backoff for a failed attempt. `attempt` is 1-based.
    ///
    /// Only `Connect` failures are retryable; the delay is
    /// `base * 2^(attempt-1)`, capped at `max_delay`.
    pub fn decide(&self, attempt: u32, kind: ErrorKind) -> RetryDecision {
        if kind != ErrorKind::Connect || attempt >= self.max_attempts {
            return RetryDecision::NoRetry;
        }
        let exp = 1u32 << attempt.saturating_sub(1).min(8);
        let delay = self.base_delay.saturating_mul(exp).min(self.max_delay);
        RetryDecision::RetryAfter(delay)
    }
}

/// Classify a curl error into a retry kind.
///
/// `bytes_received` is the body byte count of the failed attempt: a timeout
/// with nothing received is treated as a dial/handshake timeout, while any
/// failure after data arrived is a mid-stream error.
pub fn classify_curl_error(e: &curl::Error, bytes_received: u64) -> ErrorKind {
    if e.is_couldnt_resolve_host()
        || e.is_couldnt_resolve_proxy()
        || e.is_couldnt_connect()
        || e.is_ssl_connect_error()
        || (e.is_operation_timedout() && bytes_received == 0)
    {
        return ErrorKind::Connect;
    }
    if bytes_received > 0 {
        ErrorKind::Stream
    } else {
        ErrorKind::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_connect_failures_are_retried() {
        let p = RetryPolicy::default();
        assert!(matches!(
            p.decide(1, ErrorKind::Connect),
            RetryDecision::RetryAfter(_)
        ));
        assert_eq!(p.decide(1, ErrorKind::Protocol), RetryDecision::NoRetry);
        assert_eq!(p.decide(1, ErrorKind::Stream), RetryDecision::NoRetry);
        assert_eq!(p.decide(1, ErrorKind::Other), RetryDecision::NoRetry);
    }

    #[test]
    fn backoff_doubles_and_is_capped() {
        let mut p = RetryPolicy::default();
        p.max_attempts = 20;
        let delay = |attempt| match p.decide(attempt, ErrorKind::Connect) {
            RetryDecision::RetryAfter(d) => d,
            RetryDecision::NoRetry => panic!("expected retry"),
        };
        assert_eq!(delay(1), Duration::from_secs(1));
        assert_eq!(delay(2), Duration::from_secs(2));
        assert_eq!(delay(3), Duration::from_secs(4));
        assert_eq!(delay(10), p.max_delay);
    }

    #[test]
    fn respects_max_attempts() {
        let p = RetryPolicy::default();
        assert!(matches!(
            p.decide(4, ErrorKind::Connect),
            RetryDecision::RetryAfter(_)
        ));
        assert_eq!(p.decide(5, ErrorKind::Connect), RetryDecision::NoRetry);
    }

    #[test]
    fn classify_connect_errors() {
        // CURLE_COULDNT_RESOLVE_HOST and CURLE_COULDNT_CONNECT.
        assert_eq!(classify_curl_error(&curl::Error::new(6), 0), ErrorKind::Connect);
        assert_eq!(classify_curl_error(&curl::Error::new(7), 0), ErrorKind::Connect);
    }

    #[test]
    fn classify_timeout_depends_on_progress() {
        // CURLE_OPERATION_TIMEDOUT: a dial timeout before any data is
        // retryable, a stall after data arrived is not.
        assert_eq!(classify_curl_error(&curl::Error::new(28), 0), ErrorKind::Connect);
        assert_eq!(classify_curl_error(&curl::Error::new(28), 4096), ErrorKind::Stream);
    }

    #[test]
    fn classify_recv_error_mid_stream() {
        // CURLE_RECV_ERROR after bytes flowed is a mid-stream failure.
        assert_eq!(classify_curl_error(&curl::Error::new(56), 1), ErrorKind::Stream);
        assert_eq!(classify_curl_error(&curl::Error::new(56), 0), ErrorKind::Other);
    }
}
