//! Error taxonomy shared across the spec builder, diff engine, dispatcher,
//! work-request driver and reconciler. See SPEC_FULL.md §7.

use std::fmt;

/// Retryable (status, code) pairs from the OCI-style LB service, used to
/// classify a `ServiceError` as transient vs terminal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceErrorCode {
    pub status: u16,
    pub code: String,
}

impl fmt::Display for ServiceErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status, self.code)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Programming error. Call sites should `panic!` rather than return
    /// this variant in normal control flow; it exists so guard failures
    /// can be asserted on on in tests via `std::panic::catch_unwind`.
    #[error("invariant violated: {0}")]
    Invariant(&'static str),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("retryable error: {0}")]
    Retryable(String),

    #[error("load balancer {0} is in FAILED state")]
    LbFailed(String),

    #[error("load balancer {0} is being deleted")]
    LbDeleting(String),

    #[error("canceled")]
    Canceled,

    #[error("timed out waiting for {0}")]
    Timeout(String),
}

impl Error {
    pub fn invariant(msg: &'static str) -> Self {
        Error::Invariant(msg)
    }

    /// Classifies a service error `(status, code)` pair per §4.7. Returns
    /// `Error::Retryable` for the known-transient set, `Error::NotFound`
    /// for a bare 404 outside that set, else a generic retryable-false
    /// wrapper left to the caller to re-tag.
    pub fn from_service_error(status: u16, code: &str) -> Error {
        const RETRYABLE: &[(u16, &str)] = &[
            (400, "RelatedResourceNotAuthorizedOrNotFound"),
            (400, "LimitExceeded"),
            (401, "NotAuthenticated"),
            (404, "NotAuthorizedOrNotFound"),
            (409, "IncorrectState"),
            (409, "NotAuthorizedOrResourceAlreadyExists"),
            (429, "TooManyRequests"),
            (500, "InternalServerError"),
        ];
        if RETRYABLE.iter().any(|(s, c)| *s == status && *c == code) {
            return Error::Retryable(format!("{status} {code}"));
        }
        if status == 404 {
            return Error::NotFound(format!("{status} {code}"));
        }
        Error::InvalidInput(format!("{status} {code}"))
    }

    /// Whether the work-queue should requeue (true) or swallow after
    /// logging (false). Mirrors the reconciler's `ignoreNonRetriableError`.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Retryable(_) | Error::RateLimited(_) | Error::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_retryable_pairs() {
        let e = Error::from_service_error(429, "TooManyRequests");
        assert!(e.is_retryable());
        let e = Error::from_service_error(409, "IncorrectState");
        assert!(e.is_retryable());
    }

    #[test]
    fn classifies_unknown_pairs_as_terminal() {
        let e = Error::from_service_error(400, "SomeOtherCode");
        assert!(!e.is_retryable());
    }

    #[test]
    fn bare_404_outside_retryable_set_is_not_found() {
        let e = Error::from_service_error(404, "SomethingElse");
        assert!(matches!(e, Error::NotFound(_)));
        assert!(!e.is_retryable());
    }
}
