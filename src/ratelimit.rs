//! Reader/writer token-bucket rate limiting. Grounded on
//! `original_source/pkg/oci/client/ratelimter.go` (itself a thin wrapper
//! over `k8s.io/client-go/util/flowcontrol`'s token bucket).

use std::sync::Mutex;
use std::time::Instant;

/// A single token bucket: capacity `burst`, refilled at `qps` tokens/sec.
/// `TryAccept` never blocks — an empty bucket simply rejects the caller,
/// who is expected to surface `Error::RateLimited`.
pub struct TokenBucket {
    inner: Mutex<TokenBucketState>,
}

struct TokenBucketState {
    qps: f64,
    burst: f64,
    tokens: f64,
    last_refill: Instant,
    disabled: bool,
}

impl TokenBucket {
    pub fn new(qps: f64, burst: u32) -> TokenBucket {
        TokenBucket {
            inner: Mutex::new(TokenBucketState {
                qps,
                burst: burst as f64,
                tokens: burst as f64,
                last_refill: Instant::now(),
                disabled: false,
            }),
        }
    }

    /// A limiter that always admits, used when rate limiting is disabled.
    pub fn always_allow() -> TokenBucket {
        TokenBucket {
            inner: Mutex::new(TokenBucketState {
                qps: 0.0,
                burst: 0.0,
                tokens: 0.0,
                last_refill: Instant::now(),
                disabled: true,
            }),
        }
    }

    pub fn try_accept(&self) -> bool {
        let mut state = self.inner.lock().unwrap();
        if state.disabled {
            return true;
        }
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * state.qps).min(state.burst);
        state.last_refill = now;
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

pub const DEFAULT_QPS: f64 = 20.0;
pub const DEFAULT_BURST: u32 = 5;

/// The reader/writer pair shared across a client's whole lifetime.
pub struct RateLimiters {
    pub reader: TokenBucket,
    pub writer: TokenBucket,
}

impl RateLimiters {
    pub fn new(reader_qps: f64, reader_burst: u32, writer_qps: f64, writer_burst: u32) -> RateLimiters {
        RateLimiters {
            reader: TokenBucket::new(reader_qps, reader_burst),
            writer: TokenBucket::new(writer_qps, writer_burst),
        }
    }

    pub fn disabled() -> RateLimiters {
        RateLimiters {
            reader: TokenBucket::always_allow(),
            writer: TokenBucket::always_allow(),
        }
    }
}

impl Default for RateLimiters {
    fn default() -> RateLimiters {
        RateLimiters::new(DEFAULT_QPS, DEFAULT_BURST, DEFAULT_QPS, DEFAULT_BURST)
    }
}

/// Exponential backoff schedule for retryable service errors: attempt `n`
/// (1-indexed) waits `2^(n-1)` seconds.
pub fn backoff_delay_secs(attempt: u32) -> u64 {
    1u64 << attempt.saturating_sub(1)
}

pub const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 2;
