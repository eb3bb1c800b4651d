//! Fixed-window rate limiting.
//!
//! Each key gets a counter that resets at fixed, non-overlapping window
//! boundaries. A burst straddling a boundary can see up to `2 * max` requests
//! admitted within one window length.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::ports::{CounterStore, RateLimitDecision, RateLimitError, RateLimiter};

/// Millisecond wall clock.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn at(ms: u64) -> Self {
        Self {
            now: AtomicU64::new(ms),
        }
    }

    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Window length and budget for one class of endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub name: String,
    pub window: Duration,
    pub max: u32,
}

impl RateLimitPolicy {
    pub fn new(name: impl Into<String>, window: Duration, max: u32) -> Self {
        Self {
            name: name.into(),
            window,
            max,
        }
    }

    /// General API reads: 100 requests per 15 minutes.
    pub fn api() -> Self {
        Self::new("api", Duration::from_secs(15 * 60), 100)
    }

    /// Sign-in endpoints: 5 requests per 15 minutes.
    pub fn auth() -> Self {
        Self::new("auth", Duration::from_secs(15 * 60), 5)
    }

    /// Mutating endpoints: 10 requests per minute.
    pub fn write() -> Self {
        Self::new("write", Duration::from_secs(60), 10)
    }
}

pub struct FixedWindowRateLimiter {
    policy: RateLimitPolicy,
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
}

impl FixedWindowRateLimiter {
    pub fn new(policy: RateLimitPolicy, store: Arc<dyn CounterStore>) -> Self {
        Self::with_clock(policy, store, Arc::new(SystemClock))
    }

    pub fn with_clock(
        policy: RateLimitPolicy,
        store: Arc<dyn CounterStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            policy,
            store,
            clock,
        }
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    fn scoped_key(&self, key: &str) -> String {
        format!("{}:{}", self.policy.name, key)
    }
}

#[async_trait]
impl RateLimiter for FixedWindowRateLimiter {
    async fn admit(&self, key: &str) -> Result<RateLimitDecision, RateLimitError> {
        let now = self.clock.now_ms();
        let entry = self
            .store
            .hit(&self.scoped_key(key), now, self.policy.window)
            .await?;

        let allowed = entry.count <= self.policy.max;
        if !allowed {
            tracing::debug!(
                policy = %self.policy.name,
                key,
                count = entry.count,
                "Rate limit exceeded"
            );
        }

        Ok(RateLimitDecision {
            allowed,
            remaining: self.policy.max.saturating_sub(entry.count),
            reset_after: Duration::from_millis(entry.reset_at_ms.saturating_sub(now)),
        })
    }

    fn name(&self) -> &str {
        &self.policy.name
    }
}

/// Housekeeping pass that drops closed windows from a counter store.
#[derive(Clone)]
pub struct ExpirySweep {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
}

impl ExpirySweep {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn CounterStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn run_once(&self) -> Result<usize, RateLimitError> {
        let removed = self.store.purge_expired(self.clock.now_ms()).await?;
        if removed > 0 {
            tracing::debug!(removed, "Swept expired rate-limit windows");
        }
        Ok(removed)
    }
}

/// Where a request came from, as far as the transport and proxies tell us.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOrigin {
    pub forwarded_for: Option<String>,
    pub real_ip: Option<String>,
    pub peer: Option<String>,
}

/// Maps a request origin to a rate-limit key.
pub trait KeyExtractor: Send + Sync {
    fn key(&self, origin: &RequestOrigin) -> String;
}

/// First `X-Forwarded-For` hop, then `X-Real-IP`, then the peer address.
///
/// Proxy headers are client-controlled unless a trusted proxy overwrites them.
/// With `trust_proxy_headers` off only the peer address is used.
#[derive(Debug, Clone, Copy)]
pub struct ForwardedIpKey {
    pub trust_proxy_headers: bool,
}

impl Default for ForwardedIpKey {
    fn default() -> Self {
        Self {
            trust_proxy_headers: true,
        }
    }
}

impl KeyExtractor for ForwardedIpKey {
    fn key(&self, origin: &RequestOrigin) -> String {
        let non_empty = |s: &str| {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        };

        let from_headers = if self.trust_proxy_headers {
            origin
                .forwarded_for
                .as_deref()
                .and_then(|chain| chain.split(',').next())
                .and_then(non_empty)
                .or_else(|| origin.real_ip.as_deref().and_then(non_empty))
        } else {
            None
        };

        from_headers
            .or_else(|| origin.peer.as_deref().and_then(non_empty))
            .unwrap_or_else(|| "unknown".to_string())
    }
}
