//! Process-wide view of the CI provider's request budget.

use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use reqwest::header::HeaderMap;

/// A snapshot is considered stale after this long, whatever its reset says.
const SNAPSHOT_TTL: Duration = Duration::from_secs(60 * 60);
const THROTTLE_RATIO: f64 = 0.8;
const SLOWDOWN_RATIO: f64 = 0.9;
const NEAR_LIMIT_REMAINING: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSnapshot {
    pub limit: u64,
    pub remaining: u64,
    /// Unix time the budget refills at.
    pub reset_epoch: u64,
    pub used: u64,
}

impl RateLimitSnapshot {
    /// Share of the budget already consumed, 0.0..=1.0.
    pub fn used_ratio(&self) -> f64 {
        if self.limit == 0 {
            return 0.0;
        }
        self.limit.saturating_sub(self.remaining) as f64 / self.limit as f64
    }

    /// Read the `x-ratelimit-*` headers. `None` unless limit and remaining
    /// are both present.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let field = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
        };
        let limit = field("x-ratelimit-limit")?;
        let remaining = field("x-ratelimit-remaining")?;
        Some(Self {
            limit,
            remaining,
            reset_epoch: field("x-ratelimit-reset").unwrap_or(0),
            used: field("x-ratelimit-used").unwrap_or(limit.saturating_sub(remaining)),
        })
    }
}

#[derive(Debug, Default)]
struct State {
    snapshot: Option<(RateLimitSnapshot, Instant)>,
}

/// Shared rate-limit tracker, refreshed from every response.
#[derive(Debug, Clone, Default)]
pub struct RateLimiter {
    state: Arc<Mutex<State>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The instance shared by every client in the process.
    pub fn shared() -> Self {
        static SHARED: OnceLock<RateLimiter> = OnceLock::new();
        SHARED.get_or_init(RateLimiter::new).clone()
    }

    pub fn update(&self, snapshot: RateLimitSnapshot) {
        self.state.lock().snapshot = Some((snapshot, Instant::now()));
        if snapshot.remaining < NEAR_LIMIT_REMAINING {
            tracing::warn!(
                remaining = snapshot.remaining,
                limit = snapshot.limit,
                reset = snapshot.reset_epoch,
                "CI rate limit nearly exhausted"
            );
        }
    }

    pub fn update_from_headers(&self, headers: &HeaderMap) {
        if let Some(snapshot) = RateLimitSnapshot::from_headers(headers) {
            self.update(snapshot);
        }
    }

    /// Current snapshot, or `None` once it has expired (an hour old or past
    /// its reset time).
    pub fn snapshot(&self) -> Option<RateLimitSnapshot> {
        let mut state = self.state.lock();
        let (snapshot, observed) = state.snapshot?;
        let now_epoch = chrono::Utc::now().timestamp().max(0) as u64;
        let reset_passed = snapshot.reset_epoch != 0 && now_epoch >= snapshot.reset_epoch;
        if observed.elapsed() >= SNAPSHOT_TTL || reset_passed {
            state.snapshot = None;
            return None;
        }
        Some(snapshot)
    }

    pub fn should_throttle(&self) -> bool {
        self.snapshot()
            .is_some_and(|s| s.used_ratio() > THROTTLE_RATIO)
    }

    pub fn is_near_limit(&self) -> bool {
        self.snapshot()
            .is_some_and(|s| s.remaining < NEAR_LIMIT_REMAINING)
    }

    /// Stretch `base` as the budget runs out: x3 above 90% used, x2 above
    /// 80%.
    pub fn recommended_interval(&self, base: Duration) -> Duration {
        let ratio = self.snapshot().map_or(0.0, |s| s.used_ratio());
        if ratio > SLOWDOWN_RATIO {
            base * 3
        } else if ratio > THROTTLE_RATIO {
            base * 2
        } else {
            base
        }
    }
}
