//! Per-client request budget.
//!
//! Each client key gets `points` requests per rolling window. Spending the
//! last point and asking again blocks the client for the base block duration
//! plus an extra penalty that grows with every violation, capped at
//! `max_extra_block`. Violation history is forgotten after `violation_ttl` of
//! good behavior. State lives in memory only.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use threadscope_core::{RateLimitConfig, ScrapeError};
use tokio::time::Instant;

/// Outcome of [`RateLimiter::check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Points per window, for `X-RateLimit-Limit`
    pub limit: u32,
    /// Points left in the current window
    pub remaining: u32,
    /// When the window resets or the block lifts
    pub reset_at: Instant,
    /// How long a blocked client must wait
    pub retry_after: Option<Duration>,
}

impl RateLimitDecision {
    /// Time until `reset_at`, measured now.
    #[must_use]
    pub fn reset_after(&self) -> Duration {
        self.reset_at.saturating_duration_since(Instant::now())
    }

    /// Wall-clock reset time as a Unix timestamp in seconds.
    #[must_use]
    pub fn reset_unix_secs(&self) -> i64 {
        let after = chrono::Duration::from_std(self.reset_after()).unwrap_or(chrono::Duration::zero());
        (chrono::Utc::now() + after).timestamp()
    }

    /// Convert a refusal into [`ScrapeError::RateLimited`].
    pub fn into_result(self) -> Result<Self, ScrapeError> {
        match self.retry_after {
            Some(retry_after) if !self.allowed => Err(ScrapeError::RateLimited { retry_after }),
            _ => Ok(self),
        }
    }
}

/// Non-consuming view of a client's budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitStatus {
    /// Points left in the current window
    pub remaining: u32,
    /// When the window resets or the block lifts
    pub reset_at: Instant,
    /// Whether the client is currently blocked
    pub blocked: bool,
}

/// Limiter configuration and occupancy.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitStats {
    /// Window length in milliseconds
    pub window_ms: u64,
    /// Points per window
    pub max_requests: u32,
    /// Base block in milliseconds
    pub block_duration_ms: u64,
    /// Clients with a live violation record
    pub active_violations: usize,
    /// Clients currently tracked
    pub tracked_clients: usize,
}

#[derive(Debug)]
struct ClientRecord {
    remaining: u32,
    window_end: Instant,
    blocked_until: Option<Instant>,
    violation_count: u32,
    last_violation: Option<Instant>,
}

#[derive(Debug)]
struct LimiterState {
    records: HashMap<String, ClientRecord>,
    next_prune: Instant,
}

/// Rolling-window token bucket keyed by client address.
#[derive(Debug)]
pub struct RateLimiter {
    points: u32,
    window: Duration,
    block: Duration,
    violation_step: Duration,
    max_extra_block: Duration,
    violation_ttl: Duration,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    /// Create a limiter from configuration.
    #[must_use]
    pub fn new(config: &RateLimitConfig) -> Self {
        let window = Duration::from_secs(config.window_secs);
        Self {
            points: config.points.max(1),
            window,
            block: Duration::from_secs(config.block_secs),
            violation_step: Duration::from_secs(config.violation_step_secs),
            max_extra_block: Duration::from_secs(config.max_extra_block_secs),
            violation_ttl: Duration::from_secs(config.violation_ttl_secs),
            state: Mutex::new(LimiterState {
                records: HashMap::new(),
                next_prune: Instant::now() + window,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LimiterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Consume one point for `client_key`.
    pub fn check(&self, client_key: &str) -> RateLimitDecision {
        let now = Instant::now();
        let mut state = self.lock();
        self.maybe_prune(&mut state, now);

        let record = state
            .records
            .entry(client_key.to_string())
            .or_insert_with(|| ClientRecord {
                remaining: self.points,
                window_end: now + self.window,
                blocked_until: None,
                violation_count: 0,
                last_violation: None,
            });

        if let Some(last) = record.last_violation {
            if now.saturating_duration_since(last) > self.violation_ttl {
                record.violation_count = 0;
                record.last_violation = None;
            }
        }

        let blocked = record.blocked_until.is_some_and(|until| until > now);
        if !blocked {
            record.blocked_until = None;
            if record.window_end <= now {
                record.remaining = self.points;
                record.window_end = now + self.window;
            }
            if record.remaining > 0 {
                record.remaining -= 1;
                return RateLimitDecision {
                    allowed: true,
                    limit: self.points,
                    remaining: record.remaining,
                    reset_at: record.window_end,
                    retry_after: None,
                };
            }
        }

        record.violation_count = record.violation_count.saturating_add(1);
        record.last_violation = Some(now);

        let extra = self
            .violation_step
            .saturating_mul(record.violation_count)
            .min(self.max_extra_block);
        let candidate = now + self.block + extra;
        let blocked_until = record
            .blocked_until
            .map_or(candidate, |existing| existing.max(candidate));
        record.blocked_until = Some(blocked_until);
        record.remaining = 0;

        let retry_after = blocked_until.saturating_duration_since(now);
        tracing::warn!(
            client = client_key,
            violations = record.violation_count,
            retry_after_secs = retry_after.as_secs(),
            "Rate limit exceeded"
        );

        RateLimitDecision {
            allowed: false,
            limit: self.points,
            remaining: 0,
            reset_at: blocked_until,
            retry_after: Some(retry_after),
        }
    }

    /// Inspect a client's budget without consuming a point.
    pub fn status(&self, client_key: &str) -> RateLimitStatus {
        let now = Instant::now();
        let state = self.lock();

        match state.records.get(client_key) {
            Some(record) => {
                if let Some(until) = record.blocked_until.filter(|until| *until > now) {
                    RateLimitStatus {
                        remaining: 0,
                        reset_at: until,
                        blocked: true,
                    }
                } else if record.window_end > now {
                    RateLimitStatus {
                        remaining: record.remaining,
                        reset_at: record.window_end,
                        blocked: false,
                    }
                } else {
                    self.fresh_status(now)
                }
            }
            None => self.fresh_status(now),
        }
    }

    fn fresh_status(&self, now: Instant) -> RateLimitStatus {
        RateLimitStatus {
            remaining: self.points,
            reset_at: now + self.window,
            blocked: false,
        }
    }

    /// Forget everything about a client, lifting any block.
    pub fn reset(&self, client_key: &str) {
        if self.lock().records.remove(client_key).is_some() {
            tracing::info!(client = client_key, "Rate limit reset");
        }
    }

    /// Configuration and occupancy snapshot.
    pub fn stats(&self) -> RateLimitStats {
        let now = Instant::now();
        let mut state = self.lock();
        self.maybe_prune(&mut state, now);

        let active_violations = state
            .records
            .values()
            .filter(|r| r.violation_count > 0)
            .count();

        RateLimitStats {
            window_ms: duration_ms(self.window),
            max_requests: self.points,
            block_duration_ms: duration_ms(self.block),
            active_violations,
            tracked_clients: state.records.len(),
        }
    }

    fn maybe_prune(&self, state: &mut LimiterState, now: Instant) {
        if now < state.next_prune {
            return;
        }
        state.next_prune = now + self.window;

        let before = state.records.len();
        let ttl = self.violation_ttl;
        state.records.retain(|_, record| {
            if record
                .last_violation
                .is_some_and(|last| now.saturating_duration_since(last) > ttl)
            {
                record.violation_count = 0;
                record.last_violation = None;
            }
            let blocked = record.blocked_until.is_some_and(|until| until > now);
            blocked || record.window_end > now || record.violation_count > 0
        });

        let pruned = before - state.records.len();
        if pruned > 0 {
            tracing::debug!(pruned, remaining = state.records.len(), "Pruned idle rate limit records");
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
