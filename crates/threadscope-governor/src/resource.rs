//! Bounded-concurrency execution with deadlines and a circuit breaker.
//!
//! [`ConcurrencyGovernor`] owns the slot pool and the lifetime counters for
//! every scrape in the process. An operation acquires a slot (FIFO), races a
//! fixed deadline, and on release bumps exactly one terminal counter. Dropping
//! the operation future before it finishes counts as a failure.

use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use sysinfo::{Pid, ProcessesToUpdate, System};
use threadscope_core::{ConcurrencyConfig, Result, ScrapeError};
use tokio::sync::Semaphore;
use tokio::time::Instant;

const MIB: u64 = 1024 * 1024;
const MIN_ERROR_SAMPLES: u64 = 10;
const MIN_TIMEOUT_SAMPLES: u64 = 5;
const MAX_ERROR_RATE: f64 = 0.5;
const MAX_TIMEOUT_RATE: f64 = 0.3;
const MEMORY_READING_TTL: Duration = Duration::from_secs(1);

/// Source of the process' resident memory.
pub trait MemoryProbe: Send + Sync {
    /// Resident set size in bytes, if it can be measured.
    fn resident_bytes(&self) -> Option<u64>;
}

/// [`MemoryProbe`] backed by `sysinfo` for the current process.
pub struct SysinfoMemoryProbe {
    system: Mutex<System>,
    pid: Option<Pid>,
}

impl SysinfoMemoryProbe {
    /// Probe the current process.
    #[must_use]
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
            pid: sysinfo::get_current_pid().ok(),
        }
    }
}

impl Default for SysinfoMemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for SysinfoMemoryProbe {
    fn resident_bytes(&self) -> Option<u64> {
        let pid = self.pid?;
        let mut sys = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        sys.process(pid).map(sysinfo::Process::memory)
    }
}

/// Reuses another probe's reading for `ttl`.
///
/// Admission is checked on every request and health is evaluated twice per
/// operation, so the underlying process refresh runs at most once per `ttl`.
pub struct CachedMemoryProbe<P> {
    inner: P,
    ttl: Duration,
    last: Mutex<Option<(Instant, Option<u64>)>>,
}

impl<P: MemoryProbe> CachedMemoryProbe<P> {
    /// Wrap `inner`, keeping each reading for `ttl`.
    #[must_use]
    pub fn new(inner: P, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            last: Mutex::new(None),
        }
    }
}

impl<P: MemoryProbe> MemoryProbe for CachedMemoryProbe<P> {
    fn resident_bytes(&self) -> Option<u64> {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((taken, reading)) = *last {
            if taken.elapsed() < self.ttl {
                return reading;
            }
        }
        let reading = self.inner.resident_bytes();
        *last = Some((Instant::now(), reading));
        reading
    }
}

/// Lifetime counters plus the live gauge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConcurrencyStats {
    /// Operations that acquired a slot
    pub total_started: u64,
    /// Operations that returned `Ok`
    pub total_completed: u64,
    /// Operations that returned an error or were dropped
    pub total_failed: u64,
    /// Operations that hit the deadline
    pub total_timed_out: u64,
    /// Operations holding a slot right now
    pub current_active: usize,
    /// Operations waiting for a slot
    pub queued: usize,
}

impl ConcurrencyStats {
    /// Operations that reached a terminal state.
    #[must_use]
    pub fn terminal(&self) -> u64 {
        self.total_completed + self.total_failed + self.total_timed_out
    }
}

/// Health report used by the admission gate and `/health`.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceHealth {
    /// True when there are no issues
    pub healthy: bool,
    /// Counter snapshot
    pub stats: ConcurrencyStats,
    /// Human-readable reasons the gate is closed
    pub issues: Vec<String>,
    /// Resident memory in megabytes, when measurable
    pub memory_mb: Option<u64>,
}

#[derive(Debug, Default)]
struct GovernorState {
    stats: ConcurrencyStats,
    active: HashMap<u64, Instant>,
}

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Completed,
    Failed,
    TimedOut,
}

/// Owner of the scrape slot pool and its statistics.
pub struct ConcurrencyGovernor {
    semaphore: Semaphore,
    max_concurrent: usize,
    timeout: Duration,
    memory_limit_bytes: u64,
    memory_warn_bytes: u64,
    probe: Arc<dyn MemoryProbe>,
    next_id: AtomicU64,
    state: Mutex<GovernorState>,
}

impl ConcurrencyGovernor {
    /// Create a governor measuring memory through `sysinfo`, at most once a second.
    #[must_use]
    pub fn new(config: &ConcurrencyConfig) -> Self {
        let probe = CachedMemoryProbe::new(SysinfoMemoryProbe::new(), MEMORY_READING_TTL);
        Self::with_probe(config, Arc::new(probe))
    }

    /// Create a governor with a custom memory probe.
    #[must_use]
    pub fn with_probe(config: &ConcurrencyConfig, probe: Arc<dyn MemoryProbe>) -> Self {
        let max_concurrent = config.max_concurrent.max(1);
        Self {
            semaphore: Semaphore::new(max_concurrent),
            max_concurrent,
            timeout: Duration::from_secs(config.timeout_secs),
            memory_limit_bytes: config.memory_limit_mb.saturating_mul(MIB),
            memory_warn_bytes: config.memory_warn_mb.saturating_mul(MIB),
            probe,
            next_id: AtomicU64::new(1),
            state: Mutex::new(GovernorState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GovernorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Configured slot count.
    #[must_use]
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Deadline applied to each operation.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `op` in a slot, bounded by the deadline.
    ///
    /// Waits in FIFO order for a free slot. On deadline expiry the future is
    /// dropped and [`ScrapeError::Timeout`] returned.
    pub async fn with_resource_control<F, T>(&self, op: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let op_id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let permit = {
            let _waiting = QueueGuard::enter(self);
            self.semaphore
                .acquire()
                .await
                .map_err(|_| ScrapeError::Capacity("concurrency governor closed".to_string()))?
        };

        let mut guard = ReleaseGuard::start(self, op_id);
        let memory_before = self.probe.resident_bytes();

        let result = match tokio::time::timeout(self.timeout, op).await {
            Ok(Ok(value)) => {
                guard.finish(Outcome::Completed);
                Ok(value)
            }
            Ok(Err(err)) => {
                if err.is_timeout() {
                    guard.finish(Outcome::TimedOut);
                    tracing::error!(operation_id = op_id, "Operation timed out: {}", err);
                } else {
                    guard.finish(Outcome::Failed);
                    tracing::error!(operation_id = op_id, "Operation failed: {}", err);
                }
                Err(err)
            }
            Err(_) => {
                guard.finish(Outcome::TimedOut);
                tracing::error!(
                    operation_id = op_id,
                    timeout = ?self.timeout,
                    "Operation exceeded deadline"
                );
                Err(ScrapeError::Timeout(format!(
                    "operation timeout after {}ms",
                    self.timeout.as_millis()
                )))
            }
        };

        if let (Some(before), Some(after)) = (memory_before, self.probe.resident_bytes()) {
            let grown = after.saturating_sub(before);
            if grown > self.memory_warn_bytes {
                tracing::warn!(
                    operation_id = op_id,
                    grown_mb = grown / MIB,
                    "High memory growth during operation"
                );
            }
        }

        drop(permit);
        result
    }

    /// Current counters.
    pub fn stats(&self) -> ConcurrencyStats {
        let state = self.lock();
        let mut stats = state.stats;
        stats.current_active = state.active.len();
        stats
    }

    /// Evaluate every admission signal.
    pub fn health(&self) -> ResourceHealth {
        let stats = self.stats();
        let mut issues = Vec::new();

        if stats.current_active >= self.max_concurrent {
            issues.push("Maximum concurrent scrapers reached".to_string());
        }

        let samples = stats.terminal();
        if samples >= MIN_ERROR_SAMPLES {
            let rate = ratio(stats.total_failed, samples);
            if rate > MAX_ERROR_RATE {
                issues.push(format!("High error rate: {}%", percent(rate)));
            }
        }
        if samples >= MIN_TIMEOUT_SAMPLES {
            let rate = ratio(stats.total_timed_out, samples);
            if rate > MAX_TIMEOUT_RATE {
                issues.push(format!("High timeout rate: {}%", percent(rate)));
            }
        }

        let resident = self.probe.resident_bytes();
        if let Some(bytes) = resident {
            if bytes > self.memory_limit_bytes {
                issues.push(format!("High memory usage: {}MB", bytes / MIB));
            }
        }

        ResourceHealth {
            healthy: issues.is_empty(),
            stats,
            issues,
            memory_mb: resident.map(|b| b / MIB),
        }
    }

    /// Admission gate consulted before any new work.
    ///
    /// # Errors
    /// Returns [`ScrapeError::Capacity`] listing the issues that closed the gate.
    pub fn check_admission(&self) -> Result<()> {
        let health = self.health();
        if health.healthy {
            Ok(())
        } else {
            tracing::warn!(issues = ?health.issues, "Blocking new operations due to system stress");
            Err(ScrapeError::Capacity(health.issues.join("; ")))
        }
    }

    /// Whether the admission gate is open.
    pub fn should_allow_new_operation(&self) -> bool {
        self.check_admission().is_ok()
    }

    /// Forget all in-flight operations.
    ///
    /// Running futures keep their slots until they finish; only the
    /// bookkeeping is cleared.
    pub fn emergency_drain(&self) {
        let mut state = self.lock();
        let cleared = state.active.len();
        state.active.clear();
        tracing::warn!(cleared, "Emergency drain of in-flight operations");
    }

    /// Zero the lifetime counters. The active gauge is kept.
    pub fn reset_stats(&self) {
        let mut state = self.lock();
        let queued = state.stats.queued;
        state.stats = ConcurrencyStats {
            queued,
            ..ConcurrencyStats::default()
        };
        tracing::info!("Concurrency statistics reset");
    }
}

fn ratio(part: u64, total: u64) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let r = part as f64 / total as f64;
    r
}

fn percent(rate: f64) -> u64 {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let p = (rate * 100.0).round() as u64;
    p
}

/// Tracks an operation waiting for a slot.
struct QueueGuard<'a> {
    governor: &'a ConcurrencyGovernor,
}

impl<'a> QueueGuard<'a> {
    fn enter(governor: &'a ConcurrencyGovernor) -> Self {
        governor.lock().stats.queued += 1;
        Self { governor }
    }
}

impl Drop for QueueGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.governor.lock();
        state.stats.queued = state.stats.queued.saturating_sub(1);
    }
}

/// Releases an operation's bookkeeping exactly once.
struct ReleaseGuard<'a> {
    governor: &'a ConcurrencyGovernor,
    op_id: u64,
    finished: bool,
}

impl<'a> ReleaseGuard<'a> {
    fn start(governor: &'a ConcurrencyGovernor, op_id: u64) -> Self {
        let mut state = governor.lock();
        state.stats.total_started += 1;
        state.active.insert(op_id, Instant::now());
        let active = state.active.len();
        drop(state);

        tracing::debug!(operation_id = op_id, active, "Starting operation");
        Self {
            governor,
            op_id,
            finished: false,
        }
    }

    fn finish(&mut self, outcome: Outcome) {
        if self.finished {
            return;
        }
        self.finished = true;

        let mut state = self.governor.lock();
        match outcome {
            Outcome::Completed => state.stats.total_completed += 1,
            Outcome::Failed => state.stats.total_failed += 1,
            Outcome::TimedOut => state.stats.total_timed_out += 1,
        }
        let elapsed = state
            .active
            .remove(&self.op_id)
            .map(|started| started.elapsed());
        let active = state.active.len();
        drop(state);

        tracing::debug!(
            operation_id = self.op_id,
            ?outcome,
            ?elapsed,
            active,
            "Cleaned up operation"
        );
    }
}

impl Drop for ReleaseGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(operation_id = self.op_id, "Operation dropped before completion");
            self.finish(Outcome::Failed);
        }
    }
}
