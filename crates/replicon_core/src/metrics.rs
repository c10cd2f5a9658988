//! Run statistics and structured logging.
//!
//! Counters are atomics so worker threads can record into a shared
//! [`Metrics`] without locking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Population-level counters for a run.
pub struct Metrics {
    updates: AtomicU64,
    births: AtomicU64,
    deaths: AtomicU64,
    divide_faults: AtomicU64,
    instructions: AtomicU64,
    population: AtomicU64,
    start_time: Instant,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    #[must_use]
    pub fn new() -> Self {
        Self {
            updates: AtomicU64::new(0),
            births: AtomicU64::new(0),
            deaths: AtomicU64::new(0),
            divide_faults: AtomicU64::new(0),
            instructions: AtomicU64::new(0),
            population: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Records a finished update. Logs a summary every `log_interval`
    /// updates (never when it is 0).
    pub fn record_update(&self, duration: Duration, population: usize, log_interval: u64) {
        let update = self.updates.fetch_add(1, Ordering::Relaxed) + 1;
        self.population.store(population as u64, Ordering::Relaxed);

        if log_interval > 0 && update % log_interval == 0 {
            tracing::info!(
                update,
                population,
                births = self.births(),
                deaths = self.deaths(),
                divide_faults = self.divide_faults(),
                duration_ms = duration.as_millis() as u64,
                "World update"
            );
        }
    }

    pub fn record_birth(&self) {
        self.births.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_death(&self) {
        self.deaths.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_divide_fault(&self) {
        self.divide_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_instructions(&self, count: u64) {
        self.instructions.fetch_add(count, Ordering::Relaxed);
    }

    #[must_use]
    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn births(&self) -> u64 {
        self.births.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn deaths(&self) -> u64 {
        self.deaths.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn divide_faults(&self) -> u64 {
        self.divide_faults.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn instructions(&self) -> u64 {
        self.instructions.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn population(&self) -> u64 {
        self.population.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Logs a notable run event.
    pub fn log_event(&self, event_type: &str, details: &str) {
        tracing::info!(event_type, details, "World event");
    }
}

/// Installs the global `tracing` subscriber. `RUST_LOG` overrides the
/// default `info` level. Safe to call more than once.
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_env_filter(filter)
            .finish(),
    )
    .ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        assert_eq!(metrics.updates(), 0);
        assert_eq!(metrics.births(), 0);
    }

    #[test]
    fn test_record_update() {
        let metrics = Metrics::new();
        metrics.record_update(Duration::from_millis(3), 42, 0);
        metrics.record_update(Duration::from_millis(3), 40, 1);
        assert_eq!(metrics.updates(), 2);
        assert_eq!(metrics.population(), 40);
    }

    #[test]
    fn test_counters() {
        let metrics = Metrics::new();
        metrics.record_birth();
        metrics.record_birth();
        metrics.record_death();
        metrics.record_divide_fault();
        metrics.record_instructions(30);
        assert_eq!(metrics.births(), 2);
        assert_eq!(metrics.deaths(), 1);
        assert_eq!(metrics.divide_faults(), 1);
        assert_eq!(metrics.instructions(), 30);
    }

    #[test]
    fn test_init_logging_twice() {
        init_logging();
        init_logging();
    }
}
