use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceCell<()> = OnceCell::new();

/// Process-local counters, also mirrored to the `metrics` facade so an
/// installed recorder sees them.
#[derive(Debug, Default)]
pub struct AppMetrics {
    turns_total: AtomicU64,
    classifier_fallback_total: AtomicU64,
    generator_fallback_total: AtomicU64,
    engine_failure_total: AtomicU64,
    blocked_turns_total: AtomicU64,
    verdicts_total: AtomicU64,
    total_latency_millis: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub turns_total: u64,
    pub classifier_fallback_total: u64,
    pub generator_fallback_total: u64,
    pub engine_failure_total: u64,
    pub blocked_turns_total: u64,
    pub verdicts_total: u64,
    pub avg_latency_millis: f64,
}

impl AppMetrics {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inc_turn(&self) {
        self.turns_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("shield_turns_total").increment(1);
    }

    pub fn inc_classifier_fallback(&self) {
        self.classifier_fallback_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("shield_classifier_fallback_total").increment(1);
    }

    pub fn inc_generator_fallback(&self) {
        self.generator_fallback_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("shield_generator_fallback_total").increment(1);
    }

    pub fn add_engine_failures(&self, failures: usize) {
        if failures == 0 {
            return;
        }
        self.engine_failure_total
            .fetch_add(failures as u64, Ordering::Relaxed);
        metrics::counter!("shield_engine_failure_total").increment(failures as u64);
    }

    pub fn inc_blocked_turn(&self) {
        self.blocked_turns_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("shield_blocked_turns_total").increment(1);
    }

    pub fn inc_verdict(&self) {
        self.verdicts_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("shield_verdicts_total").increment(1);
    }

    pub fn observe_latency(&self, duration: Duration) {
        self.total_latency_millis
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
        metrics::histogram!("shield_turn_latency_seconds").record(duration.as_secs_f64());
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let turns = self.turns_total.load(Ordering::Relaxed);
        let latency = self.total_latency_millis.load(Ordering::Relaxed);

        MetricsSnapshot {
            turns_total: turns,
            classifier_fallback_total: self.classifier_fallback_total.load(Ordering::Relaxed),
            generator_fallback_total: self.generator_fallback_total.load(Ordering::Relaxed),
            engine_failure_total: self.engine_failure_total.load(Ordering::Relaxed),
            blocked_turns_total: self.blocked_turns_total.load(Ordering::Relaxed),
            verdicts_total: self.verdicts_total.load(Ordering::Relaxed),
            avg_latency_millis: if turns == 0 {
                0.0
            } else {
                latency as f64 / turns as f64
            },
        }
    }
}

/// JSON logs on stderr, so stdout stays free for command output.
pub fn init_tracing(service_name: &str) {
    TRACING_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}=info,shield_agents=info,shield_llm=info",
                service_name
            ))
        });

        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(std::io::stderr)
            .init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_averages_latency_per_turn() {
        let metrics = AppMetrics::default();
        assert_eq!(metrics.snapshot().avg_latency_millis, 0.0);

        metrics.inc_turn();
        metrics.inc_turn();
        metrics.observe_latency(Duration::from_millis(30));
        metrics.observe_latency(Duration::from_millis(10));
        metrics.add_engine_failures(0);
        metrics.add_engine_failures(2);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.turns_total, 2);
        assert_eq!(snapshot.engine_failure_total, 2);
        assert_eq!(snapshot.avg_latency_millis, 20.0);
    }
}
