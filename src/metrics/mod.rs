use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Provides metrics for:
// - Repository units of work (commits, rollbacks, persisted failures)
// - Outbox enqueue volume
// - Relay delivery (delivered, skipped, failed) and handler latency
// - Handler retry attempts
//
// A single Metrics value is built at startup and handed to every component
// that records into it.
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Repository Metrics
    pub units_of_work: IntCounterVec,
    pub events_enqueued: IntCounterVec,

    // Relay Metrics
    pub relay_events_delivered: IntCounterVec,
    pub relay_events_skipped: IntCounterVec,
    pub relay_events_failed: IntCounterVec,
    pub relay_handler_duration: HistogramVec,

    // Retry Metrics
    pub retry_attempts_total: IntCounterVec,
}

/// How a repository unit of work ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOfWorkResult {
    Committed,
    CommittedWithError,
    RolledBack,
}

impl UnitOfWorkResult {
    fn as_label(self) -> &'static str {
        match self {
            UnitOfWorkResult::Committed => "committed",
            UnitOfWorkResult::CommittedWithError => "committed_with_error",
            UnitOfWorkResult::RolledBack => "rolled_back",
        }
    }
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let units_of_work = IntCounterVec::new(
            Opts::new("repository_units_of_work_total", "Repository transactions by result"),
            &["aggregate_type", "result"],
        )?;
        registry.register(Box::new(units_of_work.clone()))?;

        let events_enqueued = IntCounterVec::new(
            Opts::new("outbox_events_enqueued_total", "Events written to the outbox"),
            &["stream"],
        )?;
        registry.register(Box::new(events_enqueued.clone()))?;

        let relay_events_delivered = IntCounterVec::new(
            Opts::new("relay_events_delivered_total", "Events acknowledged by handlers"),
            &["consumer", "event_type"],
        )?;
        registry.register(Box::new(relay_events_delivered.clone()))?;

        let relay_events_skipped = IntCounterVec::new(
            Opts::new("relay_events_skipped_total", "Unknown events acknowledged without handling"),
            &["consumer", "event_type"],
        )?;
        registry.register(Box::new(relay_events_skipped.clone()))?;

        let relay_events_failed = IntCounterVec::new(
            Opts::new("relay_events_failed_total", "Events left for redelivery after retries"),
            &["consumer", "event_type"],
        )?;
        registry.register(Box::new(relay_events_failed.clone()))?;

        let relay_handler_duration = HistogramVec::new(
            HistogramOpts::new("relay_handler_duration_seconds", "Handler invocation duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["consumer"],
        )?;
        registry.register(Box::new(relay_handler_duration.clone()))?;

        let retry_attempts_total = IntCounterVec::new(
            Opts::new("retry_attempts_total", "Total retry attempts"),
            &["operation", "attempt"],
        )?;
        registry.register(Box::new(retry_attempts_total.clone()))?;

        Ok(Self {
            registry,
            units_of_work,
            events_enqueued,
            relay_events_delivered,
            relay_events_skipped,
            relay_events_failed,
            relay_handler_duration,
            retry_attempts_total,
        })
    }

    /// Get the Prometheus registry for exposing metrics
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_unit_of_work(&self, aggregate_type: &str, result: UnitOfWorkResult) {
        self.units_of_work
            .with_label_values(&[aggregate_type, result.as_label()])
            .inc();
    }

    pub fn record_enqueued(&self, stream: &str, count: usize) {
        self.events_enqueued
            .with_label_values(&[stream])
            .inc_by(count as u64);
    }

    pub fn record_delivered(&self, consumer: &str, event_type: &str, duration_secs: f64) {
        self.relay_events_delivered
            .with_label_values(&[consumer, event_type])
            .inc();
        self.relay_handler_duration
            .with_label_values(&[consumer])
            .observe(duration_secs);
    }

    pub fn record_skipped(&self, consumer: &str, event_type: &str) {
        self.relay_events_skipped
            .with_label_values(&[consumer, event_type])
            .inc();
    }

    pub fn record_failed(&self, consumer: &str, event_type: &str) {
        self.relay_events_failed
            .with_label_values(&[consumer, event_type])
            .inc();
    }

    pub fn record_retry_attempt(&self, operation: &str, attempt: u32) {
        self.retry_attempts_total
            .with_label_values(&[operation, &attempt.to_string()])
            .inc();
    }
}
