use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: appointments booked (single, multi-service, group, occurrences).
pub const BOOKINGS_CREATED_TOTAL: &str = "slotwise_bookings_created_total";

/// Counter: booking attempts rejected with a schedule conflict.
pub const CONFLICTS_REJECTED_TOTAL: &str = "slotwise_conflicts_rejected_total";

/// Counter: recurring series created.
pub const SERIES_CREATED_TOTAL: &str = "slotwise_series_created_total";

/// Counter: group-session joins accepted.
pub const PARTICIPANTS_JOINED_TOTAL: &str = "slotwise_participants_joined_total";

/// Counter: group-session joins rejected at capacity.
pub const GROUP_FULL_REJECTED_TOTAL: &str = "slotwise_group_full_rejected_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: number of open businesses (loaded engines).
pub const BUSINESSES_ACTIVE: &str = "slotwise_businesses_active";

/// Histogram: journal group-commit flush duration in seconds.
pub const JOURNAL_FLUSH_DURATION_SECONDS: &str = "slotwise_journal_flush_duration_seconds";

/// Histogram: journal group-commit batch size (events per flush).
pub const JOURNAL_FLUSH_BATCH_SIZE: &str = "slotwise_journal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}
