use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: bookings created.
pub const BOOKINGS_CREATED_TOTAL: &str = "vacancy_bookings_created_total";

/// Counter: bookings cancelled. Labels: reason (guest, capacity_reduced).
pub const BOOKINGS_CANCELLED_TOTAL: &str = "vacancy_bookings_cancelled_total";

/// Counter: availability queries served.
pub const AVAILABILITY_QUERIES_TOTAL: &str = "vacancy_availability_queries_total";

/// Counter: capacity-reconciliation passes (including no-ops).
pub const RECONCILE_RUNS_TOTAL: &str = "vacancy_reconcile_runs_total";

/// Counter: bookings cancelled by the reconciler.
pub const RECONCILE_CANCELLATIONS_TOTAL: &str = "vacancy_reconcile_cancellations_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "vacancy_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "vacancy_wal_flush_batch_size";

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
