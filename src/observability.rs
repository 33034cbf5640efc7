use std::net::SocketAddr;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// ── Request metrics ─────────────────────────────────────────────

/// Counter: reservation attempts. Labels: outcome.
pub const RESERVATIONS_TOTAL: &str = "stayline_reservations_total";

/// Counter: reservations or confirmations rejected for overlap.
pub const CONFLICTS_TOTAL: &str = "stayline_conflicts_total";

/// Counter: bookings moved to confirmed.
pub const CONFIRMATIONS_TOTAL: &str = "stayline_confirmations_total";

/// Counter: bookings moved to cancelled (idempotent repeats not counted).
pub const CANCELLATIONS_TOTAL: &str = "stayline_cancellations_total";

/// Histogram: time spent holding a property's write lock, in seconds.
pub const LOCK_HOLD_SECONDS: &str = "stayline_property_lock_hold_seconds";

// ── Storage metrics ─────────────────────────────────────────────

/// Histogram: journal group-commit flush duration in seconds.
pub const JOURNAL_FLUSH_DURATION_SECONDS: &str = "stayline_journal_flush_duration_seconds";

/// Histogram: events per journal flush.
pub const JOURNAL_FLUSH_BATCH_SIZE: &str = "stayline_journal_flush_batch_size";

/// Counter: journal compactions completed.
pub const JOURNAL_COMPACTIONS_TOTAL: &str = "stayline_journal_compactions_total";

/// Gauge: registered properties.
pub const PROPERTIES: &str = "stayline_properties";

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over `default_filter`; `json` switches to one JSON object per line.
pub fn init_tracing(default_filter: &str, json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
    );
    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Install the Prometheus exporter on the given port. No-op if port is None.
pub fn init_metrics(port: Option<u16>) -> anyhow::Result<()> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
