//! Metrics endpoint handler for Prometheus scraping.
//!
//! One GET triggers one synchronous collection pass over the kstat chain.
//! The registry lock serializes passes; whatever worker thread axum runs
//! this on, chain refresh and record reads never overlap.

use std::sync::atomic::Ordering;
use std::time::Instant;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use tracing::debug;

use illumex::kstat::mono_now_ns;
use illumex::render::{MetricKind, MetricWriter, Num};

use crate::state::SharedState;

/// Initial capacity of the response buffer.
const BUFFER_CAP: usize = 256 * 1024;

const CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Handler for the /metrics endpoint.
pub async fn metrics_handler(State(state): State<SharedState>) -> impl IntoResponse {
    let start = Instant::now();
    debug!("Processing /metrics request");
    state.requests_total.fetch_add(1, Ordering::Relaxed);

    let with_help = state.config.with_help();
    let mut body = String::with_capacity(BUFFER_CAP);
    {
        let mut registry = state.registry.lock().await;
        registry.scrape(&mut body, with_help, mono_now_ns());
    }
    let scrapes = state.scrapes_total.fetch_add(1, Ordering::Relaxed) + 1;

    // exporter self metrics share the sink and the formatting rules
    let mut writer = MetricWriter::new(&mut body, with_help);
    writer.scalar(
        "illumex_exporter_requests_total",
        MetricKind::Counter,
        "Number of HTTP requests seen since the start of the exporter, incl. the current one.",
        Num::U(state.requests_total.load(Ordering::Relaxed)),
    );
    writer.scalar(
        "illumex_exporter_scrapes_total",
        MetricKind::Counter,
        "Number of collection passes since the start of the exporter, incl. the current one.",
        Num::U(scrapes),
    );
    writer.scalar(
        "illumex_exporter_scrape_duration_seconds",
        MetricKind::Gauge,
        "Time spent on the current collection pass.",
        Num::F(start.elapsed().as_secs_f64()),
    );
    writer.scalar(
        "illumex_exporter_uptime_seconds",
        MetricKind::Gauge,
        "Time since the exporter started.",
        Num::F(state.start_time.elapsed().as_secs_f64()),
    );

    debug!(
        "Metrics request completed: {} bytes, {:.3}ms",
        body.len(),
        start.elapsed().as_secs_f64() * 1000.0
    );

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, CONTENT_TYPE)],
        body,
    )
}
