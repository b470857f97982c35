//! Application state management for the exporter.
//!
//! This module defines the shared application state that is passed to the
//! HTTP handlers.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;

use illumex::collectors::CollectorRegistry;
use illumex::config::Config;

/// Type alias for shared application state.
pub type SharedState = Arc<AppState>;

/// Global application state shared across requests.
pub struct AppState {
    /// The kstat chain, caches and collectors. One scrape at a time: a
    /// chain refresh frees records a concurrent read might still reference,
    /// so concurrent collection passes are not allowed.
    pub registry: Mutex<CollectorRegistry>,
    pub config: Arc<Config>,
    /// HTTP requests seen, by outcome of routing.
    pub requests_total: AtomicU64,
    /// Collection passes served from /metrics.
    pub scrapes_total: AtomicU64,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}
