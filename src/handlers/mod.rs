//! HTTP endpoint handlers for the exporter.
//!
//! This module provides handlers for all HTTP endpoints:
//! - `/metrics`: Prometheus metrics endpoint (one collection pass)
//! - `/`: static informational page
//! - everything else: `400 Bad Request`

pub mod metrics;
pub mod root;

// Re-export handlers
pub use metrics::metrics_handler;
pub use root::{bad_request_handler, root_handler};
