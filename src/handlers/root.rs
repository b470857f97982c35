//! Root endpoint handler for the landing page, plus the catch-all.
//!
//! Anything that is neither `/` nor `/metrics` is a bad request; the
//! exporter has no other surface.

use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};

const INDEX: &str = "<html><body>See <a href='/metrics'>/metrics</a>.\r\n</body></html>";

/// Handler for the / endpoint.
pub async fn root_handler() -> impl IntoResponse {
    Html(INDEX)
}

/// Fallback for every unknown path.
pub async fn bad_request_handler() -> impl IntoResponse {
    (StatusCode::BAD_REQUEST, "Bad Request\n")
}
