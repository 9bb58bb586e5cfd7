//! HTTP surface: landing page, websocket upgrade, download endpoint.

pub mod download;
pub mod landing;
pub mod ws;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(landing::handle_index))
        .route("/ws", get(ws::handle_websocket))
        .route("/download/{key}", get(download::handle_download))
        .with_state(state)
}

/// Parse a query parameter as an integer, falling back to `default` on any
/// failure (missing key or non-numeric value) — matches the original
/// `to_int` helper's "never reject the request over a bad query param"
/// behavior.
pub fn to_int(value: Option<&String>, default: u16) -> u16 {
    value
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_int_falls_back_on_missing_or_invalid() {
        assert_eq!(to_int(None, 80), 80);
        assert_eq!(to_int(Some(&"not-a-number".to_string()), 80), 80);
        assert_eq!(to_int(Some(&"120".to_string()), 80), 120);
    }
}
