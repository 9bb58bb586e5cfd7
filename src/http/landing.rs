//! Landing page: a minimal inline HTML shell that opens the websocket and
//! renders the terminal.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::Html;

use super::to_int;
use crate::state::AppState;

const DEFAULT_FONT_SIZE: u16 = 16;

pub async fn handle_index(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Html<String> {
    let font_size = to_int(params.get("fontsize"), DEFAULT_FONT_SIZE);
    let ws_url = websocket_url(&state);
    let title = html_escape(&state.config.effective_title());

    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>{title}</title>
  <style>
    html, body {{ margin: 0; padding: 0; height: 100%; background: #000; }}
    #terminal {{ font-size: {font_size}px; height: 100%; }}
  </style>
</head>
<body>
  <div id="terminal"></div>
  <script>
    window.GANGLION_WEBSOCKET_URL = "{ws_url}";
  </script>
</body>
</html>
"#
    ))
}

fn websocket_url(state: &AppState) -> String {
    let base = state.config.public_url();
    match base.split_once(':') {
        Some((_, rest)) => format!("ws:{rest}/ws"),
        None => format!("ws://{base}/ws"),
    }
}

fn html_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn config(public_url: &str) -> Config {
        Config {
            command: "echo hi".to_string(),
            host: "localhost".to_string(),
            port: 8000,
            public_url: Some(public_url.to_string()),
            title: None,
            debug: false,
            log_level: "info".to_string(),
            log_json: false,
        }
    }

    #[test]
    fn websocket_url_swaps_http_scheme() {
        let state = AppState {
            config: Arc::new(config("http://localhost:8000")),
            broker: Arc::new(crate::broker::Broker::new()),
        };
        assert_eq!(websocket_url(&state), "ws://localhost:8000/ws");
    }

    #[test]
    fn html_escape_neutralizes_markup() {
        assert_eq!(html_escape("<script>"), "&lt;script&gt;");
    }
}
