//! Download endpoint: streams one delivery's chunks to the HTTP client as
//! the child produces them.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;

use crate::broker::OpenMethod;
use crate::state::AppState;

pub async fn handle_download(State(state): State<Arc<AppState>>, Path(key): Path<String>) -> Response {
    let entry = match state.broker.get_download_metadata(&key) {
        Ok(entry) => entry,
        Err(_) => return StatusCode::NOT_FOUND.into_response(),
    };

    let content_type = entry
        .encoding
        .as_ref()
        .map_or(entry.mime_type.clone(), |enc| {
            format!("{}; charset={enc}", entry.mime_type)
        });
    let disposition_kind = match entry.open_method {
        OpenMethod::Browser => "inline",
        OpenMethod::Download => "attachment",
    };
    let disposition = format!("{disposition_kind}; filename={}", entry.file_name);

    let body = Body::from_stream(state.broker.clone().download(key).map(Ok::<_, std::io::Error>));

    let mut response = Response::new(body);
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&content_type) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    response
}
