//! Message routing: child Meta/Packed payloads to actions, and browser
//! control arrays to session calls.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;
use tracing::{debug, warn};

use crate::broker::{Broker, ChunkPayload, OpenMethod};
use crate::packed::Value as PackedValue;

use super::Session;

/// Dispatch a decoded Meta object from the child.
pub async fn handle_meta(session: &Arc<Session>, broker: &Arc<Broker>, meta: Value) {
    let Some(kind) = meta.get("type").and_then(Value::as_str) else {
        warn!(session = %session.id, "meta message missing a type field");
        return;
    };

    match kind {
        "exit" => {
            session.browser.close().await;
        }
        "open_url" => {
            let url = meta.get("url").and_then(Value::as_str).unwrap_or_default();
            let new_tab = meta
                .get("new_tab")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            let envelope = serde_json::json!(["open_url", { "url": url, "new_tab": new_tab }]);
            session.browser.write_text(envelope.to_string()).await;
        }
        "deliver_file_start" => handle_deliver_file_start(session, broker, &meta).await,
        other => {
            warn!(session = %session.id, meta_type = other, "unrecognized meta type from child");
        }
    }
}

async fn handle_deliver_file_start(session: &Arc<Session>, broker: &Arc<Broker>, meta: &Value) {
    let (Some(key), Some(path), Some(open_method), Some(mime_type)) = (
        meta.get("key").and_then(Value::as_str),
        meta.get("path").and_then(Value::as_str),
        meta.get("open_method").and_then(Value::as_str),
        meta.get("mime_type").and_then(Value::as_str),
    ) else {
        warn!(session = %session.id, "deliver_file_start missing required fields");
        return;
    };
    let open_method = match open_method {
        "browser" => OpenMethod::Browser,
        "download" => OpenMethod::Download,
        other => {
            warn!(session = %session.id, open_method = other, "unknown open_method, dropping");
            return;
        }
    };
    let Some(encoding) = meta.get("encoding").map(|v| match v {
        Value::String(s) => Some(s.clone()),
        _ => None,
    }) else {
        warn!(session = %session.id, "deliver_file_start missing required fields");
        return;
    };
    let name = meta
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string);
    let file_name = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string());

    broker.create_download(
        Arc::clone(session),
        key.to_string(),
        file_name,
        open_method,
        mime_type.to_string(),
        encoding,
        name,
    );

    let envelope = serde_json::json!(["deliver_file_start", key]);
    session.browser.write_text(envelope.to_string()).await;
}

/// Dispatch a decoded Packed tuple from the child.
pub fn handle_packed(broker: &Arc<Broker>, mut values: Vec<PackedValue>) {
    if values.is_empty() {
        return;
    }
    let discriminator = match &values[0] {
        PackedValue::Str(s) => s.clone(),
        _ => {
            debug!("packed tuple missing a string discriminator");
            return;
        }
    };

    match discriminator.as_str() {
        "deliver_chunk" => {
            if values.len() < 3 {
                debug!("deliver_chunk packed tuple missing fields");
                return;
            }
            let chunk_value = values.pop().unwrap();
            let key = match &values[1] {
                PackedValue::Str(s) => s.clone(),
                _ => {
                    debug!("deliver_chunk key is not a string");
                    return;
                }
            };
            let chunk = match chunk_value {
                PackedValue::Bytes(b) => ChunkPayload::Bytes(b),
                PackedValue::Str(s) => ChunkPayload::Str(s),
                _ => {
                    debug!("deliver_chunk payload is not bytes or string");
                    return;
                }
            };
            broker.chunk_received(&key, chunk);
        }
        other => debug!(discriminator = other, "unrecognized packed discriminator"),
    }
}

/// Dispatch a JSON control array from the browser. Unrecognized shapes are
/// silently dropped.
pub async fn handle_browser_message(session: &Arc<Session>, text: &str) {
    let Ok(envelope) = serde_json::from_str::<Value>(text) else {
        return;
    };
    let Some(array) = envelope.as_array() else {
        return;
    };
    let Some(kind) = array.first().and_then(Value::as_str) else {
        return;
    };

    match kind {
        "stdin" => {
            if let Some(data) = array.get(1).and_then(Value::as_str) {
                session.send_bytes(Bytes::from(data.as_bytes().to_vec())).await;
            }
        }
        "resize" => {
            if let Some(dims) = array.get(1) {
                let width = dims.get("width").and_then(Value::as_u64).unwrap_or(80) as u16;
                let height = dims.get("height").and_then(Value::as_u64).unwrap_or(24) as u16;
                session.set_terminal_size(width, height).await;
            }
        }
        "ping" => {
            let data = array.get(1).cloned().unwrap_or(Value::Null);
            let pong = serde_json::json!(["pong", data]);
            session.browser.write_text(pong.to_string()).await;
        }
        "blur" => {
            session.blur().await;
        }
        "focus" => {
            session.focus().await;
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::browser_io::test_support::RecordingBrowserIo;

    fn make_session() -> Arc<Session> {
        let browser = Arc::new(RecordingBrowserIo::default());
        let broker = Arc::new(Broker::new());
        Session::new("s1".to_string(), "true".to_string(), false, browser, broker)
    }

    #[tokio::test]
    async fn ping_replies_with_pong() {
        let session = make_session();
        handle_browser_message(&session, r#"["ping","abc"]"#).await;
        // session has no child started, so stdin writes fail silently but
        // the pong reply goes straight to the browser.
    }

    #[tokio::test]
    async fn unknown_browser_shape_is_ignored() {
        let session = make_session();
        handle_browser_message(&session, r#"["frobnicate"]"#).await;
    }

    #[test]
    fn handle_packed_requires_three_elements() {
        use crate::packed;
        let values = packed::decode(packed::encode(&[PackedValue::Str(
            "deliver_chunk".to_string(),
        )]))
        .unwrap();
        let broker = Arc::new(Broker::new());
        handle_packed(&broker, values);
    }
}
