//! Download broker: the process-wide table mediating between a child's
//! chunk producer and an HTTP response consumer.
//!
//! The table is a [`dashmap::DashMap`] rather than a single `Mutex`-guarded
//! `HashMap` — the same choice the sibling hub crate makes for its frame
//! routing table — so that unrelated downloads never serialize on one lock.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use futures_util::Stream;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::debug;

use crate::error::BrokerError;
use crate::session::Session;

const CHUNK_REQUEST_SIZE: u32 = 65536;
const CHUNK_TIMEOUT: Duration = Duration::from_secs(4);

/// How the browser should treat a delivered file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMethod {
    Browser,
    Download,
}

/// A chunk as it arrives off the wire — either already bytes, or a string
/// that still needs encoding to the delivery's declared charset.
pub enum ChunkPayload {
    Bytes(Bytes),
    Str(String),
}

/// Encode a string chunk per a delivery's declared encoding. Every encoding
/// this gateway recognizes round-trips through UTF-8 unchanged; `encoding`
/// otherwise only describes bytes the child already sent as `Bytes`.
fn encode_chunk_string(s: &str, _encoding: Option<&str>) -> Bytes {
    Bytes::from(s.as_bytes().to_vec())
}

/// Everything known about one in-flight delivery, keyed by its delivery key.
pub struct DownloadEntry {
    pub session: Arc<Session>,
    pub session_id: String,
    pub file_name: String,
    pub open_method: OpenMethod,
    pub mime_type: String,
    pub encoding: Option<String>,
    pub name: Option<String>,
    chunks_tx: mpsc::UnboundedSender<Bytes>,
    chunks_rx: AsyncMutex<mpsc::UnboundedReceiver<Bytes>>,
}

/// Process-wide registry of active downloads, shared across every session.
pub struct Broker {
    downloads: DashMap<String, Arc<DownloadEntry>>,
}

impl Broker {
    pub fn new() -> Self {
        Self {
            downloads: DashMap::new(),
        }
    }

    /// Register a new delivery. Overwrites any existing entry for `key` —
    /// tolerated as a child-side protocol error, not treated as fatal here.
    #[allow(clippy::too_many_arguments)]
    pub fn create_download(
        &self,
        session: Arc<Session>,
        key: String,
        file_name: String,
        open_method: OpenMethod,
        mime_type: String,
        encoding: Option<String>,
        name: Option<String>,
    ) {
        let (chunks_tx, chunks_rx) = mpsc::unbounded_channel();
        let session_id = session.id.clone();
        let entry = Arc::new(DownloadEntry {
            session,
            session_id,
            file_name,
            open_method,
            mime_type,
            encoding,
            name,
            chunks_tx,
            chunks_rx: AsyncMutex::new(chunks_rx),
        });
        self.downloads.insert(key, entry);
    }

    /// A chunk arrived from the child. Silently discarded if the delivery
    /// has already been cancelled or finished. A string chunk is re-encoded
    /// using this delivery's declared encoding before being enqueued — this
    /// lookup belongs here, not in the caller, since the entry (and its
    /// encoding) is only reachable through the broker's table.
    pub fn chunk_received(&self, key: &str, chunk: ChunkPayload) {
        match self.downloads.get(key) {
            Some(entry) => {
                let bytes = match chunk {
                    ChunkPayload::Bytes(b) => b,
                    ChunkPayload::Str(s) => encode_chunk_string(&s, entry.encoding.as_deref()),
                };
                let _ = entry.chunks_tx.send(bytes);
            }
            None => debug!(key, "chunk received for unknown or finished download"),
        }
    }

    pub fn get_download_metadata(&self, key: &str) -> Result<Arc<DownloadEntry>, BrokerError> {
        self.downloads
            .get(key)
            .map(|entry| entry.clone())
            .ok_or_else(|| BrokerError::NotFound(key.to_string()))
    }

    /// Stream the bytes of one delivery, requesting chunks from the child
    /// one at a time and yielding them as they arrive. Takes an owned
    /// `Arc` since the returned stream must outlive this call.
    pub fn download(self: Arc<Self>, key: String) -> impl Stream<Item = Bytes> {
        let broker = self;
        async_stream::stream! {
            loop {
                let entry = match broker.downloads.get(&key) {
                    Some(entry) => entry.clone(),
                    None => break,
                };

                let request = serde_json::json!({
                    "type": "deliver_chunk_request",
                    "key": key,
                    "size": CHUNK_REQUEST_SIZE,
                    "name": entry.name,
                });
                if !entry.session.send_meta(request).await {
                    broker.downloads.remove(&key);
                    break;
                }

                let mut rx = entry.chunks_rx.lock().await;
                let next = tokio::time::timeout(CHUNK_TIMEOUT, rx.recv()).await;
                drop(rx);

                match next {
                    Ok(Some(chunk)) if !chunk.is_empty() => yield chunk,
                    _ => {
                        broker.downloads.remove(&key);
                        break;
                    }
                }
            }
        }
    }

    /// End every download owned by `session_id`, releasing any HTTP
    /// response currently streaming one of its chunks.
    pub fn cancel_app_downloads(&self, session_id: &str) {
        for entry in self.downloads.iter() {
            if entry.session_id == session_id {
                let _ = entry.chunks_tx.send(Bytes::new());
            }
        }
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}
