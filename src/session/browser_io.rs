//! The capability surface a [`super::Session`] needs from its browser
//! connection, kept as a trait so sessions can be driven in tests without a
//! real websocket.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use tokio::sync::Mutex;

#[async_trait]
pub trait BrowserIo: Send + Sync {
    /// Write a raw binary frame (terminal output) to the browser.
    async fn write_bytes(&self, data: Bytes) -> bool;
    /// Write a UTF-8 text frame (a JSON control array) to the browser.
    async fn write_text(&self, text: String) -> bool;
    /// Close the connection, e.g. in response to a child-issued `exit`.
    async fn close(&self);
    /// Send a websocket-level ping, used for the idle-connection heartbeat.
    async fn ping(&self) -> bool;
}

/// [`BrowserIo`] backed by a real Axum websocket sink.
pub struct WsBrowserIo {
    sink: Mutex<SplitSink<WebSocket, Message>>,
}

impl WsBrowserIo {
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self {
            sink: Mutex::new(sink),
        }
    }
}

#[async_trait]
impl BrowserIo for WsBrowserIo {
    async fn write_bytes(&self, data: Bytes) -> bool {
        self.sink
            .lock()
            .await
            .send(Message::Binary(data))
            .await
            .is_ok()
    }

    async fn write_text(&self, text: String) -> bool {
        self.sink
            .lock()
            .await
            .send(Message::Text(text.into()))
            .await
            .is_ok()
    }

    async fn close(&self) {
        let mut sink = self.sink.lock().await;
        let _ = sink.send(Message::Close(None)).await;
        let _ = sink.close().await;
    }

    async fn ping(&self) -> bool {
        self.sink
            .lock()
            .await
            .send(Message::Ping(Bytes::new()))
            .await
            .is_ok()
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use std::sync::Mutex as StdMutex;

    /// An in-memory [`BrowserIo`] that records every write, for router and
    /// session tests that don't need a real socket.
    #[derive(Default)]
    pub struct RecordingBrowserIo {
        pub bytes: StdMutex<Vec<Bytes>>,
        pub text: StdMutex<Vec<String>>,
        pub closed: StdMutex<bool>,
    }

    #[async_trait]
    impl BrowserIo for RecordingBrowserIo {
        async fn write_bytes(&self, data: Bytes) -> bool {
            self.bytes.lock().unwrap().push(data);
            true
        }

        async fn write_text(&self, text: String) -> bool {
            self.text.lock().unwrap().push(text);
            true
        }

        async fn close(&self) {
            *self.closed.lock().unwrap() = true;
        }

        async fn ping(&self) -> bool {
            true
        }
    }
}
