//! Session supervisor: owns one child process and relays it to one browser.

pub mod browser_io;
pub mod router;

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::broker::Broker;
use crate::frame::{self, Tag};
use crate::packed;
use browser_io::BrowserIo;

/// Sentinel the child writes once its standard streams are wired up and it
/// is ready to speak the frame protocol.
const READY_SENTINEL: &str = "__GANGLION__\n";
/// Lines read from the child's stdout before giving up on the handshake.
const PRELUDE_LINE_LIMIT: usize = 10;

/// One live child process and the browser connection it is projected onto.
pub struct Session {
    pub id: String,
    command: String,
    debug: bool,
    browser: Arc<dyn BrowserIo>,
    broker: Arc<Broker>,
    stdin: Mutex<Option<ChildStdin>>,
    shutdown_tx: watch::Sender<bool>,
    read_task: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl Session {
    pub fn new(
        id: String,
        command: String,
        debug: bool,
        browser: Arc<dyn BrowserIo>,
        broker: Arc<Broker>,
    ) -> Arc<Self> {
        let (shutdown_tx, _) = watch::channel(false);
        Arc::new(Self {
            id,
            command,
            debug,
            browser,
            broker,
            stdin: Mutex::new(None),
            shutdown_tx,
            read_task: Mutex::new(None),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        })
    }

    /// Spawn the child and start relaying it. Idempotent: a second call is
    /// logged and ignored rather than spawning a second process.
    pub async fn start(self: &Arc<Self>, width: u16, height: u16) {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!(session = %self.id, "start() called more than once, ignoring");
            return;
        }

        let mut command = tokio::process::Command::new("/bin/sh");
        command
            .arg("-c")
            .arg(&self.command)
            .envs(build_environment(width, height, self.debug))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!(session = %self.id, error = %e, "failed to spawn child process");
                return;
            }
        };

        let stdin = child.stdin.take().expect("piped stdin");
        *self.stdin.lock().await = Some(stdin);

        let session = Arc::clone(self);
        let shutdown_rx = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move { session.run(child, shutdown_rx).await });
        *self.read_task.lock().await = Some(handle);
    }

    /// Send raw bytes as a Data frame. `true` iff the write and flush both
    /// completed.
    pub async fn send_bytes(&self, data: Bytes) -> bool {
        self.write_frame(Tag::Data, &data).await
    }

    /// Serialize `obj` and send it as a Meta frame.
    pub async fn send_meta(&self, obj: Value) -> bool {
        let payload = match serde_json::to_vec(&obj) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(session = %self.id, error = %e, "failed to serialize meta message");
                return false;
            }
        };
        self.write_frame(Tag::Meta, &payload).await
    }

    pub async fn set_terminal_size(&self, width: u16, height: u16) -> bool {
        self.send_meta(serde_json::json!({
            "type": "resize",
            "width": width,
            "height": height,
        }))
        .await
    }

    pub async fn blur(&self) -> bool {
        self.send_meta(serde_json::json!({ "type": "blur" })).await
    }

    pub async fn focus(&self) -> bool {
        self.send_meta(serde_json::json!({ "type": "focus" })).await
    }

    /// Cancel this session's downloads, ask the child to quit, and wait for
    /// the read loop to finish. Safe to call more than once.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.broker.cancel_app_downloads(&self.id);
        self.send_meta(serde_json::json!({ "type": "quit" })).await;
        let _ = self.shutdown_tx.send(true);

        let handle = self.read_task.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    async fn write_frame(&self, tag: Tag, payload: &[u8]) -> bool {
        let mut guard = self.stdin.lock().await;
        let Some(stdin) = guard.as_mut() else {
            return false;
        };
        let encoded = frame::encode(tag, payload);
        if stdin.write_all(&encoded).await.is_err() {
            return false;
        }
        stdin.flush().await.is_ok()
    }

    async fn run(self: Arc<Self>, mut child: Child, mut shutdown_rx: watch::Receiver<bool>) {
        let stdout = child.stdout.take().expect("piped stdout");
        let stderr = child.stderr.take().expect("piped stderr");
        let mut stdout = BufReader::new(stdout);

        let stderr_task: JoinHandle<Vec<u8>> = tokio::spawn(async move {
            let mut stderr = stderr;
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                match stderr.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => buf.extend_from_slice(&chunk[..n]),
                }
            }
            buf
        });

        if !self.read_prelude(&mut stdout).await {
            error!(session = %self.id, "application failed to start");
        }

        loop {
            tokio::select! {
                outcome = frame::decode(&mut stdout) => {
                    match outcome {
                        Ok(frame::ReadOutcome::Frame(frame)) => {
                            Self::dispatch_frame(&self, frame).await;
                        }
                        Ok(frame::ReadOutcome::Eof) => break,
                        Err(e) => {
                            warn!(session = %self.id, error = %e, "protocol error reading from child");
                            break;
                        }
                    }
                }
                _ = shutdown_rx.changed() => break,
            }
        }

        let _ = child.start_kill();
        let stderr_data = stderr_task.await.unwrap_or_default();
        if !stderr_data.is_empty() {
            let text = String::from_utf8_lossy(&stderr_data);
            print!("{text}");
        }

        self.broker.cancel_app_downloads(&self.id);
        info!(session = %self.id, "session ended");
    }

    /// Read lines until the ready sentinel, the line limit, or EOF.
    /// Returns whether the sentinel was seen.
    async fn read_prelude<R: AsyncBufReadExt + Unpin>(&self, stdout: &mut R) -> bool {
        for _ in 0..PRELUDE_LINE_LIMIT {
            let mut line = String::new();
            match stdout.read_line(&mut line).await {
                Ok(0) => return false,
                Ok(_) => {
                    if line == READY_SENTINEL {
                        return true;
                    }
                }
                Err(e) => {
                    warn!(session = %self.id, error = %e, "error reading prelude");
                    return false;
                }
            }
        }
        false
    }

    async fn dispatch_frame(session: &Arc<Self>, frame: frame::Frame) {
        match frame.tag {
            Tag::Data => {
                session.browser.write_bytes(frame.payload).await;
            }
            Tag::Meta => match serde_json::from_slice::<Value>(&frame.payload) {
                Ok(meta) => router::handle_meta(session, &session.broker, meta).await,
                Err(e) => {
                    warn!(session = %session.id, error = %e, "malformed meta payload");
                }
            },
            Tag::Packed => match packed::decode(frame.payload) {
                Ok(values) => router::handle_packed(&session.broker, values),
                Err(e) => {
                    warn!(session = %session.id, error = %e, "malformed packed payload");
                }
            },
            Tag::Unknown(tag) => {
                debug!(session = %session.id, tag, "ignoring unknown frame tag");
            }
        }
    }
}

fn build_environment(width: u16, height: u16, debug: bool) -> Vec<(String, String)> {
    let mut env = vec![
        (
            "TEXTUAL_DRIVER".to_string(),
            "textual.drivers.web_driver:WebDriver".to_string(),
        ),
        ("TEXTUAL_FPS".to_string(), "60".to_string()),
        ("TEXTUAL_COLOR_SYSTEM".to_string(), "truecolor".to_string()),
        ("TERM_PROGRAM".to_string(), "textual".to_string()),
        (
            "TERM_PROGRAM_VERSION".to_string(),
            env!("CARGO_PKG_VERSION").to_string(),
        ),
        ("COLUMNS".to_string(), width.to_string()),
        ("ROWS".to_string(), height.to_string()),
    ];
    if debug {
        env.push(("TEXTUAL".to_string(), "debug,devtools".to_string()));
        env.push(("TEXTUAL_LOG".to_string(), "textual.log".to_string()));
    }
    env
}

#[cfg(test)]
mod tests {
    use super::browser_io::test_support::RecordingBrowserIo;
    use super::*;

    #[test]
    fn environment_carries_terminal_dimensions() {
        let env = build_environment(120, 40, false);
        assert!(env.contains(&("COLUMNS".to_string(), "120".to_string())));
        assert!(env.contains(&("ROWS".to_string(), "40".to_string())));
        assert!(!env.iter().any(|(k, _)| k == "TEXTUAL"));
    }

    #[test]
    fn debug_flag_adds_devtools_env() {
        let env = build_environment(80, 24, true);
        assert!(env.contains(&("TEXTUAL".to_string(), "debug,devtools".to_string())));
        assert!(env.contains(&(
            "TEXTUAL_LOG".to_string(),
            "textual.log".to_string()
        )));
    }

    #[tokio::test]
    async fn send_bytes_fails_before_start() {
        let browser = Arc::new(RecordingBrowserIo::default());
        let broker = Arc::new(Broker::new());
        let session = Session::new("s1".to_string(), "true".to_string(), false, browser, broker);
        assert!(!session.send_bytes(Bytes::from_static(b"hi")).await);
    }

    #[tokio::test]
    async fn stop_is_idempotent_without_a_running_child() {
        let browser = Arc::new(RecordingBrowserIo::default());
        let broker = Arc::new(Broker::new());
        let session = Session::new("s1".to_string(), "true".to_string(), false, browser, broker);
        session.stop().await;
        session.stop().await;
    }
}
