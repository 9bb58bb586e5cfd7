//! Error taxonomy for the gateway core.
//!
//! Protocol/lookup/startup failures get a typed variant here. Transient I/O
//! (a failed write to the child or to the websocket) never does — those are
//! represented as a plain `bool`/`Option` at the call site, per the
//! propagation policy: one dead write should end a session on its next read,
//! not bubble up as an error anyone has to handle.

use thiserror::Error;

/// Errors raised while decoding the child's wire protocol.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame length {len} exceeds the {max} byte ceiling")]
    FrameTooLarge { len: u32, max: u32 },

    #[error("malformed meta payload: {0}")]
    InvalidMeta(#[from] serde_json::Error),

    #[error("malformed packed payload: {0}")]
    InvalidPacked(String),
}

/// Errors surfaced by the download broker.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("no active download for key {0:?}")]
    NotFound(String),
}
