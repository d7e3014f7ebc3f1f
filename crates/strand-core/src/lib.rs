//! Shared vocabulary for the strand HTTP/WebSocket engine.
//!
//! This crate carries the pieces both the engine and its embedders need to
//! agree on: parsing limits, the error taxonomy, the cooperative shutdown
//! flag, and the response/notification types that cross the callback
//! boundary. The engine itself lives in `strand-http`.

#![deny(unsafe_code)]

mod config;
mod error;
mod handler;
mod shutdown;

pub use config::{
    DEFAULT_MAX_HEADER_LEN, DEFAULT_MAX_REQUEST_LEN, DEFAULT_MAX_WS_REQUEST_LEN,
    DEFAULT_REJECT_DELAY, Limits,
};
pub use error::{BENIGN_ERRNOS, EngineError, ProtocolError, is_benign_io_error};
pub use handler::{HttpResponse, LogNotifier, Notifier};
pub use shutdown::ShutdownFlag;
