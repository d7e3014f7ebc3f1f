//! HTTP/1.1 request parsing and WebSocket framing engine.
//!
//! This crate is the protocol core of the strand server runtime. It takes a
//! readable socket (anything implementing [`Transport`]) plus a per-worker
//! [`WorkerState`], runs one read cycle on it (one HTTP request, one
//! WebSocket upgrade exchange, or one WebSocket message), and tells the
//! external event loop what to do with the socket next.
//!
//! # Zero-copy views
//!
//! Parsing produces offsets into the worker's receive buffer rather than
//! copies: [`RequestView`] describes the method, URI and body; WebSocket
//! payloads accumulate (and are unmasked) in place. Application callbacks
//! borrow the buffer for the duration of the call.
//!
//! # What lives elsewhere
//!
//! The accept/poll loop, socket registry, timers and TLS are external
//! collaborators. They hand the engine a `(slot, socket)` pair when a read is
//! possible, and act on the returned [`CycleOutcome`].
//!
//! # Example
//!
//! ```ignore
//! use strand_core::{Limits, LogNotifier, ShutdownFlag};
//! use strand_http::{AppCallbacks, CycleContext, WorkerState, run_read_cycle};
//!
//! let limits = Limits::new();
//! let shutdown = ShutdownFlag::new();
//! let mut state = WorkerState::new(&limits);
//! let ctx = CycleContext {
//!     limits: &limits,
//!     shutdown: &shutdown,
//!     notifier: &LogNotifier,
//! };
//! let outcome = run_read_cycle(&mut socket, &slot, &mut state, &ctx, &app);
//! ```

#![deny(unsafe_code)]

mod buffer;
mod connection;
mod dispatch;
mod headers;
mod parser;
mod response;
mod transport;
mod websocket;

pub use buffer::RecvBuffer;
pub use connection::{
    AppCallbacks, CycleContext, CycleOutcome, HttpRequest, MessageHandler, RequestHandler,
    UpgradeGate, WorkerState, http_read_cycle, run_read_cycle, upgrade_read_cycle, ws_read_cycle,
};
pub use dispatch::{ConnectionSlot, DispatchTable, HandlerKind};
pub use headers::{content_length, extract_fixed, extract_map};
pub use parser::{MIN_REQUEST_LEN, RequestView, find_header_end};
pub use response::{
    ResponseWriter, reason_phrase, reply, reply_code, send_response,
};
pub use transport::{SendStatus, Transport, send_all};
pub use websocket::{
    MessageOutcome, Opcode, WS_GUID, accept_key, build_upgrade_response, read_message,
    send_message, unmask_in_place, write_close_frame, write_frame, write_pong_frame,
};
