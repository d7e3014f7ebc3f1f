//! Read-cycle drivers.
//!
//! A worker picks up one readable socket, runs exactly one read cycle on it
//! (one HTTP request, one upgrade exchange, or one WebSocket message) and
//! returns to the pool. The three drivers here are the entry points the
//! dispatch table routes to; each drives the transport to completion of its
//! protocol unit, invokes the application callback, and answers through the
//! response or frame writer.
//!
//! Application callbacks run behind a panic boundary: a panicking handler is
//! reported through the notifier and terminates only the current cycle.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::thread;

use strand_core::{EngineError, HttpResponse, Limits, Notifier, ShutdownFlag};

use crate::buffer::RecvBuffer;
use crate::dispatch::{ConnectionSlot, HandlerKind};
use crate::headers;
use crate::parser::{RequestView, find_header_end};
use crate::response::{ResponseWriter, reply_code, send_response};
use crate::transport::{RecvStep, SendStatus, Transport, recv_step, send_all};
use crate::websocket::{MessageOutcome, Opcode, accept_key, build_upgrade_response, read_message};

/// Header the upgrade handshake extracts.
const SEC_WEBSOCKET_KEY: &[u8] = b"sec-websocket-key";

// ============================================================================
// Application callbacks
// ============================================================================

/// Handles one parsed HTTP request.
pub trait RequestHandler: Send + Sync {
    /// Produces the response for `request`. The request view (and the buffer
    /// behind it) is valid only for the duration of the call.
    fn handle(&self, request: &HttpRequest<'_>) -> HttpResponse;
}

impl<F> RequestHandler for F
where
    F: Fn(&HttpRequest<'_>) -> HttpResponse + Send + Sync,
{
    fn handle(&self, request: &HttpRequest<'_>) -> HttpResponse {
        self(request)
    }
}

/// Decides whether a WebSocket upgrade request is accepted.
pub trait UpgradeGate: Send + Sync {
    /// Returns true to accept the upgrade.
    fn allow(&self, request: &HttpRequest<'_>) -> bool;
}

impl<F> UpgradeGate for F
where
    F: Fn(&HttpRequest<'_>) -> bool + Send + Sync,
{
    fn allow(&self, request: &HttpRequest<'_>) -> bool {
        self(request)
    }
}

/// Receives complete, unmasked WebSocket messages.
pub trait MessageHandler: Send + Sync {
    /// Called with the message's effective opcode (Text or Binary) and its
    /// payload. The payload view is valid only for the duration of the call.
    fn on_message(&self, opcode: Opcode, payload: &[u8]);
}

impl<F> MessageHandler for F
where
    F: Fn(Opcode, &[u8]) + Send + Sync,
{
    fn on_message(&self, opcode: Opcode, payload: &[u8]) {
        self(opcode, payload);
    }
}

/// The application side of the engine, one callback per entry point.
pub struct AppCallbacks<'a> {
    /// Plain HTTP requests.
    pub request: &'a dyn RequestHandler,
    /// WebSocket upgrade decisions.
    pub upgrade: &'a dyn UpgradeGate,
    /// WebSocket messages.
    pub message: &'a dyn MessageHandler,
}

// ============================================================================
// Request view handed to callbacks
// ============================================================================

/// Read-only view of one parsed request, borrowing the worker's buffer.
pub struct HttpRequest<'b> {
    buf: &'b [u8],
    view: RequestView,
    content_len: usize,
}

impl<'b> HttpRequest<'b> {
    /// The method bytes, e.g. `GET`.
    #[must_use]
    pub fn method(&self) -> &'b [u8] {
        self.view.method(self.buf)
    }

    /// The request URI bytes.
    #[must_use]
    pub fn uri(&self) -> &'b [u8] {
        self.view.uri(self.buf)
    }

    /// The body bytes, as bounded by `Content-Length`.
    #[must_use]
    pub fn body(&self) -> &'b [u8] {
        match self.view.body_start() {
            Some(start) => &self.buf[start..start + self.content_len],
            None => &[],
        }
    }

    /// Parsed `Content-Length`, 0 when absent.
    #[must_use]
    pub fn content_length(&self) -> usize {
        self.content_len
    }

    /// Looks up a single header value; `name` must be lowercase.
    #[must_use]
    pub fn header(&self, name: &[u8]) -> Option<&'b [u8]> {
        let mut slots = [None];
        headers::extract_fixed(self.view.header_block(self.buf), &[name], &mut slots);
        slots[0]
    }

    /// Collects every header into a map keyed by lowercased name.
    #[must_use]
    pub fn headers(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        headers::extract_map(self.view.header_block(self.buf), &mut map);
        map
    }
}

// ============================================================================
// Worker state and outcomes
// ============================================================================

/// The state a worker owns for its lifetime: one receive buffer, one request
/// view, one response writer and one frame scratch buffer, all reset per
/// cycle so steady-state processing does not allocate.
pub struct WorkerState {
    buf: RecvBuffer,
    view: RequestView,
    writer: ResponseWriter,
    scratch: Vec<u8>,
}

impl WorkerState {
    /// Allocates worker state sized for the given limits; the buffer is big
    /// enough for whichever protocol the worker is handed.
    #[must_use]
    pub fn new(limits: &Limits) -> Self {
        Self {
            buf: RecvBuffer::with_capacity(limits.max_request_len.max(limits.max_ws_request_len)),
            view: RequestView::default(),
            writer: ResponseWriter::new(),
            scratch: Vec::with_capacity(256),
        }
    }
}

/// What the event loop should do with the socket after a read cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Unit completed; keep the socket registered for the next read.
    KeepOpen,
    /// Close the socket and remove it from the loop.
    Close,
    /// Handshake succeeded; the slot is re-tagged for frame reads.
    Upgraded,
    /// WebSocket peer sent Close: fire the connection-lost handler, then
    /// close the socket.
    ConnectionLost,
}

/// Everything a read cycle needs besides the socket and the callbacks.
pub struct CycleContext<'a> {
    /// Size caps and timing knobs.
    pub limits: &'a Limits,
    /// Cooperative shutdown flag.
    pub shutdown: &'a ShutdownFlag,
    /// Diagnostic sink.
    pub notifier: &'a dyn Notifier,
}

/// Routes one readable event to the driver the slot's tag selects.
pub fn run_read_cycle<T: Transport>(
    transport: &mut T,
    slot: &ConnectionSlot,
    state: &mut WorkerState,
    ctx: &CycleContext<'_>,
    app: &AppCallbacks<'_>,
) -> CycleOutcome {
    match slot.kind() {
        HandlerKind::HttpRead => http_read_cycle(transport, state, ctx, app.request),
        HandlerKind::WsUpgrade => upgrade_read_cycle(transport, slot, state, ctx, app.upgrade),
        HandlerKind::WsMessage => ws_read_cycle(transport, state, ctx, app.message),
    }
}

// ============================================================================
// HTTP
// ============================================================================

/// Reads one HTTP request, dispatches it, sends the response.
pub fn http_read_cycle<T: Transport>(
    transport: &mut T,
    state: &mut WorkerState,
    ctx: &CycleContext<'_>,
    handler: &dyn RequestHandler,
) -> CycleOutcome {
    let body_start = match read_request(transport, state, ctx) {
        Ok(body_start) => body_start,
        Err(outcome) => return outcome,
    };

    let content_len = headers::content_length(&state.buf.filled()[..body_start]);
    if let Err(outcome) = read_body(transport, state, ctx, body_start, content_len) {
        return outcome;
    }

    let request = HttpRequest {
        buf: state.buf.filled(),
        view: state.view,
        content_len,
    };
    log::debug!(
        "{} {} ({} body bytes)",
        String::from_utf8_lossy(request.method()),
        String::from_utf8_lossy(request.uri()),
        content_len
    );

    let response = match catch_unwind(AssertUnwindSafe(|| handler.handle(&request))) {
        Ok(response) => response,
        Err(payload) => {
            let err = EngineError::Application(panic_message(&*payload));
            ctx.notifier.notify_error(&err.to_string());
            reply_code(transport, ctx.shutdown, &mut state.writer, 500);
            return CycleOutcome::KeepOpen;
        }
    };

    match send_response(transport, ctx.shutdown, &mut state.writer, &response) {
        SendStatus::Sent => CycleOutcome::KeepOpen,
        SendStatus::Shutdown | SendStatus::Benign => CycleOutcome::Close,
        SendStatus::Fatal(e) => {
            ctx.notifier
                .notify_error(&EngineError::Transport(e).to_string());
            CycleOutcome::Close
        }
    }
}

// ============================================================================
// WebSocket upgrade
// ============================================================================

/// Runs the upgrade exchange: parse, extract the key, consult the gate,
/// answer 101 and re-tag the slot.
pub fn upgrade_read_cycle<T: Transport>(
    transport: &mut T,
    slot: &ConnectionSlot,
    state: &mut WorkerState,
    ctx: &CycleContext<'_>,
    gate: &dyn UpgradeGate,
) -> CycleOutcome {
    if let Err(outcome) = read_request(transport, state, ctx) {
        return outcome;
    }

    let mut slots = [None];
    headers::extract_fixed(
        state.view.header_block(state.buf.filled()),
        &[SEC_WEBSOCKET_KEY],
        &mut slots,
    );
    let key = slots[0]
        .and_then(|value| std::str::from_utf8(value).ok())
        .map(str::trim)
        .filter(|key| !key.is_empty());

    let Some(key) = key else {
        log::debug!("upgrade request without Sec-WebSocket-Key");
        return reject_upgrade(transport, state, ctx);
    };
    let key = key.to_owned();

    let request = HttpRequest {
        buf: state.buf.filled(),
        view: state.view,
        content_len: 0,
    };
    let allowed = match catch_unwind(AssertUnwindSafe(|| gate.allow(&request))) {
        Ok(allowed) => allowed,
        Err(payload) => {
            let err = EngineError::Application(panic_message(&*payload));
            ctx.notifier.notify_error(&err.to_string());
            return CycleOutcome::Close;
        }
    };
    if !allowed {
        log::debug!("upgrade rejected by application gate");
        return reject_upgrade(transport, state, ctx);
    }

    let accept = accept_key(&key);
    build_upgrade_response(&accept, &mut state.scratch);
    match send_all(transport, ctx.shutdown, &state.scratch) {
        SendStatus::Sent => {
            slot.set_kind(HandlerKind::WsMessage);
            log::debug!("socket on port {} switched to websocket", slot.port());
            CycleOutcome::Upgraded
        }
        SendStatus::Shutdown | SendStatus::Benign => CycleOutcome::Close,
        SendStatus::Fatal(e) => {
            ctx.notifier
                .notify_error(&EngineError::Transport(e).to_string());
            CycleOutcome::Close
        }
    }
}

/// Failure path for a refused handshake: 204, a configured stall to slow
/// down repeated attempts, then close.
fn reject_upgrade<T: Transport>(
    transport: &mut T,
    state: &mut WorkerState,
    ctx: &CycleContext<'_>,
) -> CycleOutcome {
    if let SendStatus::Fatal(e) = reply_code(transport, ctx.shutdown, &mut state.writer, 204) {
        ctx.notifier
            .notify_error(&EngineError::Transport(e).to_string());
    }
    if !ctx.limits.reject_delay.is_zero() {
        thread::sleep(ctx.limits.reject_delay);
    }
    CycleOutcome::Close
}

// ============================================================================
// WebSocket messages
// ============================================================================

/// Reads one logical message and delivers it to the application.
pub fn ws_read_cycle<T: Transport>(
    transport: &mut T,
    state: &mut WorkerState,
    ctx: &CycleContext<'_>,
    on_message: &dyn MessageHandler,
) -> CycleOutcome {
    match read_message(
        transport,
        ctx.shutdown,
        &mut state.buf,
        ctx.limits.max_ws_request_len,
    ) {
        MessageOutcome::Message(opcode) => {
            let payload = state.buf.filled();
            log::debug!("websocket message: {opcode:?}, {} bytes", payload.len());
            if let Err(panic) =
                catch_unwind(AssertUnwindSafe(|| on_message.on_message(opcode, payload)))
            {
                let err = EngineError::Application(panic_message(&*panic));
                ctx.notifier.notify_error(&err.to_string());
            }
            CycleOutcome::KeepOpen
        }
        MessageOutcome::Closed => CycleOutcome::ConnectionLost,
        MessageOutcome::PeerClosed | MessageOutcome::Shutdown | MessageOutcome::Benign => {
            CycleOutcome::Close
        }
        MessageOutcome::Failed(err) => {
            ctx.notifier.notify_error(&err.to_string());
            CycleOutcome::Close
        }
    }
}

// ============================================================================
// Shared read plumbing
// ============================================================================

/// Reads until the header terminator, then parses the request line.
/// Returns the body start offset.
fn read_request<T: Transport>(
    transport: &mut T,
    state: &mut WorkerState,
    ctx: &CycleContext<'_>,
) -> Result<usize, CycleOutcome> {
    state.buf.clear();
    state.view.reset();

    let cap = ctx.limits.max_request_len;
    let mut prev = 0;
    let body_start = loop {
        if state.buf.len() >= cap {
            let err = EngineError::from(strand_core::ProtocolError::RequestTooLarge { limit: cap });
            ctx.notifier.notify_error(&err.to_string());
            return Err(CycleOutcome::Close);
        }
        let want = (cap - state.buf.len()).min(state.buf.remaining());
        let spare = &mut state.buf.spare_mut()[..want];
        match recv_step(transport, ctx.shutdown, spare) {
            RecvStep::Data(n) => {
                state.buf.advance(n);
                if let Some(end) = find_header_end(state.buf.filled(), prev) {
                    state.view.set_body_start(end);
                    break end;
                }
                prev = state.buf.len();
            }
            RecvStep::Closed | RecvStep::Shutdown | RecvStep::Benign => {
                return Err(CycleOutcome::Close);
            }
            RecvStep::Fatal(e) => {
                ctx.notifier
                    .notify_error(&EngineError::Transport(e).to_string());
                return Err(CycleOutcome::Close);
            }
        }
    };

    if let Err(e) = state.view.parse(state.buf.filled()) {
        ctx.notifier.notify_error(&EngineError::from(e).to_string());
        return Err(CycleOutcome::Close);
    }
    Ok(body_start)
}

/// Reads until `Content-Length` more bytes follow the header block.
fn read_body<T: Transport>(
    transport: &mut T,
    state: &mut WorkerState,
    ctx: &CycleContext<'_>,
    body_start: usize,
    content_len: usize,
) -> Result<(), CycleOutcome> {
    let total = body_start + content_len;
    if total > ctx.limits.max_request_len {
        let err = EngineError::from(strand_core::ProtocolError::RequestTooLarge {
            limit: ctx.limits.max_request_len,
        });
        ctx.notifier.notify_error(&err.to_string());
        return Err(CycleOutcome::Close);
    }

    while state.buf.len() < total {
        let want = (total - state.buf.len()).min(state.buf.remaining());
        let spare = &mut state.buf.spare_mut()[..want];
        match recv_step(transport, ctx.shutdown, spare) {
            RecvStep::Data(n) => state.buf.advance(n),
            RecvStep::Closed | RecvStep::Shutdown | RecvStep::Benign => {
                return Err(CycleOutcome::Close);
            }
            RecvStep::Fatal(e) => {
                ctx.notifier
                    .notify_error(&EngineError::Transport(e).to_string());
                return Err(CycleOutcome::Close);
            }
        }
    }
    Ok(())
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "opaque panic payload".to_string()
    }
}
