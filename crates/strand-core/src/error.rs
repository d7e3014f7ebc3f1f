//! Error taxonomy.
//!
//! Errors fall into the classes the worker loop cares about: protocol
//! violations (close + report, skip the application callback), transport
//! failures (close, report unless benign), orderly peer close, cooperative
//! shutdown, and application failures surfaced from user callbacks. Nothing
//! is retried and no error escapes the current read cycle.

use std::io;

/// Errnos absorbed silently on `recv`/`send` failure: ENOENT, EBADF, EPIPE,
/// ECONNRESET. A socket failing with one of these is already being torn down
/// elsewhere.
pub const BENIGN_ERRNOS: [i32; 4] = [2, 9, 32, 104];

/// Returns true if an I/O error belongs to the benign set.
///
/// Classification prefers the raw OS errno; when the error carries none
/// (synthetic errors from test doubles), the `ErrorKind` equivalents of the
/// benign errnos are used instead.
#[must_use]
pub fn is_benign_io_error(err: &io::Error) -> bool {
    if let Some(errno) = err.raw_os_error() {
        return BENIGN_ERRNOS.contains(&errno);
    }
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset
    )
}

/// A violation of the HTTP/1.1 or WebSocket wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// Fewer bytes than the shortest parseable request line.
    RequestTooShort { len: usize },
    /// Request line is missing a method or URI delimiter.
    MalformedRequestLine,
    /// The version field is not HTTP/1.1.
    UnsupportedVersion,
    /// Request grew past the configured cap.
    RequestTooLarge { limit: usize },
    /// WebSocket message grew past the configured cap.
    MessageTooLarge { limit: usize },
    /// RSV1/RSV2/RSV3 set without a negotiated extension.
    ReservedBitsSet,
    /// Opcode nibble outside the RFC 6455 set.
    UnknownOpcode(u8),
    /// Continuation frame with no message in progress.
    StrayContinuation,
    /// New data frame while the previous message is incomplete.
    InterleavedMessage,
    /// Control frame payload longer than 125 bytes.
    ControlFrameTooLong,
    /// Control frame with the FIN bit clear.
    FragmentedControlFrame,
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RequestTooShort { len } => write!(f, "request too short ({len} bytes)"),
            Self::MalformedRequestLine => write!(f, "malformed request line"),
            Self::UnsupportedVersion => write!(f, "unsupported HTTP version"),
            Self::RequestTooLarge { limit } => {
                write!(f, "request exceeds {limit} bytes")
            }
            Self::MessageTooLarge { limit } => {
                write!(f, "websocket message exceeds {limit} bytes")
            }
            Self::ReservedBitsSet => write!(f, "reserved frame bits set"),
            Self::UnknownOpcode(op) => write!(f, "unknown opcode 0x{op:X}"),
            Self::StrayContinuation => {
                write!(f, "continuation frame without an initial frame")
            }
            Self::InterleavedMessage => {
                write!(f, "new data frame while a message is incomplete")
            }
            Self::ControlFrameTooLong => {
                write!(f, "control frame payload exceeds 125 bytes")
            }
            Self::FragmentedControlFrame => write!(f, "fragmented control frame"),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Any failure a read cycle can end with.
#[derive(Debug)]
pub enum EngineError {
    /// Wire protocol violation.
    Protocol(ProtocolError),
    /// `recv`/`send` failed outside the benign set.
    Transport(io::Error),
    /// Peer closed the connection in an orderly fashion.
    PeerClosed,
    /// The cooperative shutdown flag was observed mid-cycle.
    Shutdown,
    /// A user callback failed; the message is its panic payload.
    Application(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Protocol(e) => write!(f, "protocol error: {e}"),
            Self::Transport(e) => write!(f, "transport error: {e}"),
            Self::PeerClosed => write!(f, "peer closed connection"),
            Self::Shutdown => write!(f, "shutdown requested"),
            Self::Application(msg) => write!(f, "application callback failed: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Protocol(e) => Some(e),
            Self::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ProtocolError> for EngineError {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}

impl From<io::Error> for EngineError {
    fn from(e: io::Error) -> Self {
        Self::Transport(e)
    }
}
