//! Engine limits and tuning knobs.

use std::time::Duration;

/// Default cap on a single header block, exposed to header-reading helpers.
pub const DEFAULT_MAX_HEADER_LEN: usize = 10_000;

/// Default cap on a single HTTP request (request line + headers + body).
pub const DEFAULT_MAX_REQUEST_LEN: usize = 100_000;

/// Default cap on a single WebSocket message across all of its frames.
pub const DEFAULT_MAX_WS_REQUEST_LEN: usize = 100_000;

/// Default delay before closing a socket whose upgrade was rejected.
pub const DEFAULT_REJECT_DELAY: Duration = Duration::from_secs(3);

/// Size caps and timing knobs for the engine.
///
/// One `Limits` value is shared by every worker. Exceeding
/// [`max_request_len`](Self::max_request_len) or
/// [`max_ws_request_len`](Self::max_ws_request_len) closes the offending
/// socket; [`max_header_len`](Self::max_header_len) is advisory and not
/// enforced by the core itself.
#[derive(Debug, Clone)]
pub struct Limits {
    /// Cap on a header block in bytes.
    pub max_header_len: usize,
    /// Cap on a single HTTP request buffer in bytes.
    pub max_request_len: usize,
    /// Cap on a single WebSocket message in bytes.
    pub max_ws_request_len: usize,
    /// How long to stall a rejected WebSocket upgrade before closing.
    pub reject_delay: Duration,
}

impl Limits {
    /// Creates limits with the default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_header_len: DEFAULT_MAX_HEADER_LEN,
            max_request_len: DEFAULT_MAX_REQUEST_LEN,
            max_ws_request_len: DEFAULT_MAX_WS_REQUEST_LEN,
            reject_delay: DEFAULT_REJECT_DELAY,
        }
    }

    /// Sets the header block cap.
    #[must_use]
    pub fn with_max_header_len(mut self, len: usize) -> Self {
        self.max_header_len = len;
        self
    }

    /// Sets the HTTP request cap.
    #[must_use]
    pub fn with_max_request_len(mut self, len: usize) -> Self {
        self.max_request_len = len;
        self
    }

    /// Sets the WebSocket message cap.
    #[must_use]
    pub fn with_max_ws_request_len(mut self, len: usize) -> Self {
        self.max_ws_request_len = len;
        self
    }

    /// Sets the rejected-upgrade stall.
    #[must_use]
    pub fn with_reject_delay(mut self, delay: Duration) -> Self {
        self.reject_delay = delay;
        self
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self::new()
    }
}
