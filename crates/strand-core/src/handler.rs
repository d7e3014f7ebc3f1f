//! Types crossing the application callback boundary.

/// A response produced by an application request handler.
///
/// The engine formats this into a status line, the listed header lines, a
/// `Content-Length` header and the body. Headers the engine writes itself
/// (the status line and `Content-Length`) must not be listed here.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Additional header lines, in order.
    pub headers: Vec<(String, String)>,
    /// Response body; empty means `Content-Length: 0`.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response with the given status and no headers or body.
    #[must_use]
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Appends a header line.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }
}

/// Diagnostic sink for non-fatal errors.
///
/// Invoked synchronously from whichever worker hit the error; implementations
/// must be prepared for concurrent calls but the engine makes no further
/// thread-safety guarantee.
pub trait Notifier: Send + Sync {
    /// Reports a diagnostic message.
    fn notify_error(&self, message: &str);
}

impl<F> Notifier for F
where
    F: Fn(&str) + Send + Sync,
{
    fn notify_error(&self, message: &str) {
        self(message);
    }
}

/// Notifier that forwards diagnostics to the `log` facade at warn level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify_error(&self, message: &str) {
        log::warn!("{message}");
    }
}
