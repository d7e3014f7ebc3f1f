//! HTTP response formatting and transmission.

use strand_core::{HttpResponse, ShutdownFlag};

use crate::transport::{SendStatus, Transport, send_all};

/// Formats HTTP/1.1 responses into a reusable buffer.
///
/// The buffer is cleared on every format call, so one writer per worker
/// serves every response that worker produces.
#[derive(Debug, Default)]
pub struct ResponseWriter {
    buffer: Vec<u8>,
}

impl ResponseWriter {
    /// Creates a writer with a small pre-allocated buffer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(1024),
        }
    }

    /// Formats a full response: status line, the given header lines, a
    /// `Content-Length` header, and the body.
    pub fn format(&mut self, status: u16, headers: &[(&str, &str)], body: &[u8]) -> &[u8] {
        self.buffer.clear();
        self.write_status_line(status);
        for (name, value) in headers {
            self.buffer.extend_from_slice(name.as_bytes());
            self.buffer.extend_from_slice(b": ");
            self.buffer.extend_from_slice(value.as_bytes());
            self.buffer.extend_from_slice(b"\r\n");
        }
        self.buffer.extend_from_slice(b"Content-Length: ");
        self.buffer
            .extend_from_slice(body.len().to_string().as_bytes());
        self.buffer.extend_from_slice(b"\r\n\r\n");
        self.buffer.extend_from_slice(body);
        &self.buffer
    }

    /// Formats a bare status: status line followed by an empty header block.
    pub fn format_status(&mut self, status: u16) -> &[u8] {
        self.buffer.clear();
        self.write_status_line(status);
        self.buffer.extend_from_slice(b"\r\n");
        &self.buffer
    }

    fn write_status_line(&mut self, status: u16) {
        self.buffer.extend_from_slice(b"HTTP/1.1 ");
        self.buffer
            .extend_from_slice(status.to_string().as_bytes());
        self.buffer.push(b' ');
        self.buffer
            .extend_from_slice(reason_phrase(status).as_bytes());
        self.buffer.extend_from_slice(b"\r\n");
    }
}

/// Formats and sends a full response, draining short writes.
pub fn reply<T: Transport>(
    transport: &mut T,
    shutdown: &ShutdownFlag,
    writer: &mut ResponseWriter,
    status: u16,
    headers: &[(&str, &str)],
    body: &[u8],
) -> SendStatus {
    writer.format(status, headers, body);
    send_all(transport, shutdown, &writer.buffer)
}

/// Formats and sends a bare status line.
pub fn reply_code<T: Transport>(
    transport: &mut T,
    shutdown: &ShutdownFlag,
    writer: &mut ResponseWriter,
    status: u16,
) -> SendStatus {
    writer.format_status(status);
    send_all(transport, shutdown, &writer.buffer)
}

/// Sends an application-produced [`HttpResponse`].
pub fn send_response<T: Transport>(
    transport: &mut T,
    shutdown: &ShutdownFlag,
    writer: &mut ResponseWriter,
    response: &HttpResponse,
) -> SendStatus {
    writer.buffer.clear();
    writer.write_status_line(response.status);
    for (name, value) in &response.headers {
        writer.buffer.extend_from_slice(name.as_bytes());
        writer.buffer.extend_from_slice(b": ");
        writer.buffer.extend_from_slice(value.as_bytes());
        writer.buffer.extend_from_slice(b"\r\n");
    }
    writer.buffer.extend_from_slice(b"Content-Length: ");
    writer
        .buffer
        .extend_from_slice(response.body.len().to_string().as_bytes());
    writer.buffer.extend_from_slice(b"\r\n\r\n");
    writer.buffer.extend_from_slice(&response.body);
    send_all(transport, shutdown, &writer.buffer)
}

/// Standard reason phrase for a status code.
#[must_use]
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        100 => "Continue",
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        206 => "Partial Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        411 => "Length Required",
        413 => "Payload Too Large",
        414 => "URI Too Long",
        426 => "Upgrade Required",
        429 => "Too Many Requests",
        431 => "Request Header Fields Too Large",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        505 => "HTTP Version Not Supported",
        _ => "Unknown",
    }
}
