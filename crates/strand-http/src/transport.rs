//! Blocking transport seam.
//!
//! The engine never owns sockets; it drives anything implementing
//! [`Transport`], with POSIX-like semantics: `recv` returning `Ok(0)` means
//! the peer closed in an orderly fashion, errors are classified against the
//! benign errno set, and the socket is treated as blocking for the duration
//! of one read cycle. The external event loop handles readiness and
//! lifecycle.

use std::io::{self, Read, Write};
use std::net::TcpStream;

use strand_core::{ShutdownFlag, is_benign_io_error};

/// A bidirectional byte stream associated with one client socket.
pub trait Transport {
    /// Receives up to `buf.len()` bytes. `Ok(0)` means orderly peer close.
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Sends up to `buf.len()` bytes, returning the count written.
    fn send(&mut self, buf: &[u8]) -> io::Result<usize>;
}

impl Transport for TcpStream {
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read(buf)
    }

    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write(buf)
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).recv(buf)
    }

    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        (**self).send(buf)
    }
}

/// Outcome of one `recv` attempt, with shutdown and errno classification
/// already applied.
#[derive(Debug)]
pub(crate) enum RecvStep {
    /// `n > 0` bytes arrived.
    Data(usize),
    /// Orderly peer close.
    Closed,
    /// Shutdown flag observed before or after the call.
    Shutdown,
    /// Error from the benign set; absorbed silently.
    Benign,
    /// Any other error.
    Fatal(io::Error),
}

/// One `recv` into `buf`, bracketed by shutdown polls.
pub(crate) fn recv_step<T: Transport>(
    transport: &mut T,
    shutdown: &ShutdownFlag,
    buf: &mut [u8],
) -> RecvStep {
    if shutdown.is_set() {
        return RecvStep::Shutdown;
    }
    let step = match transport.recv(buf) {
        Ok(0) => RecvStep::Closed,
        Ok(n) => RecvStep::Data(n),
        Err(e) if is_benign_io_error(&e) => RecvStep::Benign,
        Err(e) => RecvStep::Fatal(e),
    };
    if shutdown.is_set() {
        return RecvStep::Shutdown;
    }
    step
}

/// Outcome of draining a whole buffer through `send`.
#[derive(Debug)]
pub enum SendStatus {
    /// Every byte was written.
    Sent,
    /// Shutdown flag observed; the write was abandoned.
    Shutdown,
    /// Error from the benign set; the socket is going away anyway.
    Benign,
    /// Any other error.
    Fatal(io::Error),
}

impl SendStatus {
    /// Returns true if the full buffer reached the transport.
    #[must_use]
    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent)
    }
}

/// Writes all of `bytes`, retrying short writes until the buffer is drained
/// or the socket fails. The shutdown flag is polled around every attempt.
pub fn send_all<T: Transport>(
    transport: &mut T,
    shutdown: &ShutdownFlag,
    mut bytes: &[u8],
) -> SendStatus {
    while !bytes.is_empty() {
        if shutdown.is_set() {
            return SendStatus::Shutdown;
        }
        match transport.send(bytes) {
            Ok(0) => {
                return SendStatus::Fatal(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "transport accepted no bytes",
                ));
            }
            Ok(n) => bytes = &bytes[n..],
            Err(e) if is_benign_io_error(&e) => return SendStatus::Benign,
            Err(e) => return SendStatus::Fatal(e),
        }
    }
    if shutdown.is_set() {
        return SendStatus::Shutdown;
    }
    SendStatus::Sent
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Transport double that trickles writes one byte at a time.
    struct Trickle {
        written: Vec<u8>,
    }

    impl Transport for Trickle {
        fn recv(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Ok(0)
        }

        fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.push(buf[0]);
            Ok(1)
        }
    }

    #[test]
    fn send_all_drains_short_writes() {
        let mut t = Trickle { written: Vec::new() };
        let status = send_all(&mut t, &ShutdownFlag::new(), b"hello");
        assert!(status.is_sent());
        assert_eq!(t.written, b"hello");
    }

    #[test]
    fn send_all_abandons_on_shutdown() {
        let mut t = Trickle { written: Vec::new() };
        let flag = ShutdownFlag::new();
        flag.trigger();
        let status = send_all(&mut t, &flag, b"hello");
        assert!(matches!(status, SendStatus::Shutdown));
        assert!(t.written.is_empty());
    }

    struct Failing(i32);

    impl Transport for Failing {
        fn recv(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::from_raw_os_error(self.0))
        }

        fn send(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from_raw_os_error(self.0))
        }
    }

    #[test]
    fn benign_errors_are_absorbed() {
        // EPIPE
        let mut t = Failing(32);
        assert!(matches!(
            send_all(&mut t, &ShutdownFlag::new(), b"x"),
            SendStatus::Benign
        ));
    }

    #[test]
    fn fatal_errors_are_surfaced() {
        // ECONNREFUSED
        let mut t = Failing(111);
        assert!(matches!(
            send_all(&mut t, &ShutdownFlag::new(), b"x"),
            SendStatus::Fatal(_)
        ));
    }

    #[test]
    fn recv_step_classifies() {
        let flag = ShutdownFlag::new();
        let mut buf = [0u8; 4];

        let mut closed = Trickle { written: Vec::new() };
        assert!(matches!(
            recv_step(&mut closed, &flag, &mut buf),
            RecvStep::Closed
        ));

        let mut benign = Failing(104);
        assert!(matches!(
            recv_step(&mut benign, &flag, &mut buf),
            RecvStep::Benign
        ));

        flag.trigger();
        assert!(matches!(
            recv_step(&mut benign, &flag, &mut buf),
            RecvStep::Shutdown
        ));
    }
}
