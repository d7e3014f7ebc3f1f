//! Shared test doubles.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::sync::Mutex;

use strand_core::Notifier;
use strand_http::Transport;

/// In-memory socket double. Each `recv` returns at most one scripted chunk,
/// so tests control exactly how a byte stream is partitioned across reads.
/// Once the script is exhausted `recv` reports orderly close.
pub struct FakeSocket {
    chunks: VecDeque<Vec<u8>>,
    pub sent: Vec<u8>,
}

impl FakeSocket {
    /// A socket that delivers `stream` in a single read.
    pub fn whole(stream: &[u8]) -> Self {
        Self {
            chunks: VecDeque::from([stream.to_vec()]),
            sent: Vec::new(),
        }
    }

    /// A socket that delivers `stream` split at the given chunk sizes; any
    /// remainder forms a final chunk.
    pub fn chunked(stream: &[u8], sizes: &[usize]) -> Self {
        let mut chunks = VecDeque::new();
        let mut rest = stream;
        for &size in sizes {
            let take = size.min(rest.len());
            if take == 0 {
                continue;
            }
            chunks.push_back(rest[..take].to_vec());
            rest = &rest[take..];
        }
        if !rest.is_empty() {
            chunks.push_back(rest.to_vec());
        }
        Self {
            chunks,
            sent: Vec::new(),
        }
    }

    /// A socket scripted from explicit chunks (e.g. request, then frames).
    pub fn scripted(chunks: &[&[u8]]) -> Self {
        Self {
            chunks: chunks.iter().map(|c| c.to_vec()).collect(),
            sent: Vec::new(),
        }
    }

    /// The bytes the engine sent, as UTF-8 for assertions.
    pub fn sent_text(&self) -> String {
        String::from_utf8_lossy(&self.sent).into_owned()
    }
}

impl Transport for FakeSocket {
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(chunk) = self.chunks.front_mut() else {
            return Ok(0);
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        chunk.drain(..n);
        if chunk.is_empty() {
            self.chunks.pop_front();
        }
        Ok(n)
    }

    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.sent.extend_from_slice(buf);
        Ok(buf.len())
    }
}

/// Socket double that fails every operation with a fixed errno.
pub struct FailingSocket(pub i32);

impl Transport for FailingSocket {
    fn recv(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::from_raw_os_error(self.0))
    }

    fn send(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::from_raw_os_error(self.0))
    }
}

/// Notifier double collecting every diagnostic.
#[derive(Default)]
pub struct CollectNotifier(pub Mutex<Vec<String>>);

impl CollectNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

impl Notifier for CollectNotifier {
    fn notify_error(&self, message: &str) {
        self.0.lock().unwrap().push(message.to_string());
    }
}
