//! Handshake and framing scenarios end to end.

mod common;

use std::sync::Mutex;
use std::time::Duration;

use proptest::prelude::*;

use common::{CollectNotifier, FakeSocket};
use strand_core::{HttpResponse, Limits, ShutdownFlag};
use strand_http::{
    AppCallbacks, ConnectionSlot, CycleContext, CycleOutcome, HandlerKind, HttpRequest,
    MessageHandler, Opcode, RequestHandler, UpgradeGate, WorkerState, run_read_cycle,
    upgrade_read_cycle, write_frame, ws_read_cycle,
};

const UPGRADE_REQUEST: &[u8] = b"GET /chat HTTP/1.1\r\n\
    Host: example.com\r\n\
    Upgrade: websocket\r\n\
    Connection: Upgrade\r\n\
    Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
    Sec-WebSocket-Version: 13\r\n\r\n";

/// RFC 6455 masked "Hello" text frame.
const HELLO_FRAME: &[u8] = &[
    0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58,
];

fn test_limits() -> Limits {
    Limits::new().with_reject_delay(Duration::ZERO)
}

struct Recorded {
    messages: Mutex<Vec<(Opcode, Vec<u8>)>>,
}

impl Recorded {
    fn new() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
        }
    }
}

impl MessageHandler for Recorded {
    fn on_message(&self, opcode: Opcode, payload: &[u8]) {
        self.messages.lock().unwrap().push((opcode, payload.to_vec()));
    }
}

fn run_upgrade(
    socket: &mut FakeSocket,
    limits: &Limits,
    accept: bool,
) -> (CycleOutcome, ConnectionSlot, Vec<String>) {
    let shutdown = ShutdownFlag::new();
    let notifier = CollectNotifier::new();
    let slot = ConnectionSlot::new(9001, HandlerKind::WsUpgrade);
    let gate = move |_req: &HttpRequest<'_>| accept;

    let mut state = WorkerState::new(limits);
    let ctx = CycleContext {
        limits,
        shutdown: &shutdown,
        notifier: &notifier,
    };
    let outcome = upgrade_read_cycle(socket, &slot, &mut state, &ctx, &gate);
    (outcome, slot, notifier.messages())
}

#[test]
fn handshake_accept_key_and_headers() {
    let limits = test_limits();
    let mut socket = FakeSocket::whole(UPGRADE_REQUEST);
    let (outcome, slot, diags) = run_upgrade(&mut socket, &limits, true);

    assert_eq!(outcome, CycleOutcome::Upgraded);
    assert!(diags.is_empty());
    assert_eq!(slot.kind(), HandlerKind::WsMessage);

    let text = socket.sent_text();
    assert!(text.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
    assert!(text.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
    assert!(text.contains("Connection: Upgrade\r\n"));
    assert!(text.contains("Upgrade: webSocket\r\n"));
    // Status line + exactly three headers + terminating blank line.
    assert_eq!(text.matches("\r\n").count(), 5);
}

#[test]
fn missing_key_gets_204_and_close() {
    let limits = test_limits();
    let mut socket = FakeSocket::whole(b"GET /chat HTTP/1.1\r\nHost: example.com\r\n\r\n");
    let (outcome, slot, _) = run_upgrade(&mut socket, &limits, true);

    assert_eq!(outcome, CycleOutcome::Close);
    assert_eq!(slot.kind(), HandlerKind::WsUpgrade, "no re-tag on failure");
    assert!(socket.sent_text().starts_with("HTTP/1.1 204 No Content\r\n\r\n"));
}

#[test]
fn rejected_upgrade_gets_204_and_close() {
    let limits = test_limits();
    let mut socket = FakeSocket::whole(UPGRADE_REQUEST);
    let (outcome, slot, _) = run_upgrade(&mut socket, &limits, false);

    assert_eq!(outcome, CycleOutcome::Close);
    assert_eq!(slot.kind(), HandlerKind::WsUpgrade);
    assert!(socket.sent_text().starts_with("HTTP/1.1 204 No Content\r\n\r\n"));
}

#[test]
fn masked_text_frame_is_delivered() {
    let limits = test_limits();
    let shutdown = ShutdownFlag::new();
    let notifier = CollectNotifier::new();
    let recorded = Recorded::new();

    let mut socket = FakeSocket::whole(HELLO_FRAME);
    let mut state = WorkerState::new(&limits);
    let ctx = CycleContext {
        limits: &limits,
        shutdown: &shutdown,
        notifier: &notifier,
    };
    let outcome = ws_read_cycle(&mut socket, &mut state, &ctx, &recorded);

    assert_eq!(outcome, CycleOutcome::KeepOpen);
    let messages = recorded.messages.lock().unwrap();
    assert_eq!(messages.as_slice(), &[(Opcode::Text, b"Hello".to_vec())]);
}

#[test]
fn continuation_frames_form_one_message() {
    let limits = test_limits();
    let shutdown = ShutdownFlag::new();
    let notifier = CollectNotifier::new();
    let recorded = Recorded::new();

    let mask = [0x5A, 0x11, 0x7E, 0x03];
    let mut stream = Vec::new();
    // Text, FIN=0, "Hel"; Continuation, FIN=1, "lo".
    stream.extend_from_slice(&[0x01, 0x83]);
    stream.extend_from_slice(&mask);
    for (i, b) in b"Hel".iter().enumerate() {
        stream.push(b ^ mask[i % 4]);
    }
    stream.extend_from_slice(&[0x80, 0x82]);
    stream.extend_from_slice(&mask);
    for (i, b) in b"lo".iter().enumerate() {
        stream.push(b ^ mask[i % 4]);
    }

    let mut socket = FakeSocket::whole(&stream);
    let mut state = WorkerState::new(&limits);
    let ctx = CycleContext {
        limits: &limits,
        shutdown: &shutdown,
        notifier: &notifier,
    };
    let outcome = ws_read_cycle(&mut socket, &mut state, &ctx, &recorded);

    assert_eq!(outcome, CycleOutcome::KeepOpen);
    let messages = recorded.messages.lock().unwrap();
    assert_eq!(messages.as_slice(), &[(Opcode::Text, b"Hello".to_vec())]);
}

#[test]
fn close_frame_reports_connection_lost() {
    let limits = test_limits();
    let shutdown = ShutdownFlag::new();
    let notifier = CollectNotifier::new();
    let recorded = Recorded::new();

    let mut socket = FakeSocket::whole(&[0x88, 0x00]);
    let mut state = WorkerState::new(&limits);
    let ctx = CycleContext {
        limits: &limits,
        shutdown: &shutdown,
        notifier: &notifier,
    };
    let outcome = ws_read_cycle(&mut socket, &mut state, &ctx, &recorded);

    assert_eq!(outcome, CycleOutcome::ConnectionLost);
    assert!(recorded.messages.lock().unwrap().is_empty());
    assert!(notifier.messages().is_empty());
}

#[test]
fn upgrade_then_message_via_dispatch() {
    // The accept exchange and the first frame read are routed through the
    // slot's tag, as two separate read cycles.
    let limits = test_limits();
    let shutdown = ShutdownFlag::new();
    let notifier = CollectNotifier::new();
    let recorded = Recorded::new();

    let request_handler =
        |_req: &HttpRequest<'_>| -> HttpResponse { HttpResponse::new(404) };
    let gate = |_req: &HttpRequest<'_>| true;
    let request_handler: &dyn RequestHandler = &request_handler;
    let gate: &dyn UpgradeGate = &gate;
    let app = AppCallbacks {
        request: request_handler,
        upgrade: gate,
        message: &recorded,
    };

    let mut socket = FakeSocket::scripted(&[UPGRADE_REQUEST, HELLO_FRAME]);
    let slot = ConnectionSlot::new(9001, HandlerKind::WsUpgrade);
    let mut state = WorkerState::new(&limits);
    let ctx = CycleContext {
        limits: &limits,
        shutdown: &shutdown,
        notifier: &notifier,
    };

    let outcome = run_read_cycle(&mut socket, &slot, &mut state, &ctx, &app);
    assert_eq!(outcome, CycleOutcome::Upgraded);
    assert_eq!(slot.kind(), HandlerKind::WsMessage);

    let outcome = run_read_cycle(&mut socket, &slot, &mut state, &ctx, &app);
    assert_eq!(outcome, CycleOutcome::KeepOpen);
    let messages = recorded.messages.lock().unwrap();
    assert_eq!(messages.as_slice(), &[(Opcode::Text, b"Hello".to_vec())]);
}

#[test]
fn protocol_violation_is_reported() {
    let limits = test_limits();
    let shutdown = ShutdownFlag::new();
    let notifier = CollectNotifier::new();
    let recorded = Recorded::new();

    // RSV1 set.
    let mut socket = FakeSocket::whole(&[0xC1, 0x01, b'x']);
    let mut state = WorkerState::new(&limits);
    let ctx = CycleContext {
        limits: &limits,
        shutdown: &shutdown,
        notifier: &notifier,
    };
    let outcome = ws_read_cycle(&mut socket, &mut state, &ctx, &recorded);

    assert_eq!(outcome, CycleOutcome::Close);
    assert!(notifier.messages()[0].contains("reserved"));
}

// ============================================================================
// Framing laws
// ============================================================================

/// Decodes the payload length field of an encoded frame header.
fn decode_len(frame: &[u8]) -> u64 {
    match frame[1] & 0x7F {
        126 => u64::from(u16::from_be_bytes([frame[2], frame[3]])),
        127 => u64::from_be_bytes([
            frame[2], frame[3], frame[4], frame[5], frame[6], frame[7], frame[8], frame[9],
        ]),
        n => u64::from(n),
    }
}

#[test]
fn writer_length_roundtrip_boundaries() {
    for len in [0usize, 1, 125, 126, 127, 65535, 65536, 70000] {
        let mut out = Vec::new();
        write_frame(&mut out, Opcode::Binary, &vec![0xAB; len]);
        assert_eq!(decode_len(&out), len as u64, "len {len}");
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Any message, split into arbitrary frames under arbitrary mask keys,
    /// comes back byte-identical.
    #[test]
    fn framing_roundtrip(
        message in proptest::collection::vec(any::<u8>(), 1..300),
        splits in proptest::collection::vec(1usize..40, 0..5),
        keys in proptest::collection::vec(any::<[u8; 4]>(), 6),
        binary in any::<bool>(),
    ) {
        // Partition the message at the split offsets.
        let mut offsets = vec![0];
        let mut at = 0;
        for split in splits {
            at += split;
            if at >= message.len() {
                break;
            }
            offsets.push(at);
        }
        offsets.push(message.len());

        let mut stream = Vec::new();
        let frame_count = offsets.len() - 1;
        for (idx, pair) in offsets.windows(2).enumerate() {
            let chunk = &message[pair[0]..pair[1]];
            let key = keys[idx % keys.len()];
            let first = idx == 0;
            let last = idx == frame_count - 1;

            let opcode: u8 = if first {
                if binary { 0x2 } else { 0x1 }
            } else {
                0x0
            };
            stream.push(if last { 0x80 | opcode } else { opcode });
            if chunk.len() <= 125 {
                stream.push(0x80 | chunk.len() as u8);
            } else {
                stream.push(0x80 | 126);
                stream.extend_from_slice(&(chunk.len() as u16).to_be_bytes());
            }
            stream.extend_from_slice(&key);
            for (i, b) in chunk.iter().enumerate() {
                stream.push(b ^ key[i % 4]);
            }
        }

        let limits = test_limits();
        let shutdown = ShutdownFlag::new();
        let notifier = CollectNotifier::new();
        let recorded = Recorded::new();
        let mut socket = FakeSocket::whole(&stream);
        let mut state = WorkerState::new(&limits);
        let ctx = CycleContext {
            limits: &limits,
            shutdown: &shutdown,
            notifier: &notifier,
        };
        let outcome = ws_read_cycle(&mut socket, &mut state, &ctx, &recorded);

        prop_assert_eq!(outcome, CycleOutcome::KeepOpen);
        let messages = recorded.messages.lock().unwrap();
        let expected_opcode = if binary { Opcode::Binary } else { Opcode::Text };
        prop_assert_eq!(messages.len(), 1);
        prop_assert_eq!(messages[0].0, expected_opcode);
        prop_assert_eq!(&messages[0].1, &message);
    }
}
