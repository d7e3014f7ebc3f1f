//! WebSocket framing and opening handshake (RFC 6455).
//!
//! The frame layout:
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! | |1|2|3|       |K|             |                               |
//! +-+-+-+-+-------+-+-------------+ - - - - - - - - - - - - - - - +
//! |     Extended payload length continued, if payload len == 127  |
//! + - - - - - - - - - - - - - - - +-------------------------------+
//! | Masking-key, if MASK set to 1 |          Payload Data         |
//! +-------------------------------- - - - - - - - - - - - - - - - +
//! ```
//!
//! The reader reassembles continuation frames into one logical message inside
//! the worker's receive buffer, unmasking each frame with its own key as it
//! lands. Server-to-client frames are never masked.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use sha1::{Digest, Sha1};

use strand_core::{EngineError, ProtocolError, ShutdownFlag};

use crate::buffer::RecvBuffer;
use crate::transport::{RecvStep, SendStatus, Transport, recv_step, send_all};

/// Handshake GUID from RFC 6455 section 4.2.2.
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Largest payload a control frame may carry.
const MAX_CONTROL_PAYLOAD: usize = 125;

// ============================================================================
// Opcodes
// ============================================================================

/// Frame opcode (RFC 6455 section 5.2).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// Continues the previous data frame's message.
    Continuation = 0x0,
    /// UTF-8 text message.
    Text = 0x1,
    /// Binary message.
    Binary = 0x2,
    /// Connection close.
    Close = 0x8,
    /// Ping.
    Ping = 0x9,
    /// Pong.
    Pong = 0xA,
}

impl Opcode {
    /// Parses the low nibble of the first header byte.
    pub fn from_u8(value: u8) -> Result<Self, ProtocolError> {
        match value {
            0x0 => Ok(Self::Continuation),
            0x1 => Ok(Self::Text),
            0x2 => Ok(Self::Binary),
            0x8 => Ok(Self::Close),
            0x9 => Ok(Self::Ping),
            0xA => Ok(Self::Pong),
            other => Err(ProtocolError::UnknownOpcode(other)),
        }
    }

    /// Close, Ping and Pong are control opcodes.
    #[inline]
    #[must_use]
    pub fn is_control(self) -> bool {
        (self as u8) & 0x8 != 0
    }
}

// ============================================================================
// Handshake
// ============================================================================

/// Computes the `Sec-WebSocket-Accept` value:
/// `base64(SHA1(key || GUID))` over the raw 20-byte digest.
#[must_use]
pub fn accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.trim().as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Builds the `101 Switching Protocols` response carrying exactly the three
/// upgrade headers.
pub fn build_upgrade_response(accept: &str, out: &mut Vec<u8>) {
    out.clear();
    out.extend_from_slice(b"HTTP/1.1 101 Switching Protocols\r\n");
    out.extend_from_slice(b"Sec-WebSocket-Accept: ");
    out.extend_from_slice(accept.as_bytes());
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(b"Connection: Upgrade\r\n");
    out.extend_from_slice(b"Upgrade: webSocket\r\n");
    out.extend_from_slice(b"\r\n");
}

// ============================================================================
// Frame writer
// ============================================================================

/// Encodes a frame header (FIN=1, no mask) into `out`, returning its length.
fn encode_frame_header(out: &mut [u8; 10], opcode: Opcode, payload_len: usize) -> usize {
    out[0] = 0x80 | opcode as u8;
    if payload_len <= 125 {
        out[1] = payload_len as u8;
        2
    } else if payload_len <= 0xFFFF {
        out[1] = 126;
        out[2..4].copy_from_slice(&(payload_len as u16).to_be_bytes());
        4
    } else {
        out[1] = 127;
        out[2..10].copy_from_slice(&(payload_len as u64).to_be_bytes());
        10
    }
}

/// Appends one complete unmasked frame (FIN=1) to `out`.
pub fn write_frame(out: &mut Vec<u8>, opcode: Opcode, payload: &[u8]) {
    let mut head = [0u8; 10];
    let head_len = encode_frame_header(&mut head, opcode, payload.len());
    out.extend_from_slice(&head[..head_len]);
    out.extend_from_slice(payload);
}

/// Appends a close frame with status code and reason to `out`.
pub fn write_close_frame(out: &mut Vec<u8>, status_code: u16, reason: &str) {
    let mut payload = Vec::with_capacity(2 + reason.len());
    payload.extend_from_slice(&status_code.to_be_bytes());
    payload.extend_from_slice(reason.as_bytes());
    write_frame(out, Opcode::Close, &payload);
}

/// Appends a pong frame echoing a ping's payload to `out`.
pub fn write_pong_frame(out: &mut Vec<u8>, ping_payload: &[u8]) {
    write_frame(out, Opcode::Pong, ping_payload);
}

/// Sends one outbound data frame: header first, then the payload, looping on
/// short writes.
pub fn send_message<T: Transport>(
    transport: &mut T,
    shutdown: &ShutdownFlag,
    binary: bool,
    payload: &[u8],
) -> SendStatus {
    let opcode = if binary { Opcode::Binary } else { Opcode::Text };
    let mut head = [0u8; 10];
    let head_len = encode_frame_header(&mut head, opcode, payload.len());
    match send_all(transport, shutdown, &head[..head_len]) {
        SendStatus::Sent => {}
        other => return other,
    }
    send_all(transport, shutdown, payload)
}

// ============================================================================
// Frame reader
// ============================================================================

/// How a message read ended.
#[derive(Debug)]
pub enum MessageOutcome {
    /// A complete data message sits unmasked in the receive buffer; the
    /// opcode is the first frame's (Text or Binary).
    Message(Opcode),
    /// The peer sent a Close frame; no further reads were attempted.
    Closed,
    /// `recv` returned 0 mid-message.
    PeerClosed,
    /// The shutdown flag was observed; no diagnostic is owed.
    Shutdown,
    /// A benign transport error; the socket is already being torn down.
    Benign,
    /// Protocol violation or fatal transport error; the caller reports it
    /// and closes the socket.
    Failed(EngineError),
}

/// One decoded frame header.
struct FrameHead {
    fin: bool,
    opcode: Opcode,
    masked: bool,
    mask: [u8; 4],
    payload_len: u64,
}

/// Fills `dest` completely or reports why it could not.
fn read_full<T: Transport>(
    transport: &mut T,
    shutdown: &ShutdownFlag,
    dest: &mut [u8],
) -> Result<(), MessageOutcome> {
    let mut filled = 0;
    while filled < dest.len() {
        match recv_step(transport, shutdown, &mut dest[filled..]) {
            RecvStep::Data(n) => filled += n,
            RecvStep::Closed => return Err(MessageOutcome::PeerClosed),
            RecvStep::Shutdown => return Err(MessageOutcome::Shutdown),
            RecvStep::Benign => return Err(MessageOutcome::Benign),
            RecvStep::Fatal(e) => return Err(MessageOutcome::Failed(EngineError::Transport(e))),
        }
    }
    Ok(())
}

/// Reads and validates one frame header: flag byte, 7/16/64-bit length,
/// mask key.
fn read_frame_head<T: Transport>(
    transport: &mut T,
    shutdown: &ShutdownFlag,
) -> Result<FrameHead, MessageOutcome> {
    let mut head = [0u8; 2];
    read_full(transport, shutdown, &mut head)?;

    if head[0] & 0x70 != 0 {
        return Err(MessageOutcome::Failed(
            ProtocolError::ReservedBitsSet.into(),
        ));
    }
    let fin = head[0] & 0x80 != 0;
    let opcode = match Opcode::from_u8(head[0] & 0x0F) {
        Ok(op) => op,
        Err(e) => return Err(MessageOutcome::Failed(e.into())),
    };
    let masked = head[1] & 0x80 != 0;

    let payload_len = match head[1] & 0x7F {
        126 => {
            let mut ext = [0u8; 2];
            read_full(transport, shutdown, &mut ext)?;
            u64::from(u16::from_be_bytes(ext))
        }
        127 => {
            let mut ext = [0u8; 8];
            read_full(transport, shutdown, &mut ext)?;
            u64::from_be_bytes(ext)
        }
        n => u64::from(n),
    };

    let mut mask = [0u8; 4];
    if masked {
        read_full(transport, shutdown, &mut mask)?;
    }

    Ok(FrameHead {
        fin,
        opcode,
        masked,
        mask,
        payload_len,
    })
}

/// XOR-unmasks a frame payload in place. Offsets are relative to the start
/// of the slice, which must be the start of the frame's payload.
pub fn unmask_in_place(payload: &mut [u8], key: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}

/// Reads one logical message into `buf`, reassembling continuation frames
/// and unmasking each frame with its own key.
///
/// Control frames may interleave with the message: Ping is answered with an
/// echoing Pong, Pong is discarded, Close terminates the read. The
/// cumulative payload across frames is capped at `max_message_len`.
pub fn read_message<T: Transport>(
    transport: &mut T,
    shutdown: &ShutdownFlag,
    buf: &mut RecvBuffer,
    max_message_len: usize,
) -> MessageOutcome {
    debug_assert!(max_message_len <= buf.capacity());
    buf.clear();
    let mut message_opcode: Option<Opcode> = None;

    loop {
        let head = match read_frame_head(transport, shutdown) {
            Ok(head) => head,
            Err(outcome) => return outcome,
        };

        if head.opcode.is_control() {
            match handle_control_frame(transport, shutdown, &head) {
                Ok(ControlFlowStep::CloseReceived) => return MessageOutcome::Closed,
                Ok(ControlFlowStep::Handled) => continue,
                Err(outcome) => return outcome,
            }
        }

        match head.opcode {
            Opcode::Continuation if message_opcode.is_none() => {
                return MessageOutcome::Failed(ProtocolError::StrayContinuation.into());
            }
            Opcode::Text | Opcode::Binary if message_opcode.is_some() => {
                return MessageOutcome::Failed(ProtocolError::InterleavedMessage.into());
            }
            Opcode::Text | Opcode::Binary => message_opcode = Some(head.opcode),
            _ => {}
        }

        if buf.len() as u64 + head.payload_len > max_message_len as u64 {
            return MessageOutcome::Failed(
                ProtocolError::MessageTooLarge {
                    limit: max_message_len,
                }
                .into(),
            );
        }
        let payload_len = head.payload_len as usize;

        let frame_start = buf.len();
        if let Err(outcome) = read_full(
            transport,
            shutdown,
            &mut buf.spare_mut()[..payload_len],
        ) {
            return outcome;
        }
        buf.advance(payload_len);

        if head.masked {
            unmask_in_place(&mut buf.filled_mut()[frame_start..], head.mask);
        }

        if head.fin {
            break;
        }
        log::trace!("continuation expected after {payload_len}-byte frame");
    }

    match message_opcode {
        Some(opcode) => MessageOutcome::Message(opcode),
        // Unreachable for well-formed loops; kept total.
        None => MessageOutcome::Failed(ProtocolError::StrayContinuation.into()),
    }
}

enum ControlFlowStep {
    Handled,
    CloseReceived,
}

/// Consumes a control frame's payload; answers Ping with Pong.
fn handle_control_frame<T: Transport>(
    transport: &mut T,
    shutdown: &ShutdownFlag,
    head: &FrameHead,
) -> Result<ControlFlowStep, MessageOutcome> {
    if !head.fin {
        return Err(MessageOutcome::Failed(
            ProtocolError::FragmentedControlFrame.into(),
        ));
    }
    if head.payload_len > MAX_CONTROL_PAYLOAD as u64 {
        return Err(MessageOutcome::Failed(
            ProtocolError::ControlFrameTooLong.into(),
        ));
    }

    // Close payload (status + reason) is irrelevant here: the caller closes
    // the socket without further reads.
    if head.opcode == Opcode::Close {
        return Ok(ControlFlowStep::CloseReceived);
    }

    let mut payload = [0u8; MAX_CONTROL_PAYLOAD];
    let payload = &mut payload[..head.payload_len as usize];
    read_full(transport, shutdown, payload)?;
    if head.masked {
        unmask_in_place(payload, head.mask);
    }

    match head.opcode {
        Opcode::Ping => {
            let mut pong = Vec::with_capacity(2 + payload.len());
            write_pong_frame(&mut pong, payload);
            match send_all(transport, shutdown, &pong) {
                SendStatus::Sent => Ok(ControlFlowStep::Handled),
                SendStatus::Shutdown => Err(MessageOutcome::Shutdown),
                SendStatus::Benign => Err(MessageOutcome::Benign),
                SendStatus::Fatal(e) => {
                    Err(MessageOutcome::Failed(EngineError::Transport(e)))
                }
            }
        }
        _ => Ok(ControlFlowStep::Handled),
    }
}
