//! Header field extraction.
//!
//! Two modes over the same per-byte walk of a header block: a fixed list of
//! lowercase field names with parallel output slots (no allocation, used for
//! the upgrade handshake), and a general map sink. Field names compare
//! case-insensitively; map keys are normalized to lowercase on ingest.
//!
//! `content_length` is a dedicated fast path so the read loop can decide how
//! many more body bytes to expect before any general header parse runs.

use std::collections::HashMap;

/// One step of the field walk: keep going or stop early.
enum Walk {
    Continue,
    Stop,
}

/// Walks `block` line by line, invoking `visit` with each `(name, value)`
/// pair. The walk implements the header state machine: name accumulates until
/// the first `:`, exactly one leading space after it is dropped, stray `:`
/// inside the value is preserved, `LF` commits a pair, and an empty line
/// terminates the block.
fn for_each_field<'a>(block: &'a [u8], mut visit: impl FnMut(&'a [u8], &'a [u8]) -> Walk) {
    let mut i = 0;
    while i < block.len() {
        // Empty line: end of the header block.
        if block[i] == b'\r' || block[i] == b'\n' {
            break;
        }

        let name_start = i;
        while i < block.len() && block[i] != b':' && block[i] != b'\n' {
            i += 1;
        }
        if i >= block.len() || block[i] == b'\n' {
            // Line without a colon; skip it.
            i += 1;
            continue;
        }
        let name = &block[name_start..i];
        i += 1; // ':'
        if i < block.len() && block[i] == b' ' {
            i += 1;
        }

        let value_start = i;
        while i < block.len() && block[i] != b'\r' && block[i] != b'\n' {
            i += 1;
        }
        let value = &block[value_start..i];

        // Swallow the CR LF line break.
        if i < block.len() && block[i] == b'\r' {
            i += 1;
        }
        if i < block.len() && block[i] == b'\n' {
            i += 1;
        }

        if let Walk::Stop = visit(name, value) {
            return;
        }
    }
}

/// Fixed-field extraction (mode A).
///
/// `names` must be lowercase; `slots` is the parallel output array. Each
/// completed header line is compared against the list (linear scan, the list
/// is small). The walk stops early once every slot is filled; until then a
/// repeated field overwrites its slot, so the last occurrence wins.
pub fn extract_fixed<'b>(block: &'b [u8], names: &[&[u8]], slots: &mut [Option<&'b [u8]>]) {
    debug_assert_eq!(names.len(), slots.len());
    for_each_field(block, |name, value| {
        for (want, slot) in names.iter().zip(slots.iter_mut()) {
            if name.eq_ignore_ascii_case(want) {
                *slot = Some(value);
                break;
            }
        }
        if slots.iter().all(Option::is_some) {
            Walk::Stop
        } else {
            Walk::Continue
        }
    });
}

/// General map extraction (mode B).
///
/// Every parsed line is inserted keyed by the lowercased field name; repeats
/// overwrite, so the last occurrence wins.
pub fn extract_map(block: &[u8], out: &mut HashMap<String, String>) {
    for_each_field(block, |name, value| {
        out.insert(
            String::from_utf8_lossy(name).to_ascii_lowercase(),
            String::from_utf8_lossy(value).into_owned(),
        );
        Walk::Continue
    });
}

/// Returns the `Content-Length` value, or 0 if absent or unparseable.
///
/// Fast scan for the literal `content-length: ` or `Content-Length: `
/// followed by an ASCII decimal up to the next CR. Callers should bound
/// `buf` to the header block so body bytes cannot alias the needle.
#[must_use]
pub fn content_length(buf: &[u8]) -> usize {
    const LOWER: &[u8] = b"content-length: ";
    const TITLE: &[u8] = b"Content-Length: ";

    let start = buf
        .windows(LOWER.len())
        .position(|w| w == LOWER || w == TITLE)
        .map(|idx| idx + LOWER.len());

    let Some(start) = start else {
        return 0;
    };

    let mut value: usize = 0;
    let mut saw_digit = false;
    for &b in &buf[start..] {
        match b {
            b'0'..=b'9' => {
                saw_digit = true;
                value = match value
                    .checked_mul(10)
                    .and_then(|v| v.checked_add(usize::from(b - b'0')))
                {
                    Some(v) => v,
                    None => return 0,
                };
            }
            b'\r' => break,
            _ => return 0,
        }
    }
    if saw_digit { value } else { 0 }
}
