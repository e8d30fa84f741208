//! # RESP2 Framing
//!
//! Purpose: Encode commands and incrementally parse replies and push frames
//! for the TCP link, keeping allocations under control.
//!
//! ## Design Principles
//! 1. **Incremental Parsing**: `FrameDecoder` consumes a frame only once it
//!    is complete and skips re-scanning until enough bytes have arrived.
//! 2. **Buffer Reuse**: Caller provides buffers to avoid per-call allocations.
//! 3. **Binary-Safe**: Bulk strings are treated as raw bytes.
//! 4. **Fail Fast**: Invalid framing returns protocol errors immediately.

use bytes::{Buf, BytesMut};

use kvp_common::{ClientError, ClientResult};

/// RESP response value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// +OK or +PONG style responses.
    Simple(Vec<u8>),
    /// -ERR ... responses.
    Error(Vec<u8>),
    /// :123 responses.
    Integer(i64),
    /// $... bulk strings, with None for null.
    Bulk(Option<Vec<u8>>),
    /// *... arrays (subscribe confirmations and push frames).
    Array(Vec<RespValue>),
}

impl RespValue {
    /// Returns the raw bytes of a simple or bulk string.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            RespValue::Simple(data) | RespValue::Bulk(Some(data)) => Some(data),
            _ => None,
        }
    }

    /// Returns true for a `message`/`pmessage` push frame.
    pub fn is_push(&self) -> bool {
        match self {
            RespValue::Array(items) => items
                .first()
                .and_then(RespValue::as_bytes)
                .map(|kind| {
                    eq_ignore_ascii_case(kind, b"message") || eq_ignore_ascii_case(kind, b"pmessage")
                })
                .unwrap_or(false),
            _ => false,
        }
    }
}

/// Encodes a RESP2 array command into the provided buffer.
pub fn encode_command(args: &[Vec<u8>], out: &mut Vec<u8>) {
    out.push(b'*');
    push_usize(out, args.len());
    out.extend_from_slice(b"\r\n");
    for arg in args {
        out.push(b'$');
        push_usize(out, arg.len());
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(arg);
        out.extend_from_slice(b"\r\n");
    }
}

/// Largest bulk string accepted from the server, matching the default
/// `proto-max-bulk-len` of Redis.
pub const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

/// Largest array length accepted from the server.
pub const MAX_ARRAY_LEN: i64 = 1024 * 1024;

/// Outcome of parsing at one offset.
enum Step {
    Done(RespValue, usize),
    /// Incomplete; the frame needs at least this many buffered bytes.
    Need(usize),
}

/// Incremental frame decoder for one connection.
///
/// Remembers how many bytes the pending frame needs at minimum, so a large
/// bulk reply arriving over many reads is only re-scanned once it can be
/// complete.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    need: usize,
}

impl FrameDecoder {
    /// Parses one complete frame from the front of `buf`.
    ///
    /// Returns `Ok(None)` and leaves `buf` untouched when the frame is
    /// incomplete.
    pub fn decode(&mut self, buf: &mut BytesMut) -> ClientResult<Option<RespValue>> {
        if buf.len() < self.need {
            return Ok(None);
        }
        match parse_value(&buf[..], 0)? {
            Step::Done(value, consumed) => {
                buf.advance(consumed);
                self.need = 0;
                Ok(Some(value))
            }
            Step::Need(need) => {
                self.need = need;
                Ok(None)
            }
        }
    }
}

fn parse_value(data: &[u8], start: usize) -> ClientResult<Step> {
    let (line, next) = match read_line(data, start)? {
        Some(found) => found,
        None => return Ok(Step::Need(data.len() + 1)),
    };
    if line.is_empty() {
        return Err(ClientError::Protocol);
    }

    let body = &line[1..];
    match line[0] {
        b'+' => Ok(Step::Done(RespValue::Simple(body.to_vec()), next)),
        b'-' => Ok(Step::Done(RespValue::Error(body.to_vec()), next)),
        b':' => Ok(Step::Done(RespValue::Integer(parse_i64(body)?), next)),
        b'$' => {
            let len = parse_i64(body)?;
            parse_bulk(data, len, next)
        }
        b'*' => {
            let len = parse_i64(body)?;
            parse_array(data, len, next)
        }
        _ => Err(ClientError::Protocol),
    }
}

fn parse_bulk(data: &[u8], len: i64, start: usize) -> ClientResult<Step> {
    if len < 0 {
        return Ok(Step::Done(RespValue::Bulk(None), start));
    }
    if len > MAX_BULK_LEN {
        return Err(ClientError::Protocol);
    }
    let end = start + len as usize;
    if data.len() < end + 2 {
        return Ok(Step::Need(end + 2));
    }
    if &data[end..end + 2] != b"\r\n" {
        return Err(ClientError::Protocol);
    }
    Ok(Step::Done(RespValue::Bulk(Some(data[start..end].to_vec())), end + 2))
}

fn parse_array(data: &[u8], len: i64, start: usize) -> ClientResult<Step> {
    if len <= 0 {
        return Ok(Step::Done(RespValue::Array(Vec::new()), start));
    }
    if len > MAX_ARRAY_LEN {
        return Err(ClientError::Protocol);
    }

    // Every element takes at least three bytes, so the buffer bounds the
    // allocation regardless of the declared length.
    let len = len as usize;
    let mut items = Vec::with_capacity(len.min(data.len().saturating_sub(start) / 3));
    let mut pos = start;
    for _ in 0..len {
        match parse_value(data, pos)? {
            Step::Done(item, next) => {
                items.push(item);
                pos = next;
            }
            need @ Step::Need(_) => return Ok(need),
        }
    }
    Ok(Step::Done(RespValue::Array(items), pos))
}

/// Finds the CRLF-terminated line starting at `start`.
///
/// Returns the line without CRLF and the offset just past it.
fn read_line(data: &[u8], start: usize) -> ClientResult<Option<(&[u8], usize)>> {
    let newline = match data[start..].iter().position(|&b| b == b'\n') {
        Some(offset) => start + offset,
        None => return Ok(None),
    };
    if newline == start || data[newline - 1] != b'\r' {
        return Err(ClientError::Protocol);
    }
    Ok(Some((&data[start..newline - 1], newline + 1)))
}

fn parse_i64(data: &[u8]) -> ClientResult<i64> {
    if data.is_empty() {
        return Err(ClientError::Protocol);
    }
    let mut negative = false;
    let mut idx = 0;
    if data[0] == b'-' {
        negative = true;
        idx = 1;
    }

    let mut value: i64 = 0;
    while idx < data.len() {
        let b = data[idx];
        if !b.is_ascii_digit() {
            return Err(ClientError::Protocol);
        }
        value = value.saturating_mul(10).saturating_add((b - b'0') as i64);
        idx += 1;
    }

    if negative {
        Ok(-value)
    } else {
        Ok(value)
    }
}

fn push_usize(out: &mut Vec<u8>, mut value: usize) {
    // Write digits into a small stack buffer to avoid heap allocations.
    let mut buf = [0u8; 20];
    let mut len = 0;
    if value == 0 {
        buf[0] = b'0';
        len = 1;
    } else {
        while value > 0 {
            buf[len] = b'0' + (value % 10) as u8;
            value /= 10;
            len += 1;
        }
    }
    for idx in (0..len).rev() {
        out.push(buf[idx]);
    }
}

/// ASCII case-insensitive comparison for command names.
pub fn eq_ignore_ascii_case(a: &[u8], b: &[u8]) -> bool {
    a.eq_ignore_ascii_case(b)
}
