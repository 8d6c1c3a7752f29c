//! Spill line codec
//!
//! Line layout: `kind|code|timestamp|payload`
//!
//! - `kind` is `C` or `M`
//! - `code` is the decimal outcome code
//! - `\`, newline and carriage return are escaped as `\\`, `\n`, `\r` in
//!   both text fields; `|` is escaped as `\p` in the timestamp only, so the
//!   payload may contain raw pipes
//!
//! The empty event has no line representation.

use core::fmt::{self, Write};

use crate::constants::MAX_PAYLOAD_LEN;
use crate::errors::{StoreError, StoreResult};
use crate::events::{Event, EventKind, StatusCode};

const SEPARATOR: char = '|';

/// Writes one event as a spill line, without the trailing newline
pub fn encode_line<W: Write>(event: &Event, out: &mut W) -> fmt::Result {
    out.write_char(event.kind().tag())?;
    out.write_char(SEPARATOR)?;
    write!(out, "{}", event.outcome().as_u16())?;
    out.write_char(SEPARATOR)?;
    escape(event.timestamp(), true, out)?;
    out.write_char(SEPARATOR)?;
    escape(event.payload(), false, out)
}

/// Parses one spill line (trailing `\n`/`\r\n` tolerated)
pub fn decode_line(line: &str) -> StoreResult<Event> {
    let line = line.trim_end_matches(['\n', '\r']);
    let mut fields = line.splitn(4, SEPARATOR);

    let kind = fields
        .next()
        .and_then(EventKind::from_tag)
        .ok_or(StoreError::Format { reason: "unknown event kind" })?;
    if kind == EventKind::Unassigned {
        return Err(StoreError::Format { reason: "empty event" });
    }

    let code = fields
        .next()
        .and_then(|c| c.parse::<u16>().ok())
        .ok_or(StoreError::Format { reason: "bad outcome code" })?;

    let timestamp = fields.next().ok_or(StoreError::Format { reason: "missing timestamp" })?;
    let payload = fields.next().ok_or(StoreError::Format { reason: "missing payload" })?;

    let timestamp = unescape(timestamp)?;
    let payload = unescape(payload)?;

    Event::new(kind, StatusCode(code), &timestamp, &payload)
        .map_err(|_| StoreError::Format { reason: "field exceeds capacity" })
}

fn escape<W: Write>(text: &str, pipes: bool, out: &mut W) -> fmt::Result {
    for c in text.chars() {
        match c {
            '\\' => out.write_str("\\\\")?,
            '\n' => out.write_str("\\n")?,
            '\r' => out.write_str("\\r")?,
            '|' if pipes => out.write_str("\\p")?,
            other => out.write_char(other)?,
        }
    }
    Ok(())
}

fn unescape(text: &str) -> StoreResult<heapless::String<MAX_PAYLOAD_LEN>> {
    let too_long = StoreError::Format { reason: "field exceeds capacity" };
    let mut out = heapless::String::new();
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        let decoded = if c == '\\' {
            match chars.next() {
                Some('\\') => '\\',
                Some('n') => '\n',
                Some('r') => '\r',
                Some('p') => '|',
                _ => return Err(StoreError::Format { reason: "bad escape" }),
            }
        } else {
            c
        };
        out.push(decoded).map_err(|_| too_long)?;
    }

    Ok(out)
}
