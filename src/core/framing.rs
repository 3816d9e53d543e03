//! Terminator framing for the socket protocol.
//!
//! Every message is a UTF-8 JSON object followed by `\r\n`:
//!
//! ```text
//! {"cmd":"user","version":"..."}\r\n
//! ```
//!
//! JSON escapes control characters inside strings, so the terminator can only
//! appear at the end of a message.

use crate::domain::model::{Command, Payload};
use crate::utils::error::{CaptchaError, Result};
use serde::Serialize;
use std::io::{Read, Write};

pub const TERMINATOR: &[u8; 2] = b"\r\n";

const READ_CHUNK: usize = 256;

/// Largest response accepted before the terminator shows up.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

#[derive(Debug, Serialize)]
pub struct RequestEnvelope<'a> {
    pub cmd: Command,
    pub version: &'a str,
    #[serde(flatten)]
    pub payload: &'a Payload,
}

/// Serializes a request and appends the terminator.
pub fn encode_request(command: Command, version: &str, payload: &Payload) -> Result<Vec<u8>> {
    let envelope = RequestEnvelope {
        cmd: command,
        version,
        payload,
    };
    let mut frame = serde_json::to_vec(&envelope)
        .map_err(|e| CaptchaError::server(format!("failed to encode request: {}", e)))?;
    frame.extend_from_slice(TERMINATOR);
    Ok(frame)
}

/// Writes the whole frame, looping over partial writes.
pub fn write_frame<W: Write>(writer: &mut W, frame: &[u8]) -> Result<()> {
    let mut written = 0;
    while written < frame.len() {
        match writer.write(&frame[written..]) {
            Ok(0) => {
                return Err(CaptchaError::connection(
                    "connection lost while sending",
                    None,
                ))
            }
            Ok(n) => written += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(CaptchaError::connection(
                    "connection lost while sending",
                    Some(e),
                ))
            }
        }
    }
    writer
        .flush()
        .map_err(|e| CaptchaError::connection("connection lost while sending", Some(e)))
}

/// Reads until the accumulated bytes end with the terminator and returns the
/// message without it. A peer that sends more than `MAX_FRAME_SIZE` bytes
/// without terminating the frame is a server error.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    let mut buffer = Vec::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];
    while !buffer.ends_with(TERMINATOR) {
        match reader.read(&mut chunk) {
            Ok(0) => {
                return Err(CaptchaError::connection(
                    "connection lost while receiving",
                    None,
                ))
            }
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                if buffer.len() > MAX_FRAME_SIZE + TERMINATOR.len() {
                    return Err(CaptchaError::server("response frame too large"));
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(CaptchaError::connection(
                    "connection lost while receiving",
                    Some(e),
                ))
            }
        }
    }
    buffer.truncate(buffer.len() - TERMINATOR.len());
    Ok(buffer)
}
