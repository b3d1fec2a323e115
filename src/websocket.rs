//! # WebSocket framing
//!
//! RFC 6455 subset: the opening handshake accept key, and decode/encode for a
//! single data frame per read. No fragmentation, no extensions, no 64-bit
//! payload lengths, no server-to-client masking — the gaps are deliberate,
//! see the design notes.

use base64::Engine;

use crate::config::WS_GUID;
use crate::sha1;

/// Derive `Sec-WebSocket-Accept` from the client's `Sec-WebSocket-Key`.
pub fn accept_key(client_key: &str) -> String {
    let mut material = Vec::with_capacity(client_key.len() + WS_GUID.len());
    material.extend_from_slice(client_key.as_bytes());
    material.extend_from_slice(WS_GUID.as_bytes());
    let hash = sha1::digest(&material);
    base64::engine::general_purpose::STANDARD.encode(hash)
}

/// Build the literal 101 response.
pub fn handshake_response(client_key: &str) -> String {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\
         \r\n",
        accept_key(client_key)
    )
}

/// Scan CRLF-delimited header lines for `Sec-WebSocket-Key:` and return the
/// trimmed value. Case-sensitive match on the header name, as written in the
/// RFC.
pub fn find_websocket_key(request: &str) -> Option<&str> {
    request
        .lines()
        .find_map(|line| line.strip_prefix("Sec-WebSocket-Key:"))
        .map(|v| v.trim())
}

/// Decode a single inbound client frame. Returns the unmasked UTF-8 text
/// payload, or `None` for anything malformed (spec: empty output, dispatch
/// skips it) or a close-opcode frame (caller disconnects after this yields
/// `None`).
///
/// `close` is set to `true` when the frame's opcode was the close opcode, so
/// the connection manager can tear the connection down even though the
/// decoded text is empty.
pub fn decode_frame(raw: &[u8]) -> (Option<String>, bool) {
    if raw.len() < 2 {
        return (None, false);
    }

    let opcode = raw[0] & 0x0F;
    let masked = raw[1] & 0x80 != 0;
    let len7 = raw[1] & 0x7F;

    if !masked {
        // Clients MUST mask; treat as malformed.
        return (None, false);
    }

    let mut offset = 2usize;
    let payload_len: usize = if len7 == 127 {
        // 64-bit lengths unsupported.
        return (None, false);
    } else if len7 == 126 {
        if raw.len() < offset + 2 {
            return (None, false);
        }
        let len = u16::from_be_bytes([raw[offset], raw[offset + 1]]) as usize;
        offset += 2;
        len
    } else {
        len7 as usize
    };

    if raw.len() < offset + 4 {
        return (None, false);
    }
    let mask = [raw[offset], raw[offset + 1], raw[offset + 2], raw[offset + 3]];
    offset += 4;

    if raw.len() < offset + payload_len {
        return (None, false);
    }

    let mut payload = raw[offset..offset + payload_len].to_vec();
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }

    const OPCODE_CLOSE: u8 = 0x8;
    if opcode == OPCODE_CLOSE {
        return (None, true);
    }

    match String::from_utf8(payload) {
        Ok(text) => (Some(text), false),
        Err(_) => (None, false),
    }
}

/// Encode an unmasked server→client text frame for `text` (a trailing `\n`
/// is appended to match plain-transport line termination).
pub fn encode_text_frame(text: &str) -> Vec<u8> {
    let mut payload = Vec::with_capacity(text.len() + 1);
    payload.extend_from_slice(text.as_bytes());
    payload.push(b'\n');

    let len = payload.len();
    let mut frame = Vec::with_capacity(10 + len);
    frame.push(0x81); // FIN=1, opcode=text
    if len <= 125 {
        frame.push(len as u8);
    } else if len <= 65535 {
        frame.push(126);
        frame.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        frame.push(127);
        frame.extend_from_slice(&(len as u64).to_be_bytes());
    }
    frame.extend_from_slice(&payload);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_key_matches_rfc6455_example() {
        assert_eq!(
            accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn find_key_in_headers() {
        let req = "GET / HTTP/1.1\r\nHost: x\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n";
        assert_eq!(find_websocket_key(req), Some("dGhlIHNhbXBsZSBub25jZQ=="));
    }

    #[test]
    fn missing_key_is_none() {
        let req = "GET / HTTP/1.1\r\nHost: x\r\n\r\n";
        assert_eq!(find_websocket_key(req), None);
    }

    #[test]
    fn decode_boundary_hello_frame() {
        // opcode text, masked, len 5, payload "Hello"
        let raw = [0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58];
        let (text, close) = decode_frame(&raw);
        assert_eq!(text.as_deref(), Some("Hello"));
        assert!(!close);
    }

    #[test]
    fn decode_rejects_unmasked_frame() {
        let raw = [0x81, 0x05, b'H', b'e', b'l', b'l', b'o'];
        let (text, close) = decode_frame(&raw);
        assert_eq!(text, None);
        assert!(!close);
    }

    #[test]
    fn decode_rejects_64bit_length() {
        let mut raw = vec![0x81, 0xFF];
        raw.extend_from_slice(&0u64.to_be_bytes());
        raw.extend_from_slice(&[0, 0, 0, 0]); // mask
        let (text, close) = decode_frame(&raw);
        assert_eq!(text, None);
        assert!(!close);
    }

    #[test]
    fn decode_16bit_extended_length() {
        let payload = "x".repeat(200);
        let mask = [0x11u8, 0x22, 0x33, 0x44];
        let mut raw = vec![0x81, 0xFE];
        raw.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        raw.extend_from_slice(&mask);
        for (i, b) in payload.as_bytes().iter().enumerate() {
            raw.push(b ^ mask[i % 4]);
        }
        let (text, close) = decode_frame(&raw);
        assert_eq!(text.as_deref(), Some(payload.as_str()));
        assert!(!close);
    }

    #[test]
    fn decode_close_opcode_yields_empty_and_close_flag() {
        let mask = [0u8; 4];
        let raw = [0x88, 0x80, mask[0], mask[1], mask[2], mask[3]];
        let (text, close) = decode_frame(&raw);
        assert_eq!(text, None);
        assert!(close);
    }

    #[test]
    fn encode_small_frame_header() {
        let frame = encode_text_frame("hi");
        assert_eq!(&frame[..2], &[0x81, 3]); // "hi\n" is 3 bytes
        assert_eq!(&frame[2..], b"hi\n");
    }

    #[test]
    fn encode_extended_length_header() {
        let text = "x".repeat(200);
        let frame = encode_text_frame(&text);
        assert_eq!(frame[0], 0x81);
        assert_eq!(frame[1], 126);
        let len = u16::from_be_bytes([frame[2], frame[3]]);
        assert_eq!(len as usize, 201);
    }
}
