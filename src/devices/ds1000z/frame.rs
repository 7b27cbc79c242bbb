//! IEEE 488.2 definite-length block framing, as used for `:WAV:DATA?` responses:
//! `#`, one digit N, N ASCII digits giving the payload length L, L payload bytes, then a
//! terminator byte.

use std::str;

use log::warn;

use crate::error::ProtocolError;

pub const BLOCK_MARKER:u8 = b'#';
pub const TERMINATOR:u8 = b'\n';

/// Returns the payload of the block in `raw`. The header is found by its marker, so leading
/// bytes the transport left in front of it are skipped.
pub fn decode_frame(raw:&[u8]) -> Result<&[u8], ProtocolError> {
	let marker:usize = match raw.iter().position(|b| *b == BLOCK_MARKER) {
		Some(idx) => idx,
		None if raw.is_empty() => return Err(ProtocolError::TruncatedFrame{ needed: 2, available: 0 }),
		None => return Err(ProtocolError::HeaderMismatch("no block marker in response".to_owned())),
	};

	let digit_count_at:usize = marker + 1;
	let digit_count:usize = match raw.get(digit_count_at) {
		None => return Err(ProtocolError::TruncatedFrame{ needed: digit_count_at + 1, available: raw.len() }),
		Some(b @ b'1'..=b'9') => (b - b'0') as usize,
		Some(b'0') => return Err(ProtocolError::HeaderMismatch("indefinite-length blocks are not supported".to_owned())),
		Some(b) => return Err(ProtocolError::HeaderMismatch(format!("digit count {:?} is not a digit", *b as char))),
	};

	let digits_at:usize = digit_count_at + 1;
	let payload_at:usize = digits_at + digit_count;
	if raw.len() < payload_at {
		return Err(ProtocolError::TruncatedFrame{ needed: payload_at, available: raw.len() });
	}

	let digits:&[u8] = &raw[digits_at..payload_at];
	let len:usize = str::from_utf8(digits).ok()
		.filter(|s| s.bytes().all(|b| b.is_ascii_digit()))
		.and_then(|s| s.parse::<usize>().ok())
		.ok_or_else(|| ProtocolError::HeaderMismatch(format!("declared length {:?} is not numeric", String::from_utf8_lossy(digits))))?;

	let needed:usize = payload_at + len + 1;
	if raw.len() < needed {
		return Err(ProtocolError::TruncatedFrame{ needed, available: raw.len() });
	}

	if raw[payload_at + len] != TERMINATOR {
		warn!("block terminated by {:#04x} instead of a newline", raw[payload_at + len]);
	}

	Ok(&raw[payload_at..payload_at + len])
}

/// Wraps `payload` in a block the way the instrument does, with a nine-digit length.
pub fn encode_frame(payload:&[u8]) -> Vec<u8> {
	let mut frame:Vec<u8> = Vec::with_capacity(payload.len() + 12);
	frame.extend_from_slice(format!("#9{:09}", payload.len()).as_bytes());
	frame.extend_from_slice(payload);
	frame.push(TERMINATOR);
	frame
}
