use std::fmt;
use std::io;

use thiserror::Error;

use crate::devices::ds1000z::preamble::WaveformFormat;

pub type Result<T> = std::result::Result<T, CaptureError>;

/// Which end of a chunk range the device was asked to echo back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeBound { Start, Stop }

impl fmt::Display for RangeBound {
	fn fmt(&self, f:&mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self { RangeBound::Start => "start", RangeBound::Stop => "stop" })
	}
}

/// The device answered, but not in a way a capture can continue from. None of these are worth
/// retrying on their own; the acquisition has to start over from the preamble.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
	#[error("malformed preamble: {0}")]
	MalformedPreamble(String),

	#[error("device reports {bound} point {reported:?}, expected {expected}")]
	RangeMismatch { bound: RangeBound, expected: usize, reported: String },

	#[error("truncated frame: need {needed} bytes, have {available}")]
	TruncatedFrame { needed: usize, available: usize },

	#[error("bad block header: {0}")]
	HeaderMismatch(String),

	#[error("chunk {start}..={stop} carried {actual} samples, expected {expected}")]
	ChunkLength { start: usize, stop: usize, expected: usize, actual: usize },

	#[error("unexpected response to {query}: {response:?}")]
	UnexpectedResponse { query: String, response: String },
}

#[derive(Debug, Error)]
pub enum CaptureError {
	#[error(transparent)]
	Protocol(#[from] ProtocolError),

	#[error("transport error: {0}")]
	Transport(#[from] io::Error),

	#[error("invalid request: {0}")]
	InvalidRequest(String),

	#[error("waveform format {0:?} is not supported, only BYTE can be calibrated")]
	UnsupportedFormat(WaveformFormat),

	#[error("capture cancelled after {completed_chunks} chunks")]
	Cancelled { completed_chunks: usize },

	#[error("connected to {0:?}, which is not a DS1000Z series oscilloscope")]
	WrongInstrument(String),
}

impl CaptureError {
	/// The protocol error behind this failure, if the device rather than the link was at fault.
	pub fn protocol(&self) -> Option<&ProtocolError> {
		match self {
			CaptureError::Protocol(e) => Some(e),
			_ => None,
		}
	}
}
