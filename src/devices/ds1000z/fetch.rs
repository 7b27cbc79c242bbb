//! Pulling a capture out of the scope's sample memory.
//!
//! The scope hands out at most a few hundred thousand samples per `:WAV:DATA?`, read from
//! between its start and stop cursors. A full-depth capture is therefore fetched chunk by
//! chunk, moving both cursors before each read. The cursors live on the device, so chunks are
//! strictly sequential and a capture abandoned mid-chunk leaves them in an unknown position.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info};

use crate::channel::CommandChannel;
use crate::error::{CaptureError, ProtocolError, RangeBound, Result};
use super::calibrate::SampleBuffer;
use super::frame;

pub const DATA_QUERY:&str = ":WAV:DATA?";

/// Inclusive range of 1-based sample addresses, as the scope's cursors address memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRange {
	pub start: usize,
	pub stop: usize,
}

impl ChunkRange {
	pub fn len(&self) -> usize { self.stop - self.start + 1 }
}

/// Splits `[1, memory_depth]` into consecutive ranges of at most `max_chunk_size` points.
pub fn plan_chunks(memory_depth:usize, max_chunk_size:usize) -> Result<Vec<ChunkRange>> {
	if memory_depth == 0 {
		return Err(CaptureError::InvalidRequest("memory depth must be at least 1".to_owned()));
	}
	if max_chunk_size == 0 {
		return Err(CaptureError::InvalidRequest("chunk size must be at least 1".to_owned()));
	}

	Ok((1..=memory_depth).step_by(max_chunk_size)
		.map(|start| ChunkRange{ start, stop: (start + max_chunk_size - 1).min(memory_depth) })
		.collect())
}

/// Where the device-side cursor protocol stands for the chunk in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
	Idle,
	RangeSet,
	DataRequested,
	FrameReceived,
}

impl FetchState {
	fn advance(self, to:FetchState) -> Result<FetchState> {
		use FetchState::*;
		match (self, to) {
			(Idle, RangeSet) | (RangeSet, DataRequested) | (DataRequested, FrameReceived) | (FrameReceived, Idle) => Ok(to),
			_ => Err(CaptureError::InvalidRequest(format!("fetch cannot go from {:?} to {:?}", self, to))),
		}
	}
}

/// Lets another thread stop a fetch. Checked only between chunks.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
	pub fn new() -> Self { Self::default() }
	pub fn cancel(&self) { self.0.store(true, Ordering::SeqCst); }
	pub fn is_cancelled(&self) -> bool { self.0.load(Ordering::SeqCst) }
}

struct ChunkFetcher<'a, C: CommandChannel> {
	channel: &'a mut C,
	state: FetchState,
}

impl<'a, C: CommandChannel> ChunkFetcher<'a, C> {

	fn set_range(&mut self, range:ChunkRange) -> Result<()> {
		self.channel.send(&format!(":WAV:STAR {}", range.start))?;
		self.channel.send(&format!(":WAV:STOP {}", range.stop))?;

		// The scope clamps cursors it doesn't like instead of refusing them
		self.verify(":WAV:STAR?", RangeBound::Start, range.start)?;
		self.verify(":WAV:STOP?", RangeBound::Stop, range.stop)?;

		self.state = self.state.advance(FetchState::RangeSet)?;
		Ok(())
	}

	fn verify(&mut self, query:&str, bound:RangeBound, expected:usize) -> Result<()> {
		let reported:String = self.channel.query(query)?;
		match reported.trim().parse::<usize>() {
			Ok(x) if x == expected => Ok(()),
			_ => Err(ProtocolError::RangeMismatch{ bound, expected, reported }.into()),
		}
	}

	fn read_chunk(&mut self, range:ChunkRange) -> Result<Vec<u8>> {
		self.channel.send(DATA_QUERY)?;
		self.state = self.state.advance(FetchState::DataRequested)?;

		let raw:Vec<u8> = self.channel.read_raw()?;
		let payload:&[u8] = frame::decode_frame(&raw)?;
		self.state = self.state.advance(FetchState::FrameReceived)?;

		if payload.len() != range.len() {
			return Err(ProtocolError::ChunkLength{ start: range.start, stop: range.stop, expected: range.len(), actual: payload.len() }.into());
		}

		let payload = payload.to_vec();
		self.state = self.state.advance(FetchState::Idle)?;
		Ok(payload)
	}

}

/// Fetches `memory_depth` raw sample codes from the scope in chunks of at most `max_chunk_size`.
/// Either the whole capture comes back or an error does.
pub fn fetch_waveform<C: CommandChannel>(channel:&mut C, memory_depth:usize, max_chunk_size:usize) -> Result<SampleBuffer> {
	fetch_waveform_cancellable(channel, memory_depth, max_chunk_size, &CancelToken::new())
}

pub fn fetch_waveform_cancellable<C: CommandChannel>(channel:&mut C, memory_depth:usize, max_chunk_size:usize, cancel:&CancelToken) -> Result<SampleBuffer> {
	let plan:Vec<ChunkRange> = plan_chunks(memory_depth, max_chunk_size)?;
	info!("fetching {} points in {} chunks", memory_depth, plan.len());

	let mut fetcher = ChunkFetcher{ channel, state: FetchState::Idle };
	let mut chunks:Vec<Vec<u8>> = Vec::with_capacity(plan.len());

	for (idx, range) in plan.iter().enumerate() {
		if cancel.is_cancelled() {
			info!("fetch cancelled after {} of {} chunks", idx, plan.len());
			return Err(CaptureError::Cancelled{ completed_chunks: idx });
		}

		fetcher.set_range(*range)?;
		chunks.push(fetcher.read_chunk(*range)?);
		debug!("chunk {}/{}: points {}..={}", idx + 1, plan.len(), range.start, range.stop);
	}

	Ok(SampleBuffer::assemble(chunks))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::channel::mock::SimulatedScope;

	fn ceil_div(a:usize, b:usize) -> usize { (a + b - 1) / b }

	#[test]
	fn plan_covers_every_point_once() {
		for &(depth, chunk) in &[(1, 1), (1, 250_000), (7, 3), (12, 4), (250_001, 250_000), (12_000_000, 250_000), (5, 1)] {
			let plan = plan_chunks(depth, chunk).unwrap();
			assert_eq!(plan.len(), ceil_div(depth, chunk));
			assert_eq!(plan[0].start, 1);
			assert_eq!(plan.last().unwrap().stop, depth);
			for pair in plan.windows(2) {
				assert_eq!(pair[1].start, pair[0].stop + 1);
			}
			assert!(plan.iter().all(|r| r.start <= r.stop && r.len() <= chunk));
			assert_eq!(plan.iter().map(|r| r.len()).sum::<usize>(), depth);
		}
	}

	#[test]
	fn last_chunk_may_be_short() {
		let plan = plan_chunks(10, 4).unwrap();
		assert_eq!(plan, vec![
			ChunkRange{ start: 1, stop: 4 },
			ChunkRange{ start: 5, stop: 8 },
			ChunkRange{ start: 9, stop: 10 },
		]);
	}

	#[test]
	fn zero_depth_or_chunk_is_rejected() {
		assert!(matches!(plan_chunks(0, 10), Err(CaptureError::InvalidRequest(_))));
		assert!(matches!(plan_chunks(10, 0), Err(CaptureError::InvalidRequest(_))));
	}

	#[test]
	fn state_machine_only_moves_forward_in_order() {
		assert!(FetchState::Idle.advance(FetchState::RangeSet).is_ok());
		assert!(FetchState::Idle.advance(FetchState::DataRequested).is_err());
		assert!(FetchState::RangeSet.advance(FetchState::FrameReceived).is_err());
		assert!(FetchState::FrameReceived.advance(FetchState::Idle).is_ok());
	}

	#[test]
	fn issues_commands_in_protocol_order() {
		let mut scope = SimulatedScope::new((0..6).collect());
		let buf = fetch_waveform(&mut scope, 6, 4).unwrap();
		assert_eq!(buf.as_slice(), &[0, 1, 2, 3, 4, 5]);

		let expected:Vec<String> = [
			":WAV:STAR 1", ":WAV:STOP 4", ":WAV:STAR?", ":WAV:STOP?", ":WAV:DATA?",
			":WAV:STAR 5", ":WAV:STOP 6", ":WAV:STAR?", ":WAV:STOP?", ":WAV:DATA?",
		].iter().map(|s| s.to_string()).collect();
		assert_eq!(scope.commands(), &expected[..]);
	}

	#[test]
	fn clamped_stop_is_a_range_mismatch() {
		let mut scope = SimulatedScope::new(vec![0; 10]).with_stop_clamp(7);
		let err = fetch_waveform(&mut scope, 10, 4).unwrap_err();
		assert_eq!(err.protocol(), Some(&ProtocolError::RangeMismatch{ bound: RangeBound::Stop, expected: 8, reported: "7".to_owned() }));
		// Aborted before asking for the second chunk's data
		assert_eq!(scope.commands().iter().filter(|c| *c == DATA_QUERY).count(), 1);
	}

	#[test]
	fn clamped_start_is_a_range_mismatch() {
		let mut scope = SimulatedScope::new(vec![0; 10]).with_start_clamp(3);
		let err = fetch_waveform(&mut scope, 10, 4).unwrap_err();
		assert_eq!(err.protocol(), Some(&ProtocolError::RangeMismatch{ bound: RangeBound::Start, expected: 5, reported: "3".to_owned() }));
		assert_eq!(scope.commands().iter().filter(|c| *c == DATA_QUERY).count(), 1);
	}

	#[test]
	fn non_numeric_echo_is_a_range_mismatch() {
		let mut scope = SimulatedScope::new(vec![0; 10]).with_echo_reply(":WAV:STAR?", "ERR");
		let err = fetch_waveform(&mut scope, 10, 4).unwrap_err();
		assert_eq!(err.protocol(), Some(&ProtocolError::RangeMismatch{ bound: RangeBound::Start, expected: 1, reported: "ERR".to_owned() }));
		assert!(!scope.commands().iter().any(|c| c == DATA_QUERY));
	}

	#[test]
	fn truncated_frame_aborts_the_fetch() {
		let mut scope = SimulatedScope::new(vec![9; 8]).with_truncated_frame(2);
		let err = fetch_waveform(&mut scope, 8, 4).unwrap_err();
		assert!(matches!(err.protocol(), Some(ProtocolError::TruncatedFrame{ .. })));
	}

	#[test]
	fn short_payload_is_a_chunk_length_error() {
		let mut scope = SimulatedScope::new(vec![1; 5]);
		// Memory only holds five points, the scope answers the range with what it has
		let err = fetch_waveform(&mut scope, 8, 8).unwrap_err();
		assert!(matches!(err.protocol(), Some(ProtocolError::ChunkLength{ expected: 8, actual: 5, .. })));
	}

	#[test]
	fn transport_failure_propagates() {
		let mut scope = SimulatedScope::new(vec![0; 4]).with_failing_command(":WAV:DATA?");
		assert!(matches!(fetch_waveform(&mut scope, 4, 2), Err(CaptureError::Transport(_))));
	}

	#[test]
	fn cancelled_before_start_sends_nothing() {
		let mut scope = SimulatedScope::new(vec![0; 4]);
		let cancel = CancelToken::new();
		cancel.cancel();
		let err = fetch_waveform_cancellable(&mut scope, 4, 2, &cancel).unwrap_err();
		assert!(matches!(err, CaptureError::Cancelled{ completed_chunks: 0 }));
		assert!(scope.commands().is_empty());
	}
}
