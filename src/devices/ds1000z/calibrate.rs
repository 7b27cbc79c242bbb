use serde::Serialize;

use crate::error::{CaptureError, Result};
use super::preamble::Preamble;

/// Raw ADC codes for a whole capture, in memory order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleBuffer {
	samples: Vec<u8>,
}

impl SampleBuffer {

	/// Concatenates chunk payloads in the order given.
	pub fn assemble<I>(chunks:I) -> Self
		where I: IntoIterator, I::Item: AsRef<[u8]>
	{
		let mut samples:Vec<u8> = vec![];
		for chunk in chunks {
			samples.extend_from_slice(chunk.as_ref());
		}
		SampleBuffer{ samples }
	}

	pub fn len(&self) -> usize { self.samples.len() }
	pub fn is_empty(&self) -> bool { self.samples.is_empty() }
	pub fn as_slice(&self) -> &[u8] { &self.samples }
	pub fn into_inner(self) -> Vec<u8> { self.samples }

}

impl From<Vec<u8>> for SampleBuffer {
	fn from(samples:Vec<u8>) -> Self { SampleBuffer{ samples } }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TimeUnit {
	#[serde(rename = "µS")]
	Micros,
	#[serde(rename = "mS")]
	Millis,
	#[serde(rename = "S")]
	Seconds,
}

impl TimeUnit {

	/// Picks the unit that keeps a time axis reaching `max_time` seconds readable.
	pub fn for_span(max_time:f64) -> Self {
		if max_time < 1e-3 { TimeUnit::Micros }
		else if max_time < 1.0 { TimeUnit::Millis }
		else { TimeUnit::Seconds }
	}

	pub fn per_second(&self) -> f64 {
		match self {
			TimeUnit::Micros  => 1e6,
			TimeUnit::Millis  => 1e3,
			TimeUnit::Seconds => 1.0,
		}
	}

	pub fn label(&self) -> &'static str {
		match self {
			TimeUnit::Micros  => "µS",
			TimeUnit::Millis  => "mS",
			TimeUnit::Seconds => "S",
		}
	}

}

/// Calibrated capture. `time` is expressed in `time_unit`, `voltage` in volts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WaveformSeries {
	pub time: Vec<f64>,
	pub voltage: Vec<f64>,
	pub time_unit: TimeUnit,
}

impl WaveformSeries {
	pub fn len(&self) -> usize { self.time.len() }
	pub fn is_empty(&self) -> bool { self.time.is_empty() }
}

pub fn code_to_voltage(code:u8, preamble:&Preamble) -> f64 {
	(code as f64 - preamble.y_origin - preamble.y_reference) * preamble.y_increment
}

/// Converts raw codes to volts with the preamble's vertical scaling, and lays out a time axis of
/// `memory_depth` points spaced by `timebase_scale`.
///
/// The time axis follows the timebase setting rather than the preamble's `x_increment`, so its
/// spacing is only the true sample pitch when the two agree.
pub fn calibrate(samples:&SampleBuffer, preamble:&Preamble, timebase_scale:f64, memory_depth:usize) -> Result<WaveformSeries> {
	if samples.len() != memory_depth {
		return Err(CaptureError::InvalidRequest(format!("{} samples for a memory depth of {}", samples.len(), memory_depth)));
	}
	if !timebase_scale.is_finite() || timebase_scale < 0.0 {
		return Err(CaptureError::InvalidRequest(format!("timebase scale {} is not usable", timebase_scale)));
	}

	let voltage:Vec<f64> = samples.as_slice().iter().map(|c| code_to_voltage(*c, preamble)).collect();

	let max_time:f64 = memory_depth.saturating_sub(1) as f64 * timebase_scale;
	let time_unit = TimeUnit::for_span(max_time);
	let scale:f64 = time_unit.per_second();
	let time:Vec<f64> = (0..memory_depth).map(|i| i as f64 * timebase_scale * scale).collect();

	Ok(WaveformSeries{ time, voltage, time_unit })
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::devices::ds1000z::preamble::{WaveformFormat, WaveformMode};

	fn preamble(y_origin:f64, y_reference:f64, y_increment:f64) -> Preamble {
		Preamble {
			format: WaveformFormat::Byte,
			mode: WaveformMode::Raw,
			points: 0,
			count: 1,
			x_increment: 1e-9,
			x_origin: 0.0,
			x_reference: 0.0,
			y_increment,
			y_origin,
			y_reference,
		}
	}

	#[test]
	fn assemble_preserves_order_without_dedup() {
		let buf = SampleBuffer::assemble(vec![vec![1u8, 2, 3], vec![4, 5], vec![6]]);
		assert_eq!(buf.as_slice(), &[1, 2, 3, 4, 5, 6]);

		let buf = SampleBuffer::assemble(vec![vec![7u8, 7], vec![], vec![7]]);
		assert_eq!(buf.len(), 3);
	}

	#[test]
	fn reference_code_is_zero_volts() {
		let p = preamble(0.0, 127.0, 0.04);
		assert!(code_to_voltage(127, &p).abs() < 1e-12);
		assert!((code_to_voltage(255, &p) - 5.12).abs() < 1e-9);
		assert!((code_to_voltage(0, &p) + 5.08).abs() < 1e-9);
	}

	#[test]
	fn y_origin_shifts_the_zero() {
		let p = preamble(-21.0, 127.0, 0.5);
		assert!(code_to_voltage(106, &p).abs() < 1e-12);
	}

	#[test]
	fn full_depth_axis_in_seconds() {
		let depth = 12_000_000;
		let samples = SampleBuffer::from(vec![127u8; depth]);
		let series = calibrate(&samples, &preamble(0.0, 127.0, 0.04), 1e-6, depth).unwrap();
		assert_eq!(series.time_unit, TimeUnit::Seconds);
		assert_eq!(series.time.len(), depth);
		assert_eq!(series.voltage.len(), depth);
		assert!((series.time[depth - 1] - 11.999999).abs() < 1e-6);
	}

	#[test]
	fn short_axis_in_microseconds() {
		let samples = SampleBuffer::from(vec![0u8, 255, 127]);
		let series = calibrate(&samples, &preamble(0.0, 127.0, 0.04), 1e-7, 3).unwrap();
		assert_eq!(series.time_unit, TimeUnit::Micros);
		assert!((series.time[2] - 0.2).abs() < 1e-9);
		assert!((series.voltage[1] - 5.12).abs() < 1e-9);
	}

	#[test]
	fn millisecond_axis() {
		let samples = SampleBuffer::from(vec![0u8; 1000]);
		let series = calibrate(&samples, &preamble(0.0, 127.0, 0.04), 1e-5, 1000).unwrap();
		assert_eq!(series.time_unit, TimeUnit::Millis);
		assert!((series.time[999] - 9.99).abs() < 1e-9);
	}

	#[test]
	fn unit_boundaries() {
		assert_eq!(TimeUnit::for_span(0.0), TimeUnit::Micros);
		assert_eq!(TimeUnit::for_span(1e-3), TimeUnit::Millis);
		assert_eq!(TimeUnit::for_span(1.0), TimeUnit::Seconds);
		assert_eq!(TimeUnit::Micros.label(), "µS");
	}

	#[test]
	fn length_mismatch_is_rejected() {
		let samples = SampleBuffer::from(vec![0u8; 4]);
		assert!(calibrate(&samples, &preamble(0.0, 127.0, 0.04), 1e-6, 5).is_err());
	}
}
