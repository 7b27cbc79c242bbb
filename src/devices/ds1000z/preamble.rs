use log::debug;
use serde::Serialize;

use crate::channel::CommandChannel;
use crate::error::{ProtocolError, Result};

pub const PREAMBLE_QUERY:&str = ":WAV:PRE?";

const FIELD_NAMES:[&str; 10] = [
	"format", "mode", "points", "count",
	"xincrement", "xorigin", "xreference",
	"yincrement", "yorigin", "yreference",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WaveformFormat { Byte, Word, Ascii }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WaveformMode { Normal, Max, Raw }

/// Scaling parameters for the current acquisition, as reported by `:WAV:PRE?`. Only valid for
/// the acquisition it was read for.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Preamble {
	pub format: WaveformFormat,
	pub mode: WaveformMode,
	pub points: u64,
	pub count: u64,
	pub x_increment: f64,
	pub x_origin: f64,
	pub x_reference: f64,
	pub y_increment: f64,
	pub y_origin: f64,
	pub y_reference: f64,
}

fn malformed(msg:String) -> ProtocolError { ProtocolError::MalformedPreamble(msg) }

fn as_count(name:&str, x:f64) -> std::result::Result<u64, ProtocolError> {
	if x >= 0.0 && x.fract() == 0.0 && x <= u64::MAX as f64 { Ok(x as u64) }
	else { Err(malformed(format!("{} = {} is not a count", name, x))) }
}

impl Preamble {

	pub fn parse(line:&str) -> std::result::Result<Self, ProtocolError> {
		let fields:Vec<&str> = line.trim().split(',').collect();
		if fields.len() != FIELD_NAMES.len() {
			return Err(malformed(format!("expected {} fields, got {}", FIELD_NAMES.len(), fields.len())));
		}

		let mut v = [0f64; 10];
		for (idx, field) in fields.iter().enumerate() {
			v[idx] = field.trim().parse::<f64>().ok()
				.filter(|x| x.is_finite())
				.ok_or_else(|| malformed(format!("{} = {:?} is not a number", FIELD_NAMES[idx], field)))?;
		}

		let format = match v[0] as i64 {
			_ if v[0].fract() != 0.0 => return Err(malformed(format!("format code {}", v[0]))),
			0 => WaveformFormat::Byte,
			1 => WaveformFormat::Word,
			2 => WaveformFormat::Ascii,
			_ => return Err(malformed(format!("format code {}", v[0]))),
		};
		let mode = match v[1] as i64 {
			_ if v[1].fract() != 0.0 => return Err(malformed(format!("mode code {}", v[1]))),
			0 => WaveformMode::Normal,
			1 => WaveformMode::Max,
			2 => WaveformMode::Raw,
			_ => return Err(malformed(format!("mode code {}", v[1]))),
		};

		Ok(Preamble {
			format,
			mode,
			points: as_count(FIELD_NAMES[2], v[2])?,
			count: as_count(FIELD_NAMES[3], v[3])?,
			x_increment: v[4],
			x_origin: v[5],
			x_reference: v[6],
			y_increment: v[7],
			y_origin: v[8],
			y_reference: v[9],
		})
	}

}

/// Asks the device for the current preamble. Never retried: a preamble read against a changed
/// acquisition would silently miscalibrate everything fetched after it.
pub fn read_preamble<C: CommandChannel>(channel:&mut C) -> Result<Preamble> {
	let line:String = channel.query(PREAMBLE_QUERY)?;
	let preamble = Preamble::parse(&line)?;
	debug!("preamble: {:?}", preamble);
	Ok(preamble)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::channel::mock::SimulatedScope;

	// Captured from a DS1054Z in RAW mode with 12M points of memory
	const DS1054Z_LINE:&str = "0,2,12000000,1,1.000000e-09,-6.000000e-03,0,4.132813e-02,-21,127\n";

	#[test]
	fn parses_fields_in_order() {
		let p = Preamble::parse(DS1054Z_LINE).unwrap();
		assert_eq!(p.format, WaveformFormat::Byte);
		assert_eq!(p.mode, WaveformMode::Raw);
		assert_eq!(p.points, 12_000_000);
		assert_eq!(p.count, 1);
		assert_eq!(p.x_increment, 1e-9);
		assert_eq!(p.x_origin, -6e-3);
		assert_eq!(p.x_reference, 0.0);
		assert_eq!(p.y_increment, 4.132813e-02);
		assert_eq!(p.y_origin, -21.0);
		assert_eq!(p.y_reference, 127.0);
	}

	#[test]
	fn mode_codes() {
		assert_eq!(Preamble::parse("0,0,1200,1,1e-9,0,0,0.04,0,127").unwrap().mode, WaveformMode::Normal);
		assert_eq!(Preamble::parse("0,1,1200,1,1e-9,0,0,0.04,0,127").unwrap().mode, WaveformMode::Max);
		assert_eq!(Preamble::parse("0,2,1200,1,1e-9,0,0,0.04,0,127").unwrap().mode, WaveformMode::Raw);
		assert!(Preamble::parse("0,3,1200,1,1e-9,0,0,0.04,0,127").is_err());
	}

	#[test]
	fn nine_fields_is_malformed() {
		let err = Preamble::parse("0,1,1200,1,1e-9,0,0,0.04,0").unwrap_err();
		assert!(matches!(err, ProtocolError::MalformedPreamble(_)));
	}

	#[test]
	fn eleven_fields_is_malformed() {
		assert!(Preamble::parse("0,1,1200,1,1e-9,0,0,0.04,0,127,5").is_err());
	}

	#[test]
	fn non_numeric_field_is_malformed() {
		let err = Preamble::parse("0,1,1200,1,1e-9,0,0,volts,0,127").unwrap_err();
		assert_eq!(err, ProtocolError::MalformedPreamble("yincrement = \"volts\" is not a number".to_owned()));
	}

	#[test]
	fn empty_field_is_malformed() {
		assert!(Preamble::parse("0,1,1200,1,1e-9,,0,0.04,0,127").is_err());
	}

	#[test]
	fn unknown_format_code_is_malformed() {
		assert!(Preamble::parse("3,1,1200,1,1e-9,0,0,0.04,0,127").is_err());
		assert!(Preamble::parse("0.5,1,1200,1,1e-9,0,0,0.04,0,127").is_err());
	}

	#[test]
	fn fractional_point_count_is_malformed() {
		assert!(Preamble::parse("0,1,1200.5,1,1e-9,0,0,0.04,0,127").is_err());
	}

	#[test]
	fn reads_one_line_from_the_channel() {
		let mut scope = SimulatedScope::new(vec![127; 10]);
		let p = read_preamble(&mut scope).unwrap();
		assert_eq!(p.points, 10);
		assert_eq!(scope.commands(), &[PREAMBLE_QUERY.to_owned()]);
	}
}
