use lazy_static::lazy_static;
use log::{info, warn};
use regex::Regex;
use serde::Serialize;

use crate::channel::{CommandChannel, Vxi11Channel};
use crate::config::CaptureConfig;
use crate::error::{CaptureError, ProtocolError, Result};

pub mod calibrate;
pub mod fetch;
pub mod frame;
pub mod preamble;

use calibrate::WaveformSeries;
use fetch::CancelToken;
use preamble::{Preamble, WaveformFormat};

lazy_static! {
	static ref IDN_RE: Regex   = Regex::new(r"^([^,]+),([^,]+),([^,]+),([^,\s]+)").unwrap();
	static ref MODEL_RE: Regex = Regex::new(r"^(DS|MSO)1\d{3}Z").unwrap();
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Identity {
	pub manufacturer: String,
	pub model: String,
	pub serial_num: String,
	pub fw_version: String,
}

impl Identity {
	pub fn parse(idn:&str) -> Option<Self> {
		let caps = IDN_RE.captures(idn.trim())?;
		let field = |i:usize| caps.get(i).map(|m| m.as_str().trim().to_owned());
		Some(Identity {
			manufacturer: field(1)?,
			model: field(2)?,
			serial_num: field(3)?,
			fw_version: field(4)?,
		})
	}

	pub fn is_ds1000z(&self) -> bool {
		self.manufacturer.eq_ignore_ascii_case("RIGOL TECHNOLOGIES") && MODEL_RE.is_match(&self.model)
	}
}

/// A finished acquisition together with the horizontal settings it was taken at.
#[derive(Debug, Clone, Serialize)]
pub struct Capture {
	pub channel: u8,
	pub memory_depth: usize,
	pub timebase_scale: f64,
	pub timebase_offset: f64,
	pub sample_rate: f64,
	pub volts_per_div: f64,
	pub volt_offset: f64,
	pub preamble: Preamble,
	pub series: WaveformSeries,
}

/// A Rigol DS1000Z series oscilloscope reached through a command channel.
pub struct Ds1000z<C: CommandChannel> {
	channel: C,
	config: CaptureConfig,
}

impl Ds1000z<Vxi11Channel> {

	/// Opens a VXI-11 link to `config.host` and checks that a DS1000Z is on the other end.
	pub fn connect(config:CaptureConfig) -> Result<Self> {
		let channel = Vxi11Channel::open(&config)?;
		let mut dev = Ds1000z::with_channel(channel, config);

		let identity = dev.identify()?;
		if !identity.is_ds1000z() {
			return Err(CaptureError::WrongInstrument(format!("{} {}", identity.manufacturer, identity.model)));
		}
		info!("connected to {} {} (serial {}, firmware {})", identity.manufacturer, identity.model, identity.serial_num, identity.fw_version);
		Ok(dev)
	}

}

impl<C: CommandChannel> Ds1000z<C> {

	pub fn with_channel(channel:C, config:CaptureConfig) -> Self { Self{ channel, config } }

	pub fn channel_mut(&mut self) -> &mut C { &mut self.channel }

	pub fn into_channel(self) -> C { self.channel }

	pub fn identify(&mut self) -> Result<Identity> {
		let resp:String = self.channel.query("*IDN?")?;
		Identity::parse(&resp).ok_or_else(|| unexpected("*IDN?", &resp).into())
	}

	fn query_f64(&mut self, query:&str) -> Result<f64> {
		let resp:String = self.channel.query(query)?;
		resp.trim().parse::<f64>().ok()
			.filter(|x| x.is_finite())
			.ok_or_else(|| unexpected(query, &resp).into())
	}

	/// Selects the source channel and switches waveform readout to full-memory BYTE data, then
	/// stops acquisition so memory holds still while it is read.
	pub fn prepare(&mut self, channel:u8) -> Result<()> {
		check_channel(channel)?;
		self.channel.send(&format!(":WAV:SOUR CHAN{}", channel))?;
		self.channel.send(":WAV:FORM BYTE")?;
		self.channel.send(":WAV:MODE RAW")?;
		self.channel.send(":STOP")?;
		Ok(())
	}

	/// Restarts acquisition and hands the front panel back.
	pub fn resume(&mut self) -> Result<()> {
		self.channel.send(":RUN")?;
		self.channel.send(":KEY:FORC")?;
		Ok(())
	}

	/// Memory depth in points. `None` when the scope is in AUTO depth.
	pub fn memory_depth(&mut self) -> Result<Option<usize>> {
		let resp:String = self.channel.query(":ACQ:MDEP?")?;
		let resp_trim = resp.trim();
		if resp_trim.eq_ignore_ascii_case("AUTO") {
			return Ok(None);
		}

		// Depths come back as integers, occasionally in scientific notation
		match resp_trim.parse::<usize>() {
			Ok(n) if n > 0 => Ok(Some(n)),
			_ => match resp_trim.parse::<f64>() {
				Ok(x) if x >= 1.0 && x.fract() == 0.0 => Ok(Some(x as usize)),
				_ => Err(unexpected(":ACQ:MDEP?", &resp).into()),
			},
		}
	}

	pub fn timebase_scale(&mut self)  -> Result<f64> { self.query_f64(":TIM:SCAL?")  }
	pub fn timebase_offset(&mut self) -> Result<f64> { self.query_f64(":TIM:OFFS?")  }
	pub fn sample_rate(&mut self)     -> Result<f64> { self.query_f64(":ACQ:SRAT?") }

	pub fn channel_scale(&mut self, channel:u8) -> Result<f64> {
		check_channel(channel)?;
		self.query_f64(&format!(":CHAN{}:SCAL?", channel))
	}

	pub fn channel_offset(&mut self, channel:u8) -> Result<f64> {
		check_channel(channel)?;
		self.query_f64(&format!(":CHAN{}:OFFS?", channel))
	}

	pub fn read_preamble(&mut self) -> Result<Preamble> { preamble::read_preamble(&mut self.channel) }

	/// Reads the preamble, fetches `memory_depth` points in chunks and calibrates them.
	pub fn fetch_and_calibrate(&mut self, memory_depth:usize, max_chunk_size:usize, timebase_scale:f64) -> Result<WaveformSeries> {
		self.fetch_and_calibrate_cancellable(memory_depth, max_chunk_size, timebase_scale, &CancelToken::new())
			.map(|(_, series)| series)
	}

	fn fetch_and_calibrate_cancellable(&mut self, memory_depth:usize, max_chunk_size:usize, timebase_scale:f64, cancel:&CancelToken) -> Result<(Preamble, WaveformSeries)> {
		let preamble:Preamble = self.read_preamble()?;
		if preamble.format != WaveformFormat::Byte {
			return Err(CaptureError::UnsupportedFormat(preamble.format));
		}

		let samples = fetch::fetch_waveform_cancellable(&mut self.channel, memory_depth, max_chunk_size, cancel)?;
		let series = calibrate::calibrate(&samples, &preamble, timebase_scale, memory_depth)?;
		Ok((preamble, series))
	}

	/// Takes a complete capture of the configured channel: prepares the scope, reads back its
	/// horizontal settings, fetches the whole of memory and sets the scope running again.
	///
	/// The scope is cleared and resumed even when the fetch fails; the fetch's error is the one
	/// returned.
	pub fn capture(&mut self, cancel:&CancelToken) -> Result<Capture> {
		let channel:u8 = self.config.channel;
		let max_chunk_size:usize = self.config.max_chunk_size;

		self.prepare(channel)?;
		let result = self.capture_stopped(channel, max_chunk_size, cancel);

		match result {
			Ok(capture) => {
				self.resume()?;
				Ok(capture)
			},
			Err(e) => {
				// Whatever the device queued for the abandoned chunk must not answer the resume
				if let Err(clear_err) = self.channel.clear() {
					warn!("unable to clear device after failed capture: {}", clear_err);
				}
				if let Err(resume_err) = self.resume() {
					warn!("unable to resume acquisition after failed capture: {}", resume_err);
				}
				Err(e)
			},
		}
	}

	fn capture_stopped(&mut self, channel:u8, max_chunk_size:usize, cancel:&CancelToken) -> Result<Capture> {
		let timebase_scale:f64 = self.timebase_scale()?;
		let timebase_offset:f64 = self.timebase_offset()?;
		let sample_rate:f64 = self.sample_rate()?;
		let volts_per_div:f64 = self.channel_scale(channel)?;
		let volt_offset:f64 = self.channel_offset(channel)?;

		let memory_depth:usize = match self.memory_depth()? {
			Some(n) => n,
			None => match self.config.auto_memory_depth {
				Some(n) => {
					warn!("memory depth is AUTO, assuming {} points from config", n);
					n
				},
				None => {
					let points = self.read_preamble()?.points as usize;
					warn!("memory depth is AUTO, using the preamble's {} points", points);
					points
				},
			},
		};
		info!("capturing CHAN{}: {} points, {} s/div, {} Sa/s", channel, memory_depth, timebase_scale, sample_rate);

		let (preamble, series) = self.fetch_and_calibrate_cancellable(memory_depth, max_chunk_size, timebase_scale, cancel)?;
		info!("captured {} points, time axis in {}", series.len(), series.time_unit.label());

		Ok(Capture{ channel, memory_depth, timebase_scale, timebase_offset, sample_rate, volts_per_div, volt_offset, preamble, series })
	}

}

fn unexpected(query:&str, response:&str) -> ProtocolError {
	ProtocolError::UnexpectedResponse{ query: query.to_owned(), response: response.to_owned() }
}

fn check_channel(channel:u8) -> Result<()> {
	if (1..=4).contains(&channel) { Ok(()) }
	else { Err(CaptureError::InvalidRequest(format!("DS1000Z has no channel {}", channel))) }
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::channel::mock::SimulatedScope;

	#[test]
	fn parses_idn() {
		let id = Identity::parse("RIGOL TECHNOLOGIES,DS1054Z,DS1ZA220300438,00.04.04.SP3\n").unwrap();
		assert_eq!(id.model, "DS1054Z");
		assert_eq!(id.serial_num, "DS1ZA220300438");
		assert_eq!(id.fw_version, "00.04.04.SP3");
		assert!(id.is_ds1000z());
	}

	#[test]
	fn other_models_are_not_ds1000z() {
		let id = Identity::parse("Siglent Technologies,SDS1202X-E,SDS1EDEX5R1234,1.3.27").unwrap();
		assert!(!id.is_ds1000z());
		assert!(Identity::parse("garbage").is_none());
	}

	#[test]
	fn auto_memory_depth_is_none() {
		let mut dev = Ds1000z::with_channel(SimulatedScope::new(vec![0; 4]).with_auto_depth(), CaptureConfig::default());
		assert_eq!(dev.memory_depth().unwrap(), None);
	}

	#[test]
	fn scientific_memory_depth_is_accepted() {
		let mut dev = Ds1000z::with_channel(SimulatedScope::new(vec![0; 4]).with_depth_reply("1.2e+07"), CaptureConfig::default());
		assert_eq!(dev.memory_depth().unwrap(), Some(12_000_000));
	}

	#[test]
	fn non_numeric_scalar_is_unexpected() {
		let mut dev = Ds1000z::with_channel(SimulatedScope::new(vec![0; 4]).with_depth_reply("lots"), CaptureConfig::default());
		assert!(matches!(dev.memory_depth().unwrap_err().protocol(), Some(ProtocolError::UnexpectedResponse{ .. })));
	}

	#[test]
	fn channel_five_is_rejected() {
		let mut dev = Ds1000z::with_channel(SimulatedScope::new(vec![0; 4]), CaptureConfig::default());
		assert!(matches!(dev.prepare(5), Err(CaptureError::InvalidRequest(_))));
		assert!(dev.channel_mut().commands().is_empty());
	}

	#[test]
	fn word_format_is_not_calibrated() {
		let mut dev = Ds1000z::with_channel(SimulatedScope::new(vec![0; 4]).with_format_code(1), CaptureConfig::default());
		assert!(matches!(dev.fetch_and_calibrate(4, 2, 1e-6), Err(CaptureError::UnsupportedFormat(WaveformFormat::Word))));
	}
}
