//! An in-memory stand-in for a DS1000Z, answering the subset of its command set the capture
//! pipeline uses. Faults a real scope can produce (clamped cursors, short reads, dead links)
//! are switched on with the `with_*` builders.

use std::collections::VecDeque;
use std::io::{self, Error, ErrorKind};

use crate::devices::ds1000z::fetch::CancelToken;
use crate::devices::ds1000z::frame::encode_frame;
use super::CommandChannel;

pub struct SimulatedScope {
	samples: Vec<u8>,
	idn: String,

	// Device state the command set can change
	source: u8,
	format_code: u8,
	mode_code: u8,
	start: usize,
	stop: usize,
	running: bool,

	// Fixed readings
	x_increment: f64,
	y_increment: f64,
	y_origin: f64,
	y_reference: f64,
	timebase_scale: f64,
	timebase_offset: f64,
	sample_rate: f64,
	volts_per_div: f64,
	volt_offset: f64,
	depth_reply: Option<String>,

	// Fault injection
	start_clamp: Option<usize>,
	stop_clamp: Option<usize>,
	echo_reply: Option<(String, String)>,
	truncate_frames_by: usize,
	failing_command: Option<String>,
	preamble_line: Option<String>,
	cancel_after: Option<(CancelToken, usize)>,

	data_queries: usize,
	output: VecDeque<Vec<u8>>,
	commands: Vec<String>,
}

fn bad_command(cmd:&str) -> io::Error {
	Error::new(ErrorKind::InvalidInput, format!("simulated scope does not understand {:?}", cmd))
}

fn parse_arg<T: std::str::FromStr>(cmd:&str, arg:Option<&str>) -> io::Result<T> {
	arg.and_then(|a| a.trim().parse::<T>().ok()).ok_or_else(|| bad_command(cmd))
}

impl SimulatedScope {

	/// A running scope whose sample memory holds `samples`, calibrated so code 127 is 0 V at
	/// 40 mV per code.
	pub fn new(samples:Vec<u8>) -> Self {
		let stop = samples.len().max(1);
		Self {
			samples,
			idn: "RIGOL TECHNOLOGIES,DS1054Z,DS1ZA000000001,00.04.04.SP3".to_owned(),
			source: 1,
			format_code: 0,
			mode_code: 0,
			start: 1,
			stop,
			running: true,
			x_increment: 1e-9,
			y_increment: 0.04,
			y_origin: 0.0,
			y_reference: 127.0,
			timebase_scale: 1e-6,
			timebase_offset: 0.0,
			sample_rate: 1e9,
			volts_per_div: 1.0,
			volt_offset: 0.0,
			depth_reply: None,
			start_clamp: None,
			stop_clamp: None,
			echo_reply: None,
			truncate_frames_by: 0,
			failing_command: None,
			preamble_line: None,
			cancel_after: None,
			data_queries: 0,
			output: VecDeque::new(),
			commands: vec![],
		}
	}

	pub fn with_idn(mut self, idn:&str) -> Self { self.idn = idn.to_owned(); self }
	pub fn with_timebase_scale(mut self, scale:f64) -> Self { self.timebase_scale = scale; self }
	pub fn with_format_code(mut self, code:u8) -> Self { self.format_code = code; self }
	pub fn with_auto_depth(self) -> Self { self.with_depth_reply("AUTO") }
	pub fn with_depth_reply(mut self, reply:&str) -> Self { self.depth_reply = Some(reply.to_owned()); self }
	pub fn with_preamble_line(mut self, line:&str) -> Self { self.preamble_line = Some(line.to_owned()); self }

	pub fn with_vertical(mut self, y_increment:f64, y_origin:f64, y_reference:f64) -> Self {
		self.y_increment = y_increment;
		self.y_origin = y_origin;
		self.y_reference = y_reference;
		self
	}

	/// Start cursors set past `max` land on `max` instead.
	pub fn with_start_clamp(mut self, max:usize) -> Self { self.start_clamp = Some(max); self }

	/// Stop cursors set past `max` land on `max` instead.
	pub fn with_stop_clamp(mut self, max:usize) -> Self { self.stop_clamp = Some(max); self }

	/// `query` (`:WAV:STAR?` or `:WAV:STOP?`) is answered with `reply` instead of the cursor.
	pub fn with_echo_reply(mut self, query:&str, reply:&str) -> Self {
		self.echo_reply = Some((query.to_ascii_uppercase(), reply.to_owned()));
		self
	}

	/// Every data block loses its last `n` bytes on the way out.
	pub fn with_truncated_frame(mut self, n:usize) -> Self { self.truncate_frames_by = n; self }

	/// The link fails whenever `cmd` is sent.
	pub fn with_failing_command(mut self, cmd:&str) -> Self { self.failing_command = Some(cmd.to_owned()); self }

	/// Trips `token` while serving the `n`th data query, as if a user hit cancel during that chunk.
	pub fn with_cancel_after(mut self, token:CancelToken, n:usize) -> Self { self.cancel_after = Some((token, n)); self }

	pub fn commands(&self) -> &[String] { &self.commands }
	pub fn is_running(&self) -> bool { self.running }
	pub fn source(&self) -> u8 { self.source }
	pub fn format_code(&self) -> u8 { self.format_code }
	pub fn mode_code(&self) -> u8 { self.mode_code }

	fn reply(&mut self, line:String) {
		let mut bytes = line.into_bytes();
		bytes.push(b'\n');
		self.output.push_back(bytes);
	}

	fn echo(&mut self, query:&str, cursor:usize) {
		let line = match &self.echo_reply {
			Some((q, reply)) if q == query => reply.clone(),
			_ => cursor.to_string(),
		};
		self.reply(line)
	}

	fn preamble(&self) -> String {
		match &self.preamble_line {
			Some(line) => line.clone(),
			None => format!("{},{},{},1,{:e},{:e},0,{:e},{},{}",
				self.format_code, self.mode_code, self.samples.len(),
				self.x_increment, -(self.samples.len() as f64) * self.x_increment / 2.0,
				self.y_increment, self.y_origin, self.y_reference),
		}
	}

	fn data_block(&mut self) -> Vec<u8> {
		self.data_queries += 1;
		if let Some((token, n)) = &self.cancel_after {
			if self.data_queries == *n { token.cancel(); }
		}

		let from = (self.start - 1).min(self.samples.len());
		let to = self.stop.min(self.samples.len()).max(from);
		let mut frame = encode_frame(&self.samples[from..to]);
		frame.truncate(frame.len().saturating_sub(self.truncate_frames_by));
		frame
	}

}

impl CommandChannel for SimulatedScope {

	fn send(&mut self, command:&str) -> io::Result<()> {
		let cmd = command.trim().to_owned();
		self.commands.push(cmd.clone());

		if self.failing_command.as_deref() == Some(cmd.as_str()) {
			return Err(Error::new(ErrorKind::BrokenPipe, "simulated link failure"));
		}

		let upper = cmd.to_ascii_uppercase();
		let mut parts = upper.splitn(2, char::is_whitespace);
		let header = parts.next().unwrap_or("");
		let arg = parts.next();

		match header {
			"*IDN?"       => { let idn = self.idn.clone(); self.reply(idn) },
			":WAV:SOUR"   => {
				self.source = match arg.map(str::trim) {
					Some("CHAN1") => 1, Some("CHAN2") => 2, Some("CHAN3") => 3, Some("CHAN4") => 4,
					_ => return Err(bad_command(&cmd)),
				};
			},
			":WAV:FORM"   => {
				self.format_code = match arg.map(str::trim) {
					Some("BYTE") => 0, Some("WORD") => 1, Some("ASC") | Some("ASCII") => 2,
					_ => return Err(bad_command(&cmd)),
				};
			},
			":WAV:MODE"   => {
				self.mode_code = match arg.map(str::trim) {
					Some("NORM") | Some("NORMAL") => 0, Some("MAX") | Some("MAXIMUM") => 1, Some("RAW") => 2,
					_ => return Err(bad_command(&cmd)),
				};
			},
			":WAV:STAR"   => {
				let start = parse_arg::<usize>(&cmd, arg)?.max(1);
				self.start = self.start_clamp.map_or(start, |max| start.min(max));
			},
			":WAV:STOP"   => {
				let stop = parse_arg::<usize>(&cmd, arg)?;
				self.stop = self.stop_clamp.map_or(stop, |max| stop.min(max));
			},
			":WAV:STAR?"  => { let s = self.start; self.echo(header, s) },
			":WAV:STOP?"  => { let s = self.stop; self.echo(header, s) },
			":WAV:PRE?"   => { let p = self.preamble(); self.reply(p) },
			":WAV:DATA?"  => { let block = self.data_block(); self.output.push_back(block) },
			":ACQ:MDEP?"  => {
				let depth = self.depth_reply.clone().unwrap_or_else(|| self.samples.len().to_string());
				self.reply(depth)
			},
			":ACQ:SRAT?"  => { let s = format!("{:e}", self.sample_rate); self.reply(s) },
			":TIM:SCAL?"  => { let s = format!("{:e}", self.timebase_scale); self.reply(s) },
			":TIM:OFFS?"  => { let s = format!("{:e}", self.timebase_offset); self.reply(s) },
			":STOP"       => self.running = false,
			":RUN"        => self.running = true,
			":KEY:FORC"   => { },
			h if h.starts_with(":CHAN") && h.ends_with(":SCAL?") => { let s = format!("{:e}", self.volts_per_div); self.reply(s) },
			h if h.starts_with(":CHAN") && h.ends_with(":OFFS?") => { let s = format!("{:e}", self.volt_offset); self.reply(s) },
			_ => return Err(bad_command(&cmd)),
		}

		Ok(())
	}

	fn read_line(&mut self) -> io::Result<String> {
		let bytes = self.output.pop_front().ok_or_else(|| Error::new(ErrorKind::TimedOut, "nothing to read"))?;
		let line = String::from_utf8(bytes).map_err(|_| Error::new(ErrorKind::InvalidData, "response is not UTF-8"))?;
		Ok(line.trim_end_matches('\n').to_owned())
	}

	fn read_raw(&mut self) -> io::Result<Vec<u8>> {
		self.output.pop_front().ok_or_else(|| Error::new(ErrorKind::TimedOut, "nothing to read"))
	}

	fn clear(&mut self) -> io::Result<()> {
		self.commands.push("<clear>".to_owned());
		self.output.clear();
		Ok(())
	}

}
