//! The command channel the capture pipeline talks through.
//!
//! The instrument answers one command at a time, so a channel is used through `&mut` and never
//! shared between captures. Callers that want several captures against one instrument have to
//! serialize them themselves.

use std::io::{self, Error, ErrorKind};
use std::str;
use std::thread;

use log::debug;

use crate::config::{CaptureConfig, SettlingIntervals};
use crate::vxi11::CoreClient;

pub mod mock;

pub trait CommandChannel {
	/// Writes one command. Any response it provokes is left for a following read.
	fn send(&mut self, command:&str) -> io::Result<()>;

	/// Reads one newline-terminated text response, without the terminator.
	fn read_line(&mut self) -> io::Result<String>;

	/// Reads one complete binary response exactly as the device sent it.
	fn read_raw(&mut self) -> io::Result<Vec<u8>>;

	fn query(&mut self, command:&str) -> io::Result<String> {
		self.send(command)?;
		self.read_line()
	}

	/// Discards any response the device still has queued, e.g. after a capture was abandoned
	/// mid-chunk.
	fn clear(&mut self) -> io::Result<()> { Ok(()) }
}

/// Commands are paced by what they ask the instrument to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandClass {
	Command,
	Query,
	/// A query answered with a binary block, which takes the device noticeably longer to stage.
	DataQuery,
}

impl CommandClass {
	pub fn of(command:&str) -> Self {
		let cmd = command.trim().to_ascii_uppercase();
		if cmd.ends_with(":DATA?") {
			CommandClass::DataQuery
		} else if cmd.ends_with('?') {
			CommandClass::Query
		} else {
			CommandClass::Command
		}
	}
}

/// A command channel over a VXI-11 link.
///
/// Every write blocks for its class's settling interval before returning, so the read that
/// follows never races the instrument.
pub struct Vxi11Channel {
	core: CoreClient,
	settling: SettlingIntervals,
}

impl Vxi11Channel {

	pub fn open(config:&CaptureConfig) -> io::Result<Self> {
		let mut core = CoreClient::new(&config.host, config.io_timeout_ms)?;
		core.create_link(&config.device_name)?;
		Ok(Self{ core, settling: config.settling.clone() })
	}

}

impl CommandChannel for Vxi11Channel {

	fn send(&mut self, command:&str) -> io::Result<()> {
		debug!("-> {}", command);
		let mut msg:Vec<u8> = Vec::with_capacity(command.len() + 1);
		msg.extend_from_slice(command.as_bytes());
		msg.push(b'\n');
		self.core.write(&msg)?;

		let settle = self.settling.for_class(CommandClass::of(command));
		thread::sleep(settle);
		Ok(())
	}

	fn read_line(&mut self) -> io::Result<String> {
		let resp:Vec<u8> = self.core.read()?;
		let line:&str = str::from_utf8(&resp)
			.map_err(|_| Error::new(ErrorKind::InvalidData, "Unable to parse response as UTF-8"))?;
		let line = line.trim_end_matches(&['\n', '\r'][..]);
		debug!("<- {}", line);
		Ok(line.to_owned())
	}

	fn read_raw(&mut self) -> io::Result<Vec<u8>> {
		let resp:Vec<u8> = self.core.read()?;
		debug!("<- {} raw bytes", resp.len());
		Ok(resp)
	}

	fn clear(&mut self) -> io::Result<()> {
		debug!("-> device clear");
		self.core.clear()
	}

}
