//! Capture settings, read from a JSON file by front ends.
//!
//! Every field has a default so a config file only needs to name what differs, usually just
//! the `host`:
//!
//! ```json
//! { "host": "192.168.1.50", "settling": { "data_ms": 500 } }
//! ```

use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::channel::CommandClass;

/// Largest number of BYTE samples a DS1000Z returns for one `:WAV:DATA?` in RAW mode.
pub const DEFAULT_MAX_CHUNK_SIZE:usize = 250_000;

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("unable to read config: {0}")]
	Io(#[from] io::Error),

	#[error("unable to parse config: {0}")]
	Parse(#[from] serde_json::Error),

	#[error("invalid config: {0}")]
	Invalid(String),
}

/// How long to let the instrument settle after each class of command before talking to it
/// again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlingIntervals {
	pub command_ms: u64,
	pub query_ms: u64,
	pub data_ms: u64,
}

impl Default for SettlingIntervals {
	fn default() -> Self {
		Self{ command_ms: 100, query_ms: 100, data_ms: 250 }
	}
}

impl SettlingIntervals {
	pub fn for_class(&self, class:CommandClass) -> Duration {
		Duration::from_millis(match class {
			CommandClass::Command   => self.command_ms,
			CommandClass::Query     => self.query_ms,
			CommandClass::DataQuery => self.data_ms,
		})
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
	pub host: String,
	pub device_name: String,
	pub channel: u8,
	pub max_chunk_size: usize,
	/// Depth to assume when the scope reports `AUTO`; `None` falls back to the preamble's point count.
	pub auto_memory_depth: Option<usize>,
	pub settling: SettlingIntervals,
	pub io_timeout_ms: u32,
}

impl Default for CaptureConfig {
	fn default() -> Self {
		Self {
			host: String::new(),
			device_name: "inst0".to_owned(),
			channel: 1,
			max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
			auto_memory_depth: None,
			settling: SettlingIntervals::default(),
			io_timeout_ms: 12_000,
		}
	}
}

impl CaptureConfig {

	pub fn from_json_str(s:&str) -> Result<Self, ConfigError> {
		let config:Self = serde_json::from_str(s)?;
		config.validate()?;
		Ok(config)
	}

	pub fn from_json_file<P: AsRef<Path>>(path:P) -> Result<Self, ConfigError> {
		Self::from_json_str(&fs::read_to_string(path)?)
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.host.trim().is_empty() {
			return Err(ConfigError::Invalid("host must be set".to_owned()));
		}
		if !(1..=4).contains(&self.channel) {
			return Err(ConfigError::Invalid(format!("channel {} out of range 1..=4", self.channel)));
		}
		if self.max_chunk_size == 0 {
			return Err(ConfigError::Invalid("max_chunk_size must be at least 1".to_owned()));
		}
		if self.auto_memory_depth == Some(0) {
			return Err(ConfigError::Invalid("auto_memory_depth must be at least 1".to_owned()));
		}
		let s = &self.settling;
		for (name, ms) in &[("command_ms", s.command_ms), ("query_ms", s.query_ms), ("data_ms", s.data_ms)] {
			if *ms == 0 {
				return Err(ConfigError::Invalid(format!("settling.{} must be at least 1", name)));
			}
		}
		Ok(())
	}

}
