
// External data representation, a protocol for serializing data to be sent over the network
pub mod xdr;

// Remote procedure call, a protocol build on top of XDR to provide something like C-style function calls over the network
pub mod rpc;

// A protocol using RPC that's meant to communicate with instruments like oscilloscopes, power supplies, waveform generators, etc
pub mod vxi11;

// Request/response channels to an instrument, over VXI-11 or simulated
pub mod channel;

// Instruments driven through a channel
pub mod devices;

pub mod config;
pub mod error;

pub use channel::CommandChannel;
pub use config::CaptureConfig;
pub use devices::ds1000z::{Capture, Ds1000z};
pub use devices::ds1000z::calibrate::{SampleBuffer, TimeUnit, WaveformSeries};
pub use devices::ds1000z::fetch::CancelToken;
pub use devices::ds1000z::preamble::Preamble;
pub use error::{CaptureError, ProtocolError, Result};
