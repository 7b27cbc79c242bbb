
// Device core
pub const DEVICE_CORE_PROG:u32  = 0x0607af;
pub const DEVICE_CORE_VERS:u32  = 1;
pub const CREATE_LINK:u32       = 10;
pub const DEVICE_WRITE:u32      = 11;
pub const DEVICE_READ:u32       = 12;
pub const DEVICE_CLEAR:u32      = 15;
pub const DESTROY_LINK:u32      = 23;

pub const CLIENT_ID:i32 = 3333;

pub const OPERATION_FLAGS_END:i32 = 8;

// Reason bits on a device_read reply
pub const REASON_REQCNT:i32 = 1;
pub const REASON_CHR:i32    = 2;
pub const REASON_END:i32    = 4;

use std::io::{self, Error, ErrorKind};
use std::time::Duration;

use log::{debug, trace};

use crate::rpc::port_mapping::{TcpPortMapperClient, Mapping};
use crate::rpc::tcp_clients::TcpClient;

pub mod xdr_pack;

fn device_error(code:i32) -> io::Error {
	let (kind, msg) = match code {
		1  => (ErrorKind::InvalidInput,     "Syntax error"),
		3  => (ErrorKind::NotFound,         "Device not accessible"),
		4  => (ErrorKind::InvalidInput,     "Invalid link identifier"),
		5  => (ErrorKind::InvalidInput,     "Parameter error"),
		6  => (ErrorKind::NotConnected,     "Channel not established"),
		8  => (ErrorKind::Unsupported,      "Operation not supported"),
		9  => (ErrorKind::Other,            "Out of resources"),
		11 => (ErrorKind::WouldBlock,       "Device locked by another link"),
		12 => (ErrorKind::Other,            "No lock held by this link"),
		15 => (ErrorKind::TimedOut,         "I/O timeout"),
		17 => (ErrorKind::Other,            "I/O error"),
		21 => (ErrorKind::InvalidInput,     "Invalid address"),
		23 => (ErrorKind::Interrupted,      "Abort"),
		29 => (ErrorKind::AlreadyExists,    "Channel already established"),
		_  => (ErrorKind::Other,            "Unknown device error"),
	};
	Error::new(kind, format!("VXI-11 error {}: {}", code, msg))
}

fn check(code:i32) -> io::Result<()> {
	if code == 0 { Ok(()) } else { Err(device_error(code)) }
}

pub struct Link {
	pub link_id: i32,
	pub max_recv_size: u32,
}

pub struct CoreClient {
	client: TcpClient,
	opt_link: Option<Link>,
	io_timeout_ms: u32,
}

impl CoreClient {

	fn link(&self) -> io::Result<&Link> {
		self.opt_link.as_ref().ok_or_else(|| Error::new(ErrorKind::NotConnected, "No link"))
	}

	pub fn new(host:&str, io_timeout_ms:u32) -> io::Result<Self> {
		// Socket timeouts sit a little above the device-side timeout so the device reports first
		let sock_timeout = Some(Duration::from_millis(io_timeout_ms as u64 + 2000));

		let mut pmap_client = TcpPortMapperClient::new(host, sock_timeout)?;
		let port:u16 = pmap_client.get_port(&Mapping{ program: DEVICE_CORE_PROG, version: DEVICE_CORE_VERS })?;

		let client = TcpClient::connect((host, port), DEVICE_CORE_PROG, DEVICE_CORE_VERS, sock_timeout)?;
		Ok(CoreClient{ client, opt_link: None, io_timeout_ms })
	}

	pub fn create_link(&mut self, device:&str) -> io::Result<()> {
		if self.opt_link.is_some() {
			return Err(Error::new(ErrorKind::AlreadyExists, "Already connected to a link"));
		}

		let packer = self.client.start_call(CREATE_LINK)?;
		xdr_pack::pack_create_link_parms(packer, CLIENT_ID, false, self.io_timeout_ms, device)?;
		let unpacker = self.client.do_call()?;

		let error:i32         = unpacker.unpack_i32()?;
		let link_id:i32       = unpacker.unpack_i32()?;
		let _abort_port:u32   = unpacker.unpack_u32()?;
		let max_recv_size:u32 = unpacker.unpack_u32()?;
		check(error)?;

		debug!("vxi11 link {} to {} (max_recv_size={})", link_id, device, max_recv_size);
		self.opt_link = Some(Link{ link_id, max_recv_size });
		Ok(())
	}

	pub fn write(&mut self, data:&[u8]) -> io::Result<()> {
		let (link_id, max_recv_size) = {
			let link = self.link()?;
			(link.link_id, link.max_recv_size.max(1) as usize)
		};
		let timeout:u32 = self.io_timeout_ms;

		// Messages longer than the device accepts in one call go out in pieces, END on the last
		let pieces:Vec<&[u8]> = if data.is_empty() { vec![data] } else { data.chunks(max_recv_size).collect() };
		let n_pieces:usize = pieces.len();
		for (idx, piece) in pieces.into_iter().enumerate() {
			let flags:i32 = if idx + 1 == n_pieces { OPERATION_FLAGS_END } else { 0 };

			let packer = self.client.start_call(DEVICE_WRITE)?;
			xdr_pack::pack_device_write_parms(packer, link_id, timeout, timeout, flags, piece)?;
			let unpacker = self.client.do_call()?;

			let error:i32 = unpacker.unpack_i32()?;
			let size:u32  = unpacker.unpack_u32()?;
			check(error)?;

			if size as usize != piece.len() {
				return Err(Error::new(ErrorKind::WriteZero, format!("Device accepted {} of {} bytes", size, piece.len())));
			}
		}

		Ok(())
	}

	/// Reads one complete response message, stitching together partial reads until the device
	/// flags END.
	pub fn read(&mut self) -> io::Result<Vec<u8>> {
		let link_id:i32 = self.link()?.link_id;
		let timeout:u32 = self.io_timeout_ms;

		let mut ans:Vec<u8> = vec![];
		loop {
			let packer = self.client.start_call(DEVICE_READ)?;
			xdr_pack::pack_device_read_parms(packer, link_id, u32::MAX, timeout, timeout, 0, 0)?;
			let unpacker = self.client.do_call()?;

			let error:i32  = unpacker.unpack_i32()?;
			let reason:i32 = unpacker.unpack_i32()?;
			let data:Vec<u8> = unpacker.unpack_variable_len_opaque()?;
			check(error)?;

			trace!("vxi11 read {} bytes, reason={:#b}", data.len(), reason);
			ans.extend_from_slice(&data);

			if reason & REASON_END != 0 { return Ok(ans); }
			if reason & !(REASON_REQCNT | REASON_CHR | REASON_END) != 0 {
				return Err(Error::new(ErrorKind::InvalidData, format!("Reserved reason bits set: {:#x}", reason)));
			}
		}
	}

	/// Device clear: discards any pending output and resets the device's input parser.
	pub fn clear(&mut self) -> io::Result<()> {
		let link_id:i32 = self.link()?.link_id;
		let timeout:u32 = self.io_timeout_ms;

		let packer = self.client.start_call(DEVICE_CLEAR)?;
		xdr_pack::pack_device_generic_parms(packer, link_id, 0, timeout, timeout)?;
		let unpacker = self.client.do_call()?;
		check(unpacker.unpack_i32()?)
	}

	pub fn destroy_link(&mut self) -> io::Result<()> {
		let link_id:i32 = self.link()?.link_id;

		let packer = self.client.start_call(DESTROY_LINK)?;
		packer.pack_i32(link_id)?;
		let unpacker = self.client.do_call()?;
		let error:i32 = unpacker.unpack_i32()?;

		self.opt_link = None;
		check(error)
	}

}

impl Drop for CoreClient {

	fn drop(&mut self) {
		if self.opt_link.is_some() {
			if let Err(e) = self.destroy_link() {
				debug!("unable to destroy vxi11 link: {}", e);
			}
		}
	}

}
