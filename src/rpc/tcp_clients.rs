use std::io::{self, Read, Write, Error, ErrorKind};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use byteorder::{BigEndian, WriteBytesExt, ReadBytesExt};
use log::trace;

use crate::xdr::{Packer, Unpacker};
use super::message;

const LAST_FRAGMENT:u32 = 0x8000_0000;

pub struct TcpClient {
	stream: TcpStream,
	prog: u32,
	vers: u32,
	lastxid: u32,
	packer: Packer,
	unpacker: Unpacker,
}

impl TcpClient {

	pub fn connect<A: ToSocketAddrs>(addr:A, prog:u32, vers:u32, timeout:Option<Duration>) -> io::Result<Self> {
		let stream = TcpStream::connect(addr)?;
		stream.set_read_timeout(timeout)?;
		stream.set_write_timeout(timeout)?;
		stream.set_nodelay(true)?;
		Ok(Self{ stream, prog, vers, lastxid: 0, packer: Packer::new(), unpacker: Unpacker::new() })
	}

	/// Begins a new call to procedure `prc` and hands back the packer so the caller can append
	/// the procedure's arguments.
	pub fn start_call(&mut self, prc:u32) -> io::Result<&mut Packer> {
		self.lastxid = self.lastxid.wrapping_add(1);
		self.packer.reset();
		message::pack_callheader_no_auth(&mut self.packer, self.lastxid, self.prog, self.vers, prc)?;
		Ok(&mut self.packer)
	}

	/// Sends the call built since `start_call` and waits for its reply. The returned unpacker is
	/// positioned at the procedure's results.
	pub fn do_call(&mut self) -> io::Result<&mut Unpacker> {
		let call:&[u8] = self.packer.as_bytes();
		let mut send_bytes:Vec<u8> = Vec::with_capacity(call.len() + 4);
		send_bytes.write_u32::<BigEndian>(call.len() as u32 | LAST_FRAGMENT)?;
		send_bytes.extend_from_slice(call);
		self.stream.write_all(&send_bytes)?;
		trace!("rpc call xid={} prog={:#x} ({} bytes)", self.lastxid, self.prog, call.len());

		loop {
			let reply:Vec<u8> = self.read_record()?;
			self.unpacker.reset(reply);

			let xid:u32 = message::unpack_replyheader(&mut self.unpacker)?;
			if xid == self.lastxid {
				return Ok(&mut self.unpacker);
			} else if xid < self.lastxid {
				// A late reply to an earlier call that already gave up
				trace!("discarding stale rpc reply xid={}", xid);
				continue;
			} else {
				return Err(Error::new(ErrorKind::InvalidData, format!("Reply xid {} is ahead of the last call {}", xid, self.lastxid)));
			}
		}
	}

	// Reassembles one record from its record-marking fragments
	fn read_record(&mut self) -> io::Result<Vec<u8>> {
		let mut reply:Vec<u8> = vec![];
		loop {
			let marker:u32 = self.stream.read_u32::<BigEndian>()?;
			let n:usize = (marker & !LAST_FRAGMENT) as usize;

			let start:usize = reply.len();
			reply.resize(start + n, 0);
			self.stream.read_exact(&mut reply[start..])?;

			if marker & LAST_FRAGMENT != 0 { return Ok(reply); }
		}
	}

}
