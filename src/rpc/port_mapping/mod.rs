
pub const PMAP_PROG:u32 = 100000;
pub const PMAP_VERS:u32 = 2;
pub const PMAP_PORT:u16 = 111;

pub const PMAPPROC_GETPORT:u32 = 3;     // (mapping) -> unsigned int

use std::io::{self, Error, ErrorKind};
use std::time::Duration;

use log::debug;

use super::IPPROTO_TCP;
use super::tcp_clients::TcpClient;

/// A program registration as the portmapper describes it. Only TCP transports are looked up
/// since VXI-11 core channels run over TCP.
#[derive(Debug)]
pub struct Mapping {
	pub program: u32,
	pub version: u32,
}

pub struct TcpPortMapperClient {
	client: TcpClient,
}

impl TcpPortMapperClient {

	pub fn new(host:&str, timeout:Option<Duration>) -> io::Result<Self> {
		let client = TcpClient::connect((host, PMAP_PORT), PMAP_PROG, PMAP_VERS, timeout)?;
		Ok(Self{ client })
	}

	pub fn get_port(&mut self, m:&Mapping) -> io::Result<u16> {
		let packer = self.client.start_call(PMAPPROC_GETPORT)?;
		packer.pack_u32(m.program)?;
		packer.pack_u32(m.version)?;
		packer.pack_u32(IPPROTO_TCP)?;
		packer.pack_u32(0)?;

		let unpacker = self.client.do_call()?;
		let port:u32 = unpacker.unpack_u32()?;
		if !unpacker.all_data_consumed() {
			return Err(Error::new(ErrorKind::InvalidData, "Data unexpectedly left over after unpacking port"));
		}

		// The portmapper answers 0 for programs it doesn't know about
		match port {
			0 => Err(Error::new(ErrorKind::NotFound, format!("Program {:#x} v{} not registered", m.program, m.version))),
			p if p > u16::MAX as u32 => Err(Error::new(ErrorKind::InvalidData, format!("Port {} out of range", p))),
			p => {
				debug!("portmapper: program {:#x} v{} on tcp port {}", m.program, m.version, p);
				Ok(p as u16)
			},
		}
	}

}
