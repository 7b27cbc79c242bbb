
use std::io::{self, Error, ErrorKind};

use crate::xdr::Packer;

pub fn pack_create_link_parms(packer:&mut Packer, id:i32, lock_device:bool, lock_timeout:u32, device:&str) -> io::Result<()> {
	if !device.is_ascii() {
		return Err(Error::new(ErrorKind::InvalidInput, "VXI-11 device names must be ASCII"));
	}
	packer.pack_i32(id)?;
	packer.pack_bool(lock_device)?;
	packer.pack_u32(lock_timeout)?;
	packer.pack_variable_len_opaque(device.as_bytes())
}

pub fn pack_device_write_parms(packer:&mut Packer, link:i32, timeout:u32, lock_timeout:u32, flags:i32, data:&[u8]) -> io::Result<()> {
	packer.pack_i32(link)?;
	packer.pack_u32(timeout)?;
	packer.pack_u32(lock_timeout)?;
	packer.pack_i32(flags)?;
	packer.pack_variable_len_opaque(data)
}

pub fn pack_device_read_parms(packer:&mut Packer, link:i32, request_size:u32, timeout:u32, lock_timeout:u32, flags:i32, term_char:i32) -> io::Result<()> {
	packer.pack_i32(link)?;
	packer.pack_u32(request_size)?;
	packer.pack_u32(timeout)?;
	packer.pack_u32(lock_timeout)?;
	packer.pack_i32(flags)?;
	packer.pack_i32(term_char)
}

pub fn pack_device_generic_parms(packer:&mut Packer, link:i32, flags:i32, lock_timeout:u32, timeout:u32) -> io::Result<()> {
	packer.pack_i32(link)?;
	packer.pack_i32(flags)?;
	packer.pack_u32(lock_timeout)?;
	packer.pack_u32(timeout)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn create_link_rejects_non_ascii_device() {
		let mut p = Packer::new();
		assert!(pack_create_link_parms(&mut p, 1, false, 1000, "inst\u{e9}").is_err());
	}

	#[test]
	fn write_parms_carry_payload_last() {
		let mut p = Packer::new();
		pack_device_write_parms(&mut p, 5, 100, 200, 8, b"*IDN?").unwrap();
		let bytes = p.as_bytes();
		assert_eq!(bytes.len(), 4*4 + 4 + 8);
		assert_eq!(&bytes[20..25], b"*IDN?");
	}
}
