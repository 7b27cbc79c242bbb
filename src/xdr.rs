use std::io::{self, Error, ErrorKind, Cursor};

use byteorder::{BigEndian, WriteBytesExt, ReadBytesExt};

// XDR items are always padded out to a multiple of four bytes
const ALIGN:usize = 4;

fn padding(len:usize) -> usize { (ALIGN - len % ALIGN) % ALIGN }

#[derive(Default)]
pub struct Packer {
	buff: Vec<u8>,
}

impl Packer {

	pub fn new() -> Self { Self::default() }

	pub fn reset(&mut self) { self.buff.clear(); }

	pub fn as_bytes(&self) -> &[u8] { &self.buff }

	pub fn pack_u32(&mut self, x:u32) -> io::Result<()> { self.buff.write_u32::<BigEndian>(x) }
	pub fn pack_i32(&mut self, x:i32) -> io::Result<()> { self.buff.write_i32::<BigEndian>(x) }
	pub fn pack_enum(&mut self, x:i32) -> io::Result<()> { self.pack_i32(x) }
	pub fn pack_bool(&mut self, b:bool) -> io::Result<()> { self.pack_i32(if b { 1 } else { 0 }) }

	pub fn pack_variable_len_opaque(&mut self, data:&[u8]) -> io::Result<()> {
		if data.len() > u32::MAX as usize {
			return Err(Error::new(ErrorKind::InvalidInput, "Opaque data too long for XDR"));
		}
		self.pack_u32(data.len() as u32)?;
		self.buff.extend_from_slice(data);
		self.buff.resize(self.buff.len() + padding(data.len()), 0);
		Ok(())
	}

}

// Reads through a received reply without shifting the buffer; replies carrying a waveform
// chunk are hundreds of kilobytes so consuming from the front has to be O(1)
#[derive(Default)]
pub struct Unpacker {
	rdr: Cursor<Vec<u8>>,
}

impl Unpacker {

	pub fn new() -> Self { Self::default() }

	pub fn reset(&mut self, data:Vec<u8>) { self.rdr = Cursor::new(data); }

	pub fn remaining(&self) -> usize {
		self.rdr.get_ref().len().saturating_sub(self.rdr.position() as usize)
	}

	pub fn all_data_consumed(&self) -> bool { self.remaining() == 0 }

	pub fn unpack_u32(&mut self) -> io::Result<u32> { self.rdr.read_u32::<BigEndian>() }
	pub fn unpack_i32(&mut self) -> io::Result<i32> { self.rdr.read_i32::<BigEndian>() }

	// Range checks on enums belong to the caller, which knows the legal set of values
	pub fn unpack_enum(&mut self) -> io::Result<i32> { self.unpack_i32() }

	pub fn unpack_bool(&mut self) -> io::Result<bool> {
		match self.unpack_i32()? {
			0 => Ok(false),
			1 => Ok(true),
			x => Err(Error::new(ErrorKind::InvalidData, format!("Expected 0 or 1 for an XDR bool but got {}", x))),
		}
	}

	pub fn unpack_variable_len_opaque(&mut self) -> io::Result<Vec<u8>> {
		let n:usize = self.unpack_u32()? as usize;
		let padded:usize = n + padding(n);
		if padded > self.remaining() {
			return Err(Error::new(ErrorKind::UnexpectedEof, "Opaque length runs past the end of the reply"));
		}

		let start:usize = self.rdr.position() as usize;
		let ans:Vec<u8> = self.rdr.get_ref()[start..start + n].to_vec();
		self.rdr.set_position((start + padded) as u64);
		Ok(ans)
	}

}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn opaque_is_padded_to_four_bytes() {
		let mut packer = Packer::new();
		packer.pack_variable_len_opaque(b"inst0").unwrap();
		assert_eq!(packer.as_bytes(), &[0, 0, 0, 5, b'i', b'n', b's', b't', b'0', 0, 0, 0]);
	}

	#[test]
	fn unpacker_skips_padding_between_items() {
		let mut packer = Packer::new();
		packer.pack_variable_len_opaque(b":WAV:STAR?").unwrap();
		packer.pack_i32(-7).unwrap();
		packer.pack_bool(true).unwrap();

		let mut unpacker = Unpacker::new();
		unpacker.reset(packer.as_bytes().to_vec());
		assert_eq!(unpacker.unpack_variable_len_opaque().unwrap(), b":WAV:STAR?".to_vec());
		assert_eq!(unpacker.unpack_i32().unwrap(), -7);
		assert!(unpacker.unpack_bool().unwrap());
		assert!(unpacker.all_data_consumed());
	}

	#[test]
	fn truncated_opaque_is_an_error() {
		let mut unpacker = Unpacker::new();
		unpacker.reset(vec![0, 0, 0, 9, 1, 2, 3]);
		assert_eq!(unpacker.unpack_variable_len_opaque().unwrap_err().kind(), ErrorKind::UnexpectedEof);
	}

	#[test]
	fn bool_out_of_range_is_rejected() {
		let mut unpacker = Unpacker::new();
		unpacker.reset(vec![0, 0, 0, 2]);
		assert!(unpacker.unpack_bool().is_err());
	}
}
