use std::io::{self, Error, ErrorKind};

use crate::xdr::{Packer, Unpacker};
use super::{AUTH_NONE, CALL, RPCVERSION, REPLY, MSG_ACCEPTED, MSG_DENIED, RPC_MISMATCH, AUTH_ERROR};
use super::{SUCCESS, PROG_UNAVAIL, PROG_MISMATCH, PROC_UNAVAIL, GARBAGE_ARGS};

fn rejected(msg:String) -> io::Error { Error::new(ErrorKind::Other, msg) }

pub fn pack_callheader_no_auth(packer:&mut Packer, xid:u32, prog:u32, vers:u32, prc:u32) -> io::Result<()> {
	packer.pack_u32(xid)?;
	packer.pack_enum(CALL)?;
	packer.pack_u32(RPCVERSION)?;
	packer.pack_u32(prog)?;
	packer.pack_u32(vers)?;
	packer.pack_u32(prc)?;

	// Credentials and verifier, both AUTH_NONE with an empty body
	for _ in 0..2 {
		packer.pack_enum(AUTH_NONE)?;
		packer.pack_variable_len_opaque(&[])?;
	}
	Ok(())
}

/// Consumes an accepted reply header and returns its xid, leaving the unpacker positioned at
/// the procedure's results. Denied or unsuccessful replies become errors.
pub fn unpack_replyheader(unpacker:&mut Unpacker) -> io::Result<u32> {
	let xid:u32 = unpacker.unpack_u32()?;

	let mtype:i32 = unpacker.unpack_enum()?;
	if mtype != REPLY {
		return Err(rejected(format!("Expected REPLY message type but got {}", mtype)));
	}

	match unpacker.unpack_enum()? {
		MSG_ACCEPTED => { },
		MSG_DENIED => {
			return match unpacker.unpack_enum()? {
				RPC_MISMATCH => {
					let low:u32  = unpacker.unpack_u32()?;
					let high:u32 = unpacker.unpack_u32()?;
					Err(rejected(format!("Call denied, server supports RPC versions {} to {}", low, high)))
				},
				AUTH_ERROR => {
					let stat:u32 = unpacker.unpack_u32()?;
					Err(rejected(format!("Call denied with auth error {}", stat)))
				},
				x => Err(rejected(format!("Call denied for unknown reason {}", x))),
			};
		},
		x => return Err(rejected(format!("Reply status {} is neither accepted nor denied", x))),
	}

	// The verifier on a reply is of no use without authentication
	let _flavor:i32 = unpacker.unpack_enum()?;
	let _verf:Vec<u8> = unpacker.unpack_variable_len_opaque()?;

	match unpacker.unpack_enum()? {
		SUCCESS       => Ok(xid),
		PROG_UNAVAIL  => Err(rejected("Program unavailable".to_owned())),
		PROG_MISMATCH => {
			let low:u32  = unpacker.unpack_u32()?;
			let high:u32 = unpacker.unpack_u32()?;
			Err(rejected(format!("Program mismatch, server supports versions {} to {}", low, high)))
		},
		PROC_UNAVAIL  => Err(rejected("Procedure unavailable".to_owned())),
		GARBAGE_ARGS  => Err(rejected("Server could not decode the call arguments".to_owned())),
		x             => Err(rejected(format!("Call failed with accept status {}", x))),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn accepted_reply(xid:u32, stat:i32) -> Vec<u8> {
		let mut p = Packer::new();
		p.pack_u32(xid).unwrap();
		p.pack_enum(REPLY).unwrap();
		p.pack_enum(MSG_ACCEPTED).unwrap();
		p.pack_enum(AUTH_NONE).unwrap();
		p.pack_variable_len_opaque(&[]).unwrap();
		p.pack_enum(stat).unwrap();
		p.as_bytes().to_vec()
	}

	#[test]
	fn call_header_layout() {
		let mut p = Packer::new();
		pack_callheader_no_auth(&mut p, 7, 0x0607af, 1, 11).unwrap();
		// xid, CALL, rpcvers, prog, vers, proc, then two empty AUTH_NONE blocks
		assert_eq!(p.as_bytes().len(), 6*4 + 2*8);
		assert_eq!(&p.as_bytes()[..4], &[0, 0, 0, 7]);
		assert_eq!(&p.as_bytes()[12..16], &[0x00, 0x06, 0x07, 0xaf]);
	}

	#[test]
	fn accepted_reply_yields_xid() {
		let mut u = Unpacker::new();
		u.reset(accepted_reply(42, SUCCESS));
		assert_eq!(unpack_replyheader(&mut u).unwrap(), 42);
		assert!(u.all_data_consumed());
	}

	#[test]
	fn garbage_args_is_an_error() {
		let mut u = Unpacker::new();
		u.reset(accepted_reply(3, GARBAGE_ARGS));
		assert!(unpack_replyheader(&mut u).is_err());
	}
}
