//! A single outstanding PCCC command: its wire fields, lifecycle flags, and
//! the pluggable reply parser that classifies the eventual response.

use bilge::prelude::*;

use crate::status::Status;

/// CMD values that omit the FNC byte; every other CMD includes it.
const NO_FNC: [u8; 6] = [0x00, 0x01, 0x02, 0x04, 0x05, 0x08];

pub fn has_fnc(cmd: u8) -> bool {
	!NO_FNC.contains(&cmd)
}

/// Lifecycle flags for a pooled command. `ack_rcvd` and `reply_rcvd` are
/// independent: whichever arrives first is recorded, and the command only
/// completes once both are set.
#[bitsize(8)]
#[derive(Clone, Copy, FromBits)]
pub struct CmdFlags {
	pub pend: bool,
	pub tx: bool,
	pub ack_rcvd: bool,
	pub reply_rcvd: bool,
	reserved: u4,
}

impl CmdFlags {
	pub fn unused() -> Self {
		Self::new(false, false, false, false, u4::new(0))
	}

	pub fn is_unused(&self) -> bool {
		!self.pend() && !self.tx() && !self.ack_rcvd() && !self.reply_rcvd()
	}

	pub fn is_complete(&self) -> bool {
		self.ack_rcvd() && self.reply_rcvd()
	}
}

/// A reply parser inspects the payload following DST|SRC|CMD|STS|TNS (and
/// FNC, if present) and decides whether the reply should be treated as a
/// success given the command's own user data.
pub type ReplyParser = fn(sts: &Status, cmd: u8, payload: &[u8], user: &[u8]) -> Result<(), String>;

fn default_parser(sts: &Status, cmd: u8, _payload: &[u8], _user: &[u8]) -> Result<(), String> {
	if sts.is_success() {
		Ok(())
	} else {
		Err(sts.describe_for(cmd))
	}
}

pub enum Outcome {
	Success,
	/// The daemon could not deliver the command to the serial link.
	NoDeliver,
	/// No reply arrived before the command's deadline.
	Timeout,
	/// A reply arrived with a non-zero status, or the reply parser rejected it.
	Reply(String),
	/// The client socket to the daemon failed.
	Link,
}

pub struct Command {
	pub dst: u8,
	pub src: u8,
	pub cmd: u8,
	pub fnc: Option<u8>,
	pub tns: u16,
	/// The command-specific payload following the header (and FNC, if present).
	pub data: Vec<u8>,
	pub flags: CmdFlags,
	/// Absolute tick deadline, set once the daemon ACKs the send.
	pub expires: Option<u64>,
	pub parser: ReplyParser,
	pub notify: Option<Box<dyn FnMut(Outcome)>>,
}

impl Command {
	pub fn new(dst: u8, src: u8, cmd: u8, fnc: Option<u8>, tns: u16, data: Vec<u8>) -> Self {
		Self {
			dst,
			src,
			cmd,
			fnc,
			tns,
			data,
			flags: CmdFlags::unused(),
			expires: None,
			parser: default_parser,
			notify: None,
		}
	}

	/// Serializes the outgoing command: `DST|SRC|CMD|STS=0|TNS(LE)[|FNC]|data`.
	pub fn encode(&self) -> Vec<u8> {
		let mut out = Vec::with_capacity(7 + self.data.len());
		out.push(self.dst);
		out.push(self.src);
		out.push(self.cmd);
		out.push(0);
		out.extend_from_slice(&self.tns.to_le_bytes());

		if let Some(fnc) = self.fnc {
			out.push(fnc);
		}

		out.extend_from_slice(&self.data);
		out
	}
}

/// Byte offset of STS within a reply: `DST|SRC|CMD|STS|TNS(LE)`.
pub const REPLY_HEADER_LEN: usize = 6;
