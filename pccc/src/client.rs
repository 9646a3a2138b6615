//! The client-side PCCC engine: owns the TCP socket to the `df1d` daemon,
//! runs the read-mode FSM over it, and drives the command pool's lifecycle.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

use log::warn;

use crate::msg::{has_fnc, Command, Outcome, REPLY_HEADER_LEN};
use crate::pool::Pool;
use crate::status::Status;

const SOH: u8 = 0x01;
const ACK: u8 = 0x06;
const NAK: u8 = 0x15;

const MSG_CAPACITY: usize = 300;

#[derive(Clone, Copy, PartialEq, Eq)]
enum ReadState {
	Idle,
	MsgLen,
	Msg,
}

/// The client-side PCCC engine bound to one daemon connection.
pub struct PcccConnection {
	socket: TcpStream,
	pool: Pool,
	state: ReadState,
	msg_len: usize,
	msg: Vec<u8>,
	/// A fresh send start time, once the in-flight command's `DLE`-level write has been flushed.
	timeout: Duration,
	error: Option<String>,
	/// Local monotonic reference against which `Command::expires` is measured, in milliseconds.
	epoch: Instant,
	/// Outcome of the most recently completed slot that had no `notify` callback
	/// (i.e. one driven by `cmd_send_blocking`), stashed here for it to pick up.
	last_outcome: Option<(usize, Outcome)>,
}

fn now_ms(epoch: Instant) -> u64 {
	epoch.elapsed().as_millis() as u64
}

impl PcccConnection {
	pub fn new(socket: TcpStream, pool_capacity: usize, timeout: Duration) -> std::io::Result<Self> {
		socket.set_nodelay(true)?;

		let seed = std::process::id() ^ std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_secs() as u32).unwrap_or(0);

		Ok(Self {
			socket,
			pool: Pool::new(pool_capacity, seed),
			state: ReadState::Idle,
			msg_len: 0,
			msg: Vec::with_capacity(MSG_CAPACITY),
			timeout,
			error: None,
			epoch: Instant::now(),
			last_outcome: None,
		})
	}

	/// Clears and returns the last operator-facing error message.
	pub fn take_error(&mut self) -> Option<String> {
		self.error.take()
	}

	fn set_error(&mut self, msg: impl Into<String>) {
		self.error = Some(msg.into());
	}

	/// Enqueues a command in non-blocking mode: returns immediately, and `notify` fires
	/// exactly once (from a later `read`/`tick` call) with the classified outcome.
	pub fn cmd_send(&mut self, dst: u8, src: u8, cmd: u8, fnc: Option<u8>, data: Vec<u8>, notify: Box<dyn FnMut(Outcome)>) -> std::io::Result<()> {
		let fnc = if has_fnc(cmd) { fnc } else { None };

		let idx = self.pool.allocate(|tns| Command::new(dst, src, cmd, fnc, tns, data)).ok_or_else(|| {
			std::io::Error::new(std::io::ErrorKind::WouldBlock, "command pool is full")
		})?;

		if let Some(command) = self.pool.get_mut(idx) {
			command.notify = Some(notify);
		}

		self.pump_send()
	}

	/// One-at-a-time mode: blocks until the reply arrives, times out, or the link fails.
	pub fn cmd_send_blocking(&mut self, dst: u8, src: u8, cmd: u8, fnc: Option<u8>, data: Vec<u8>) -> Outcome {
		let fnc = if has_fnc(cmd) { fnc } else { None };

		let Some(idx) = self.pool.allocate(|tns| Command::new(dst, src, cmd, fnc, tns, data)) else {
			return Outcome::NoDeliver;
		};

		if let Err(err) = self.pump_send() {
			self.set_error(format!("write error: {err}"));
			return Outcome::Link;
		}

		// The bounded wait restarts once the daemon ACKs the send: one timeout window for the
		// ACK itself, a fresh one for the reply that follows it.
		let mut deadline = Instant::now() + self.timeout;
		let mut waiting_for_ack = true;

		loop {
			let remaining = deadline.saturating_duration_since(Instant::now());

			if remaining.is_zero() {
				self.pool.free(idx);
				return Outcome::Timeout;
			}

			if self.socket.set_read_timeout(Some(remaining)).is_err() {
				return Outcome::Link;
			}

			let mut buf = [0u8; 512];

			let n = match self.socket.read(&mut buf) {
				Ok(0) => return Outcome::Link,
				Ok(n) => n,
				Err(err) if matches!(err.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) => {
					self.pool.free(idx);
					return Outcome::Timeout;
				}
				Err(err) => {
					self.set_error(format!("read error: {err}"));
					return Outcome::Link;
				}
			};

			for &byte in &buf[..n] {
				self.feed_byte(byte);
			}

			if let Some((done_idx, _)) = &self.last_outcome {
				if *done_idx == idx {
					break;
				}
			}

			if waiting_for_ack {
				if let Some(cmd) = self.pool.get(idx) {
					if cmd.flags.ack_rcvd() {
						waiting_for_ack = false;
						deadline = Instant::now() + self.timeout;
					}
				}
			}
		}

		self.last_outcome.take().map(|(_, outcome)| outcome).unwrap_or(Outcome::NoDeliver)
	}

	/// Pumps queued reads off the socket; call repeatedly (e.g. from the caller's own poll loop)
	/// in non-blocking mode.
	pub fn pump_read(&mut self) -> std::io::Result<()> {
		let mut buf = [0u8; 512];

		loop {
			match self.socket.read(&mut buf) {
				Ok(0) => return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "daemon closed the connection")),
				Ok(n) => {
					for &byte in &buf[..n] {
						self.feed_byte(byte);
					}
				}
				Err(err) if matches!(err.kind(), std::io::ErrorKind::WouldBlock) => return Ok(()),
				Err(err) => return Err(err),
			}
		}
	}

	/// Scans the pool for commands whose absolute deadline has passed; call once per tick.
	pub fn tick(&mut self) {
		let now = now_ms(self.epoch);

		let expired: Vec<usize> = self
			.pool
			.occupied()
			.filter(|&idx| matches!(self.pool.get(idx), Some(cmd) if cmd.expires.is_some_and(|exp| exp <= now)))
			.collect();

		for idx in expired {
			self.complete(idx, Outcome::Timeout);
		}
	}

	fn feed_byte(&mut self, byte: u8) {
		match self.state {
			ReadState::Idle => match byte {
				SOH => {
					self.msg.clear();
					self.state = ReadState::MsgLen;
				}
				ACK => self.handle_send_ack(),
				NAK => self.handle_send_nak(),
				_ => {}
			},
			ReadState::MsgLen => {
				self.msg_len = byte as usize;
				self.state = ReadState::Msg;

				if self.msg_len == 0 {
					self.parse_msg();
					self.state = ReadState::Idle;
				}
			}
			ReadState::Msg => {
				self.msg.push(byte);

				if self.msg.len() == self.msg_len {
					self.parse_msg();
					self.state = ReadState::Idle;
				}
			}
		}
	}

	fn handle_send_ack(&mut self) {
		let Some(idx) = self.pool.in_flight() else { return };
		self.pool.clear_in_flight();

		let now = now_ms(self.epoch);
		let timeout_ms = self.timeout.as_millis() as u64 + 1000;

		if let Some(command) = self.pool.get_mut(idx) {
			command.flags = command.flags.with_ack_rcvd(true);
			command.expires = Some(now + timeout_ms);

			if command.flags.is_complete() {
				self.complete(idx, Outcome::Success);
				return;
			}
		}

		if let Err(err) = self.pump_send() {
			warn!("Failed to pump next PCCC command: {err}");
		}
	}

	fn handle_send_nak(&mut self) {
		let Some(idx) = self.pool.in_flight() else { return };
		self.pool.clear_in_flight();
		self.complete(idx, Outcome::NoDeliver);

		if let Err(err) = self.pump_send() {
			warn!("Failed to pump next PCCC command: {err}");
		}
	}

	/// Looks at bit 6 of the CMD byte: a reply finds the matching outstanding command by TNS,
	/// runs its reply parser, and ACKs the daemon.
	fn parse_msg(&mut self) {
		if self.msg.len() < REPLY_HEADER_LEN {
			warn!("Received undersized PCCC reply ({} bytes)", self.msg.len());
			return;
		}

		let cmd_byte = self.msg[2];

		if cmd_byte & 0x40 == 0 {
			// Not a reply (bit 6 clear); nothing in this engine originates unsolicited sends.
			return;
		}

		let sts_byte = self.msg[3];
		let tns = u16::from_le_bytes([self.msg[4], self.msg[5]]);
		let rest = self.msg[REPLY_HEADER_LEN..].to_vec();

		let Some(idx) = self.pool.find_by_tns(tns) else {
			warn!("No outstanding PCCC command for TNS 0x{tns:04x}");
			return;
		};

		let real_cmd = cmd_byte & !0x40;
		let status = Status::parse(sts_byte, real_cmd, &rest);

		let ext_len = if sts_byte == 0xF0 {
			1 + if matches!(status.ext_sts, Some(0x1A) | Some(0x1B)) { 1 } else { 0 }
		} else {
			0
		};

		let payload = &rest[ext_len.min(rest.len())..];

		let result = if let Some(command) = self.pool.get(idx) {
			(command.parser)(&status, real_cmd, payload, &command.data)
		} else {
			Err("command missing from pool".to_string())
		};

		if let Some(command) = self.pool.get_mut(idx) {
			command.flags = command.flags.with_reply_rcvd(true);
		}

		let _ = self.socket.write_all(&[ACK]);

		let complete = self.pool.get(idx).is_some_and(|c| c.flags.is_complete());

		if complete {
			match result {
				Ok(()) => self.complete(idx, Outcome::Success),
				Err(desc) => self.complete(idx, Outcome::Reply(desc)),
			}
		}
	}

	/// Writes the next queued command's frame to the socket, if any and if nothing else is in flight.
	fn pump_send(&mut self) -> std::io::Result<()> {
		let Some(idx) = self.pool.next_to_send() else { return Ok(()) };

		let Some(command) = self.pool.get(idx) else { return Ok(()) };
		let frame = command.encode();

		self.socket.write_all(&[SOH, frame.len() as u8])?;
		self.socket.write_all(&frame)?;

		if let Some(command) = self.pool.get_mut(idx) {
			command.flags = command.flags.with_tx(true).with_pend(true);
		}

		Ok(())
	}

	/// Frees a completed or abandoned slot. If it carries a `notify` (non-blocking mode) the
	/// callback fires with the outcome; otherwise the outcome is stashed for
	/// `cmd_send_blocking` to collect.
	fn complete(&mut self, idx: usize, outcome: Outcome) {
		if let Some(mut command) = self.pool.free(idx) {
			match command.notify.take() {
				Some(mut notify) => notify(outcome),
				None => self.last_outcome = Some((idx, outcome)),
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn fnc_presence_matches_spec_table() {
		assert!(!has_fnc(0x00));
		assert!(!has_fnc(0x08));
		assert!(has_fnc(0x0F));
		assert!(has_fnc(0x06));
	}
}
