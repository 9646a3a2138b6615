//! The DF1 receive state machine: byte de-stuffing, checksum accumulation,
//! duplicate detection, and the pending-acknowledgement slot.

use crate::buffer::ByteBuf;
use crate::checksum::{Bcc, Checksum, Crc16};
use crate::symbols::{ACK, DLE, ENQ, ETX, NAK, STX};

/// Ticks of inactivity after the first application byte before an in-progress reception is abandoned.
pub const RX_TIMEOUT_TICKS: u32 = 500;

const APP_CAPACITY: usize = 512;
const RUNT_MIN_LEN: usize = 6;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum State {
	Idle,
	App,
	Cs1,
	Cs2,
	/// Waiting for the owning client to ACK or NAK a delivered message.
	Pend,
}

enum ChecksumAccum {
	Bcc(Bcc),
	Crc(Crc16),
}

impl ChecksumAccum {
	fn new(use_crc: bool) -> Self {
		if use_crc {
			Self::Crc(Crc16::default())
		} else {
			Self::Bcc(Bcc::default())
		}
	}

	fn update(&mut self, byte: u8) {
		match self {
			Self::Bcc(c) => c.update(byte),
			Self::Crc(c) => c.update(byte),
		}
	}

	fn finalize(&self) -> Vec<u8> {
		match self {
			Self::Bcc(c) => c.finalize(),
			Self::Crc(c) => c.finalize(),
		}
	}

	fn expected_cs_bytes(&self) -> usize {
		match self {
			Self::Bcc(_) => 1,
			Self::Crc(_) => 2,
		}
	}
}

/// What happened as a result of feeding one byte to the receiver.
pub enum RxEvent {
	None,
	/// An ordinary `ACK`/`NAK` arrived for the transmitter, outside of any in-progress reception.
	Ack,
	Nak,
	/// An `ACK`/`NAK` arrived interleaved inside an in-progress reception (the peer treats send and receive as interleaved).
	EmbeddedAck,
	EmbeddedNak,
	/// The peer polled with `DLE ENQ`.
	Enq,
	/// A frame finished accumulating and passed the runt/checksum/duplicate checks; its payload is in `app()`.
	Accepted,
	/// A frame finished but was too short to be meaningful.
	Runt,
	/// A frame finished but its checksum didn't match.
	BadChecksum,
	/// A frame finished, passed the checksum check, but is a repeat of the last accepted frame.
	Duplicate,
}

pub struct Receiver {
	state: State,
	app: ByteBuf,
	checksum: ChecksumAccum,
	cs_received: Vec<u8>,
	fingerprint: [u8; 4],
	use_crc: bool,
	dup_detect: bool,
	prev_dle: bool,
	overflow: bool,
	pub last_was_ack: bool,
	/// Ticks since the first application byte of the in-progress reception arrived.
	ticks: u32,
	/// The client currently expected to ACK/NAK the delivered message, if any.
	pub client: Option<usize>,
}

impl Receiver {
	pub fn new(use_crc: bool, dup_detect: bool) -> Self {
		Self {
			state: State::Idle,
			app: ByteBuf::new(APP_CAPACITY),
			checksum: ChecksumAccum::new(use_crc),
			cs_received: Vec::new(),
			fingerprint: [0; 4],
			use_crc,
			dup_detect,
			prev_dle: false,
			overflow: false,
			last_was_ack: true,
			ticks: 0,
			client: None,
		}
	}

	pub fn is_pending(&self) -> bool {
		self.state == State::Pend
	}

	/// Whether the receiver is actively accumulating an in-progress message.
	pub fn is_receiving(&self) -> bool {
		matches!(self.state, State::App | State::Cs1 | State::Cs2)
	}

	pub fn app(&self) -> &[u8] {
		self.app.filled()
	}

	/// Advances the receive timeout. Returns `true` if the in-progress reception just timed out.
	pub fn tick(&mut self) -> bool {
		if !self.is_receiving() {
			self.ticks = 0;
			return false;
		}

		self.ticks += 1;

		if self.ticks > RX_TIMEOUT_TICKS {
			self.abandon();
			self.last_was_ack = false;
			return true;
		}

		false
	}

	fn abandon(&mut self) {
		self.state = State::Idle;
		self.prev_dle = false;
	}

	fn begin_app(&mut self) {
		self.app.reset();
		self.checksum = ChecksumAccum::new(self.use_crc);
		self.cs_received.clear();
		self.overflow = false;
		self.prev_dle = false;
		self.ticks = 0;
		self.state = State::App;
	}

	/// Call after the owning client has ACKed or NAKed the message handed to it; emits the final response symbol and returns the receiver to `Idle`.
	pub fn finish_pending(&mut self, ack: bool) {
		self.last_was_ack = ack;
		self.client = None;
		self.state = State::Idle;
		self.prev_dle = false;
	}

	/// Called when acceptance rules classify the just-finished frame: delivers to `client`, or not (unknown destination / duplicate).
	pub fn deliver_to(&mut self, client: usize) {
		self.client = client.into();
		self.state = State::Pend;
	}

	pub fn feed_byte(&mut self, byte: u8) -> RxEvent {
		match self.state {
			State::Idle | State::Pend => self.feed_idle_or_pend(byte),
			State::App => self.feed_app(byte),
			State::Cs1 => self.feed_cs1(byte),
			State::Cs2 => self.feed_cs2(byte),
		}
	}

	fn feed_idle_or_pend(&mut self, byte: u8) -> RxEvent {
		if !self.prev_dle {
			if byte == DLE {
				self.prev_dle = true;
			}

			return RxEvent::None;
		}

		self.prev_dle = false;

		match byte {
			STX if self.state == State::Idle => {
				self.begin_app();
				RxEvent::None
			}
			ENQ => RxEvent::Enq,
			ACK => RxEvent::Ack,
			NAK => RxEvent::Nak,
			_ => RxEvent::None,
		}
	}

	fn feed_app(&mut self, byte: u8) -> RxEvent {
		if !self.prev_dle {
			if byte == DLE {
				self.prev_dle = true;
				return RxEvent::None;
			}

			return self.push_app_byte(byte);
		}

		self.prev_dle = false;

		match byte {
			DLE => self.push_app_byte(DLE),
			ETX => {
				if self.use_crc {
					self.checksum.update(ETX);
				}

				self.state = State::Cs1;
				RxEvent::None
			}
			ACK => RxEvent::EmbeddedAck,
			NAK => RxEvent::EmbeddedNak,
			_ => {
				// An unrecognized post-DLE byte: the eventual response to this frame must be a NAK.
				self.last_was_ack = false;
				RxEvent::None
			}
		}
	}

	fn push_app_byte(&mut self, byte: u8) -> RxEvent {
		if self.app.append_byte(byte).is_err() {
			self.overflow = true;
		} else {
			self.checksum.update(byte);
		}

		RxEvent::None
	}

	fn feed_cs1(&mut self, byte: u8) -> RxEvent {
		self.cs_received.push(byte);

		if self.checksum.expected_cs_bytes() == 1 {
			return self.accept();
		}

		self.state = State::Cs2;
		RxEvent::None
	}

	fn feed_cs2(&mut self, byte: u8) -> RxEvent {
		self.cs_received.push(byte);
		self.accept()
	}

	fn accept(&mut self) -> RxEvent {
		self.state = State::Idle;
		self.prev_dle = false;

		let app = self.app.filled();

		if app.len() < RUNT_MIN_LEN {
			return RxEvent::Runt;
		}

		if self.overflow || !self.checksum.verify(&self.cs_received) {
			return RxEvent::BadChecksum;
		}

		let fingerprint = [app[1], app[2], app[4], app[5]];
		let is_dup = self.dup_detect && fingerprint == self.fingerprint;
		self.fingerprint = fingerprint;

		if is_dup {
			RxEvent::Duplicate
		} else {
			RxEvent::Accepted
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn feed_all(rx: &mut Receiver, bytes: &[u8]) -> Vec<RxEvent> {
		bytes.iter().map(|&b| rx.feed_byte(b)).collect()
	}

	#[test]
	fn accepts_well_formed_frame() {
		let mut rx = Receiver::new(false, false);
		let payload = [0x05, 0x00, 0x06, 0x00, 0x42, 0x42, 0x42];
		let mut wire = Vec::new();
		crate::frame::encode_df1_frame(&mut wire, &payload, false);

		let events = feed_all(&mut rx, &wire);
		assert!(matches!(events.last(), Some(RxEvent::Accepted)));
		assert_eq!(rx.app(), &payload);
	}

	#[test]
	fn runt_below_six_bytes() {
		let mut rx = Receiver::new(true, false);
		let payload = [0x01, 0x02, 0x03];
		let mut wire = Vec::new();
		crate::frame::encode_df1_frame(&mut wire, &payload, true);

		let events = feed_all(&mut rx, &wire);
		assert!(matches!(events.last(), Some(RxEvent::Runt)));
	}

	#[test]
	fn bad_checksum_is_detected() {
		let mut rx = Receiver::new(true, false);
		let payload = [0x05, 0x00, 0x06, 0x00, 0x42, 0x42, 0x42];
		let mut wire = Vec::new();
		crate::frame::encode_df1_frame(&mut wire, &payload, true);
		*wire.last_mut().unwrap() ^= 0xFF;

		let events = feed_all(&mut rx, &wire);
		assert!(matches!(events.last(), Some(RxEvent::BadChecksum)));
	}

	#[test]
	fn duplicate_detection_matches_fingerprint_offsets() {
		let mut rx = Receiver::new(false, true);
		let payload = [0x05, 0x01, 0x02, 0x00, 0x03, 0x04, 0x42];
		let mut wire = Vec::new();
		crate::frame::encode_df1_frame(&mut wire, &payload, false);

		let first = feed_all(&mut rx, &wire);
		assert!(matches!(first.last(), Some(RxEvent::Accepted)));

		let second = feed_all(&mut rx, &wire);
		assert!(matches!(second.last(), Some(RxEvent::Duplicate)));
	}

	#[test]
	fn idle_channel_never_times_out() {
		let mut rx = Receiver::new(false, false);

		for _ in 0..(RX_TIMEOUT_TICKS * 2) {
			assert!(!rx.tick());
		}
	}

	#[test]
	fn receiver_times_out_mid_frame() {
		let mut rx = Receiver::new(false, false);
		rx.feed_byte(DLE);
		rx.feed_byte(STX);
		rx.feed_byte(0x01);

		let mut timed_out = false;

		for _ in 0..=RX_TIMEOUT_TICKS {
			if rx.tick() {
				timed_out = true;
				break;
			}
		}

		assert!(timed_out);
		assert!(!rx.last_was_ack);
	}
}
