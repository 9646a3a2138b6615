//! The DF1 transmit state machine: NAK/ENQ retry counters and the ACK timer.

use crate::symbols::{DLE, ENQ};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum State {
	Idle,
	PendMsgTx,
	PendResp,
}

/// The result of delivering an event to the transmitter.
pub enum TxResult {
	/// Nothing externally visible happened.
	None,
	/// A NAK was within budget; the caller must rewrite `msg()` to the serial line and call `data_sent()` to re-arm the response timer.
	Retry,
	/// The message finished: `ack` tells whether the owning client should be told success or failure. The client reference recorded at `submit` time is returned so the caller can notify it (it may already be gone).
	Done { client: Option<usize>, ack: bool },
}

/// The result of advancing the transmitter's ACK timer by one tick.
pub enum TickResult {
	/// Nothing happened this tick.
	Quiescent,
	/// The ACK timeout elapsed within budget; the caller must write `DLE ENQ` to the serial line.
	SendEnq,
	/// The ENQ retry budget was exhausted; the message failed.
	Done { client: Option<usize>, ack: bool },
}

pub struct Transmitter {
	state: State,
	nak_cnt: u8,
	enq_cnt: u8,
	max_nak: u8,
	max_enq: u8,
	/// Ticks elapsed while waiting for a response.
	eticks: u32,
	/// Ticks allowed before an ENQ retry is sent.
	tticks: u32,
	msg: Vec<u8>,
	client: Option<usize>,
}

impl Transmitter {
	pub fn new(max_nak: u8, max_enq: u8, tticks: u32) -> Self {
		Self {
			state: State::Idle,
			nak_cnt: 0,
			enq_cnt: 0,
			max_nak,
			max_enq,
			eticks: 0,
			tticks,
			msg: Vec::new(),
			client: None,
		}
	}

	pub fn is_idle(&self) -> bool {
		self.state == State::Idle
	}

	/// Hands a fully wire-encoded frame to the transmitter. The caller (the connection) is responsible for actually writing `msg()` to the serial line.
	pub fn submit(&mut self, client: usize, msg: Vec<u8>) {
		assert!(self.is_idle());

		self.msg = msg;
		self.client = Some(client);
		self.state = State::PendMsgTx;
		self.nak_cnt = 0;
		self.enq_cnt = 0;
	}

	pub fn msg(&self) -> &[u8] {
		&self.msg
	}

	pub fn client_idx(&self) -> Option<usize> {
		self.client
	}

	/// Severs the link to the originating client (it disconnected); the transmission stays in-flight and its eventual ACK/NAK is silently consumed.
	pub fn clear_client(&mut self) {
		self.client = None;
	}

	/// Fixes up the client reference after a `Vec::swap_remove` moved the client this transmission belongs to.
	pub fn relocate_client(&mut self, new_idx: usize) {
		self.client = Some(new_idx);
	}

	/// Called once the TTY output buffer has fully drained the submitted frame.
	pub fn data_sent(&mut self) {
		if self.state == State::PendMsgTx {
			self.state = State::PendResp;
			self.eticks = 0;
		}
	}

	/// Called when the peer ACKs. Returns `Done` unless this arrives out of turn.
	pub fn ack(&mut self) -> TxResult {
		if self.state != State::PendResp {
			return TxResult::None;
		}

		self.finish(true)
	}

	/// Called when the peer NAKs. Retransmits if the NAK budget isn't exhausted.
	pub fn nak(&mut self) -> TxResult {
		if self.state != State::PendResp {
			return TxResult::None;
		}

		self.nak_cnt += 1;

		if self.nak_cnt < self.max_nak {
			self.state = State::PendMsgTx;
			TxResult::Retry
		} else {
			self.finish(false)
		}
	}

	fn finish(&mut self, ack: bool) -> TxResult {
		let client = self.client.take();
		self.state = State::Idle;
		self.nak_cnt = 0;
		self.enq_cnt = 0;
		self.msg.clear();

		TxResult::Done { client, ack }
	}

	/// Advances the ACK timer. `receiving` is whether the receiver is mid-frame; `embed_rsp` is whether this connection has ever observed an embedded response.
	pub fn tick(&mut self, receiving: bool, embed_rsp: bool) -> TickResult {
		if self.state != State::PendResp {
			return TickResult::Quiescent;
		}

		if receiving && !embed_rsp {
			return TickResult::Quiescent;
		}

		self.eticks += 1;

		if self.eticks <= self.tticks {
			return TickResult::Quiescent;
		}

		self.enq_cnt += 1;

		if self.enq_cnt > self.max_enq {
			return match self.finish(false) {
				TxResult::Done { client, ack } => TickResult::Done { client, ack },
				TxResult::None => TickResult::Quiescent,
			};
		}

		self.eticks = 0;
		self.state = State::PendMsgTx;

		TickResult::SendEnq
	}

	/// The bytes to write when an ENQ retry fires (the transmitter returns to `PEND_MSG_TX`; call `data_sent` once they drain to re-arm the response timer).
	pub fn enq_bytes() -> [u8; 2] {
		[DLE, ENQ]
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn nak_then_success() {
		let mut tx = Transmitter::new(2, 2, 20);
		tx.submit(5, vec![1, 2, 3]);
		tx.data_sent();

		assert!(matches!(tx.nak(), TxResult::Retry));
		assert!(tx.msg() == [1, 2, 3]);

		tx.data_sent();

		match tx.ack() {
			TxResult::Done { client, ack } => {
				assert_eq!(client, Some(5));
				assert!(ack);
			}
			TxResult::None => panic!("expected Done"),
		}
	}

	#[test]
	fn enq_then_failure() {
		let mut tx = Transmitter::new(3, 1, 2);
		tx.submit(1, vec![1, 2, 3]);
		tx.data_sent();

		// tticks=2: the third tick in PEND_RESP crosses the timeout and fires the first ENQ retry.
		assert!(matches!(tx.tick(false, false), TickResult::Quiescent));
		assert!(matches!(tx.tick(false, false), TickResult::Quiescent));
		assert!(matches!(tx.tick(false, false), TickResult::SendEnq));

		// The retry put the transmitter back in PEND_MSG_TX; simulate the ENQ draining and re-arm the timer.
		tx.data_sent();
		assert!(matches!(tx.tick(false, false), TickResult::Quiescent));
		assert!(matches!(tx.tick(false, false), TickResult::Quiescent));

		match tx.tick(false, false) {
			TickResult::Done { client, ack } => {
				assert_eq!(client, Some(1));
				assert!(!ack);
			}
			_ => panic!("expected failure after exhausting enq budget"),
		}
	}

	#[test]
	fn timer_pauses_while_receiving_without_embedded_responses() {
		let mut tx = Transmitter::new(2, 2, 1);
		tx.submit(1, vec![1, 2, 3]);
		tx.data_sent();

		for _ in 0..10 {
			assert!(matches!(tx.tick(true, false), TickResult::Quiescent));
		}
	}
}
