//! A single TCP peer speaking the daemon's client-socket protocol, and the
//! byte-level state machine that drives its registration and per-message
//! framing.

use crate::buffer::ByteBuf;
use crate::symbols::{ACK, NAK};

const SOH: u8 = 0x01;
const SOCK_CAPACITY: usize = 512;
const MAX_NAME_LEN: usize = 16;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ClientState {
	Connected,
	RegLen,
	RegName,
	Idle,
	MsgLen,
	Msg,
	MsgReady,
	MsgPend,
}

impl ClientState {
	pub fn is_registered(&self) -> bool {
		!matches!(self, ClientState::Connected | ClientState::RegLen | ClientState::RegName)
	}

	pub fn can_accept_outbound(&self) -> bool {
		matches!(self, ClientState::Idle)
	}
}

#[derive(Default)]
pub struct ClientCounters {
	pub rx_timeouts: u32,
	pub tx_success: u32,
	pub tx_fail: u32,
	pub rx_delivered: u32,
	pub protocol_errors: u32,
}

/// What happened as a result of feeding one byte from the client socket.
pub enum ClientEvent {
	None,
	/// Registration finished; `addr` and the accumulated name are available on the client.
	Registered,
	/// The client finished assembling an outbound DF1 application message, in `df1_tx`.
	OutboundReady,
	/// The client ACKed the message the daemon most recently delivered to it.
	DeliveredAck,
	/// The client NAKed the message the daemon most recently delivered to it.
	DeliveredNak,
	/// The client violated the socket protocol (second SOH before the first completes, unexpected byte, oversized name) and must be dropped.
	ProtocolViolation,
}

pub struct Client {
	pub name: String,
	pub addr: u8,
	state: ClientState,
	reg_name_len: usize,
	msg_len: usize,
	/// The application message being assembled from the client, destined for the serial link.
	pub df1_tx: ByteBuf,
	/// Bytes queued to be written out to the client's socket.
	pub sock_out: ByteBuf,
	pub counters: ClientCounters,
}

impl Client {
	pub fn new() -> Self {
		Self {
			name: String::new(),
			addr: 0,
			state: ClientState::Connected,
			reg_name_len: 0,
			msg_len: 0,
			df1_tx: ByteBuf::new(SOCK_CAPACITY),
			sock_out: ByteBuf::new(SOCK_CAPACITY),
			counters: ClientCounters::default(),
		}
	}

	pub fn state(&self) -> ClientState {
		self.state
	}

	/// Feeds one byte read from the client's socket through the protocol FSM.
	pub fn feed_byte(&mut self, byte: u8) -> ClientEvent {
		match self.state {
			ClientState::Connected => {
				self.addr = byte;
				self.state = ClientState::RegLen;
				ClientEvent::None
			}
			ClientState::RegLen => {
				if byte == 0 || byte as usize > MAX_NAME_LEN {
					self.counters.protocol_errors += 1;
					return ClientEvent::ProtocolViolation;
				}

				self.reg_name_len = byte as usize;
				self.name.clear();
				self.state = ClientState::RegName;
				ClientEvent::None
			}
			ClientState::RegName => {
				self.name.push(byte as char);

				if self.name.len() == self.reg_name_len {
					self.state = ClientState::Idle;
					ClientEvent::Registered
				} else {
					ClientEvent::None
				}
			}
			ClientState::Idle => match byte {
				SOH => {
					self.df1_tx.reset();
					self.state = ClientState::MsgLen;
					ClientEvent::None
				}
				ACK => ClientEvent::DeliveredAck,
				NAK => ClientEvent::DeliveredNak,
				_ => {
					self.counters.protocol_errors += 1;
					ClientEvent::ProtocolViolation
				}
			},
			ClientState::MsgLen => {
				self.msg_len = byte as usize;
				self.state = ClientState::Msg;

				if self.msg_len == 0 {
					self.state = ClientState::MsgReady;
					ClientEvent::OutboundReady
				} else {
					ClientEvent::None
				}
			}
			ClientState::Msg => {
				// `append_byte` cannot fail: df1_tx's capacity exceeds the one-byte length prefix's range.
				self.df1_tx.append_byte(byte).ok();

				if self.df1_tx.len() == self.msg_len {
					self.state = ClientState::MsgReady;
					ClientEvent::OutboundReady
				} else {
					ClientEvent::None
				}
			}
			// A second SOH (or any byte) before the prior outbound message completes is a protocol violation.
			ClientState::MsgReady | ClientState::MsgPend => {
				self.counters.protocol_errors += 1;
				ClientEvent::ProtocolViolation
			}
		}
	}

	/// Call once the arbitrator has picked this client's message for transmission. Returns the assembled application payload and clears `df1_tx`.
	pub fn take_outbound(&mut self) -> Vec<u8> {
		assert_eq!(self.state, ClientState::MsgReady);
		self.state = ClientState::MsgPend;

		let payload = self.df1_tx.filled().to_vec();
		self.df1_tx.reset();
		payload
	}

	/// Call once the transmitter has finished (success or failure) with this client's message.
	pub fn finish_pending(&mut self, ack: bool) {
		self.state = ClientState::Idle;

		if ack {
			self.counters.tx_success += 1;
			self.sock_out.append_byte(ACK).ok();
		} else {
			self.counters.tx_fail += 1;
			self.sock_out.append_byte(NAK).ok();
		}
	}

	/// Call to deliver a received DF1 application message to this client.
	pub fn deliver(&mut self, payload: &[u8]) {
		self.counters.rx_delivered += 1;
		self.sock_out.append_byte(SOH).ok();
		self.sock_out.append_byte(payload.len() as u8).ok();
		self.sock_out.append_blob(payload).ok();
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn register(client: &mut Client, addr: u8, name: &str) {
		assert!(matches!(client.feed_byte(addr), ClientEvent::None));
		assert!(matches!(client.feed_byte(name.len() as u8), ClientEvent::None));

		for (i, b) in name.bytes().enumerate() {
			let ev = client.feed_byte(b);

			if i + 1 == name.len() {
				assert!(matches!(ev, ClientEvent::Registered));
			} else {
				assert!(matches!(ev, ClientEvent::None));
			}
		}
	}

	#[test]
	fn registration_then_outbound_message() {
		let mut client = Client::new();
		register(&mut client, 5, "plc5");

		assert_eq!(client.addr, 5);
		assert_eq!(client.name, "plc5");
		assert!(client.state().can_accept_outbound());

		assert!(matches!(client.feed_byte(0x01), ClientEvent::None));
		assert!(matches!(client.feed_byte(3), ClientEvent::None));
		assert!(matches!(client.feed_byte(0xAA), ClientEvent::None));
		assert!(matches!(client.feed_byte(0xBB), ClientEvent::None));
		assert!(matches!(client.feed_byte(0xCC), ClientEvent::OutboundReady));
		assert_eq!(client.df1_tx.filled(), &[0xAA, 0xBB, 0xCC]);
	}

	#[test]
	fn second_soh_before_completion_is_a_violation() {
		let mut client = Client::new();
		register(&mut client, 1, "a");

		client.feed_byte(0x01);
		client.feed_byte(2);
		client.feed_byte(0x01);

		assert!(matches!(client.feed_byte(0x01), ClientEvent::ProtocolViolation));
	}
}
