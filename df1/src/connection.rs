//! Binds one serial channel to its set of TCP clients: routes events between
//! the framer, transmitter, receiver, and clients, and round-robins outbound
//! transmission opportunities among registered clients.

use log::{info, warn};

use crate::client::{Client, ClientEvent, ClientState};
use crate::config::ConnectionConfig;
use crate::frame::encode_df1_frame;
use crate::receiver::{Receiver, RxEvent};
use crate::symbols::{ACK, DLE, NAK};
use crate::transmitter::{Transmitter, TxResult};

/// The sixteen diagnostic counters tracked per connection.
#[derive(Default, Debug)]
pub struct Counters {
	pub runts: u64,
	pub bad_cs: u64,
	pub dups: u64,
	pub unknown_dst: u64,
	pub msg_rx: u64,
	pub naks_in: u64,
	pub acks_in: u64,
	pub tx_success: u64,
	pub tx_fail: u64,
	pub enqs_out: u64,
	pub resp_timeouts: u64,
	pub rx_timeouts: u64,
	pub acks_out: u64,
	pub naks_out: u64,
	pub embedded_acks: u64,
	pub embedded_naks: u64,
}

pub struct Connection {
	pub name: String,
	use_crc: bool,
	duplex: crate::config::Duplex,
	embed_rsp: bool,
	clients: Vec<Client>,
	last_serviced: usize,
	receiver: Receiver,
	transmitter: Transmitter,
	/// Bytes queued to be written to the serial line.
	pub tty_out: Vec<u8>,
	pub counters: Counters,
}

impl Connection {
	pub fn new(config: &ConnectionConfig) -> Self {
		let tticks = config.ack_timeout_ticks(10);

		Self {
			name: config.name.clone(),
			use_crc: config.use_crc(),
			duplex: config.duplex,
			embed_rsp: false,
			clients: Vec::new(),
			last_serviced: 0,
			receiver: Receiver::new(config.use_crc(), config.rx_dup_detect),
			transmitter: Transmitter::new(config.tx_max_nak, config.tx_max_enq, tticks),
			tty_out: Vec::new(),
			counters: Counters::default(),
		}
	}

	pub fn duplex(&self) -> crate::config::Duplex {
		self.duplex
	}

	/// Registers a newly-accepted client. Returns its slot index, or `None` if the connection is full of other concerns (never rejected by capacity in this design; registration collisions are only detectable once the client sends its `addr` byte).
	pub fn add_client(&mut self) -> usize {
		self.clients.push(Client::new());
		self.clients.len() - 1
	}

	/// Drops a closed client. If it was the transmitter's in-flight client, the transmission stays
	/// in-flight and its eventual ACK/NAK is silently consumed (the reference is cleared, not the
	/// transmission). `Vec::swap_remove` moves the last client into `idx`; any stable reference to
	/// the old last index is fixed up to point at its new home.
	pub fn remove_client(&mut self, idx: usize) {
		let last = self.clients.len() - 1;

		if self.receiver.client == Some(idx) {
			self.receiver.client = None;
		} else if self.receiver.client == Some(last) {
			self.receiver.client = Some(idx);
		}

		if self.transmitter.client_idx() == Some(idx) {
			self.transmitter.clear_client();
		} else if self.transmitter.client_idx() == Some(last) {
			self.transmitter.relocate_client(idx);
		}

		self.clients.swap_remove(idx);

		if self.last_serviced >= self.clients.len() {
			self.last_serviced = 0;
		}
	}

	pub fn client(&self, idx: usize) -> &Client {
		&self.clients[idx]
	}

	pub fn client_mut(&mut self, idx: usize) -> &mut Client {
		&mut self.clients[idx]
	}

	/// Feeds one byte received on the client socket at `idx` into that client's protocol FSM, and reacts to what happened.
	pub fn client_byte(&mut self, idx: usize, byte: u8) -> bool {
		let event = self.clients[idx].feed_byte(byte);

		match event {
			ClientEvent::None => {}
			ClientEvent::Registered => {
				if let Some(collision) = self.clients.iter().enumerate().find(|&(j, c)| j != idx && c.addr == self.clients[idx].addr && c.state().is_registered()) {
					warn!("Client registration collision on addr {}", self.clients[idx].addr);
					let _ = collision;
					return false;
				}

				info!("Client '{}' registered at addr {}", self.clients[idx].name, self.clients[idx].addr);
			}
			ClientEvent::OutboundReady => self.arbitrate(),
			ClientEvent::DeliveredAck => self.deliver_ack_nak(idx, true),
			ClientEvent::DeliveredNak => self.deliver_ack_nak(idx, false),
			ClientEvent::ProtocolViolation => return false,
		}

		true
	}

	fn deliver_ack_nak(&mut self, idx: usize, ack: bool) {
		if self.receiver.client != Some(idx) {
			return;
		}

		self.receiver.finish_pending(ack);
		self.write_response(ack);
	}

	fn write_response(&mut self, ack: bool) {
		self.tty_out.push(DLE);
		self.tty_out.push(if ack { ACK } else { NAK });

		if ack {
			self.counters.acks_out += 1;
		} else {
			self.counters.naks_out += 1;
		}
	}

	/// Round-robins to the next client with an outbound message ready, starting after the last-serviced one.
	fn arbitrate(&mut self) {
		if !self.transmitter.is_idle() {
			return;
		}

		let n = self.clients.len();

		for offset in 1..=n {
			let idx = (self.last_serviced + offset) % n;

			if self.clients[idx].state() == ClientState::MsgReady {
				self.last_serviced = idx;

				let payload = self.clients[idx].take_outbound();
				let mut frame = Vec::new();
				encode_df1_frame(&mut frame, &payload, self.use_crc);
				self.tty_out.extend_from_slice(&frame);
				self.transmitter.submit(idx, frame);
				// The reactor serializes writes per fd, so the frame is considered sent as soon as it's queued.
				self.transmitter.data_sent();

				return;
			}
		}
	}

	/// Feeds one raw byte read off the serial TTY through the receiver and reacts to the resulting event.
	pub fn tty_byte(&mut self, byte: u8) {
		match self.receiver.feed_byte(byte) {
			RxEvent::None => {}
			RxEvent::Ack => {
				self.counters.acks_in += 1;
				self.handle_tx_result(self.transmitter.ack(), false);
			}
			RxEvent::Nak => {
				self.counters.naks_in += 1;
				self.handle_tx_result(self.transmitter.nak(), false);
			}
			RxEvent::EmbeddedAck => {
				self.embed_rsp = true;
				self.counters.acks_in += 1;
				self.counters.embedded_acks += 1;
				self.handle_tx_result(self.transmitter.ack(), true);
			}
			RxEvent::EmbeddedNak => {
				self.embed_rsp = true;
				self.counters.naks_in += 1;
				self.counters.embedded_naks += 1;
				self.handle_tx_result(self.transmitter.nak(), true);
			}
			RxEvent::Enq => self.handle_enq(),
			RxEvent::Accepted => self.handle_accepted(),
			RxEvent::Runt => {
				self.counters.runts += 1;
				self.write_response(false);
			}
			RxEvent::BadChecksum => {
				self.counters.bad_cs += 1;
				self.write_response(false);
			}
			RxEvent::Duplicate => {
				self.counters.dups += 1;
				self.write_response(true);
			}
		}
	}

	fn handle_tx_result(&mut self, result: TxResult, _embedded: bool) {
		match result {
			TxResult::None => {}
			TxResult::Retry => {
				self.tty_out.extend_from_slice(self.transmitter.msg());
				self.transmitter.data_sent();
			}
			TxResult::Done { client, ack } => {
				if let Some(idx) = client {
					if ack {
						self.counters.tx_success += 1;
					} else {
						self.counters.tx_fail += 1;
					}

					self.clients[idx].finish_pending(ack);
				}

				self.arbitrate();
			}
		}
	}

	fn handle_enq(&mut self) {
		if self.receiver.is_pending() {
			let idx = self.receiver.client.take();

			if let Some(idx) = idx {
				self.clients[idx].counters.rx_timeouts += 1;
				self.counters.rx_timeouts += 1;
			}

			self.write_response(true);
			return;
		}

		self.write_response(self.receiver.last_was_ack);
	}

	fn handle_accepted(&mut self) {
		self.counters.msg_rx += 1;

		let app = self.receiver.app().to_vec();
		let addr = app[0];

		match self.clients.iter().position(|c| c.addr == addr && c.state().is_registered()) {
			Some(idx) => {
				self.clients[idx].deliver(&app);
				self.receiver.deliver_to(idx);
			}
			None => {
				self.counters.unknown_dst += 1;
				self.write_response(true);
			}
		}
	}

	/// Advances all per-connection timers by one tick (the 10ms cadence).
	pub fn tick(&mut self) {
		if self.receiver.tick() {
			self.counters.rx_timeouts += 1;
		}

		match self.transmitter.tick(self.receiver.is_receiving(), self.embed_rsp) {
			crate::transmitter::TickResult::Quiescent => {}
			crate::transmitter::TickResult::SendEnq => {
				self.counters.enqs_out += 1;
				self.tty_out.extend_from_slice(&Transmitter::enq_bytes());
				self.transmitter.data_sent();
			}
			crate::transmitter::TickResult::Done { client, ack } => {
				self.counters.resp_timeouts += 1;
				self.handle_tx_result(TxResult::Done { client, ack }, false);
			}
		}
	}
}
