//! The fixed-size pool of outstanding commands and the transaction-number
//! counter used to tag and match replies to them.

use std::collections::VecDeque;

use crate::msg::Command;

pub struct Pool {
	slots: Vec<Option<Command>>,
	/// Slot indices whose command has been built but not yet written to the socket.
	pending_tx: VecDeque<usize>,
	/// The slot currently waiting on the daemon's ACK or NAK of its send.
	in_flight: Option<usize>,
	tns: u16,
}

impl Pool {
	pub fn new(capacity: usize, seed: u32) -> Self {
		let mut tns = (seed ^ (seed >> 16)) as u16;

		if tns == 0 {
			tns = 1;
		}

		Self {
			slots: (0..capacity).map(|_| None).collect(),
			pending_tx: VecDeque::new(),
			in_flight: None,
			tns,
		}
	}

	fn next_tns(&mut self) -> u16 {
		loop {
			self.tns = self.tns.wrapping_add(1);

			if self.tns != 0 {
				return self.tns;
			}
		}
	}

	/// Allocates a slot for a new command, stamping it with a fresh TNS.
	/// Returns the slot index, or `None` if the pool is full.
	pub fn allocate(&mut self, build: impl FnOnce(u16) -> Command) -> Option<usize> {
		let idx = self.slots.iter().position(Option::is_none)?;
		let tns = self.next_tns();
		let mut cmd = build(tns);
		cmd.flags = crate::msg::CmdFlags::unused();
		self.slots[idx] = Some(cmd);
		self.pending_tx.push_back(idx);

		Some(idx)
	}

	pub fn get(&self, idx: usize) -> Option<&Command> {
		self.slots.get(idx).and_then(Option::as_ref)
	}

	pub fn get_mut(&mut self, idx: usize) -> Option<&mut Command> {
		self.slots.get_mut(idx).and_then(Option::as_mut)
	}

	pub fn find_by_tns(&self, tns: u16) -> Option<usize> {
		self.slots.iter().position(|slot| matches!(slot, Some(cmd) if cmd.tns == tns))
	}

	pub fn free(&mut self, idx: usize) -> Option<Command> {
		self.slots.get_mut(idx).and_then(Option::take)
	}

	pub fn in_flight(&self) -> Option<usize> {
		self.in_flight
	}

	/// Pops the next queued command to write to the socket, marking it in-flight.
	pub fn next_to_send(&mut self) -> Option<usize> {
		if self.in_flight.is_some() {
			return None;
		}

		let idx = self.pending_tx.pop_front()?;
		self.in_flight = Some(idx);

		Some(idx)
	}

	/// Clears the in-flight slot once its ACK/NAK has been processed.
	pub fn clear_in_flight(&mut self) {
		self.in_flight = None;
	}

	/// All currently-occupied slot indices, for scanning timeouts.
	pub fn occupied(&self) -> impl Iterator<Item = usize> + '_ {
		self.slots.iter().enumerate().filter_map(|(idx, slot)| slot.as_ref().map(|_| idx))
	}
}
