//! Encodes application payloads into the on-wire DF1 byte stream.

use crate::checksum::{Bcc, Checksum, Crc16};
use crate::symbols::{DLE, ETX, STX};

/// Appends `DLE STX | stuffed payload | DLE ETX | checksum` for `payload` to `out`.
pub fn encode_df1_frame(out: &mut Vec<u8>, payload: &[u8], use_crc: bool) {
	out.push(DLE);
	out.push(STX);

	for &byte in payload {
		out.push(byte);

		if byte == DLE {
			out.push(DLE);
		}
	}

	out.push(DLE);
	out.push(ETX);

	if use_crc {
		let mut crc = Crc16::default();

		for &byte in payload {
			crc.update(byte);
		}

		crc.update(ETX);

		out.extend_from_slice(&crc.finalize());
	} else {
		let mut bcc = Bcc::default();

		for &byte in payload {
			bcc.update(byte);
		}

		out.extend_from_slice(&bcc.finalize());
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trip_crc_scenario() {
		let payload = [0x05, 0x00, 0x06, 0x00, 0x42, 0x42, 0x42];
		let mut out = Vec::new();
		encode_df1_frame(&mut out, &payload, true);

		assert_eq!(&out[..9], &[0x10, 0x02, 0x05, 0x00, 0x06, 0x00, 0x42, 0x42, 0x42]);
		assert_eq!(&out[9..11], &[0x10, 0x03]);
		assert_eq!(out.len(), 13);
	}

	#[test]
	fn dle_byte_is_stuffed() {
		let payload = [0x10];
		let mut out = Vec::new();
		encode_df1_frame(&mut out, &payload, false);

		assert_eq!(&out[..6], &[0x10, 0x02, 0x10, 0x10, 0x10, 0x03]);
	}
}
