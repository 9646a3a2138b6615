//! Address and typed-data codecs that concrete PCCC commands are built from.

use utils::error::*;

/// Logical binary address: 1-7 levels, each in 0..=999.
pub struct PlcLba {
	pub levels: Vec<u16>,
}

impl PlcLba {
	pub fn new(levels: Vec<u16>) -> Result<Self> {
		if levels.is_empty() || levels.len() > 7 {
			return Err(());
		}

		if levels.iter().any(|&l| l > 999) {
			return Err(());
		}

		Ok(Self { levels })
	}

	/// A level `< 255` is one byte; `254` is still one byte (only `255` is the
	/// extended-encoding sentinel); `>= 255` is `0xFF` followed by a
	/// little-endian `u16`.
	pub fn encode(&self, out: &mut Vec<u8>) {
		for &level in &self.levels {
			if level < 255 {
				out.push(level as u8);
			} else {
				out.push(0xFF);
				out.extend_from_slice(&level.to_le_bytes());
			}
		}
	}

	pub fn decode(bytes: &[u8], num_levels: usize) -> Result<(Self, usize)> {
		if num_levels == 0 || num_levels > 7 {
			return Err(());
		}

		let mut levels = Vec::with_capacity(num_levels);
		let mut pos = 0;

		for _ in 0..num_levels {
			let &byte = bytes.get(pos).ok_or(())?;

			if byte == 0xFF {
				let lo = *bytes.get(pos + 1).ok_or(())?;
				let hi = *bytes.get(pos + 2).ok_or(())?;
				levels.push(u16::from_le_bytes([lo, hi]));
				pos += 3;
			} else {
				levels.push(byte as u16);
				pos += 1;
			}
		}

		Ok((Self { levels }, pos))
	}
}

/// Logical ASCII address: at most 15 characters, written without the `$`
/// display prefix (the prefix is a programming-terminal convention, not part
/// of the wire encoding).
pub const LOGICAL_ASCII_MAX_LEN: usize = 15;

pub fn encode_logical_ascii(addr: &str, out: &mut Vec<u8>) -> Result {
	if addr.len() > LOGICAL_ASCII_MAX_LEN || !addr.is_ascii() {
		return Err(());
	}

	out.extend_from_slice(addr.as_bytes());
	out.push(0);

	Ok(())
}

pub fn decode_logical_ascii(bytes: &[u8]) -> Result<String> {
	let end = bytes.iter().position(|&b| b == 0).ok_or(())?;
	String::from_utf8(bytes[..end].to_vec()).map_err(|_| ())
}

/// A fixed-size typed PCCC data element.
pub trait DataCodec: Sized {
	const WIRE_LEN: usize;

	fn encode(&self, out: &mut Vec<u8>);
	fn decode(bytes: &[u8]) -> Result<Self>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Int(pub i16);

impl DataCodec for Int {
	const WIRE_LEN: usize = 2;

	fn encode(&self, out: &mut Vec<u8>) {
		out.extend_from_slice(&self.0.to_le_bytes());
	}

	fn decode(bytes: &[u8]) -> Result<Self> {
		let bytes: [u8; 2] = bytes.get(..2).ok_or(())?.try_into().map_err(|_| ())?;
		Ok(Self(i16::from_le_bytes(bytes)))
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bin(pub u16);

impl DataCodec for Bin {
	const WIRE_LEN: usize = 2;

	fn encode(&self, out: &mut Vec<u8>) {
		out.extend_from_slice(&self.0.to_le_bytes());
	}

	fn decode(bytes: &[u8]) -> Result<Self> {
		let bytes: [u8; 2] = bytes.get(..2).ok_or(())?.try_into().map_err(|_| ())?;
		Ok(Self(u16::from_le_bytes(bytes)))
	}
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Float(pub f32);

impl DataCodec for Float {
	const WIRE_LEN: usize = 4;

	fn encode(&self, out: &mut Vec<u8>) {
		out.extend_from_slice(&self.0.to_le_bytes());
	}

	fn decode(bytes: &[u8]) -> Result<Self> {
		let bytes: [u8; 4] = bytes.get(..4).ok_or(())?.try_into().map_err(|_| ())?;
		Ok(Self(f32::from_le_bytes(bytes)))
	}
}

/// The 6-byte structure shared by `Timer`, `Counter`, and `Control`: two
/// little-endian `i16` words plus one status byte whose low 3 bits carry the
/// structure's flag bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Struct6 {
	pub pre: i16,
	pub acc: i16,
	pub flags: u8,
}

impl DataCodec for Struct6 {
	const WIRE_LEN: usize = 6;

	fn encode(&self, out: &mut Vec<u8>) {
		out.extend_from_slice(&self.pre.to_le_bytes());
		out.extend_from_slice(&self.acc.to_le_bytes());
		out.push(self.flags & 0x07);
	}

	fn decode(bytes: &[u8]) -> Result<Self> {
		if bytes.len() < 6 {
			return Err(());
		}

		Ok(Self {
			pre: i16::from_le_bytes([bytes[0], bytes[1]]),
			acc: i16::from_le_bytes([bytes[2], bytes[3]]),
			flags: bytes[4] & 0x07,
		})
	}
}

pub type Timer = Struct6;
pub type Counter = Struct6;
pub type Control = Struct6;

/// 2-byte length prefix (little-endian) + 82 bytes of text, zero-padded. The
/// library NUL-terminates on read but does not require it on write.
pub struct Str {
	pub text: String,
}

const STR_TEXT_LEN: usize = 82;

impl DataCodec for Str {
	const WIRE_LEN: usize = 2 + STR_TEXT_LEN;

	fn encode(&self, out: &mut Vec<u8>) {
		let bytes = self.text.as_bytes();
		let len = bytes.len().min(STR_TEXT_LEN);

		out.extend_from_slice(&(len as u16).to_le_bytes());

		let mut buf = [0u8; STR_TEXT_LEN];
		buf[..len].copy_from_slice(&bytes[..len]);
		out.extend_from_slice(&buf);
	}

	fn decode(bytes: &[u8]) -> Result<Self> {
		if bytes.len() < Self::WIRE_LEN {
			return Err(());
		}

		let len = u16::from_le_bytes([bytes[0], bytes[1]]) as usize;
		let len = len.min(STR_TEXT_LEN);
		let text_bytes = &bytes[2..2 + len];
		let end = text_bytes.iter().position(|&b| b == 0).unwrap_or(len);

		Ok(Self {
			text: String::from_utf8_lossy(&text_bytes[..end]).into_owned(),
		})
	}
}

/// Raw 2-byte status element, uninterpreted by this codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat(pub [u8; 2]);

impl DataCodec for Stat {
	const WIRE_LEN: usize = 2;

	fn encode(&self, out: &mut Vec<u8>) {
		out.extend_from_slice(&self.0);
	}

	fn decode(bytes: &[u8]) -> Result<Self> {
		let bytes: [u8; 2] = bytes.get(..2).ok_or(())?.try_into().map_err(|_| ())?;
		Ok(Self(bytes))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn lba_single_byte_boundary() {
		let mut out = Vec::new();
		PlcLba::new(vec![254]).unwrap().encode(&mut out);
		assert_eq!(out, [254]);

		let (decoded, consumed) = PlcLba::decode(&out, 1).unwrap();
		assert_eq!(consumed, 1);
		assert_eq!(decoded.levels, [254]);
	}

	#[test]
	fn lba_extended_sentinel() {
		let mut out = Vec::new();
		PlcLba::new(vec![255, 999]).unwrap().encode(&mut out);
		assert_eq!(out, [0xFF, 255, 0, 0xFF, 999u16 as u8, (999u16 >> 8) as u8]);

		let (decoded, consumed) = PlcLba::decode(&out, 2).unwrap();
		assert_eq!(consumed, out.len());
		assert_eq!(decoded.levels, [255, 999]);
	}

	#[test]
	fn lba_max_value_round_trips() {
		// The wire encoding supports the full 16-bit range; `PlcLba::new` layers the
		// 0-999 domain restriction on top for ordinary callers.
		let mut out = Vec::new();
		PlcLba { levels: vec![65535] }.encode(&mut out);
		let (decoded, _) = PlcLba::decode(&out, 1).unwrap();
		assert_eq!(decoded.levels, [65535]);
	}

	#[test]
	fn logical_ascii_round_trip() {
		let mut out = Vec::new();
		encode_logical_ascii("N7:0", &mut out).unwrap();
		assert_eq!(decode_logical_ascii(&out).unwrap(), "N7:0");
	}

	#[test]
	fn struct6_keeps_only_low_three_flag_bits() {
		let mut out = Vec::new();
		Struct6 { pre: 100, acc: -5, flags: 0xFF }.encode(&mut out);
		let decoded = Struct6::decode(&out).unwrap();
		assert_eq!(decoded, Struct6 { pre: 100, acc: -5, flags: 0x07 });
	}

	#[test]
	fn str_round_trips_without_nul_on_write() {
		let mut out = Vec::new();
		Str { text: "hello".into() }.encode(&mut out);
		assert_eq!(out.len(), Str::WIRE_LEN);

		let decoded = Str::decode(&out).unwrap();
		assert_eq!(decoded.text, "hello");
	}
}
