//! Status and extended-status classification for PCCC replies.
//!
//! A reply's STS byte is classified without reference to the command it
//! answers, except in the `0xF0` (extended status follows) case, where the
//! owning CMD selects which extended-status table applies.

const LOCAL_ERRORS: &[(u8, &str)] = &[
	(0x01, "DST node is out of buffer space"),
	(0x02, "Cannot guarantee delivery: link layer"),
	(0x03, "Duplicate token holder detected"),
	(0x04, "Local port is disconnected"),
	(0x05, "Application layer timed out waiting for a response"),
	(0x06, "Duplicate node detected"),
	(0x07, "Station is offline"),
	(0x08, "Hardware fault"),
];

const REMOTE_ERRORS: &[(u8, &str)] = &[
	(0x10, "Illegal command or format"),
	(0x20, "Host has a problem and will not communicate"),
	(0x30, "Remote node host is missing, disconnected, or shut down"),
	(0x40, "Host could not complete function due to hardware fault"),
	(0x50, "Addressing problem or memory protect rungs"),
	(0x60, "Function not allowed due to command protection selection"),
	(0x70, "Processor is in program mode"),
	(0x80, "Compatibility mode file missing or communication zone problem"),
	(0x90, "Remote node cannot buffer command"),
	(0xA0, "Wait ACK (1775-KA buffer full)"),
	(0xB0, "Remote node problem due to download"),
	(0xC0, "Wait ACK (1775-KA buffer full)"),
];

/// CMD 0x0F's extended-status table, keyed by EXT STS 0x01-0x24.
const EXT_0F: &[(u8, &str)] = &[
	(0x01, "A field has an illegal value"),
	(0x02, "Less levels specified in address than minimum for any address"),
	(0x03, "More levels specified in address than system supports"),
	(0x04, "Symbol not found"),
	(0x05, "Symbol is of improper format"),
	(0x06, "Address does not point to something usable"),
	(0x07, "File is wrong size"),
	(0x08, "Cannot complete request, situation has changed since start of command"),
	(0x09, "Data or file is too large"),
	(0x0A, "Transaction size plus word address is too large"),
	(0x0B, "Access denied, improper privilege"),
	(0x0C, "Condition cannot be generated, resource is lacking"),
	(0x0D, "Condition already exists, resource already available"),
	(0x0E, "Command cannot be executed"),
	(0x0F, "Histogram overflow"),
	(0x10, "No access"),
	(0x11, "Illegal data type"),
	(0x12, "Invalid parameter or invalid data"),
	(0x13, "Address reference exists to deleted area"),
	(0x14, "Command execution failure for unknown reason"),
	(0x15, "Data conversion error"),
	(0x16, "Scanner not able to communicate with module"),
	(0x17, "Type mismatch"),
	(0x18, "1771 module response was not valid"),
	(0x19, "Duplicated label"),
	(0x1A, "File is open; another node owns it"),
	(0x1B, "Another node is the program owner"),
	(0x1C, "Reserved"),
	(0x1D, "Reserved"),
	(0x1E, "Data table element protection violation"),
	(0x1F, "Temporary internal problem"),
	(0x22, "Remote rack fault"),
	(0x23, "Timeout"),
	(0x24, "Unknown error"),
];

/// The smaller extended-status table shared by CMD 0x0B/0x1A/0x1B.
const EXT_SHARED: &[(u8, &str)] = &[
	(0x01, "A field has an illegal value"),
	(0x02, "Less levels specified in address than minimum for any address"),
	(0x03, "More levels specified in address than system supports"),
	(0x04, "Symbol not found"),
	(0x05, "Symbol is of improper format"),
	(0x06, "Address does not point to something usable"),
	(0x1A, "File is open; another node owns it"),
	(0x1B, "Another node is the program owner"),
];

fn describe_table(table: &[(u8, &str)], code: u8) -> Option<&'static str> {
	table.iter().find(|&&(c, _)| c == code).map(|&(_, s)| s)
}

/// The classified status of a PCCC reply.
pub struct Status {
	pub sts: u8,
	/// The extended-status byte, present only when `sts == 0xF0`.
	pub ext_sts: Option<u8>,
	/// The node that owns the file, present only for EXT STS 0x1A/0x1B.
	pub owner_node: Option<u8>,
}

impl Status {
	pub fn parse(sts: u8, cmd: u8, rest: &[u8]) -> Self {
		if sts != 0xF0 {
			return Self { sts, ext_sts: None, owner_node: None };
		}

		let ext_sts = rest.first().copied();
		let owner_node = match ext_sts {
			Some(0x1A) | Some(0x1B) => rest.get(1).copied(),
			_ => None,
		};

		let _ = cmd;
		Self { sts, ext_sts, owner_node }
	}

	pub fn is_success(&self) -> bool {
		self.sts == 0x00
	}

	/// Which extended-status table applies to this reply's owning CMD.
	fn ext_table(cmd: u8) -> &'static [(u8, &'static str)] {
		match cmd {
			0x0F => EXT_0F,
			0x0B | 0x1A | 0x1B => EXT_SHARED,
			_ => EXT_0F,
		}
	}

	/// A human-readable description, looking up the extended-status table for
	/// `cmd` when this status is `0xF0`.
	pub fn describe_for(&self, cmd: u8) -> String {
		if self.is_success() {
			return "Success".to_string();
		}

		if self.sts == 0xF0 {
			let table = Self::ext_table(cmd);

			return match self.ext_sts {
				Some(code) => describe_table(table, code).map(str::to_string).unwrap_or_else(|| format!("Unrecognized extended status 0x{code:02X}")),
				None => "Extended status indicated but not present".to_string(),
			};
		}

		let high = self.sts & 0xF0;
		let low = self.sts & 0x0F;

		if low == 0 {
			if let Some(desc) = describe_table(REMOTE_ERRORS, high) {
				return desc.to_string();
			}
		}

		if let Some(desc) = describe_table(LOCAL_ERRORS, self.sts) {
			return desc.to_string();
		}

		format!("Unrecognized status 0x{:02X}", self.sts)
	}

	/// Describes the status without reference to the owning command; used
	/// when the caller has no CMD context (e.g. the default reply parser).
	pub fn describe(&self) -> String {
		self.describe_for(0x0F)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn zero_status_is_success() {
		assert!(Status::parse(0x00, 0x0F, &[]).is_success());
	}

	#[test]
	fn local_error_is_described() {
		let status = Status::parse(0x04, 0x0F, &[]);
		assert!(!status.is_success());
		assert_eq!(status.describe_for(0x0F), "Local port is disconnected");
	}

	#[test]
	fn extended_status_decodes_against_owning_cmd() {
		let status = Status::parse(0xF0, 0x0F, &[0x04]);
		assert_eq!(status.ext_sts, Some(0x04));
		assert_eq!(status.describe_for(0x0F), "Symbol not found");
	}

	#[test]
	fn extended_status_with_owner_node() {
		let status = Status::parse(0xF0, 0x0B, &[0x1A, 7]);
		assert_eq!(status.ext_sts, Some(0x1A));
		assert_eq!(status.owner_node, Some(7));
		assert_eq!(status.describe_for(0x0B), "File is open; another node owns it");
	}
}
