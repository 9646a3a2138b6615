//! The typed configuration contract the core accepts. Parsing and validating
//! these values from an on-disk format is an external collaborator's job
//! (the `daemon` binary's TOML loader); the core only consumes already-valid
//! values of these types.

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum BaudRate {
	#[serde(rename = "110")]
	B110,
	#[serde(rename = "300")]
	B300,
	#[serde(rename = "600")]
	B600,
	#[serde(rename = "1200")]
	B1200,
	#[serde(rename = "2400")]
	B2400,
	#[serde(rename = "9600")]
	B9600,
	#[serde(rename = "19200")]
	B19200,
	#[serde(rename = "38400")]
	B38400,
}

impl BaudRate {
	pub fn as_u32(self) -> u32 {
		match self {
			Self::B110 => 110,
			Self::B300 => 300,
			Self::B600 => 600,
			Self::B1200 => 1200,
			Self::B2400 => 2400,
			Self::B9600 => 9600,
			Self::B19200 => 19200,
			Self::B38400 => 38400,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumMode {
	Crc,
	Bcc,
}

/// Accepted by configuration, but the shipped engine's `Connection` does not branch on this value — it always behaves as `Full`. See the design ledger for the open question this resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Duplex {
	Full,
	Master,
	Slave,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
	pub name: String,
	pub device: String,
	pub baud: BaudRate,
	pub checksum: ChecksumMode,
	pub duplex: Duplex,
	pub listen_port: u16,
	pub tx_max_nak: u8,
	pub tx_max_enq: u8,
	pub rx_dup_detect: bool,
	pub ack_timeout_ms: u32,
}

impl ConnectionConfig {
	pub fn use_crc(&self) -> bool {
		self.checksum == ChecksumMode::Crc
	}

	/// `ack_timeout_ms` expressed in ticks of the 10ms cadence the engine runs at.
	pub fn ack_timeout_ticks(&self, tick_period_ms: u32) -> u32 {
		(self.ack_timeout_ms / tick_period_ms).max(1)
	}
}
