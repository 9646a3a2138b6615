//! Loads and validates the `df1d` TOML configuration file into the core's
//! typed `ConnectionConfig` values. Replaces the original's libxml2 DTD
//! validation with `serde`'s own enum/field validation, plus the handful of
//! range checks a DTD can't express.

use std::path::Path;

use df1::ConnectionConfig;
use serde::Deserialize;

use crate::error::DaemonError;

#[derive(Debug, Deserialize)]
struct ConfigFile {
	#[serde(rename = "connection", default)]
	connections: Vec<ConnectionConfig>,
}

pub fn load(path: &Path) -> Result<Vec<ConnectionConfig>, DaemonError> {
	let text = std::fs::read_to_string(path).map_err(|source| DaemonError::ReadConfig { path: path.display().to_string(), source })?;

	let file: ConfigFile = toml::from_str(&text).map_err(|source| DaemonError::ParseConfig { path: path.display().to_string(), source })?;

	if file.connections.is_empty() {
		return Err(DaemonError::NoConnections);
	}

	for conn in &file.connections {
		validate(conn)?;
	}

	Ok(file.connections)
}

fn validate(conn: &ConnectionConfig) -> Result<(), DaemonError> {
	if conn.name.is_empty() || conn.name.len() > 16 {
		return Err(DaemonError::InvalidConnection { name: conn.name.clone(), reason: "name must be 1-16 bytes".to_string() });
	}

	if conn.device.is_empty() {
		return Err(DaemonError::InvalidConnection { name: conn.name.clone(), reason: "device path must not be empty".to_string() });
	}

	if conn.listen_port == 0 {
		return Err(DaemonError::InvalidConnection { name: conn.name.clone(), reason: "listen_port must be nonzero".to_string() });
	}

	if conn.ack_timeout_ms == 0 {
		return Err(DaemonError::InvalidConnection { name: conn.name.clone(), reason: "ack_timeout_ms must be nonzero".to_string() });
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use std::io::Write;

	use super::*;

	fn write_toml(contents: &str) -> tempfile::NamedTempFile {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		file.write_all(contents.as_bytes()).unwrap();
		file
	}

	#[test]
	fn loads_a_minimal_connection() {
		let file = write_toml(
			r#"
			[[connection]]
			name = "line1"
			device = "/dev/ttyS0"
			baud = "9600"
			checksum = "crc"
			duplex = "full"
			listen_port = 7171
			tx_max_nak = 2
			tx_max_enq = 2
			rx_dup_detect = true
			ack_timeout_ms = 200
			"#,
		);

		let configs = load(file.path()).unwrap();
		assert_eq!(configs.len(), 1);
		assert_eq!(configs[0].name, "line1");
	}

	#[test]
	fn rejects_empty_connection_list() {
		let file = write_toml("");
		assert!(matches!(load(file.path()), Err(DaemonError::NoConnections)));
	}

	#[test]
	fn rejects_name_over_16_bytes() {
		let file = write_toml(
			r#"
			[[connection]]
			name = "a-name-that-is-way-too-long"
			device = "/dev/ttyS0"
			baud = "9600"
			checksum = "crc"
			duplex = "full"
			listen_port = 7171
			tx_max_nak = 2
			tx_max_enq = 2
			rx_dup_detect = true
			ack_timeout_ms = 200
			"#,
		);

		assert!(matches!(load(file.path()), Err(DaemonError::InvalidConnection { .. })));
	}

	#[test]
	fn rejects_unknown_baud_rate() {
		let file = write_toml(
			r#"
			[[connection]]
			name = "line1"
			device = "/dev/ttyS0"
			baud = "4800"
			checksum = "crc"
			duplex = "full"
			listen_port = 7171
			tx_max_nak = 2
			tx_max_enq = 2
			rx_dup_detect = true
			ack_timeout_ms = 200
			"#,
		);

		assert!(matches!(load(file.path()), Err(DaemonError::ParseConfig { .. })));
	}
}
