//! Startup and configuration errors, reported to the operator with structured
//! detail rather than folded into the core's `Result<T, ()>` idiom.

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
	#[error("failed to read configuration file {path}: {source}")]
	ReadConfig { path: String, #[source] source: std::io::Error },

	#[error("failed to parse configuration file {path}: {source}")]
	ParseConfig { path: String, #[source] source: toml::de::Error },

	#[error("configuration has no [[connection]] tables")]
	NoConnections,

	#[error("connection '{name}': {reason}")]
	InvalidConnection { name: String, reason: String },

	#[error("failed to install Ctrl+C handler: {0}")]
	Signal(String),
}
