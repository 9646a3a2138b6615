use std::path::PathBuf;

use clap::Parser;

/// Multiplexes TCP clients onto a serial DF1 link.
#[derive(Debug, Parser)]
#[command(name = "df1d", version, about)]
pub struct Cli {
	/// Path to the TOML configuration file.
	#[arg(short, long, value_name = "FILE")]
	pub config: PathBuf,

	/// Increase log verbosity (-v, -vv, -vvv).
	#[arg(short, long, action = clap::ArgAction::Count)]
	pub verbose: u8,
}

impl Cli {
	pub fn log_level(&self) -> log::LevelFilter {
		match self.verbose {
			0 => log::LevelFilter::Info,
			1 => log::LevelFilter::Debug,
			_ => log::LevelFilter::Trace,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn verbosity_escalates_log_level() {
		let base = Cli { config: "df1d.toml".into(), verbose: 0 };
		assert_eq!(base.log_level(), log::LevelFilter::Info);

		let verbose = Cli { config: "df1d.toml".into(), verbose: 2 };
		assert_eq!(verbose.log_level(), log::LevelFilter::Trace);
	}
}
