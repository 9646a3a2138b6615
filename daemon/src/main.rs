mod cli;
mod config;
mod error;

use clap::Parser;
use error::DaemonError;
use stakker::{actor, ret_nop};

fn run() -> Result<(), DaemonError> {
	let cli = cli::Cli::parse();

	log::set_boxed_logger(Box::new(runtime::logger::Logger)).expect("logger already set");
	log::set_max_level(cli.log_level());

	let connections = config::load(&cli.config)?;

	log::info!("Loaded {} connection(s) from {}", connections.len(), cli.config.display());

	let mut stakker = runtime::init();
	let engine = actor!(stakker, df1::Engine::init(connections), ret_nop!());

	runtime::exec(&mut stakker, move || {
		log::info!("Shutting down");
		drop(engine);
	})
	.map_err(|()| DaemonError::Signal("failed to run event loop".to_string()))?;

	Ok(())
}

fn main() {
	if let Err(err) = run() {
		eprintln!("df1d: {err}");
		std::process::exit(1);
	}
}
