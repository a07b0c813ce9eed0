//! Command-line interface definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "meta-relay")]
#[command(about = "Meta-transaction relay for trusted forwarder contracts", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Args {
	/// Path to configuration file
	#[arg(short, long, env = "RELAY_CONFIG", default_value = "config/relay.toml")]
	pub config: PathBuf,

	/// Log level override (trace, debug, info, warn, error)
	#[arg(short, long, env = "RELAY_LOG_LEVEL")]
	pub log_level: Option<String>,

	#[command(subcommand)]
	pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
	/// Start the relay and its HTTP API
	Start,
	/// Load and validate the configuration, then exit
	Validate,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults_to_start() {
		let args = Args::try_parse_from(["meta-relay"]).unwrap();
		assert_eq!(args.command, None);
		assert_eq!(args.config, PathBuf::from("config/relay.toml"));
	}

	#[test]
	fn test_validate_with_overrides() {
		let args = Args::try_parse_from([
			"meta-relay",
			"--config",
			"other.toml",
			"--log-level",
			"debug",
			"validate",
		])
		.unwrap();
		assert_eq!(args.command, Some(Command::Validate));
		assert_eq!(args.config, PathBuf::from("other.toml"));
		assert_eq!(args.log_level.as_deref(), Some("debug"));
	}
}
