use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use netstore_proto::constants::{PORT_MAX, PORT_MIN, TIMEOUT_DEFAULT, TIMEOUT_MAX, TIMEOUT_MIN};
use netstore_proto::Error;

/// `netstore-client -g MCAST_ADDR -p CMD_PORT -o OUT_FLDR [-t TIMEOUT]`
#[derive(Parser, Debug)]
#[command(name = "netstore-client", about = "Interactive client for the netstore control-plane protocol")]
struct Cli {
	/// Multicast group address storage nodes listen on.
	#[arg(short = 'g', long = "mcast-addr")]
	mcast_addr: Ipv4Addr,

	/// UDP port for control-plane traffic (1..65535).
	#[arg(short = 'p', long = "cmd-port")]
	cmd_port: u32,

	/// Directory fetched files are written into.
	#[arg(short = 'o', long = "out-fldr")]
	out_fldr: PathBuf,

	/// Per-operation / per-transfer timeout in seconds (1..300).
	#[arg(short = 't', long = "timeout", default_value_t = TIMEOUT_DEFAULT)]
	timeout: u32,
}

#[derive(Debug, Clone)]
pub struct Config {
	pub mcast_addr: Ipv4Addr,
	pub cmd_port: u16,
	pub out_fldr: PathBuf,
	pub timeout: Duration,
}

impl Config {
	pub fn parse() -> netstore_proto::Result<Config> {
		let cli = Cli::parse();
		Config::from_cli(cli)
	}

	fn from_cli(cli: Cli) -> netstore_proto::Result<Config> {
		if !(PORT_MIN..=PORT_MAX).contains(&cli.cmd_port) {
			return Err(Error::config(format!("-p {} out of range {}..{}", cli.cmd_port, PORT_MIN, PORT_MAX)));
		}

		if !(TIMEOUT_MIN..=TIMEOUT_MAX).contains(&cli.timeout) {
			return Err(Error::config(format!("-t {} out of range {}..{}", cli.timeout, TIMEOUT_MIN, TIMEOUT_MAX)));
		}

		Ok(Config {
			mcast_addr: cli.mcast_addr,
			cmd_port: cli.cmd_port as u16,
			out_fldr: cli.out_fldr,
			timeout: Duration::from_secs(cli.timeout as u64),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn base_cli() -> Cli {
		Cli { mcast_addr: Ipv4Addr::new(239, 10, 11, 12), cmd_port: 6001, out_fldr: PathBuf::from("/tmp/out"), timeout: 5 }
	}

	#[test]
	fn accepts_valid_config() {
		assert!(Config::from_cli(base_cli()).is_ok());
	}

	#[test]
	fn rejects_port_out_of_range() {
		let mut cli = base_cli();
		cli.cmd_port = 70_000;
		assert!(Config::from_cli(cli).is_err());
	}

	#[test]
	fn rejects_timeout_out_of_range() {
		let mut cli = base_cli();
		cli.timeout = 0;
		assert!(Config::from_cli(cli).is_err());
	}
}
