mod config;
mod dispatch;
mod multicast;
mod state;
mod transfer;

use std::net::UdpSocket;
use std::os::unix::io::AsRawFd;
use std::process::ExitCode;

use log::{error, info};
use netstore_proto::wire::BUFFER_SIZE;
use netstore_runtime::logger::Logger;
use netstore_runtime::{signal, Interest, RawFd, Reactor};

use config::Config;
use dispatch::DispatchCtx;
use state::NodeState;
use transfer::Transfers;

fn main() -> ExitCode {
	Logger::init(log::LevelFilter::Info);

	let config = match Config::parse() {
		Ok(c) => c,
		Err(e) => {
			error!("{e}");
			return ExitCode::FAILURE;
		}
	};

	match run(config) {
		Ok(interrupted) => {
			if interrupted {
				info!("shutting down on SIGINT");
				ExitCode::from(130)
			} else {
				ExitCode::SUCCESS
			}
		}
		Err(e) => {
			error!("{e}");
			ExitCode::FAILURE
		}
	}
}

/// Runs the server loop to completion. Returns `Ok(true)` if termination
/// was due to SIGINT, `Ok(false)` for any other clean shutdown.
fn run(config: Config) -> netstore_proto::Result<bool> {
	signal::ignore_sigpipe();
	signal::install().map_err(|e| netstore_proto::Error::config(format!("failed to install SIGINT handler: {e}")))?;

	let mut state = NodeState::init(config.shrd_fldr.clone(), config.max_space)?;
	let socket: UdpSocket = multicast::bind_server(config.mcast_addr, config.cmd_port)?;

	info!("listening on {}:{} ({})", config.mcast_addr, config.cmd_port, config.shrd_fldr.display());

	let udp_fd = socket.as_raw_fd();
	let mut reactor: Reactor<RawFd> = Reactor::new();
	reactor.register(udp_fd, Interest::READABLE, udp_fd);

	let mut transfers = Transfers::new();
	let mut recv_buf = vec![0u8; BUFFER_SIZE];

	loop {
		if signal::interrupted() {
			return Ok(true);
		}

		let deadline = transfers.next_deadline(config.timeout);
		let ready = reactor.poll(deadline).map_err(|e| netstore_proto::Error::socket_io("poll", e))?;

		if signal::interrupted() {
			return Ok(true);
		}

		for (fd, _interest) in ready {
			if fd == udp_fd {
				service_udp(&socket, &mut reactor, &mut state, &mut transfers, config.mcast_addr, &mut recv_buf);
			} else if transfers.is_transfer_fd(fd) {
				transfers.service(&mut reactor, fd);
			}
		}

		transfers.reap_expired(&mut reactor, std::time::Instant::now(), config.timeout);
	}
}

fn service_udp(
	socket: &UdpSocket,
	reactor: &mut Reactor<RawFd>,
	state: &mut NodeState,
	transfers: &mut Transfers,
	mcast_addr: std::net::Ipv4Addr,
	recv_buf: &mut [u8],
) {
	let (n, peer) = match socket.recv_from(recv_buf) {
		Ok(pair) => pair,
		Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return,
		Err(e) => {
			log::warn!("recv_from failed: {e}");
			return;
		}
	};

	let mut ctx = DispatchCtx { socket, reactor, state, transfers, mcast_addr };
	dispatch::handle(&mut ctx, peer, &recv_buf[..n]);
}
