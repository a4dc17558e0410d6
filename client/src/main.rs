mod commands;
mod config;
mod dispatch;
mod net;
mod pending;
mod transfer;

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead};
use std::net::{SocketAddr, UdpSocket};
use std::os::unix::io::AsRawFd;
use std::process::ExitCode;

use log::{error, warn};
use netstore_proto::wire::{Packet, Tag, BUFFER_SIZE};
use netstore_runtime::logger::Logger;
use netstore_runtime::{signal, time, Interest, RawFd, Reactor};

use commands::Command;
use config::Config;
use dispatch::ClientCtx;
use pending::{ClientState, PendingOp, QueuedUpload};
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

fn run(config: Config) -> netstore_proto::Result<bool> {
	signal::ignore_sigpipe();
	signal::install().map_err(|e| netstore_proto::Error::config(format!("failed to install SIGINT handler: {e}")))?;

	let socket: UdpSocket = net::bind_client()?;
	let udp_fd = socket.as_raw_fd();
	let stdin_fd = io::stdin().as_raw_fd();

	let mut reactor: Reactor<RawFd> = Reactor::new();
	reactor.register(udp_fd, Interest::READABLE, udp_fd);
	reactor.register(stdin_fd, Interest::READABLE, stdin_fd);

	let mut state = ClientState::new();
	let mut transfers = Transfers::new();
	let mut recv_buf = vec![0u8; BUFFER_SIZE];
	let mcast_peer = SocketAddr::new(config.mcast_addr.into(), config.cmd_port);

	let mut stdin = io::BufReader::new(io::stdin());

	loop {
		if signal::interrupted() {
			return Ok(true);
		}

		let deadline = time::earliest(state.seqs.next_deadline(config.timeout), transfers.next_deadline(config.timeout));
		let ready = reactor.poll(deadline).map_err(|e| netstore_proto::Error::socket_io("poll", e))?;

		if signal::interrupted() {
			return Ok(true);
		}

		for (fd, _interest) in ready {
			if fd == udp_fd {
				service_udp(&socket, &mut reactor, &mut state, &mut transfers, config.cmd_port, &mut recv_buf);
			} else if fd == stdin_fd {
				let mut line = String::new();
				match stdin.read_line(&mut line) {
					Ok(0) => return Ok(false),
					Ok(_) => {
						if let Some(exit) = handle_command(&config, &socket, mcast_peer, &mut state, &line) {
							return Ok(exit);
						}
					}
					Err(e) => {
						warn!("stdin read failed: {e}");
						return Ok(false);
					}
				}
			} else if transfers.is_transfer_fd(fd) {
				if let Some(outcome) = transfers.service(&mut reactor, fd) {
					dispatch::outcome_message(outcome);
				}
			}
		}

		let now = std::time::Instant::now();
		let mut ctx = ClientCtx { socket: &socket, reactor: &mut reactor, state: &mut state, transfers: &mut transfers, cmd_port: config.cmd_port };
		dispatch::reap_expired(&mut ctx, now, config.timeout);

		for outcome in transfers.reap_expired(&mut reactor, now, config.timeout) {
			dispatch::outcome_message(outcome);
		}
	}
}

fn service_udp(socket: &UdpSocket, reactor: &mut Reactor<RawFd>, state: &mut ClientState, transfers: &mut Transfers, cmd_port: u16, recv_buf: &mut [u8]) {
	let (n, peer) = match socket.recv_from(recv_buf) {
		Ok(pair) => pair,
		Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
		Err(e) => {
			warn!("recv_from failed: {e}");
			return;
		}
	};

	let mut ctx = ClientCtx { socket, reactor, state, transfers, cmd_port };
	dispatch::handle_udp(&mut ctx, peer, &recv_buf[..n]);
}

/// Returns `Some(was_interrupted)` when the loop should terminate (the
/// `exit` verb), `None` otherwise.
fn handle_command(config: &Config, socket: &UdpSocket, mcast_peer: SocketAddr, state: &mut ClientState, line: &str) -> Option<bool> {
	match commands::parse(line) {
		Command::Exit => return Some(false),
		Command::Unknown => {}

		Command::Discover => {
			let seq = state.seqs.insert(PendingOp::Discover);
			send(socket, mcast_peer, &Packet::simple(Tag::Hello, seq, Vec::new()));
		}

		Command::Search { substr } => {
			let seq = state.seqs.insert(PendingOp::Search { found: Vec::new() });
			send(socket, mcast_peer, &Packet::simple(Tag::List, seq, substr));
		}

		Command::Fetch { name } => {
			let Some((server_ip, _)) = state.search_set.iter().find(|(_, n)| n == &name) else {
				println!("Requested file is not in recently searched");
				return None;
			};
			let server_ip = *server_ip;

			let dest_path = config.out_fldr.join(&name);
			let file = match OpenOptions::new().write(true).create(true).truncate(true).open(&dest_path) {
				Ok(f) => f,
				Err(e) => {
					println!("File {name} downloading failed ({server_ip}:0) {e}");
					return None;
				}
			};

			let seq = state.seqs.insert(PendingOp::Fetch { filename: name.clone(), dest_path, file });
			send(socket, SocketAddr::new(server_ip, config.cmd_port), &Packet::simple(Tag::Get, seq, name));
		}

		Command::Upload { path } => {
			let path_buf = std::path::PathBuf::from(&path);
			let file = match File::open(&path_buf) {
				Ok(f) => f,
				Err(_) => {
					println!("File {path} does not exist");
					return None;
				}
			};
			let size = file.metadata().map(|m| m.len()).unwrap_or(0);

			state.upload_queue.push(QueuedUpload { path: path_buf, file, size });

			if state.upload_discover_seq.is_none() {
				let seq = state.seqs.insert(PendingOp::UploadDiscover { responses: Vec::new() });
				state.upload_discover_seq = Some(seq);
				send(socket, mcast_peer, &Packet::simple(Tag::Hello, seq, Vec::new()));
			}
		}

		Command::Remove { name } => {
			// No reply is expected, so DEL needs no pending-op bookkeeping
			// (§4.4); the seq only has to be unlikely to collide with one
			// still in flight.
			send(socket, mcast_peer, &Packet::simple(Tag::Del, rand::random::<u64>(), name));
		}
	}

	None
}

fn send(socket: &UdpSocket, peer: SocketAddr, packet: &Packet) {
	if let Ok(bytes) = packet.encode() {
		let _ = socket.send_to(&bytes, peer);
	}
}
