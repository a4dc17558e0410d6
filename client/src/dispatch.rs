//! Client-side reply handling (§4.4) and the upload placement FSM (§4.6).

use std::net::{SocketAddr, UdpSocket};

use log::warn;
use netstore_proto::wire::{Packet, Tag};
use netstore_proto::Direction;
use netstore_runtime::{RawFd, Reactor};

use crate::pending::{Candidate, ClientState, PendingOp};
use crate::transfer::{Label, Outcome, Transfers};

pub struct ClientCtx<'a> {
	pub socket: &'a UdpSocket,
	pub reactor: &'a mut Reactor<RawFd>,
	pub state: &'a mut ClientState,
	pub transfers: &'a mut Transfers,
	/// The well-known control-plane port every storage node binds to; used
	/// to address a specific server directly during upload placement.
	pub cmd_port: u16,
}

fn send(socket: &UdpSocket, peer: SocketAddr, packet: &Packet) {
	if let Ok(bytes) = packet.encode() {
		let _ = socket.send_to(&bytes, peer);
	}
}

fn pckg_error(peer: SocketAddr, reason: impl std::fmt::Display) {
	warn!("[PCKG ERROR] Skipping invalid package from {peer} ({reason})");
}

fn basename(path: &std::path::Path) -> String {
	path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| path.display().to_string())
}

pub fn handle_udp(ctx: &mut ClientCtx, peer: SocketAddr, bytes: &[u8]) {
	let packet = match Packet::decode(bytes) {
		Ok(p) => p,
		Err(e) => {
			pckg_error(peer, e);
			return;
		}
	};

	match packet.tag {
		Tag::GoodDay => handle_good_day(ctx, peer, &packet),
		Tag::MyList => handle_my_list(ctx, peer, &packet),
		Tag::ConnectMe => handle_connect_me(ctx, peer, &packet),
		Tag::NoWay => handle_no_way(ctx, peer, &packet),
		Tag::CanAdd => handle_can_add(ctx, peer, &packet),
		other => pckg_error(peer, format!("unexpected tag {other} at client")),
	}
}

fn handle_good_day(ctx: &mut ClientCtx, peer: SocketAddr, packet: &Packet) {
	match ctx.state.seqs.get_mut(packet.seq) {
		Some(PendingOp::Discover) => {
			println!("Found {} ({}) with free space {}", peer.ip(), packet.data_str(), packet.param.unwrap_or(0));
		}
		Some(PendingOp::UploadDiscover { responses }) => {
			responses.push(Candidate { ip: peer.ip(), free_space: packet.param.unwrap_or(0) as i64 });
		}
		_ => pckg_error(peer, format!("unexpected GOOD_DAY for seq {}", packet.seq)),
	}
}

fn handle_my_list(ctx: &mut ClientCtx, peer: SocketAddr, packet: &Packet) {
	match ctx.state.seqs.get_mut(packet.seq) {
		Some(PendingOp::Search { found }) => {
			for name in packet.data_str().split('\n').filter(|s| !s.is_empty()) {
				println!("{name} ({})", peer.ip());
				found.push((peer.ip(), name.to_owned()));
			}
		}
		_ => pckg_error(peer, format!("unexpected MY_LIST for seq {}", packet.seq)),
	}
}

fn handle_connect_me(ctx: &mut ClientCtx, peer: SocketAddr, packet: &Packet) {
	let Some(op) = ctx.state.seqs.remove(packet.seq) else {
		pckg_error(peer, format!("unexpected CONNECT_ME for seq {}", packet.seq));
		return;
	};

	let PendingOp::Fetch { filename, file, .. } = op else {
		pckg_error(peer, format!("CONNECT_ME for seq {} does not match a pending fetch", packet.seq));
		return;
	};

	let port = packet.param.unwrap_or(0) as u16;
	let addr = SocketAddr::new(peer.ip(), port);

	if let Err(e) = ctx.transfers.start(ctx.reactor, addr, Direction::SocketToFile, file, Label::Download { name: filename.clone(), addr }) {
		println!("File {filename} downloading failed ({addr}) {e}");
	}
}

fn handle_no_way(ctx: &mut ClientCtx, peer: SocketAddr, packet: &Packet) {
	let Some(PendingOp::UploadAttempt { path, .. }) = ctx.state.seqs.get(packet.seq) else {
		pckg_error(peer, format!("unexpected NO_WAY for seq {}", packet.seq));
		return;
	};

	// §4.6: NO_WAY is only a valid rejection of this attempt when its data
	// echoes the filename (basename) we sent in the ADD; anything else is an
	// unexpected reply — logged and dropped, leaving the pending attempt
	// (and its seq) registered rather than acting on it.
	let filename = basename(path);
	if packet.data_str() != filename {
		pckg_error(peer, format!("NO_WAY for seq {} carries data {:?}, expected filename {filename:?}", packet.seq, packet.data_str()));
		return;
	}

	let op = ctx.state.seqs.remove(packet.seq).expect("presence just checked above");
	let PendingOp::UploadAttempt { path, file, size, remaining, .. } = op else {
		unreachable!("shape just checked above");
	};

	retry_or_give_up(ctx, path, file, size, remaining);
}

fn handle_can_add(ctx: &mut ClientCtx, peer: SocketAddr, packet: &Packet) {
	if !matches!(ctx.state.seqs.get(packet.seq), Some(PendingOp::UploadAttempt { .. })) {
		pckg_error(peer, format!("unexpected CAN_ADD for seq {}", packet.seq));
		return;
	}

	// §4.6: CAN_ADD's data must be empty per protocol; a non-empty payload is
	// an unexpected reply — logged and dropped, leaving the pending attempt
	// registered rather than treating it as an acceptance.
	if !packet.data.is_empty() {
		pckg_error(peer, format!("CAN_ADD for seq {} carries non-empty data", packet.seq));
		return;
	}

	let op = ctx.state.seqs.remove(packet.seq).expect("presence just checked above");
	let PendingOp::UploadAttempt { path, file, .. } = op else {
		unreachable!("shape just checked above");
	};

	let port = packet.param.unwrap_or(0) as u16;
	let addr = SocketAddr::new(peer.ip(), port);
	let display_path = path.display().to_string();

	if let Err(e) = ctx.transfers.start(ctx.reactor, addr, Direction::FileToSocket, file, Label::Upload { path: display_path.clone(), addr }) {
		println!("File {display_path} uploading failed ({addr}) {e}");
	}
}

/// Shared by a NO_WAY reply and an expiring upload-attempt timer (§4.6:
/// "Timer expires: treat identically to NO_WAY").
pub fn retry_or_give_up(ctx: &mut ClientCtx, path: std::path::PathBuf, file: std::fs::File, size: u64, mut remaining: Vec<Candidate>) {
	let Some(next) = remaining.pop() else {
		println!("File {} too big", basename(&path));
		return;
	};

	let seq = ctx.state.seqs.insert(PendingOp::UploadAttempt { path: path.clone(), file, size, target_ip: next.ip, remaining });

	let filename = basename(&path);
	let packet = Packet::complex(Tag::Add, seq, size, filename);
	let peer = SocketAddr::new(next.ip, ctx.cmd_port);
	send(ctx.socket, peer, &packet);
}

pub fn outcome_message(outcome: Outcome) {
	match outcome {
		Outcome::Downloaded { name, addr } => println!("File {name} downloaded ({addr})"),
		Outcome::DownloadFailed { name, addr, cause } => println!("File {name} downloading failed ({addr}) {cause}"),
		Outcome::Uploaded { path, addr } => println!("File {path} uploaded ({addr})"),
		Outcome::UploadFailed { path, addr, cause } => println!("File {path} uploading failed ({addr}) {cause}"),
	}
}

/// Closes every pending operation whose collection window or per-operation
/// timeout has elapsed (§4.4, §4.6, §7 "`Timeout` is recovered identically
/// to `UnexpectedReply`/NO_WAY/`SocketIO` depending on context").
pub fn reap_expired(ctx: &mut ClientCtx, now: std::time::Instant, timeout: std::time::Duration) {
	let expired = ctx.state.seqs.expired(now, timeout);

	for seq in expired {
		let Some(op) = ctx.state.seqs.remove(seq) else { continue };

		match op {
			PendingOp::Discover => {}

			PendingOp::UploadDiscover { mut responses } => {
				ctx.state.upload_discover_seq = None;
				responses.sort_by_key(|c| c.free_space);

				let queued: Vec<_> = ctx.state.upload_queue.drain(..).collect();
				for queued in queued {
					retry_or_give_up(ctx, queued.path, queued.file, queued.size, responses.clone());
				}
			}

			PendingOp::Search { found } => {
				ctx.state.search_set = found;
			}

			PendingOp::Fetch { filename, .. } => {
				warn!("fetch {filename} timed out waiting for a reply");
			}

			PendingOp::UploadAttempt { path, file, size, remaining, .. } => {
				retry_or_give_up(ctx, path, file, size, remaining);
			}
		}
	}
}
