//! §4.3 command dispatch: decode one UDP datagram and react to its tag.

use std::fs::OpenOptions;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};

use log::warn;
use netstore_proto::wire::{Packet, Tag, DATA_MAX};
use netstore_runtime::Reactor;

use crate::state::NodeState;
use crate::transfer::Transfers;

pub struct DispatchCtx<'a> {
	pub socket: &'a UdpSocket,
	pub reactor: &'a mut Reactor<netstore_runtime::RawFd>,
	pub state: &'a mut NodeState,
	pub transfers: &'a mut Transfers,
	pub mcast_addr: Ipv4Addr,
}

fn send(socket: &UdpSocket, peer: SocketAddr, packet: &Packet) {
	match packet.encode() {
		Ok(bytes) => {
			if let Err(e) = socket.send_to(&bytes, peer) {
				warn!("send to {peer} failed: {e}");
			}
		}
		Err(e) => warn!("failed to encode {:?} reply to {peer}: {e}", packet.tag),
	}
}

fn pckg_error(peer: SocketAddr, reason: impl std::fmt::Display) {
	warn!("[PCKG ERROR] Skipping invalid package from {peer} ({reason})");
}

/// Decodes `bytes` from `peer` and dispatches it. Logged-and-dropped per
/// §4.3 for malformed/unknown/rejected packets; at most one reply is ever
/// sent per inbound packet (HELLO/LIST/GET/ADD), except LIST which may send
/// several MY_LIST replies.
pub fn handle(ctx: &mut DispatchCtx, peer: SocketAddr, bytes: &[u8]) {
	let packet = match Packet::decode(bytes) {
		Ok(p) => p,
		Err(e) => {
			pckg_error(peer, e);
			return;
		}
	};

	match packet.tag {
		Tag::Hello => handle_hello(ctx, peer, &packet),
		Tag::List => handle_list(ctx, peer, &packet),
		Tag::Get => handle_get(ctx, peer, &packet),
		Tag::Del => handle_del(ctx, &packet),
		Tag::Add => handle_add(ctx, peer, &packet),
		other => pckg_error(peer, format!("unexpected tag {other} at server")),
	}
}

fn handle_hello(ctx: &mut DispatchCtx, peer: SocketAddr, packet: &Packet) {
	if !packet.data.is_empty() {
		pckg_error(peer, "HELLO carries a non-empty payload");
		return;
	}

	let reply = Packet::complex(Tag::GoodDay, packet.seq, ctx.state.free_space as u64, ctx.mcast_addr.to_string());
	send(ctx.socket, peer, &reply);
}

fn handle_list(ctx: &mut DispatchCtx, peer: SocketAddr, packet: &Packet) {
	let substr = packet.data_str();
	let mut current = String::new();

	for name in ctx.state.matching(substr) {
		let grows_by = name.len() + if current.is_empty() { 0 } else { 1 };

		if !current.is_empty() && current.len() + grows_by > DATA_MAX {
			send(ctx.socket, peer, &Packet::simple(Tag::MyList, packet.seq, std::mem::take(&mut current)));
		}

		if !current.is_empty() {
			current.push('\n');
		}
		current.push_str(name);
	}

	if !current.is_empty() {
		send(ctx.socket, peer, &Packet::simple(Tag::MyList, packet.seq, current));
	}
}

fn handle_get(ctx: &mut DispatchCtx, peer: SocketAddr, packet: &Packet) {
	let filename = packet.data_str();

	if !ctx.state.hosted.contains(filename) {
		pckg_error(peer, format!("GET for unhosted file {filename:?}"));
		return;
	}

	let path = ctx.state.path_for(filename);
	let file = match std::fs::File::open(&path) {
		Ok(f) => f,
		Err(e) => {
			warn!("GET {filename}: failed to open {}: {e}", path.display());
			return;
		}
	};

	let port = match ctx.transfers.listen_for_get(ctx.reactor, file) {
		Ok(p) => p,
		Err(e) => {
			warn!("GET {filename}: failed to open transfer listener: {e}");
			return;
		}
	};

	let reply = Packet::complex(Tag::ConnectMe, packet.seq, port as u64, filename);
	send(ctx.socket, peer, &reply);
}

fn handle_del(ctx: &mut DispatchCtx, packet: &Packet) {
	let filename = packet.data_str();
	ctx.state.delete(filename);
}

fn handle_add(ctx: &mut DispatchCtx, peer: SocketAddr, packet: &Packet) {
	let filename = packet.data_str().to_owned();
	let raw_size = packet.param.unwrap_or(0);

	// §4.1: the wire param is untrusted input; a value that doesn't fit a
	// non-negative i64 must be rejected rather than cast (which would wrap
	// to a negative size and corrupt the free-space accounting in §8).
	let Ok(size) = i64::try_from(raw_size) else {
		pckg_error(peer, format!("ADD param {raw_size} does not fit a non-negative i64"));
		let reply = Packet::simple(Tag::NoWay, packet.seq, filename);
		send(ctx.socket, peer, &reply);
		return;
	};

	if !ctx.state.can_add(&filename, size) {
		let reply = Packet::simple(Tag::NoWay, packet.seq, filename);
		send(ctx.socket, peer, &reply);
		return;
	}

	let path = ctx.state.path_for(&filename);
	let file = match OpenOptions::new().write(true).create(true).truncate(true).open(&path) {
		Ok(f) => f,
		Err(e) => {
			warn!("ADD {filename}: failed to open {} for writing: {e}", path.display());
			let reply = Packet::simple(Tag::NoWay, packet.seq, filename);
			send(ctx.socket, peer, &reply);
			return;
		}
	};

	let port = match ctx.transfers.listen_for_add(ctx.reactor, file) {
		Ok(p) => p,
		Err(e) => {
			warn!("ADD {filename}: failed to open transfer listener: {e}");
			let reply = Packet::simple(Tag::NoWay, packet.seq, filename);
			send(ctx.socket, peer, &reply);
			return;
		}
	};

	// Reservation happens here, at ADD-accept time, not at TCP-close time
	// (§3, §4.3) — not rolled back if the transfer never completes (§9).
	ctx.state.reserve(&filename, size);

	let reply = Packet::complex(Tag::CanAdd, packet.seq, port as u64, Vec::new());
	send(ctx.socket, peer, &reply);
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::net::Ipv4Addr;
	use std::time::Duration;

	use netstore_runtime::Reactor;

	fn harness() -> (UdpSocket, UdpSocket, NodeState, Reactor<netstore_runtime::RawFd>, Transfers, tempfile::TempDir) {
		let dir = tempfile::tempdir().unwrap();
		let state = NodeState::init(dir.path().to_path_buf(), 1000).unwrap();
		let server_sock = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
		let client_sock = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
		client_sock.set_read_timeout(Some(Duration::from_millis(200))).unwrap();
		(server_sock, client_sock, state, Reactor::new(), Transfers::new(), dir)
	}

	fn recv_reply(client_sock: &UdpSocket) -> Packet {
		let mut buf = [0u8; 4096];
		let (n, _) = client_sock.recv_from(&mut buf).expect("expected a reply");
		Packet::decode(&buf[..n]).unwrap()
	}

	#[test]
	fn hello_replies_with_free_space_and_mcast_string() {
		let (server_sock, client_sock, mut state, mut reactor, mut transfers, _dir) = harness();
		let peer = client_sock.local_addr().unwrap();
		let mut ctx = DispatchCtx { socket: &server_sock, reactor: &mut reactor, state: &mut state, transfers: &mut transfers, mcast_addr: Ipv4Addr::new(239, 10, 11, 12) };

		let hello = Packet::simple(Tag::Hello, 7, Vec::new());
		handle(&mut ctx, peer, &hello.encode().unwrap());

		let reply = recv_reply(&client_sock);
		assert_eq!(reply.tag, Tag::GoodDay);
		assert_eq!(reply.seq, 7);
		assert_eq!(reply.param, Some(1000));
		assert_eq!(reply.data_str(), "239.10.11.12");
	}

	#[test]
	fn hello_with_payload_is_dropped() {
		let (server_sock, client_sock, mut state, mut reactor, mut transfers, _dir) = harness();
		let peer = client_sock.local_addr().unwrap();
		let mut ctx = DispatchCtx { socket: &server_sock, reactor: &mut reactor, state: &mut state, transfers: &mut transfers, mcast_addr: Ipv4Addr::new(239, 10, 11, 12) };

		let hello = Packet::simple(Tag::Hello, 7, b"unexpected".to_vec());
		handle(&mut ctx, peer, &hello.encode().unwrap());

		let mut buf = [0u8; 4096];
		assert!(client_sock.recv_from(&mut buf).is_err(), "no reply expected for a malformed HELLO");
	}

	#[test]
	fn list_chunks_results_under_data_max() {
		let (server_sock, client_sock, mut state, mut reactor, mut transfers, _dir) = harness();
		state.hosted.insert("a".repeat(DATA_MAX - 2));
		state.hosted.insert("b".repeat(10));
		let peer = client_sock.local_addr().unwrap();
		let mut ctx = DispatchCtx { socket: &server_sock, reactor: &mut reactor, state: &mut state, transfers: &mut transfers, mcast_addr: Ipv4Addr::LOCALHOST };

		let list = Packet::simple(Tag::List, 3, Vec::new());
		handle(&mut ctx, peer, &list.encode().unwrap());

		let first = recv_reply(&client_sock);
		let second = recv_reply(&client_sock);
		assert_eq!(first.tag, Tag::MyList);
		assert_eq!(second.tag, Tag::MyList);
		assert_eq!(first.seq, 3);
		assert_eq!(second.seq, 3);
		assert!(first.data.len() <= DATA_MAX);
		assert!(second.data.len() <= DATA_MAX);
	}

	#[test]
	fn list_with_no_matches_sends_no_reply() {
		let (server_sock, client_sock, mut state, mut reactor, mut transfers, _dir) = harness();
		let peer = client_sock.local_addr().unwrap();
		let mut ctx = DispatchCtx { socket: &server_sock, reactor: &mut reactor, state: &mut state, transfers: &mut transfers, mcast_addr: Ipv4Addr::LOCALHOST };

		let list = Packet::simple(Tag::List, 3, b"ghost".to_vec());
		handle(&mut ctx, peer, &list.encode().unwrap());

		let mut buf = [0u8; 4096];
		assert!(client_sock.recv_from(&mut buf).is_err());
	}

	#[test]
	fn add_rejects_duplicate_filename_with_no_way() {
		let (server_sock, client_sock, mut state, mut reactor, mut transfers, _dir) = harness();
		state.hosted.insert("a.txt".to_owned());
		let peer = client_sock.local_addr().unwrap();
		let mut ctx = DispatchCtx { socket: &server_sock, reactor: &mut reactor, state: &mut state, transfers: &mut transfers, mcast_addr: Ipv4Addr::LOCALHOST };

		let add = Packet::complex(Tag::Add, 9, 10, b"a.txt".to_vec());
		handle(&mut ctx, peer, &add.encode().unwrap());

		let reply = recv_reply(&client_sock);
		assert_eq!(reply.tag, Tag::NoWay);
		assert_eq!(reply.seq, 9);
		assert_eq!(reply.data_str(), "a.txt");
	}

	#[test]
	fn add_rejects_param_too_large_for_i64_without_corrupting_free_space() {
		let (server_sock, client_sock, mut state, mut reactor, mut transfers, _dir) = harness();
		let peer = client_sock.local_addr().unwrap();
		let free_space_before = state.free_space;
		let mut ctx = DispatchCtx { socket: &server_sock, reactor: &mut reactor, state: &mut state, transfers: &mut transfers, mcast_addr: Ipv4Addr::LOCALHOST };

		let add = Packet::complex(Tag::Add, 9, u64::MAX, b"huge.bin".to_vec());
		handle(&mut ctx, peer, &add.encode().unwrap());

		let reply = recv_reply(&client_sock);
		assert_eq!(reply.tag, Tag::NoWay);
		assert_eq!(reply.seq, 9);
		assert_eq!(reply.data_str(), "huge.bin");
		assert_eq!(state.free_space, free_space_before);
		assert!(!state.hosted.contains("huge.bin"));
	}

	#[test]
	fn add_accepts_and_reserves_space_immediately() {
		let (server_sock, client_sock, mut state, mut reactor, mut transfers, _dir) = harness();
		let peer = client_sock.local_addr().unwrap();
		let mut ctx = DispatchCtx { socket: &server_sock, reactor: &mut reactor, state: &mut state, transfers: &mut transfers, mcast_addr: Ipv4Addr::LOCALHOST };

		let add = Packet::complex(Tag::Add, 9, 400, b"new.bin".to_vec());
		handle(&mut ctx, peer, &add.encode().unwrap());

		let reply = recv_reply(&client_sock);
		assert_eq!(reply.tag, Tag::CanAdd);
		assert_eq!(state.free_space, 600);
		assert!(state.hosted.contains("new.bin"));
	}

	#[test]
	fn del_of_missing_file_sends_no_reply() {
		let (server_sock, client_sock, mut state, mut reactor, mut transfers, _dir) = harness();
		let peer = client_sock.local_addr().unwrap();
		let mut ctx = DispatchCtx { socket: &server_sock, reactor: &mut reactor, state: &mut state, transfers: &mut transfers, mcast_addr: Ipv4Addr::LOCALHOST };

		let del = Packet::simple(Tag::Del, 1, b"ghost".to_vec());
		handle(&mut ctx, peer, &del.encode().unwrap());

		let mut buf = [0u8; 4096];
		assert!(client_sock.recv_from(&mut buf).is_err());
	}
}
