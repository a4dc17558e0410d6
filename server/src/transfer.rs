//! Server-side TCP listener/session bookkeeping for GET (serving) and ADD
//! (receiving) transfers (§4.3, §4.5).

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, TcpListener, TcpStream};
use std::os::unix::io::AsRawFd;
use std::time::{Duration, Instant};

use log::warn;
use netstore_proto::{Direction, TransferSession};
use netstore_runtime::{Interest, RawFd, Reactor};

/// What a transfer does once its peer has connected.
enum Role {
	/// Serving GET: read from `file`, write to the socket.
	Get { file: File },
	/// Receiving ADD: read from the socket, write to `file`.
	Add { file: File },
}

enum Entry {
	Listening { listener: TcpListener, created: Instant },
	Active { stream: TcpStream, role: Role, session: TransferSession },
}

pub struct Transfers {
	entries: HashMap<RawFd, Entry>,
	roles: HashMap<RawFd, Role>,
}

impl Transfers {
	pub fn new() -> Self {
		Transfers { entries: HashMap::new(), roles: HashMap::new() }
	}

	/// Creates a listening socket for an upcoming GET/ADD transfer, returns
	/// its ephemeral port. `role` is stashed until the peer connects.
	fn listen(&mut self, reactor: &mut Reactor<RawFd>, role: Role) -> io::Result<u16> {
		let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, 0))?;
		listener.set_nonblocking(true)?;
		let port = listener.local_addr()?.port();
		let fd = listener.as_raw_fd();

		reactor.register(fd, Interest::READABLE, fd);
		self.roles.insert(fd, role);
		self.entries.insert(fd, Entry::Listening { listener, created: Instant::now() });

		Ok(port)
	}

	pub fn listen_for_get(&mut self, reactor: &mut Reactor<RawFd>, file: File) -> io::Result<u16> {
		self.listen(reactor, Role::Get { file })
	}

	pub fn listen_for_add(&mut self, reactor: &mut Reactor<RawFd>, file: File) -> io::Result<u16> {
		self.listen(reactor, Role::Add { file })
	}

	pub fn is_transfer_fd(&self, fd: RawFd) -> bool {
		self.entries.contains_key(&fd)
	}

	/// Accepts the one inbound connection a listener expects, switching the
	/// reactor registration from the listener fd to the stream fd.
	fn accept(&mut self, reactor: &mut Reactor<RawFd>, listener_fd: RawFd) {
		let Some(Entry::Listening { listener, .. }) = self.entries.remove(&listener_fd) else {
			return;
		};
		reactor.deregister(listener_fd);

		let role = self.roles.remove(&listener_fd).expect("role stashed at listen time");

		let (stream, _peer) = match listener.accept() {
			Ok(pair) => pair,
			Err(e) => {
				warn!("accept on transfer listener failed: {e}");
				return;
			}
		};

		if let Err(e) = stream.set_nonblocking(true) {
			warn!("set_nonblocking on accepted transfer socket failed: {e}");
			return;
		}

		let stream_fd = stream.as_raw_fd();
		let direction = match role {
			Role::Get { .. } => Direction::FileToSocket,
			Role::Add { .. } => Direction::SocketToFile,
		};

		let mut session = TransferSession::new(direction);
		session.mark_active();

		let interest = match direction {
			Direction::FileToSocket => Interest::WRITABLE,
			Direction::SocketToFile => Interest::READABLE,
		};
		reactor.register(stream_fd, interest, stream_fd);

		self.entries.insert(stream_fd, Entry::Active { stream, role, session });
	}

	/// Services one readiness event on a transfer fd: accept, or one
	/// recv/send, never more than one per call (§5).
	pub fn service(&mut self, reactor: &mut Reactor<RawFd>, fd: RawFd) {
		if matches!(self.entries.get(&fd), Some(Entry::Listening { .. })) {
			self.accept(reactor, fd);
			return;
		}

		let Some(Entry::Active { stream, role, session }) = self.entries.get_mut(&fd) else {
			return;
		};

		match role {
			Role::Add { file, .. } => Self::service_add(stream, file, session),
			Role::Get { file } => Self::service_get(stream, file, session),
		}

		if session.is_done() {
			reactor.deregister(fd);
			self.entries.remove(&fd);
		}
	}

	fn service_add(stream: &mut TcpStream, file: &mut File, session: &mut TransferSession) {
		let n = match stream.read(session.buffer.scratch()) {
			Ok(n) => n,
			Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
			Err(_) => {
				session.finish(false);
				return;
			}
		};

		if n == 0 {
			session.finish(true);
			return;
		}

		session.buffer.fill(n);
		if file.write_all(session.buffer.unread()).is_err() {
			session.finish(false);
			return;
		}
		session.buffer.advance(n);
		session.touch();
	}

	fn service_get(stream: &mut TcpStream, file: &mut File, session: &mut TransferSession) {
		if session.buffer.is_empty() {
			let n = match file.read(session.buffer.scratch()) {
				Ok(n) => n,
				Err(_) => {
					session.finish(false);
					return;
				}
			};

			if n == 0 {
				session.finish(true);
				return;
			}
			session.buffer.fill(n);
		}

		match stream.write(session.buffer.unread()) {
			Ok(sent) => {
				session.buffer.advance(sent);
				session.touch();
			}
			Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
			Err(_) => session.finish(false),
		}
	}

	/// Tears down every transfer whose inactivity deadline has passed.
	pub fn reap_expired(&mut self, reactor: &mut Reactor<RawFd>, now: Instant, timeout: Duration) {
		let expired: Vec<RawFd> = self
			.entries
			.iter()
			.filter(|(_, e)| match e {
				Entry::Listening { created, .. } => now.duration_since(*created) >= timeout,
				Entry::Active { session, .. } => session.is_expired(now, timeout),
			})
			.map(|(&fd, _)| fd)
			.collect();

		for fd in expired {
			reactor.deregister(fd);
			self.entries.remove(&fd);
			self.roles.remove(&fd);
		}
	}

	pub fn next_deadline(&self, timeout: Duration) -> Option<Instant> {
		self.entries
			.values()
			.filter_map(|e| match e {
				Entry::Listening { created, .. } => Some(*created + timeout),
				Entry::Active { session, .. } => Some(session.deadline(timeout)),
			})
			.min()
	}
}

impl Default for Transfers {
	fn default() -> Self {
		Self::new()
	}
}
