//! Active client-side TCP transfers: fetch (download) and upload, both
//! started by connecting out to a port named in a CONNECT_ME/CAN_ADD
//! reply (§4.5, §4.6).

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::os::unix::io::AsRawFd;
use std::time::{Duration, Instant};

use netstore_proto::{Direction, TransferSession};
use netstore_runtime::{Interest, RawFd, Reactor};

/// What the user sees printed once a transfer finishes, per §6.
pub enum Label {
	Download { name: String, addr: SocketAddr },
	Upload { path: String, addr: SocketAddr },
}

struct Entry {
	stream: TcpStream,
	file: File,
	session: TransferSession,
	label: Label,
}

pub enum Outcome {
	Downloaded { name: String, addr: SocketAddr },
	DownloadFailed { name: String, addr: SocketAddr, cause: String },
	Uploaded { path: String, addr: SocketAddr },
	UploadFailed { path: String, addr: SocketAddr, cause: String },
}

pub struct Transfers {
	entries: HashMap<RawFd, Entry>,
}

impl Transfers {
	pub fn new() -> Self {
		Transfers { entries: HashMap::new() }
	}

	/// Connects to `addr` and registers a transfer in `direction`, owning
	/// `file` for the duration. Used for both fetch (`SocketToFile`,
	/// `file` already open for writing) and upload (`FileToSocket`, `file`
	/// already open for reading).
	pub fn start(&mut self, reactor: &mut Reactor<RawFd>, addr: SocketAddr, direction: Direction, file: File, label: Label) -> io::Result<()> {
		let stream = TcpStream::connect(addr)?;
		stream.set_nonblocking(true)?;
		let fd = stream.as_raw_fd();

		let mut session = TransferSession::new(direction);
		session.mark_active();

		let interest = match direction {
			Direction::FileToSocket => Interest::WRITABLE,
			Direction::SocketToFile => Interest::READABLE,
		};
		reactor.register(fd, interest, fd);

		self.entries.insert(fd, Entry { stream, file, session, label });
		Ok(())
	}

	pub fn is_transfer_fd(&self, fd: RawFd) -> bool {
		self.entries.contains_key(&fd)
	}

	/// Services one readiness event; returns the terminal outcome if the
	/// transfer just completed or failed.
	pub fn service(&mut self, reactor: &mut Reactor<RawFd>, fd: RawFd) -> Option<Outcome> {
		let entry = self.entries.get_mut(&fd)?;

		match entry.session.direction {
			Direction::SocketToFile => Self::service_download(&mut entry.stream, &mut entry.file, &mut entry.session),
			Direction::FileToSocket => Self::service_upload(&mut entry.stream, &mut entry.file, &mut entry.session),
		}

		if !entry.session.is_done() {
			return None;
		}

		let ok = matches!(entry.session.state, netstore_proto::TransferState::Done { ok: true });
		reactor.deregister(fd);
		let entry = self.entries.remove(&fd)?;

		Some(match (entry.label, ok) {
			(Label::Download { name, addr }, true) => Outcome::Downloaded { name, addr },
			(Label::Download { name, addr }, false) => Outcome::DownloadFailed { name, addr, cause: "transfer failed".into() },
			(Label::Upload { path, addr }, true) => Outcome::Uploaded { path, addr },
			(Label::Upload { path, addr }, false) => Outcome::UploadFailed { path, addr, cause: "transfer failed".into() },
		})
	}

	fn service_download(stream: &mut TcpStream, file: &mut File, session: &mut TransferSession) {
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

	fn service_upload(stream: &mut TcpStream, file: &mut File, session: &mut TransferSession) {
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

	pub fn reap_expired(&mut self, reactor: &mut Reactor<RawFd>, now: Instant, timeout: Duration) -> Vec<Outcome> {
		let expired: Vec<RawFd> =
			self.entries.iter().filter(|(_, e)| e.session.is_expired(now, timeout)).map(|(&fd, _)| fd).collect();

		let mut outcomes = Vec::new();
		for fd in expired {
			reactor.deregister(fd);
			if let Some(entry) = self.entries.remove(&fd) {
				outcomes.push(match entry.label {
					Label::Download { name, addr } => Outcome::DownloadFailed { name, addr, cause: "timed out".into() },
					Label::Upload { path, addr } => Outcome::UploadFailed { path, addr, cause: "timed out".into() },
				});
			}
		}
		outcomes
	}

	pub fn next_deadline(&self, timeout: Duration) -> Option<Instant> {
		self.entries.values().map(|e| e.session.deadline(timeout)).min()
	}
}

impl Default for Transfers {
	fn default() -> Self {
		Self::new()
	}
}
