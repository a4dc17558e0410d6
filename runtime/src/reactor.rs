//! A tiny single-threaded `poll()` reactor.
//!
//! The server and client each run one `Reactor` per process and make at
//! most one blocking `poll()` call per loop iteration; handlers registered
//! against a ready key do at most one `recv`/`accept`/`send` before
//! returning control to the loop, per §4's "never loop inside a handler".

use std::io;
use std::time::Instant;

use crate::time;

#[cfg(unix)]
pub type RawFd = std::os::unix::io::RawFd;
#[cfg(windows)]
pub type RawFd = std::os::windows::io::RawSocket;

/// Readiness/interest mask, mirrored on both the request and the response
/// side of `poll()`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct Interest(i16);

impl Interest {
	pub const NONE: Interest = Interest(0);
	pub const READABLE: Interest = Interest(0x001);
	pub const WRITABLE: Interest = Interest(0x004);

	pub fn contains(self, other: Interest) -> bool {
		self.0 & other.0 == other.0
	}
}

impl std::ops::BitOr for Interest {
	type Output = Interest;
	fn bitor(self, rhs: Interest) -> Interest {
		Interest(self.0 | rhs.0)
	}
}

/// An entry a caller has registered with the reactor: an fd/socket to
/// watch, the interest mask, and an opaque key returned on readiness.
struct Registration<K> {
	fd: RawFd,
	interest: Interest,
	key: K,
}

/// Generic over the caller's key type (commonly an enum identifying which
/// socket/stream/stdin became ready).
pub struct Reactor<K> {
	regs: Vec<Registration<K>>,
}

impl<K: Copy + Eq> Reactor<K> {
	pub fn new() -> Self {
		Reactor { regs: Vec::new() }
	}

	pub fn register(&mut self, fd: RawFd, interest: Interest, key: K) {
		self.deregister(fd);
		self.regs.push(Registration { fd, interest, key });
	}

	pub fn set_interest(&mut self, fd: RawFd, interest: Interest) {
		if let Some(r) = self.regs.iter_mut().find(|r| r.fd == fd) {
			r.interest = interest;
		}
	}

	pub fn deregister(&mut self, fd: RawFd) {
		self.regs.retain(|r| r.fd != fd);
	}

	pub fn is_registered(&self, fd: RawFd) -> bool {
		self.regs.iter().any(|r| r.fd == fd)
	}

	/// Blocks until a registered fd is ready, `deadline` elapses, or the
	/// call is interrupted by a signal. Returns the keys that became
	/// ready; an empty vector means the deadline fired (or the call was
	/// interrupted — the caller is expected to re-check its own exit
	/// condition, e.g. `runtime::signal::interrupted()`, in that case).
	pub fn poll(&self, deadline: Option<Instant>) -> io::Result<Vec<(K, Interest)>> {
		if self.regs.is_empty() {
			return Ok(Vec::new());
		}

		let timeout_ms = time::as_millis(deadline);
		let mut pfds: Vec<sys::PollFd> = self
			.regs
			.iter()
			.map(|r| sys::PollFd::new(r.fd, r.interest))
			.collect();

		match sys::poll(&mut pfds, timeout_ms) {
			Ok(_) => {}
			Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(Vec::new()),
			Err(e) => return Err(e),
		}

		let mut ready = Vec::new();
		for (reg, pfd) in self.regs.iter().zip(pfds.iter()) {
			let revents = pfd.revents();
			if revents != Interest::NONE {
				ready.push((reg.key, revents));
			}
		}
		Ok(ready)
	}
}

impl<K: Copy + Eq> Default for Reactor<K> {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(unix)]
mod sys {
	use super::{Interest, RawFd};
	use std::io;

	#[repr(transparent)]
	pub struct PollFd(libc::pollfd);

	impl PollFd {
		pub fn new(fd: RawFd, interest: Interest) -> Self {
			let mut events = 0;
			if interest.contains(Interest::READABLE) {
				events |= libc::POLLIN;
			}
			if interest.contains(Interest::WRITABLE) {
				events |= libc::POLLOUT;
			}
			PollFd(libc::pollfd {
				fd,
				events,
				revents: 0,
			})
		}

		pub fn revents(&self) -> Interest {
			let mut out = Interest::NONE;
			let bits = self.0.revents;
			if bits & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0 {
				out = out | Interest::READABLE;
			}
			if bits & libc::POLLOUT != 0 {
				out = out | Interest::WRITABLE;
			}
			out
		}
	}

	pub fn poll(pfds: &mut [PollFd], timeout_ms: i32) -> io::Result<usize> {
		let ptr = pfds.as_mut_ptr() as *mut libc::pollfd;
		let n = unsafe { libc::poll(ptr, pfds.len() as libc::nfds_t, timeout_ms) };
		if n < 0 {
			Err(io::Error::last_os_error())
		} else {
			Ok(n as usize)
		}
	}
}

#[cfg(windows)]
mod sys {
	use super::{Interest, RawFd};
	use std::io;
	use windows_sys::Win32::Networking::WinSock::{WSAPoll, POLLIN, POLLOUT, WSAPOLLFD};

	#[repr(transparent)]
	pub struct PollFd(WSAPOLLFD);

	impl PollFd {
		pub fn new(fd: RawFd, interest: Interest) -> Self {
			let mut events: i16 = 0;
			if interest.contains(Interest::READABLE) {
				events |= POLLIN as i16;
			}
			if interest.contains(Interest::WRITABLE) {
				events |= POLLOUT as i16;
			}
			PollFd(WSAPOLLFD {
				fd: fd as usize,
				events,
				revents: 0,
			})
		}

		pub fn revents(&self) -> Interest {
			let mut out = Interest::NONE;
			let bits = self.0.revents;
			if bits & POLLIN as i16 != 0 {
				out = out | Interest::READABLE;
			}
			if bits & POLLOUT as i16 != 0 {
				out = out | Interest::WRITABLE;
			}
			out
		}
	}

	pub fn poll(pfds: &mut [PollFd], timeout_ms: i32) -> io::Result<usize> {
		let ptr = pfds.as_mut_ptr() as *mut WSAPOLLFD;
		let n = unsafe { WSAPoll(ptr, pfds.len() as u32, timeout_ms) };
		if n < 0 {
			Err(io::Error::last_os_error())
		} else {
			Ok(n as usize)
		}
	}
}

#[cfg(all(test, unix))]
mod tests {
	use super::*;
	use std::os::unix::io::AsRawFd;
	use std::os::unix::net::UnixStream;

	#[test]
	fn readable_socket_reports_ready() {
		let (a, b) = UnixStream::pair().unwrap();
		b.set_nonblocking(true).unwrap();
		a.set_nonblocking(true).unwrap();

		let mut reactor: Reactor<u32> = Reactor::new();
		reactor.register(b.as_raw_fd(), Interest::READABLE, 1);

		use std::io::Write;
		let mut a = a;
		a.write_all(b"x").unwrap();

		let ready = reactor.poll(None).unwrap();
		assert_eq!(ready.len(), 1);
		assert_eq!(ready[0].0, 1);
		assert!(ready[0].1.contains(Interest::READABLE));
	}

	#[test]
	fn empty_reactor_returns_immediately_on_deadline() {
		let reactor: Reactor<u32> = Reactor::new();
		let ready = reactor.poll(Some(Instant::now())).unwrap();
		assert!(ready.is_empty());
	}

	#[test]
	fn deregister_stops_reporting() {
		let (a, b) = UnixStream::pair().unwrap();
		a.set_nonblocking(true).unwrap();
		b.set_nonblocking(true).unwrap();

		let mut reactor: Reactor<u32> = Reactor::new();
		reactor.register(b.as_raw_fd(), Interest::READABLE, 1);
		reactor.deregister(b.as_raw_fd());
		assert!(!reactor.is_registered(b.as_raw_fd()));

		use std::io::Write;
		let mut a = a;
		a.write_all(b"x").unwrap();

		let ready = reactor.poll(Some(Instant::now())).unwrap();
		assert!(ready.is_empty());
	}
}
