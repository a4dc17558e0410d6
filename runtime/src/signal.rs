use std::sync::atomic::{AtomicBool, Ordering};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Install the SIGINT handler. Unix's default `ctrlc` behaviour interrupts
/// any in-flight blocking syscall (our `poll()` included) with `EINTR`, so
/// the reactor's poll wrapper treats `EINTR` as "nothing ready, go check
/// `interrupted()`" rather than as an error — this is the signalfd-
/// equivalent path through the readiness-waiter that §5 asks for.
pub fn install() -> Result<(), ctrlc::Error> {
	ctrlc::set_handler(|| INTERRUPTED.store(true, Ordering::SeqCst))
}

/// Whether SIGINT has been delivered since `install()`.
pub fn interrupted() -> bool {
	INTERRUPTED.load(Ordering::SeqCst)
}

/// Ignore SIGPIPE so a peer's half-close surfaces as an `EPIPE` write error
/// instead of killing the process (§7).
#[cfg(unix)]
pub fn ignore_sigpipe() {
	unsafe {
		libc::signal(libc::SIGPIPE, libc::SIG_IGN);
	}
}

#[cfg(not(unix))]
pub fn ignore_sigpipe() {}

#[cfg(test)]
pub fn reset_for_test() {
	INTERRUPTED.store(false, Ordering::SeqCst);
}
