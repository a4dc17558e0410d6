//! Shared plumbing for the netstore server and client: a single-threaded
//! `poll()` reactor, the stderr logger, SIGINT handling and timeout math.

pub mod logger;
pub mod reactor;
pub mod signal;
pub mod time;

pub use reactor::{Interest, RawFd, Reactor};
