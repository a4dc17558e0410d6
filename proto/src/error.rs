use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use netstore_wire::WireError;
use thiserror::Error;

/// The six error kinds from the control-plane error design: `MalformedPacket`
/// and `UnexpectedReply` are recovered locally (logged, the caller carries
/// on); `LocalIO`/`SocketIO` terminate the transfer or operation that hit
/// them; `Timeout` is recovered identically to whichever of those two fits
/// the context it fired in; `Config` is fatal at startup.
#[derive(Debug, Error)]
pub enum Error {
	#[error("malformed packet from {from} ({source})")]
	MalformedPacket {
		from: SocketAddr,
		#[source]
		source: WireError,
	},

	#[error("unexpected reply from {from} (tag {tag}, seq {seq})")]
	UnexpectedReply { from: SocketAddr, seq: u64, tag: String },

	#[error("{path}: {source}")]
	LocalIO {
		path: PathBuf,
		#[source]
		source: io::Error,
	},

	#[error("{context}: {source}")]
	SocketIO {
		context: String,
		#[source]
		source: io::Error,
	},

	#[error("{context} timed out after {secs}s")]
	Timeout { context: String, secs: u64 },

	#[error("invalid configuration: {0}")]
	Config(String),
}

impl Error {
	pub fn malformed_packet(from: SocketAddr, source: WireError) -> Self {
		Error::MalformedPacket { from, source }
	}

	pub fn unexpected_reply(from: SocketAddr, seq: u64, tag: impl Into<String>) -> Self {
		Error::UnexpectedReply { from, seq, tag: tag.into() }
	}

	pub fn local_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
		Error::LocalIO { path: path.into(), source }
	}

	pub fn socket_io(context: impl Into<String>, source: io::Error) -> Self {
		Error::SocketIO { context: context.into(), source }
	}

	pub fn timeout(context: impl Into<String>, secs: u64) -> Self {
		Error::Timeout { context: context.into(), secs }
	}

	pub fn config(message: impl Into<String>) -> Self {
		Error::Config(message.into())
	}
}

pub type Result<T = (), E = Error> = std::result::Result<T, E>;
