//! Client-side pending operations (§3 "Pending client operation", §4.4,
//! §4.6) and the most-recent-search index `fetch` validates against.

use std::fs::File;
use std::net::IpAddr;
use std::path::PathBuf;

use netstore_proto::SeqRegistry;

/// A file queued by `upload` until the next discover window closes.
pub struct QueuedUpload {
	pub path: PathBuf,
	pub file: File,
	pub size: u64,
}

/// A responder ranked by free space, as gathered by an upload-discover
/// window; popped from the back (largest first) by the placement FSM.
#[derive(Clone, Copy)]
pub struct Candidate {
	pub ip: IpAddr,
	pub free_space: i64,
}

pub enum PendingOp {
	/// Plain `discover`: each GOOD_DAY is printed as it arrives: only the
	/// window's existence (for the timeout clock) is tracked here.
	Discover,

	/// The background discover `upload` triggers to rank servers; silent
	/// until the window closes, at which point placement FSMs start for
	/// every file in the queue.
	UploadDiscover { responses: Vec<Candidate> },

	/// `search [substr]`: filenames are printed as MY_LIST replies arrive;
	/// `found` accumulates the (ip, filename) pairs that become the new
	/// most-recent-search set once the window closes.
	Search { found: Vec<(IpAddr, String)> },

	/// `fetch <name>`: waiting for a CONNECT_ME reply naming a TCP port.
	Fetch { filename: String, dest_path: PathBuf, file: File },

	/// One placement attempt within the upload FSM (§4.6): `remaining` is
	/// the ascending-sorted candidate tail not yet tried, *not* including
	/// the one this attempt is currently targeting.
	UploadAttempt { path: PathBuf, file: File, size: u64, target_ip: IpAddr, remaining: Vec<Candidate> },
}

pub struct ClientState {
	pub seqs: SeqRegistry<PendingOp>,
	pub search_set: Vec<(IpAddr, String)>,
	pub upload_queue: Vec<QueuedUpload>,
	pub upload_discover_seq: Option<u64>,
}

impl ClientState {
	pub fn new() -> Self {
		ClientState { seqs: SeqRegistry::new(), search_set: Vec::new(), upload_queue: Vec::new(), upload_discover_seq: None }
	}
}

impl Default for ClientState {
	fn default() -> Self {
		Self::new()
	}
}
