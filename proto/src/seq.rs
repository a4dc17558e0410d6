//! Correlation of asynchronous UDP replies back to the pending operation
//! that triggered them.
//!
//! Mints opaque 64-bit sequence ids from the OS random source (so stale
//! replies from a previous invocation collide with a fresh id only
//! astronomically rarely, per the source's `std::mt19937_64` note) and
//! keeps a single map from seq to both the pending operation's payload and
//! its start time, which doubles as the per-operation timeout clock.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// A pending operation: when it started, plus whatever the caller needs to
/// remember about it (candidate server lists, file handles, collected
/// replies, ...).
pub struct Pending<T> {
	pub started: Instant,
	pub data: T,
}

/// seq → pending-operation index, keyed by ids minted here.
pub struct SeqRegistry<T> {
	entries: HashMap<u64, Pending<T>>,
}

impl<T> SeqRegistry<T> {
	pub fn new() -> Self {
		Self { entries: HashMap::new() }
	}

	/// Mint a fresh sequence id, register `data` under it and return the id.
	/// Used both for a brand-new operation and for re-issuing a retry (e.g.
	/// upload placement after NO_WAY), where a fresh id makes replies to the
	/// abandoned attempt naturally unmatched.
	pub fn insert(&mut self, data: T) -> u64 {
		loop {
			let seq = rand::random::<u64>();

			if let std::collections::hash_map::Entry::Vacant(entry) = self.entries.entry(seq) {
				entry.insert(Pending { started: Instant::now(), data });
				return seq;
			}
		}
	}

	pub fn get(&self, seq: u64) -> Option<&T> {
		self.entries.get(&seq).map(|p| &p.data)
	}

	pub fn get_mut(&mut self, seq: u64) -> Option<&mut T> {
		self.entries.get_mut(&seq).map(|p| &mut p.data)
	}

	pub fn started_at(&self, seq: u64) -> Option<Instant> {
		self.entries.get(&seq).map(|p| p.started)
	}

	pub fn remove(&mut self, seq: u64) -> Option<T> {
		self.entries.remove(&seq).map(|p| p.data)
	}

	pub fn contains(&self, seq: u64) -> bool {
		self.entries.contains_key(&seq)
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = (u64, &T)> {
		self.entries.iter().map(|(&seq, p)| (seq, &p.data))
	}

	/// Sequence ids whose operation started at least `timeout` ago.
	pub fn expired(&self, now: Instant, timeout: Duration) -> Vec<u64> {
		self.entries.iter().filter(|(_, p)| now.duration_since(p.started) >= timeout).map(|(&seq, _)| seq).collect()
	}

	/// Earliest remaining deadline across all pending entries, if any.
	pub fn next_deadline(&self, timeout: Duration) -> Option<Instant> {
		self.entries.values().map(|p| p.started + timeout).min()
	}
}

impl<T> Default for SeqRegistry<T> {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn minted_ids_are_unique_while_pending() {
		let mut reg = SeqRegistry::new();
		let mut seen = std::collections::HashSet::new();

		for i in 0..1000 {
			let seq = reg.insert(i);
			assert!(seen.insert(seq), "sequence id collided while still pending");
		}
	}

	#[test]
	fn remove_frees_the_slot() {
		let mut reg: SeqRegistry<&str> = SeqRegistry::new();
		let seq = reg.insert("fetch a.txt");

		assert_eq!(reg.get(seq), Some(&"fetch a.txt"));
		assert_eq!(reg.remove(seq), Some("fetch a.txt"));
		assert_eq!(reg.get(seq), None);
	}

	#[test]
	fn expired_reports_only_stale_entries() {
		let mut reg: SeqRegistry<()> = SeqRegistry::new();
		let seq = reg.insert(());

		assert!(reg.expired(Instant::now(), Duration::from_secs(5)).is_empty());
		assert_eq!(reg.expired(Instant::now() + Duration::from_secs(10), Duration::from_secs(5)), vec![seq]);
	}
}
