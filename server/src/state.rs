use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexSet;
use log::info;
use netstore_proto::Error;

/// One per server process: the hosted-files set and free-space counter,
/// mutated only from dispatch handlers (§3, "Ownership").
///
/// `hosted` is an `IndexSet` rather than a `HashSet` because §9 asks that
/// MY_LIST chunking preserve directory-enumeration order.
pub struct NodeState {
	pub shrd_fldr: PathBuf,
	pub free_space: i64,
	pub hosted: IndexSet<String>,
}

impl NodeState {
	/// Enumerates `shrd_fldr`, subtracting each file's size from
	/// `max_space`. Fails to start if the remainder is negative, per §3's
	/// lifecycle note.
	pub fn init(shrd_fldr: PathBuf, max_space: i64) -> netstore_proto::Result<Self> {
		let mut hosted = IndexSet::new();
		let mut used: i64 = 0;

		let entries = fs::read_dir(&shrd_fldr).map_err(|e| Error::local_io(shrd_fldr.clone(), e))?;

		for entry in entries {
			let entry = entry.map_err(|e| Error::local_io(shrd_fldr.clone(), e))?;
			let path = entry.path();

			if !path.is_file() {
				continue;
			}

			let meta = entry.metadata().map_err(|e| Error::local_io(path.clone(), e))?;
			let name = entry.file_name().to_string_lossy().into_owned();

			used += meta.len() as i64;
			hosted.insert(name);
		}

		let free_space = max_space - used;

		if free_space < 0 {
			return Err(Error::config(format!(
				"shared folder {} already holds {used} bytes, exceeding max-space {max_space}",
				shrd_fldr.display()
			)));
		}

		info!("hosting {} file(s), {free_space} byte(s) free under {}", hosted.len(), shrd_fldr.display());

		Ok(NodeState { shrd_fldr, free_space, hosted })
	}

	pub fn path_for(&self, filename: &str) -> PathBuf {
		self.shrd_fldr.join(filename)
	}

	/// A filename is only ever relative and contains no path separator,
	/// per §3's "relative, no `/`" invariant on the hosted set.
	pub fn is_valid_filename(filename: &str) -> bool {
		!filename.is_empty() && !filename.contains('/') && !filename.contains('\\')
	}

	/// §4.3 DEL: remove the file and, on success, credit its size back to
	/// free space. A missing filename is a silent no-op.
	pub fn delete(&mut self, filename: &str) {
		if !self.hosted.contains(filename) {
			return;
		}

		let path = self.path_for(filename);
		let size = fs::metadata(&path).map(|m| m.len() as i64).unwrap_or(0);

		if fs::remove_file(&path).is_ok() {
			self.free_space += size;
			self.hosted.shift_remove(filename);
		}
	}

	/// §4.3 ADD admission check; does not mutate state.
	pub fn can_add(&self, filename: &str, size: i64) -> bool {
		Self::is_valid_filename(filename) && !self.hosted.contains(filename) && size <= self.free_space
	}

	/// Reserves space at ADD-accept time, per §3: "reservation at
	/// ADD-accept time, not at TCP-close time". Not rolled back if the
	/// transfer never completes (§4.3, §9).
	pub fn reserve(&mut self, filename: &str, size: i64) {
		self.free_space -= size;
		self.hosted.insert(filename.to_owned());
	}

	pub fn matching<'a>(&'a self, substr: &'a str) -> impl Iterator<Item = &'a str> {
		self.hosted.iter().map(|s| s.as_str()).filter(move |name| name.contains(substr))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	fn write_file(dir: &Path, name: &str, contents: &[u8]) {
		let mut f = fs::File::create(dir.join(name)).unwrap();
		f.write_all(contents).unwrap();
	}

	#[test]
	fn init_subtracts_hosted_file_sizes() {
		let dir = tempfile::tempdir().unwrap();
		write_file(dir.path(), "a.txt", &[0u8; 200]);

		let state = NodeState::init(dir.path().to_path_buf(), 1000).unwrap();
		assert_eq!(state.free_space, 800);
		assert!(state.hosted.contains("a.txt"));
	}

	#[test]
	fn init_fails_when_folder_exceeds_max_space() {
		let dir = tempfile::tempdir().unwrap();
		write_file(dir.path(), "a.txt", &[0u8; 200]);

		assert!(NodeState::init(dir.path().to_path_buf(), 100).is_err());
	}

	#[test]
	fn delete_credits_space_and_removes_entry() {
		let dir = tempfile::tempdir().unwrap();
		write_file(dir.path(), "a.txt", &[0u8; 200]);

		let mut state = NodeState::init(dir.path().to_path_buf(), 1000).unwrap();
		state.delete("a.txt");

		assert_eq!(state.free_space, 1000);
		assert!(!state.hosted.contains("a.txt"));
	}

	#[test]
	fn delete_of_missing_file_is_a_no_op() {
		let dir = tempfile::tempdir().unwrap();
		let mut state = NodeState::init(dir.path().to_path_buf(), 1000).unwrap();
		state.delete("ghost");
		assert_eq!(state.free_space, 1000);
	}

	#[test]
	fn can_add_rejects_slash_and_duplicate_and_oversize() {
		let dir = tempfile::tempdir().unwrap();
		write_file(dir.path(), "a.txt", &[0u8; 100]);
		let state = NodeState::init(dir.path().to_path_buf(), 1000).unwrap();

		assert!(!state.can_add("sub/file", 10));
		assert!(!state.can_add("a.txt", 10));
		assert!(!state.can_add("big", 10_000));
		assert!(state.can_add("ok.txt", 10));
	}

	#[test]
	fn reserve_is_not_rolled_back_by_caller() {
		let dir = tempfile::tempdir().unwrap();
		let mut state = NodeState::init(dir.path().to_path_buf(), 1000).unwrap();
		state.reserve("partial.bin", 400);

		assert_eq!(state.free_space, 600);
		assert!(state.hosted.contains("partial.bin"));
	}
}
