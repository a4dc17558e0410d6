use std::time::{Duration, Instant};

/// Converts an optional deadline into the millisecond timeout `poll()`
/// expects: `None` blocks indefinitely (`-1`), a deadline already in the
/// past collapses to `0` (return immediately), matching §4.4's "the
/// reactor never busy-waits; a due timer becomes a zero-length poll".
pub fn as_millis(deadline: Option<Instant>) -> i32 {
	match deadline {
		None => -1,
		Some(when) => {
			let now = Instant::now();
			if when <= now {
				0
			} else {
				let remaining = when - now;
				clamp_millis(remaining)
			}
		}
	}
}

fn clamp_millis(d: Duration) -> i32 {
	let millis = d.as_millis();
	if millis > i32::MAX as u128 {
		i32::MAX
	} else {
		millis as i32
	}
}

/// The earlier of two optional deadlines, `None` meaning "no deadline".
pub fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
	match (a, b) {
		(None, None) => None,
		(Some(x), None) => Some(x),
		(None, Some(y)) => Some(y),
		(Some(x), Some(y)) => Some(x.min(y)),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn no_deadline_blocks_forever() {
		assert_eq!(as_millis(None), -1);
	}

	#[test]
	fn past_deadline_is_immediate() {
		let past = Instant::now() - Duration::from_secs(1);
		assert_eq!(as_millis(Some(past)), 0);
	}

	#[test]
	fn future_deadline_is_positive() {
		let soon = Instant::now() + Duration::from_millis(250);
		let ms = as_millis(Some(soon));
		assert!(ms > 0 && ms <= 250);
	}

	#[test]
	fn earliest_picks_the_smaller() {
		let now = Instant::now();
		let a = now + Duration::from_secs(5);
		let b = now + Duration::from_secs(1);
		assert_eq!(earliest(Some(a), Some(b)), Some(b));
		assert_eq!(earliest(None, Some(b)), Some(b));
		assert_eq!(earliest(Some(a), None), Some(a));
		assert_eq!(earliest(None, None), None);
	}
}
