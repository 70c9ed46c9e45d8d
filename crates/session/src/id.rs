//! Session-scoped id allocation.

use std::sync::atomic::{AtomicU64, Ordering};

use wamp_protocol::{Id, MAX_ID};

/// Sequential id generator.
///
/// Yields `1, 2, 3, ...` and wraps back to `1` after [`MAX_ID`]. Ids are
/// unique among live requests as long as fewer than 2^53 requests are
/// outstanding at once.
#[derive(Debug)]
pub struct IdGenerator {
	last: AtomicU64,
}

impl Default for IdGenerator {
	fn default() -> Self {
		Self::new()
	}
}

impl IdGenerator {
	pub fn new() -> Self {
		Self::starting_after(0)
	}

	/// Creates a generator whose first id is `last + 1` (wrapping).
	pub fn starting_after(last: Id) -> Self {
		Self {
			last: AtomicU64::new(last),
		}
	}

	/// Allocates the next id. Never returns zero.
	pub fn next(&self) -> Id {
		let (Ok(previous) | Err(previous)) =
			self.last
				.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(successor(last)));

		successor(previous)
	}
}

fn successor(id: Id) -> Id {
	if id >= MAX_ID { 1 } else { id + 1 }
}
