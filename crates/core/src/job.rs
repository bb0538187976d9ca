//! Bookkeeping for long-running engine jobs.
//!
//! A `202 Accepted` reply carrying a `jobID` means the engine is still
//! working. The session polls the progress endpoint until the status is no
//! longer 202. A caller timeout only requests cancellation: polling carries
//! on and the caller receives whatever the job finally settles on.

use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct LongRunningJob {
	id: String,
	started: Instant,
	cancelled: bool,
	polls: usize,
}

impl LongRunningJob {
	pub fn new(id: impl Into<String>) -> Self {
		Self { id: id.into(), started: Instant::now(), cancelled: false, polls: 0 }
	}

	pub fn id(&self) -> &str {
		&self.id
	}

	pub fn elapsed(&self) -> Duration {
		self.started.elapsed()
	}

	pub fn is_cancelled(&self) -> bool {
		self.cancelled
	}

	pub fn polls(&self) -> usize {
		self.polls
	}

	pub fn record_poll(&mut self) {
		self.polls += 1;
	}

	/// Returns `true` exactly once, the first time the job has outlived `timeout`.
	pub fn take_cancellation(&mut self, timeout: Option<Duration>) -> bool {
		match timeout {
			Some(timeout) if !self.cancelled && self.elapsed() >= timeout => {
				self.cancelled = true;
				true
			}
			_ => false,
		}
	}
}
