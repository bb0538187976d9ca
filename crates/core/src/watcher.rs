//! Background observer for the profile-migration helper.
//!
//! Loading a profile saved by an older engine spawns a helper process that
//! migrates it step by step through intermediate versions. The watcher polls
//! for that helper and logs each version transition. It stops when the
//! helper disappears or when its token is cancelled by the next non-profile
//! request.

use std::fmt;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::adapter::extract_version;

/// Default pattern identifying the migration helper in the process list.
pub const DEFAULT_HELPER_PATTERN: &str = r"(?i)migrat";

static DEFAULT_HELPER: LazyLock<Regex> = LazyLock::new(|| Regex::new(DEFAULT_HELPER_PATTERN).unwrap());

/// Reports whether the migration helper is running.
#[async_trait]
pub trait HelperProbe: Send + Sync + fmt::Debug {
	/// Version label the helper is currently working on, or `None` when no
	/// helper is running.
	async fn active_helper(&self) -> Option<String>;
}

/// Scans the OS process list for a command line matching a pattern.
#[derive(Debug, Clone)]
pub struct ProcessListProbe {
	pattern: Regex,
}

impl Default for ProcessListProbe {
	fn default() -> Self {
		Self { pattern: DEFAULT_HELPER.clone() }
	}
}

impl ProcessListProbe {
	pub fn new(pattern: Regex) -> Self {
		Self { pattern }
	}

	/// Finds the helper in a process listing, one process per line.
	pub fn find_in(&self, listing: &str) -> Option<String> {
		let line = listing.lines().find(|line| self.pattern.is_match(line))?;
		Some(
			extract_version(line)
				.map(|version| version.to_string())
				.unwrap_or_else(|| "unknown version".to_string()),
		)
	}
}

#[async_trait]
impl HelperProbe for ProcessListProbe {
	async fn active_helper(&self) -> Option<String> {
		let output = if cfg!(windows) {
			Command::new("tasklist").args(["/v", "/fo", "csv", "/nh"]).output().await
		} else {
			Command::new("ps").args(["-eo", "args="]).output().await
		};
		match output {
			Ok(output) if output.status.success() => {
				self.find_in(&String::from_utf8_lossy(&output.stdout))
			}
			Ok(_) | Err(_) => None,
		}
	}
}

/// Handle to a running watcher task.
#[derive(Debug)]
pub struct MigrationWatcher {
	token: CancellationToken,
	handle: JoinHandle<()>,
}

impl MigrationWatcher {
	pub fn spawn(probe: Arc<dyn HelperProbe>, interval: Duration) -> Self {
		let token = CancellationToken::new();
		let handle = tokio::spawn(watch(probe, interval, token.clone()));
		Self { token, handle }
	}

	/// Signals the task to stop at its next cycle.
	pub fn finish(&self) {
		self.token.cancel();
	}

	pub fn is_finished(&self) -> bool {
		self.handle.is_finished()
	}
}

impl Drop for MigrationWatcher {
	fn drop(&mut self) {
		self.token.cancel();
	}
}

async fn watch(probe: Arc<dyn HelperProbe>, interval: Duration, token: CancellationToken) {
	let mut current: Option<String> = None;
	loop {
		tokio::select! {
			_ = token.cancelled() => break,
			_ = tokio::time::sleep(interval) => {}
		}

		match probe.active_helper().await {
			Some(label) => {
				if current.as_deref() != Some(label.as_str()) {
					info!(target: "ep.watcher", "Migrating profile to {label}");
					current = Some(label);
				}
			}
			None if current.is_some() => {
				info!(target: "ep.watcher", "Profile migration finished");
				break;
			}
			None => {}
		}
	}
	debug!(target: "ep.watcher", "migration watcher stopped");
}

#[cfg(test)]
mod tests {
	use std::collections::VecDeque;
	use std::sync::Mutex;
	use std::sync::atomic::{AtomicUsize, Ordering};

	use super::*;

	#[derive(Debug)]
	struct Scripted {
		answers: Mutex<VecDeque<Option<String>>>,
		calls: AtomicUsize,
	}

	impl Scripted {
		fn new(answers: &[Option<&str>]) -> Arc<Self> {
			Arc::new(Self {
				answers: Mutex::new(answers.iter().map(|a| a.map(str::to_string)).collect()),
				calls: AtomicUsize::new(0),
			})
		}
	}

	#[async_trait]
	impl HelperProbe for Scripted {
		async fn active_helper(&self) -> Option<String> {
			self.calls.fetch_add(1, Ordering::SeqCst);
			self.answers.lock().unwrap().pop_front().flatten()
		}
	}

	#[tokio::test]
	async fn stops_when_helper_disappears() {
		let probe = Scripted::new(&[None, Some("24.3p1"), Some("25.1p0"), None]);
		let watcher = MigrationWatcher::spawn(probe.clone(), Duration::from_millis(5));

		tokio::time::timeout(Duration::from_secs(5), async {
			while !watcher.is_finished() {
				tokio::time::sleep(Duration::from_millis(5)).await;
			}
		})
		.await
		.unwrap();
		assert_eq!(probe.calls.load(Ordering::SeqCst), 4);
	}

	#[tokio::test]
	async fn stops_when_signalled() {
		let probe = Scripted::new(&[]);
		let watcher = MigrationWatcher::spawn(probe, Duration::from_millis(5));
		watcher.finish();

		tokio::time::timeout(Duration::from_secs(5), async {
			while !watcher.is_finished() {
				tokio::time::sleep(Duration::from_millis(5)).await;
			}
		})
		.await
		.unwrap();
	}

	#[test]
	fn finds_helper_version() {
		let probe = ProcessListProbe::default();
		let listing = "/usr/bin/bash\n/opt/ep/ep -application ep.profile.migration 24.3p1\n";
		assert_eq!(probe.find_in(listing).as_deref(), Some("24.3p1"));
		assert_eq!(probe.find_in("/usr/bin/bash\n"), None);
	}
}
