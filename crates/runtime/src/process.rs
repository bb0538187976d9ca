//! Handles to processes started on behalf of a session.

use std::fmt;
use std::io::Read;
use std::process::Child;

use portable_pty::{Child as PtyChild, ChildKiller, MasterPty};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// A running OS process that the session is responsible for.
pub trait EngineProcess: Send + fmt::Debug {
	/// OS process id, if still known.
	fn id(&self) -> Option<u32>;

	/// Returns `true` while the process has not exited.
	fn is_alive(&mut self) -> bool;

	/// Forcefully stops the process.
	fn terminate(&mut self) -> Result<()>;
}

/// The engine process plus any companions started alongside it.
#[derive(Debug)]
pub struct ProcessHandle {
	engine: Box<dyn EngineProcess>,
	companions: Vec<Box<dyn EngineProcess>>,
}

impl ProcessHandle {
	pub fn new(engine: Box<dyn EngineProcess>) -> Self {
		Self { engine, companions: Vec::new() }
	}

	pub fn with_companion(mut self, companion: Box<dyn EngineProcess>) -> Self {
		self.companions.push(companion);
		self
	}

	pub fn id(&self) -> Option<u32> {
		self.engine.id()
	}

	pub fn is_alive(&mut self) -> bool {
		self.engine.is_alive()
	}

	/// Stops the engine, then any companions. The first engine error is returned.
	pub fn terminate(&mut self) -> Result<()> {
		let result = if self.engine.is_alive() { self.engine.terminate() } else { Ok(()) };

		for companion in &mut self.companions {
			if companion.is_alive() {
				if let Err(e) = companion.terminate() {
					warn!(target: "ep.runtime", error = %e, "failed to stop companion process");
				}
			}
		}

		result
	}
}

/// A process spawned through `std::process::Command`.
#[derive(Debug)]
pub struct ChildProcess {
	child: Child,
}

impl ChildProcess {
	pub fn new(child: Child) -> Self {
		Self { child }
	}
}

impl EngineProcess for ChildProcess {
	fn id(&self) -> Option<u32> {
		Some(self.child.id())
	}

	fn is_alive(&mut self) -> bool {
		matches!(self.child.try_wait(), Ok(None))
	}

	fn terminate(&mut self) -> Result<()> {
		debug!(target: "ep.runtime", pid = self.child.id(), "killing process");
		self.child
			.kill()
			.map_err(|e| Error::LaunchFailed(format!("Failed to kill process: {e}")))?;
		let _ = self.child.wait();
		Ok(())
	}
}

/// A process attached to a pseudo-terminal.
///
/// Output written to the terminal is drained on a background thread so the
/// child never blocks on a full buffer.
pub struct PtyProcess {
	child: Box<dyn PtyChild + Send + Sync>,
	_master: Box<dyn MasterPty + Send>,
}

impl PtyProcess {
	pub fn new(child: Box<dyn PtyChild + Send + Sync>, master: Box<dyn MasterPty + Send>) -> Self {
		if let Ok(mut reader) = master.try_clone_reader() {
			std::thread::spawn(move || {
				let mut buf = [0u8; 4096];
				while let Ok(n) = reader.read(&mut buf) {
					if n == 0 {
						break;
					}
				}
			});
		}
		Self { child, _master: master }
	}
}

impl fmt::Debug for PtyProcess {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("PtyProcess").field("pid", &self.child.process_id()).finish()
	}
}

impl EngineProcess for PtyProcess {
	fn id(&self) -> Option<u32> {
		self.child.process_id()
	}

	fn is_alive(&mut self) -> bool {
		matches!(self.child.try_wait(), Ok(None))
	}

	fn terminate(&mut self) -> Result<()> {
		self.child.kill()?;
		Ok(())
	}
}
