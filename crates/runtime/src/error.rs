//! Error types for launching and locating the engine.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while preparing or starting an engine process.
#[derive(Debug, Error)]
pub enum Error {
	/// The engine executable does not exist at the resolved location.
	#[error("EmbeddedPlatform executable not found at '{}'", path.display())]
	ExecutableNotFound { path: PathBuf },

	/// The REST server add-on is not registered for this engine version.
	#[error(
		"The REST API add-on is not installed for EmbeddedPlatform {version}. Re-run the installer and enable the REST server add-on."
	)]
	AddonMissing { version: String },

	/// Neither version nor install location could be determined.
	#[error(
		"Cannot start EmbeddedPlatform: pass a version and install location, or set installationRoot and epVersion in the configuration"
	)]
	MissingInstallation,

	/// A required environment variable of the headless image is unset.
	#[error("Required environment variable '{0}' is not set")]
	MissingEnvironment(&'static str),

	/// Every port from the starting point to 65535 is taken.
	#[error("No open port found in range {start}..=65535")]
	NoOpenPort { start: u16 },

	/// Spawning the process failed.
	#[error("Failed to launch EmbeddedPlatform: {0}")]
	LaunchFailed(String),

	/// I/O error.
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),
}

impl Error {
	/// Returns `true` for errors caused by the local installation or
	/// configuration rather than by the running process.
	pub fn is_configuration(&self) -> bool {
		matches!(
			self,
			Self::ExecutableNotFound { .. }
				| Self::AddonMissing { .. }
				| Self::MissingInstallation
				| Self::MissingEnvironment(_)
		)
	}
}
