//! Error types for EmbeddedPlatform sessions.

use std::fmt;
use std::path::PathBuf;

use ep_protocol::Message;
use thiserror::Error;

use crate::diagnostics::LogEntry;

/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Evidence gathered from the engine after a request failed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
	/// Engine messages recorded since the last profile operation.
	pub messages: Vec<Message>,
	/// ERROR entries from the engine log written since the session started.
	pub log_entries: Vec<LogEntry>,
}

impl Diagnostics {
	pub fn is_empty(&self) -> bool {
		self.messages.is_empty() && self.log_entries.is_empty()
	}
}

impl fmt::Display for Diagnostics {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for message in &self.messages {
			writeln!(f, "{message}")?;
		}
		for entry in &self.log_entries {
			writeln!(f, "{entry}")?;
		}
		Ok(())
	}
}

/// Errors that can occur while opening or driving a session.
#[derive(Debug, Error)]
pub enum Error {
	/// Invalid or incomplete configuration, including a missing profile file.
	#[error("Configuration error: {0}")]
	Config(String),

	/// The engine did not come up.
	#[error("{reason}{}", log_file.as_ref().map(|p| format!(" (log file: {})", p.display())).unwrap_or_default())]
	Startup { reason: String, log_file: Option<PathBuf> },

	/// A request failed, with whatever context the engine could provide.
	#[error("{method} {path} failed: {message}{}", hint.as_ref().map(|h| format!("\n{h}")).unwrap_or_default())]
	Request {
		method: String,
		path: String,
		status: Option<u16>,
		message: String,
		hint: Option<String>,
		diagnostics: Diagnostics,
	},

	/// The session has been closed or its engine process is gone.
	#[error("Session is closed")]
	Closed,

	/// HTTP client construction or transport error outside a request.
	#[error("HTTP error: {0}")]
	Http(#[from] reqwest::Error),

	/// Launching or locating the engine failed.
	#[error(transparent)]
	Runtime(#[from] ep_runtime::Error),

	/// I/O error.
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// JSON serialization/deserialization error.
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl Error {
	/// Returns `true` for configuration problems that no retry will fix.
	pub fn is_config(&self) -> bool {
		match self {
			Self::Config(_) => true,
			Self::Runtime(e) => e.is_configuration(),
			_ => false,
		}
	}

	pub fn is_startup(&self) -> bool {
		matches!(self, Self::Startup { .. })
	}

	/// HTTP status of a failed request, if the engine answered at all.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Request { status, .. } => *status,
			_ => None,
		}
	}

	pub fn hint(&self) -> Option<&str> {
		match self {
			Self::Request { hint, .. } => hint.as_deref(),
			_ => None,
		}
	}

	pub fn diagnostics(&self) -> Option<&Diagnostics> {
		match self {
			Self::Request { diagnostics, .. } => Some(diagnostics),
			_ => None,
		}
	}
}
