//! Engine messages and log-file evidence used to explain failures.
//!
//! When a request fails, the session gathers two kinds of evidence: the
//! engine's message log since the last profile operation, and ERROR entries
//! from the engine's log file written since the session started. This module
//! holds the parts of that work that need no engine: log parsing, message
//! ordering, and the reentrancy guard used while evidence is collected.

use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use chrono::NaiveDateTime;
use ep_protocol::{Message, Severity};
use regex::Regex;
use tracing::{debug, error, info, warn};

/// Timestamp format of engine message dates (`01-Jan-2024 10:00:00`).
pub const MESSAGE_DATE_FORMAT: &str = "%d-%b-%Y %H:%M:%S";

/// Timestamp format at the start of engine log lines.
pub const LOG_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Error responses that are expected and never escalated.
pub const BENIGN_RESPONSES: &[&str] =
	&["The compiler is already defined", "No message found for the given query."];

/// Log lines that contain ERROR but carry no useful information.
pub const EXCLUDED_LOG_MESSAGES: &[&str] =
	&["Registry key could not be read: The system cannot find the file specified"];

static LOG_TIMESTAMP: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}").unwrap());

/// One ERROR entry from the engine log, continuation lines included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
	pub timestamp: NaiveDateTime,
	pub text: String,
}

impl fmt::Display for LogEntry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.text)
	}
}

/// Returns `true` if a failed response body is one of the expected ones.
pub fn is_benign_response(body: &str) -> bool {
	BENIGN_RESPONSES.iter().any(|benign| body.contains(benign))
}

/// Extracts ERROR entries at or after `since` from log file content.
///
/// A line starting with a timestamp opens a new entry; other lines continue
/// the current one. Stack-frame lines (`at ...`) are dropped.
pub fn parse_error_entries(content: &str, since: Option<NaiveDateTime>) -> Vec<LogEntry> {
	let mut entries = Vec::new();
	let mut current: Option<LogEntry> = None;

	for line in content.lines() {
		let timestamp = LOG_TIMESTAMP
			.find(line)
			.and_then(|m| NaiveDateTime::parse_from_str(m.as_str(), LOG_TIMESTAMP_FORMAT).ok());

		match timestamp {
			Some(timestamp) => {
				entries.extend(current.take());
				let recent = since.is_none_or(|since| timestamp >= since);
				let is_error = line.to_uppercase().contains("ERROR");
				let excluded = EXCLUDED_LOG_MESSAGES.iter().any(|m| line.contains(m));
				if recent && is_error && !excluded {
					current = Some(LogEntry { timestamp, text: line.to_string() });
				}
			}
			None => {
				if let Some(entry) = current.as_mut() {
					entry.text.push('\n');
					entry.text.push_str(line);
				}
			}
		}
	}
	entries.extend(current);

	entries.into_iter().map(clean_entry).collect()
}

fn clean_entry(entry: LogEntry) -> LogEntry {
	let text = entry
		.text
		.lines()
		.filter(|line| !line.trim_start().starts_with("at "))
		.collect::<Vec<_>>()
		.join("\n")
		.trim()
		.to_string();
	LogEntry { text, ..entry }
}

/// Reads `path` and returns its ERROR entries at or after `since`.
///
/// A missing or unreadable log yields no entries.
pub fn read_error_entries(path: &Path, since: Option<NaiveDateTime>) -> Vec<LogEntry> {
	match fs::read(path) {
		Ok(bytes) => parse_error_entries(&String::from_utf8_lossy(&bytes), since),
		Err(e) => {
			debug!(target: "ep.diagnostics", path = %path.display(), error = %e, "engine log not readable");
			Vec::new()
		}
	}
}

/// Parses an engine message date.
pub fn parse_message_date(date: &str) -> Option<NaiveDateTime> {
	NaiveDateTime::parse_from_str(date.trim(), MESSAGE_DATE_FORMAT).ok()
}

/// Sorts messages ascending by date.
///
/// If any date does not parse, the raw date strings are compared instead.
pub fn sort_messages(messages: &mut [Message]) {
	if messages.iter().all(|m| parse_message_date(&m.date).is_some()) {
		messages.sort_by_cached_key(|m| parse_message_date(&m.date));
	} else {
		messages.sort_by(|a, b| a.date.cmp(&b.date));
	}
}

/// Guards evidence collection against reentrancy.
///
/// Collecting messages issues requests of its own; if one of those fails, the
/// nested failure must be reported as-is instead of collecting again.
#[derive(Debug, Default)]
pub struct ErrorCorrelator {
	depth: usize,
}

impl ErrorCorrelator {
	/// Enters a collection scope. Returns `false` if one is already active.
	pub fn enter(&mut self) -> bool {
		self.depth += 1;
		self.depth == 1
	}

	pub fn exit(&mut self) {
		self.depth = self.depth.saturating_sub(1);
	}

	pub fn is_active(&self) -> bool {
		self.depth > 0
	}
}

/// Logs a message at the level matching its severity.
pub fn emit_message(message: &Message) {
	match message.severity {
		Severity::Info => info!(target: "ep.diagnostics", "{message}"),
		Severity::Warning => warn!(target: "ep.diagnostics", "{message}"),
		Severity::Error | Severity::Critical => error!(target: "ep.diagnostics", "{message}"),
	}
}

/// Hint for failures whose cause is clear from the message alone.
///
/// When this returns `Some`, the usual message and log collection is skipped.
pub fn known_failure_hint(message: &str, path: &str) -> Option<String> {
	let lower = message.to_lowercase();
	if lower.contains("resource not found") {
		Some(format!(
			"The engine could not find what '{path}' refers to. Check the spelling of the path and \
			 that any UID in it belongs to the currently loaded profile."
		))
	} else if lower.contains("malformed request") {
		Some(format!(
			"The engine could not read the request sent to '{path}'. Check that the body is valid \
			 JSON and uses the field names documented for this engine version."
		))
	} else {
		None
	}
}
