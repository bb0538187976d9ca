//! Request and response bodies exchanged with the engine.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Severity attached to an engine message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
	Info,
	Warning,
	Error,
	Critical,
}

impl Severity {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Info => "INFO",
			Self::Warning => "WARNING",
			Self::Error => "ERROR",
			Self::Critical => "CRITICAL",
		}
	}
}

impl fmt::Display for Severity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// An entry from the engine's message log.
///
/// `date` keeps the engine's own rendering (`01-Jan-2024 10:00:00`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
	pub date: String,
	pub severity: Severity,
	#[serde(rename = "message")]
	pub text: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub hint: Option<String>,
}

impl fmt::Display for Message {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "[{}][{}] {}", self.date, self.severity, self.text)?;
		if let Some(hint) = &self.hint {
			write!(f, " ({hint})")?;
		}
		Ok(())
	}
}

/// Response of `POST message-markers`: the point after which messages are collected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMarker {
	pub date: String,
}

/// One named engine setting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preference {
	#[serde(rename = "preferenceName")]
	pub name: String,
	#[serde(rename = "preferenceValue")]
	pub value: String,
}

impl Preference {
	pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
		Self { name: name.into(), value: value.into() }
	}

	/// Builds a preference from a loosely typed config value.
	///
	/// Strings are taken as-is; numbers and booleans use their JSON rendering.
	pub fn from_value(name: impl Into<String>, value: &Value) -> Self {
		let value = match value {
			Value::String(s) => s.clone(),
			Value::Null => String::new(),
			other => other.to_string(),
		};
		Self { name: name.into(), value }
	}
}

/// Body of a `202 Accepted` reply that started a long-running job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobAccepted {
	#[serde(rename = "jobID", deserialize_with = "string_or_number")]
	pub job_id: String,
}

/// Body of the cancellation request for a long-running job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressCancel {
	#[serde(rename = "progress-id")]
	pub progress_id: String,
}

/// The slice of `openapi.json` the client cares about.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenApiDocument {
	pub info: OpenApiInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenApiInfo {
	pub version: String,
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
	match Value::deserialize(deserializer)? {
		Value::String(s) => Ok(s),
		Value::Number(n) => Ok(n.to_string()),
		other => Err(serde::de::Error::custom(format!(
			"expected string or number, got {other}"
		))),
	}
}
