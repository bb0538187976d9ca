//! Engine version labels such as `24.3p1`.
//!
//! Labels have the shape `<major>.<minor><letter><patch>`. They are compared
//! component-wise, so `9.0` sorts before `10.0` and `24.3p2` before `24.3p10`.
//! Labels that do not follow the shape (development builds such as `nightly`)
//! rank above every structured label and compare as strings among themselves.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Version assumed when the engine does not report one.
pub const DEFAULT_VERSION: &str = "24.2p0";

/// First version that accepts `progress?progress-id=<id>` instead of `progress/<id>`.
pub const PROGRESS_QUERY_SINCE: &str = "22.1p0";

/// First version that loads profiles through `openprofile?path=<file>`.
pub const OPEN_PROFILE_SINCE: &str = "25.3p0";

/// First version able to cancel a long-running job.
pub const JOB_CANCEL_SINCE: &str = "25.3p0";

/// First version started through `ep.application.headless.HeadlessApplication`.
pub const HEADLESS_APP_SINCE: &str = "23.3p0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Components {
	major: u32,
	minor: u32,
	letter: Option<char>,
	patch: Option<u32>,
}

/// A version label reported by (or configured for) the engine.
#[derive(Debug, Clone)]
pub struct EngineVersion {
	raw: String,
	components: Option<Components>,
}

impl EngineVersion {
	/// Parses a label. Never fails: unrecognized labels rank as newest.
	pub fn parse(label: &str) -> Self {
		let raw = label.trim().to_string();
		let components = parse_components(&raw);
		Self { raw, components }
	}

	pub fn as_str(&self) -> &str {
		&self.raw
	}

	/// Returns `true` if the label could be split into numeric components.
	pub fn is_structured(&self) -> bool {
		self.components.is_some()
	}

	/// Returns `true` if this version is the same as or newer than `threshold`.
	pub fn at_least(&self, threshold: &str) -> bool {
		*self >= EngineVersion::parse(threshold)
	}
}

impl Default for EngineVersion {
	fn default() -> Self {
		Self::parse(DEFAULT_VERSION)
	}
}

fn parse_components(label: &str) -> Option<Components> {
	let label = label.strip_prefix("ep").unwrap_or(label);
	let (major, rest) = label.split_once('.')?;
	let major = major.parse().ok()?;

	let digits_end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
	let minor = rest[..digits_end].parse().ok()?;
	let rest = &rest[digits_end..];

	let mut chars = rest.chars();
	let letter = match chars.next() {
		None => return Some(Components { major, minor, letter: None, patch: None }),
		Some(c) if c.is_ascii_alphabetic() => c.to_ascii_lowercase(),
		Some(_) => return None,
	};
	let tail = chars.as_str();
	let patch = if tail.is_empty() { None } else { Some(tail.parse().ok()?) };

	Some(Components { major, minor, letter: Some(letter), patch })
}

impl Ord for EngineVersion {
	fn cmp(&self, other: &Self) -> Ordering {
		match (&self.components, &other.components) {
			(Some(a), Some(b)) => a.cmp(b),
			(Some(_), None) => Ordering::Less,
			(None, Some(_)) => Ordering::Greater,
			(None, None) => self.raw.cmp(&other.raw),
		}
	}
}

impl PartialOrd for EngineVersion {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl PartialEq for EngineVersion {
	fn eq(&self, other: &Self) -> bool {
		self.cmp(other) == Ordering::Equal
	}
}

impl Eq for EngineVersion {}

impl fmt::Display for EngineVersion {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.raw)
	}
}

impl FromStr for EngineVersion {
	type Err = std::convert::Infallible;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(Self::parse(s))
	}
}

impl From<&str> for EngineVersion {
	fn from(value: &str) -> Self {
		Self::parse(value)
	}
}

impl Serialize for EngineVersion {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&self.raw)
	}
}

impl<'de> Deserialize<'de> for EngineVersion {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let raw = String::deserialize(deserializer)?;
		Ok(Self::parse(&raw))
	}
}
