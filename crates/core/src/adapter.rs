//! Version-dependent endpoint shapes.
//!
//! The engine's wire protocol changed across releases. [`ProtocolAdapter`]
//! is fixed once the session knows the engine version and answers every
//! "which endpoint / is this supported" question from then on.

use std::path::PathBuf;
use std::sync::LazyLock;

use ep_protocol::{EngineVersion, JOB_CANCEL_SINCE, OPEN_PROFILE_SINCE, PROGRESS_QUERY_SINCE};
use regex::Regex;
use reqwest::Method;

static VERSION_LABEL: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"\d+\.\d+[a-zA-Z]\d+").unwrap());

/// Pulls a version label such as `25.3p0` out of the engine's self-description.
pub fn extract_version(text: &str) -> Option<EngineVersion> {
	VERSION_LABEL.find(text).map(|m| EngineVersion::parse(m.as_str()))
}

/// A profile-load request after path normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileLoad {
	/// Decoded profile location on the engine host.
	pub file: PathBuf,
	/// Request path in the shape the engine version expects.
	pub path: String,
}

#[derive(Debug, Clone)]
pub struct ProtocolAdapter {
	version: EngineVersion,
}

impl ProtocolAdapter {
	pub fn new(version: EngineVersion) -> Self {
		Self { version }
	}

	pub fn version(&self) -> &EngineVersion {
		&self.version
	}

	pub fn uses_progress_query(&self) -> bool {
		self.version.at_least(PROGRESS_QUERY_SINCE)
	}

	pub fn uses_open_profile(&self) -> bool {
		self.version.at_least(OPEN_PROFILE_SINCE)
	}

	/// Whether long-running jobs can be cancelled, which is what makes
	/// per-request timeouts meaningful.
	pub fn supports_job_cancel(&self) -> bool {
		self.version.at_least(JOB_CANCEL_SINCE)
	}

	/// Path used to poll a long-running job.
	pub fn progress_path(&self, job_id: &str) -> String {
		if self.uses_progress_query() {
			format!("progress?progress-id={}", urlencoding::encode(job_id))
		} else {
			format!("progress/{}", urlencoding::encode(job_id))
		}
	}

	pub fn cancel_path(&self) -> &'static str {
		"progress/cancel"
	}

	/// Returns `true` for `GET profiles/<file>` and `GET openprofile?path=<file>`.
	pub fn is_profile_load(&self, method: &Method, path: &str) -> bool {
		*method == Method::GET && parse_profile_load(path).is_some()
	}

	/// Rewrites a profile-load path for this engine version.
	///
	/// Either input shape is accepted. The file path is percent-decoded once
	/// (callers may or may not have encoded it) and encoded exactly once on
	/// the way out. Returns `None` if `path` is not a profile load.
	pub fn profile_load(&self, path: &str) -> Option<ProfileLoad> {
		let (file, extra) = parse_profile_load(path)?;
		let encoded = urlencoding::encode(&file).into_owned();

		let path = if self.uses_open_profile() {
			let mut path = format!("openprofile?path={encoded}");
			for param in &extra {
				path.push('&');
				path.push_str(param);
			}
			path
		} else {
			let mut path = format!("profiles/{encoded}");
			if !extra.is_empty() {
				path.push('?');
				path.push_str(&extra.join("&"));
			}
			path
		};

		Some(ProfileLoad { file: PathBuf::from(file), path })
	}
}

/// Returns `true` for any request addressed to the profile endpoints.
pub fn is_profile_request(path: &str) -> bool {
	let path = trim_root(path);
	path.starts_with("profiles") || path.starts_with("openprofile")
}

/// Returns `true` for requests that create or load a profile, which reset
/// the message marker.
pub fn refreshes_message_marker(method: &Method, path: &str) -> bool {
	(*method == Method::GET || *method == Method::POST) && is_profile_request(path)
}

fn trim_root(path: &str) -> &str {
	let mut path = path.trim_start_matches('/');
	while let Some(rest) = path.strip_prefix("ep/") {
		path = rest.trim_start_matches('/');
	}
	path
}

/// Splits a profile-load path into the decoded file and the remaining query
/// parameters.
fn parse_profile_load(path: &str) -> Option<(String, Vec<String>)> {
	let path = trim_root(path);

	if let Some(rest) = path.strip_prefix("profiles/") {
		let (raw_file, query) = rest.split_once('?').unwrap_or((rest, ""));
		if raw_file.is_empty() {
			return None;
		}
		let extra = query.split('&').filter(|p| !p.is_empty()).map(str::to_string).collect();
		return Some((decode(raw_file), extra));
	}

	let query = path.strip_prefix("openprofile?")?;
	let mut file = None;
	let mut extra = Vec::new();
	for param in query.split('&').filter(|p| !p.is_empty()) {
		match param.strip_prefix("path=") {
			Some(value) if file.is_none() => file = Some(decode(value)),
			_ => extra.push(param.to_string()),
		}
	}
	file.filter(|f| !f.is_empty()).map(|f| (f, extra))
}

fn decode(raw: &str) -> String {
	urlencoding::decode(raw)
		.map(|s| s.into_owned())
		.unwrap_or_else(|_| raw.to_string())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn adapter(version: &str) -> ProtocolAdapter {
		ProtocolAdapter::new(EngineVersion::parse(version))
	}

	#[test]
	fn version_from_api_description() {
		assert_eq!(extract_version("EmbeddedPlatform REST API 25.3p0").unwrap().as_str(), "25.3p0");
		assert_eq!(extract_version("1.0").map(|v| v.to_string()), None);
	}

	#[test]
	fn progress_paths() {
		assert_eq!(adapter("21.3p0").progress_path("17"), "progress/17");
		assert_eq!(adapter("24.2p0").progress_path("17"), "progress?progress-id=17");
	}

	#[test]
	fn cancel_support() {
		assert!(!adapter("21.3p0").supports_job_cancel());
		assert!(!adapter("25.2p0").supports_job_cancel());
		assert!(adapter("25.3p0").supports_job_cancel());
	}

	#[test]
	fn legacy_profile_load() {
		let load = adapter("24.2p0")
			.profile_load("profiles/C:/work/my model.epp?discardCurrentProfile=true")
			.unwrap();
		assert_eq!(load.file, PathBuf::from("C:/work/my model.epp"));
		assert_eq!(load.path, "profiles/C%3A%2Fwork%2Fmy%20model.epp?discardCurrentProfile=true");
	}

	#[test]
	fn current_profile_load() {
		let load = adapter("25.3p0")
			.profile_load("profiles/C:/work/model.epp?discardCurrentProfile=true")
			.unwrap();
		assert_eq!(load.path, "openprofile?path=C%3A%2Fwork%2Fmodel.epp&discardCurrentProfile=true");
	}

	#[test]
	fn already_encoded_path_is_not_encoded_twice() {
		let plain = adapter("24.2p0").profile_load("profiles/C:/work/my model.epp").unwrap();
		let encoded = adapter("24.2p0")
			.profile_load("profiles/C%3A%2Fwork%2Fmy%20model.epp")
			.unwrap();
		assert_eq!(plain, encoded);
	}

	#[test]
	fn openprofile_input_on_legacy_engine() {
		let load = adapter("24.2p0")
			.profile_load("/ep/openprofile?path=%2Ftmp%2Fa.epp&discardCurrentProfile=true")
			.unwrap();
		assert_eq!(load.file, PathBuf::from("/tmp/a.epp"));
		assert_eq!(load.path, "profiles/%2Ftmp%2Fa.epp?discardCurrentProfile=true");
	}

	#[test]
	fn non_profile_paths() {
		let adapter = adapter("25.3p0");
		assert!(adapter.profile_load("profiles").is_none());
		assert!(adapter.profile_load("scopes/123").is_none());
		assert!(!adapter.is_profile_load(&Method::POST, "profiles/a.epp"));
		assert!(adapter.is_profile_load(&Method::GET, "profiles/a.epp"));
	}

	#[test]
	fn marker_refresh_for_profile_operations() {
		assert!(refreshes_message_marker(&Method::POST, "profiles?discardCurrentProfile=true"));
		assert!(refreshes_message_marker(&Method::GET, "/ep/openprofile?path=a.epp"));
		assert!(!refreshes_message_marker(&Method::PUT, "profiles"));
		assert!(!refreshes_message_marker(&Method::GET, "scopes"));
	}
}
