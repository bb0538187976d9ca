//! Session configuration.
//!
//! [`EngineConfig`] is the already-merged project configuration (normally
//! loaded from YAML by the caller). [`SessionOptions`] collects everything
//! needed to connect to or start an engine.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use ep_runtime::Launcher;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::watcher::HelperProbe;

/// Environment variable naming the project configuration file.
pub const CONFIG_FILE_ENV: &str = "BTC_API_CONFIG_FILE";

pub const DEFAULT_HOST: &str = "http://localhost";
pub const DEFAULT_PORT: u16 = 1337;
pub const DEFAULT_INSTALL_ROOT: &str = "C:/Program Files/BTC";
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_CLOSE_GRACE: Duration = Duration::from_secs(10);

static INSTALL_VERSION: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"ep(\d+\.\d+[a-zA-Z]\d+)").unwrap());

/// Project configuration as consumed by a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub installation_root: Option<PathBuf>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub ep_version: Option<String>,
	/// Startup timeout in seconds.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub startup_timeout: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub license_location: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub compiler: Option<String>,
	#[serde(default)]
	pub preferences: BTreeMap<String, Value>,
}

impl EngineConfig {
	pub fn from_value(value: Value) -> Result<Self> {
		serde_json::from_value(value).map_err(|e| Error::Config(format!("invalid configuration: {e}")))
	}
}

/// Where and which engine to start, after combining options and config.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Installation {
	pub version: Option<String>,
	pub location: Option<PathBuf>,
}

/// Resolves the engine version and install location.
///
/// An explicit version plus root gives `<root>/ep<version>`. An explicit
/// location without version yields the version embedded in its path. Whatever
/// is still missing comes from `installationRoot`/`epVersion` in the config.
pub fn resolve_installation(
	version: Option<&str>,
	install_root: Option<&Path>,
	install_location: Option<&Path>,
	config: &EngineConfig,
) -> Installation {
	let mut version = version.map(str::to_string);
	let mut location = install_location.map(Path::to_path_buf);

	if location.is_none() {
		if let (Some(v), Some(root)) = (version.as_deref(), install_root) {
			location = Some(root.join(format!("ep{v}")));
		}
	}
	if version.is_none() {
		if let Some(loc) = location.as_deref() {
			version = version_from_path(loc);
		}
	}
	if version.is_none() || location.is_none() {
		if let (Some(root), Some(config_version)) = (&config.installation_root, &config.ep_version) {
			let v = version.unwrap_or_else(|| config_version.clone());
			location = Some(root.join(format!("ep{v}")));
			version = Some(v);
		}
	}

	Installation { version, location }
}

/// Extracts `24.3p1` from paths like `C:/Program Files/BTC/ep24.3p1`.
pub fn version_from_path(path: &Path) -> Option<String> {
	let text = path.to_string_lossy();
	INSTALL_VERSION
		.captures(&text)
		.and_then(|caps| caps.get(1))
		.map(|m| m.as_str().to_string())
}

/// Options for [`Session::open`](crate::Session::open).
#[derive(Debug, Clone)]
pub struct SessionOptions {
	pub host: String,
	pub port: u16,
	pub version: Option<String>,
	pub install_root: Option<PathBuf>,
	pub install_location: Option<PathBuf>,
	pub license_package: String,
	pub license_location: Option<String>,
	pub extra_vm_args: Vec<String>,
	pub startup_timeout: Duration,
	pub skip_companion_start: bool,
	pub config: Option<EngineConfig>,
	pub config_file: Option<PathBuf>,
	pub report_template_source: Option<PathBuf>,
	pub poll_interval: Duration,
	pub startup_poll_interval: Duration,
	pub close_grace: Duration,
	pub launcher: Option<Arc<dyn Launcher>>,
	pub migration_probe: Option<Arc<dyn HelperProbe>>,
}

impl Default for SessionOptions {
	fn default() -> Self {
		Self {
			host: DEFAULT_HOST.to_string(),
			port: DEFAULT_PORT,
			version: None,
			install_root: Some(PathBuf::from(DEFAULT_INSTALL_ROOT)),
			install_location: None,
			license_package: String::new(),
			license_location: None,
			extra_vm_args: Vec::new(),
			startup_timeout: DEFAULT_STARTUP_TIMEOUT,
			skip_companion_start: false,
			config: None,
			config_file: std::env::var_os(CONFIG_FILE_ENV).map(PathBuf::from),
			report_template_source: None,
			poll_interval: DEFAULT_POLL_INTERVAL,
			startup_poll_interval: DEFAULT_POLL_INTERVAL,
			close_grace: DEFAULT_CLOSE_GRACE,
			launcher: None,
			migration_probe: None,
		}
	}
}

impl SessionOptions {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_host(mut self, host: impl Into<String>) -> Self {
		self.host = host.into();
		self
	}

	pub fn with_port(mut self, port: u16) -> Self {
		self.port = port;
		self
	}

	pub fn with_version(mut self, version: impl Into<String>) -> Self {
		self.version = Some(version.into());
		self
	}

	pub fn with_install_root(mut self, root: impl Into<PathBuf>) -> Self {
		self.install_root = Some(root.into());
		self
	}

	pub fn with_install_location(mut self, location: impl Into<PathBuf>) -> Self {
		self.install_location = Some(location.into());
		self
	}

	pub fn with_license_package(mut self, package: impl Into<String>) -> Self {
		self.license_package = package.into();
		self
	}

	pub fn with_license_location(mut self, location: impl Into<String>) -> Self {
		self.license_location = Some(location.into());
		self
	}

	pub fn with_extra_vm_args<I, S>(mut self, args: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.extra_vm_args = args.into_iter().map(Into::into).collect();
		self
	}

	pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
		self.startup_timeout = timeout;
		self
	}

	pub fn with_skip_companion_start(mut self, skip: bool) -> Self {
		self.skip_companion_start = skip;
		self
	}

	pub fn with_config(mut self, config: EngineConfig) -> Self {
		self.config = Some(config);
		self
	}

	/// Configuration file whose directory anchors relative preference paths.
	pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
		self.config_file = Some(path.into());
		self
	}

	pub fn with_report_template_source(mut self, path: impl Into<PathBuf>) -> Self {
		self.report_template_source = Some(path.into());
		self
	}

	pub fn with_poll_interval(mut self, interval: Duration) -> Self {
		self.poll_interval = interval;
		self
	}

	pub fn with_startup_poll_interval(mut self, interval: Duration) -> Self {
		self.startup_poll_interval = interval;
		self
	}

	pub fn with_close_grace(mut self, grace: Duration) -> Self {
		self.close_grace = grace;
		self
	}

	pub fn with_launcher(mut self, launcher: Arc<dyn Launcher>) -> Self {
		self.launcher = Some(launcher);
		self
	}

	pub fn with_migration_probe(mut self, probe: Arc<dyn HelperProbe>) -> Self {
		self.migration_probe = Some(probe);
		self
	}

	/// Startup timeout after applying `startupTimeout` from the config.
	pub fn effective_startup_timeout(&self) -> Duration {
		self.config
			.as_ref()
			.and_then(|c| c.startup_timeout)
			.map(Duration::from_secs)
			.unwrap_or(self.startup_timeout)
	}

	/// Directory that relative preference paths are resolved against.
	pub fn config_root(&self) -> Option<&Path> {
		self.config_file.as_deref().and_then(Path::parent)
	}
}
