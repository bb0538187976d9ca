//! Host-specific engine launching.
//!
//! A [`Launcher`] turns a [`LaunchRequest`] into a running process. Two
//! variants exist: [`DesktopLauncher`](crate::DesktopLauncher) for a regular
//! Windows installation and [`HeadlessLauncher`](crate::HeadlessLauncher) for
//! container images that describe themselves through environment variables.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use ep_protocol::{EngineVersion, HEADLESS_APP_SINCE};

use crate::desktop::DesktopLauncher;
use crate::error::Result;
use crate::headless::HeadlessLauncher;
use crate::process::ProcessHandle;

const BRIDGE_PORT_BASE: u16 = 29300;

/// Which host flavour a launcher targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LauncherKind {
	Desktop,
	Headless,
}

/// Everything needed to start one engine process.
#[derive(Debug, Clone, Default)]
pub struct LaunchRequest {
	pub version: Option<String>,
	pub install_location: Option<PathBuf>,
	pub port: u16,
	pub license_package: String,
	pub license_location: Option<String>,
	pub extra_vm_args: Vec<String>,
	pub skip_companion: bool,
}

/// Starts engine processes for one kind of host.
pub trait Launcher: Send + Sync + fmt::Debug {
	fn kind(&self) -> LauncherKind;

	/// Port the engine will actually listen on for a requested port.
	fn rest_port(&self, requested: u16) -> u16 {
		requested
	}

	/// Whether the session may move to another port when the requested one is taken.
	fn allows_port_search(&self) -> bool {
		true
	}

	/// Version label to assume when the caller configured none.
	fn default_version(&self) -> Option<String> {
		None
	}

	/// Location of the engine log file for a process started with these settings.
	fn log_file(&self, version: Option<&str>, port: u16) -> Option<PathBuf>;

	/// Spawns the engine.
	fn launch(&self, request: &LaunchRequest) -> Result<ProcessHandle>;
}

/// Picks the launcher matching the current host.
pub fn detect_launcher() -> Arc<dyn Launcher> {
	if cfg!(windows) {
		Arc::new(DesktopLauncher::new())
	} else {
		Arc::new(HeadlessLauncher::new())
	}
}

/// Port of the scripting bridge that accompanies a REST port.
///
/// Derived as `29300 + rest_port % 100`, moved down by 100 if it would
/// collide with the REST port itself.
pub fn scripting_bridge_port(rest_port: u16) -> u16 {
	let port = BRIDGE_PORT_BASE + rest_port % 100;
	if port == rest_port { port - 100 } else { port }
}

/// Eclipse application id for the given engine version.
pub fn application_id(version: &EngineVersion) -> &'static str {
	if version.at_least(HEADLESS_APP_SINCE) {
		"ep.application.headless.HeadlessApplication"
	} else {
		"ep.application.headless"
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn bridge_port_derivation() {
		assert_eq!(scripting_bridge_port(1337), 29337);
		assert_eq!(scripting_bridge_port(8080), 29380);
		assert_eq!(scripting_bridge_port(29342), 29242);
	}

	#[test]
	fn application_id_by_version() {
		assert_eq!(application_id(&EngineVersion::parse("23.2p0")), "ep.application.headless");
		assert_eq!(
			application_id(&EngineVersion::parse("24.2p0")),
			"ep.application.headless.HeadlessApplication"
		);
	}
}
