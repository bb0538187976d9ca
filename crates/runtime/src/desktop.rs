//! Launching a desktop (Windows) installation of the engine.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use ep_protocol::EngineVersion;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::launcher::{LaunchRequest, Launcher, LauncherKind, application_id, scripting_bridge_port};
use crate::process::{ChildProcess, ProcessHandle};

const REST_ADDON_KEYS: [&str; 3] = ["REST_Server_EU", "REST_Server_BASE_EU", "REST_Server_JP"];

/// Answers whether the REST server add-on is installed for a version.
pub trait AddonProbe: Send + Sync + fmt::Debug {
	fn is_installed(&self, version: &str) -> bool;
}

/// Looks the add-on up in the 64-bit Windows registry.
#[derive(Debug, Default, Clone, Copy)]
pub struct RegistryAddonProbe;

impl AddonProbe for RegistryAddonProbe {
	fn is_installed(&self, version: &str) -> bool {
		REST_ADDON_KEYS.iter().any(|key| {
			let path = format!(r"HKLM\SOFTWARE\BTC\EmbeddedPlatform {version}\Addons\{key}");
			let found = Command::new("reg")
				.args(["query", &path, "/reg:64"])
				.stdout(Stdio::null())
				.stderr(Stdio::null())
				.status()
				.is_ok_and(|status| status.success());
			debug!(target: "ep.runtime", key = %path, found, "checked REST add-on registry key");
			found
		})
	}
}

/// Starts `rcp/ep.exe` from a desktop installation.
#[derive(Debug, Clone)]
pub struct DesktopLauncher {
	addon_probe: Arc<dyn AddonProbe>,
	appdata: Option<PathBuf>,
}

impl Default for DesktopLauncher {
	fn default() -> Self {
		Self::new()
	}
}

impl DesktopLauncher {
	pub fn new() -> Self {
		Self { addon_probe: Arc::new(RegistryAddonProbe), appdata: dirs::config_dir() }
	}

	pub fn with_addon_probe(mut self, probe: Arc<dyn AddonProbe>) -> Self {
		self.addon_probe = probe;
		self
	}

	/// Overrides the roaming application-data directory (`%APPDATA%`).
	pub fn with_appdata(mut self, appdata: impl Into<PathBuf>) -> Self {
		self.appdata = Some(appdata.into());
		self
	}

	fn instance_dir(&self, version: &str, port: u16) -> Option<PathBuf> {
		self.appdata
			.as_ref()
			.map(|root| root.join("BTC").join("ep").join(version).join(port.to_string()))
	}

	/// Command-line arguments passed to `ep.exe`.
	pub fn arguments(&self, version: &str, request: &LaunchRequest) -> Vec<String> {
		let port = request.port;
		let app = application_id(&EngineVersion::parse(version));
		let instance = self
			.instance_dir(version, port)
			.unwrap_or_else(|| PathBuf::from("BTC").join("ep").join(version).join(port.to_string()));
		let area = |name: &str| instance.join(name).to_string_lossy().replace('\\', "/");

		let mut args = vec![
			"-clearPersistedState".to_string(),
			"-application".to_string(),
			app.to_string(),
			"-nosplash".to_string(),
			"-vmargs".to_string(),
			"-Dep.runtime.batch=ep".to_string(),
			format!("-Dep.runtime.api.port={}", scripting_bridge_port(port)),
			format!("-Dosgi.configuration.area.default={}", area("configuration")),
			format!("-Dosgi.instance.area.default={}", area("workspace")),
			format!("-Dep.configuration.logpath=AppData/Roaming/BTC/ep/{version}/{port}/logs"),
			format!("-Dep.runtime.workdir=BTC/ep/{version}/{port}"),
			format!("-Dep.licensing.package={}", request.license_package),
			format!("-Dep.rest.port={port}"),
		];
		if let Some(location) = &request.license_location {
			args.push(format!("-Dep.licensing.location={location}"));
		}
		args.extend(request.extra_vm_args.iter().cloned());
		args
	}
}

/// Resolves an install location to the executable inside it.
pub fn executable_path(install_location: &Path) -> PathBuf {
	let is_exe = install_location
		.extension()
		.is_some_and(|ext| ext.eq_ignore_ascii_case("exe"));
	if is_exe { install_location.to_path_buf() } else { install_location.join("rcp").join("ep.exe") }
}

impl Launcher for DesktopLauncher {
	fn kind(&self) -> LauncherKind {
		LauncherKind::Desktop
	}

	fn log_file(&self, version: Option<&str>, port: u16) -> Option<PathBuf> {
		self.instance_dir(version?, port).map(|dir| dir.join("logs").join("current.log"))
	}

	fn launch(&self, request: &LaunchRequest) -> Result<ProcessHandle> {
		let (Some(version), Some(install_location)) =
			(request.version.as_deref(), request.install_location.as_deref())
		else {
			return Err(Error::MissingInstallation);
		};

		let exe = executable_path(install_location);
		if !exe.is_file() {
			return Err(Error::ExecutableNotFound { path: exe });
		}
		if !self.addon_probe.is_installed(version) {
			return Err(Error::AddonMissing { version: version.to_string() });
		}

		let args = self.arguments(version, request);
		debug!(target: "ep.runtime", exe = %exe.display(), ?args, "spawning desktop engine");
		info!(target: "ep.runtime", "Waiting for BTC EmbeddedPlatform {version} to be available");

		let child = Command::new(&exe)
			.args(&args)
			.stdin(Stdio::null())
			.stdout(Stdio::null())
			.stderr(Stdio::null())
			.spawn()
			.map_err(|e| Error::LaunchFailed(format!("{}: {e}", exe.display())))?;

		Ok(ProcessHandle::new(Box::new(ChildProcess::new(child))))
	}
}
