//! Launching the engine inside a headless container image.
//!
//! The image describes its layout through environment variables
//! (`EP_INSTALL_PATH`, `EP_REGISTRY`, `LOG_DIR`, ...). When the image also
//! ships MATLAB, it is started next to the engine on a pseudo-terminal.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::LazyLock;

use ep_protocol::{DEFAULT_VERSION, EngineVersion};
use portable_pty::{CommandBuilder, PtySize, native_pty_system};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::launcher::{LaunchRequest, Launcher, LauncherKind, application_id};
use crate::process::{ChildProcess, ProcessHandle, PtyProcess};

/// REST port used when `REST_PORT` is not set.
pub const DEFAULT_REST_PORT: u16 = 8080;

const BRIDGE_PORT: u16 = 1109;
const COMPANION_EXECUTABLE: &str = "matlab";

static INI_VERSION: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"/ep/(\d+\.\d+[a-zA-Z]*\d+)/").unwrap());

/// Starts `$EP_INSTALL_PATH/ep` as configured by the container environment.
#[derive(Debug, Clone, Default)]
pub struct HeadlessLauncher {
	overrides: BTreeMap<String, String>,
}

impl HeadlessLauncher {
	pub fn new() -> Self {
		Self::default()
	}

	/// Supplies environment values that take precedence over the process environment.
	pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.overrides.insert(name.into(), value.into());
		self
	}

	fn var(&self, name: &str) -> Option<String> {
		self.overrides
			.get(name)
			.cloned()
			.or_else(|| std::env::var(name).ok())
	}

	fn require(&self, name: &'static str) -> Result<String> {
		self.var(name).ok_or(Error::MissingEnvironment(name))
	}

	/// Engine version recorded in `$EP_INSTALL_PATH/ep.ini`.
	pub fn installed_version(&self) -> Option<String> {
		let install = self.var("EP_INSTALL_PATH")?;
		read_ini_version(&Path::new(&install).join("ep.ini"))
	}

	/// Command line (program first) for the engine process.
	pub fn command_line(&self, version: &str, request: &LaunchRequest) -> Result<Vec<String>> {
		let install = self.require("EP_INSTALL_PATH")?;
		let matlab_ip = self.var("MATLAB_IP").unwrap_or_else(|| "127.0.0.1".to_string());

		let mut args = vec![
			format!("{}/ep", install.trim_end_matches('/')),
			"-clearPersistedState".to_string(),
			"-nosplash".to_string(),
			"-console".to_string(),
			"-consoleLog".to_string(),
			"-application".to_string(),
			application_id(&EngineVersion::parse(version)).to_string(),
			"-vmargs".to_string(),
			format!("-Dep.linux.config={}", self.require("EP_REGISTRY")?),
			format!("-Dlogback.configurationFile={}", self.require("EP_LOG_CONFIG")?),
			format!("-Dep.configuration.logpath={}", self.require("LOG_DIR")?),
			format!("-Dep.runtime.workdir={}", self.require("WORK_DIR")?),
			format!("-Dbtc.root.temp.dir={}", self.require("TMP_DIR")?),
			format!("-Dep.licensing.location={}", self.require("LICENSE_LOCATION")?),
			format!("-Dep.licensing.package={}", self.require("LICENSE_PACKAGES")?),
			format!("-Dep.rest.port={}", request.port),
			"-Dosgi.configuration.area.default=/tmp/ep/configuration".to_string(),
			"-Dosgi.instance.area.default=/tmp/ep/workspace".to_string(),
			"-Dep.runtime.batch=ep".to_string(),
			format!("-Dep.runtime.api.port={BRIDGE_PORT}"),
			format!("-Dep.matlab.ip.range={matlab_ip}"),
		];
		args.extend(request.extra_vm_args.iter().cloned());
		Ok(args)
	}

	fn start_companion(&self) -> Option<PtyProcess> {
		let exe = which::which(COMPANION_EXECUTABLE).ok()?;
		let pty = native_pty_system();
		let spawned = pty
			.openpty(PtySize { rows: 24, cols: 80, pixel_width: 0, pixel_height: 0 })
			.and_then(|pair| {
				let child = pair.slave.spawn_command(CommandBuilder::new(&exe))?;
				Ok((child, pair.master))
			});

		match spawned {
			Ok((child, master)) => {
				info!(target: "ep.runtime", exe = %exe.display(), "started MATLAB alongside the engine");
				Some(PtyProcess::new(child, master))
			}
			Err(e) => {
				warn!(target: "ep.runtime", error = %e, "failed to start MATLAB");
				None
			}
		}
	}
}

fn read_ini_version(path: &Path) -> Option<String> {
	let content = fs::read_to_string(path).ok()?;
	INI_VERSION
		.captures(&content)
		.and_then(|caps| caps.get(1))
		.map(|m| m.as_str().to_string())
}

impl Launcher for HeadlessLauncher {
	fn kind(&self) -> LauncherKind {
		LauncherKind::Headless
	}

	fn rest_port(&self, _requested: u16) -> u16 {
		self.var("REST_PORT")
			.and_then(|port| port.trim().parse().ok())
			.unwrap_or(DEFAULT_REST_PORT)
	}

	fn allows_port_search(&self) -> bool {
		false
	}

	fn default_version(&self) -> Option<String> {
		Some(self.installed_version().unwrap_or_else(|| DEFAULT_VERSION.to_string()))
	}

	fn log_file(&self, _version: Option<&str>, _port: u16) -> Option<PathBuf> {
		self.var("LOG_DIR").map(|dir| PathBuf::from(dir).join("current.log"))
	}

	fn launch(&self, request: &LaunchRequest) -> Result<ProcessHandle> {
		let version = request
			.version
			.clone()
			.or_else(|| self.installed_version())
			.unwrap_or_else(|| DEFAULT_VERSION.to_string());
		let command_line = self.command_line(&version, request)?;
		let (program, args) = command_line
			.split_first()
			.ok_or_else(|| Error::LaunchFailed("empty command line".into()))?;

		debug!(target: "ep.runtime", %program, ?args, "spawning headless engine");
		info!(target: "ep.runtime", "Waiting for BTC EmbeddedPlatform {version} to be available");

		let child = Command::new(program)
			.args(args)
			.stdin(Stdio::null())
			.stdout(Stdio::null())
			.stderr(Stdio::null())
			.spawn()
			.map_err(|e| Error::LaunchFailed(format!("{program}: {e}")))?;

		let mut handle = ProcessHandle::new(Box::new(ChildProcess::new(child)));
		if !request.skip_companion {
			if let Some(companion) = self.start_companion() {
				handle = handle.with_companion(Box::new(companion));
			}
		}
		Ok(handle)
	}
}
