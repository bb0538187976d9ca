//! Process-level plumbing for EmbeddedPlatform sessions.
//!
//! This crate knows how to find a free REST port, how to start the engine on
//! a Windows desktop installation or inside a headless container, and how to
//! stop what it started. It never talks HTTP; that is the job of `ep-rs`.

pub mod desktop;
pub mod error;
pub mod headless;
pub mod launcher;
pub mod port;
pub mod process;

pub use desktop::{AddonProbe, DesktopLauncher, RegistryAddonProbe};
pub use error::{Error, Result};
pub use headless::HeadlessLauncher;
pub use launcher::{
	LaunchRequest, Launcher, LauncherKind, application_id, detect_launcher, scripting_bridge_port,
};
pub use port::{PortProbe, find_open_port, find_open_port_with, probe_port};
pub use process::{ChildProcess, EngineProcess, ProcessHandle, PtyProcess};
