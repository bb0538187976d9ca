//! ep: session manager for BTC EmbeddedPlatform's REST API.
//!
//! A [`Session`] connects to a running engine or starts one, speaks the
//! version-dependent dialect of its REST API, waits out long-running jobs,
//! and enriches every failure with the engine's own messages and log.
//!
//! ```ignore
//! use ep::{Session, SessionOptions};
//!
//! #[tokio::main]
//! async fn main() -> ep::Result<()> {
//!     ep::init_logging(0);
//!     let mut session = Session::open(SessionOptions::new().with_version("24.3p1")).await?;
//!     session.open_profile("C:/work/model.epp").await?;
//!     let scopes = session.get("scopes").await?;
//!     println!("{scopes}");
//!     session.close().await
//! }
//! ```

pub mod adapter;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod job;
pub mod logging;
pub mod preferences;
pub mod session;
pub mod transport;
pub mod watcher;

pub use adapter::{ProfileLoad, ProtocolAdapter};
pub use config::{EngineConfig, Installation, SessionOptions};
pub use diagnostics::LogEntry;
pub use error::{Diagnostics, Error, Result};
pub use logging::init_logging;
pub use preferences::{PreferenceOutcome, PreferencePlan};
pub use session::{Session, SessionState};
pub use transport::{EngineClient, EngineResponse, Request};
pub use watcher::{HelperProbe, MigrationWatcher, ProcessListProbe};

pub use ep_protocol::{EngineVersion, Message, Preference, Severity};
pub use ep_runtime::{DesktopLauncher, HeadlessLauncher, LaunchRequest, Launcher, LauncherKind, ProcessHandle};
