//! Mock EmbeddedPlatform engine and launcher for session tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::TcpListener as StdListener;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use ep::{HelperProbe, SessionOptions};
use ep_runtime::{EngineProcess, LaunchRequest, Launcher, LauncherKind, ProcessHandle};
use parking_lot::Mutex;
use serde_json::{Value, json};

pub const HOST: &str = "http://127.0.0.1";
pub const MARKER_DATE: &str = "01-Jan-2024 10:00:00";
pub const JOB_ID: &str = "42";

#[derive(Debug, Clone)]
pub struct Recorded {
	pub method: String,
	/// Path below `/ep/`, query included.
	pub path: String,
	pub body: String,
}

/// Behavior of the mock engine, adjustable while it runs.
#[derive(Debug, Default)]
pub struct EngineState {
	/// Version reported by `openapi.json`; `None` answers 404.
	pub version: Option<String>,
	/// Health checks to fail before answering OK.
	pub health_failures: usize,
	/// `202` answers to give on the progress endpoint before the result.
	pub pending_polls: usize,
	pub job_result: Value,
	pub reject_batches: bool,
	pub rejected_preferences: Vec<String>,
	pub messages: Vec<Value>,
	pub messages_fail: bool,
	/// Responses keyed by `"<METHOD> <path>"`, path without query.
	pub overrides: HashMap<String, (u16, String)>,
	/// Keep answering health checks after the quit request.
	pub ignore_quit: bool,
	pub quit: bool,
	pub requests: Vec<Recorded>,
}

impl EngineState {
	pub fn new(version: &str) -> Self {
		Self {
			version: Some(version.to_string()),
			job_result: json!({ "result": { "status": "done" } }),
			..Default::default()
		}
	}

	fn respond(&mut self, method: &Method, path: &str, body: &str) -> (u16, String) {
		if let Some((status, body)) = self.overrides.get(&format!("{method} {path}")) {
			return (*status, body.clone());
		}

		match (method.as_str(), path) {
			("GET", "test") => {
				if self.quit && !self.ignore_quit {
					(503, String::new())
				} else if self.health_failures > 0 {
					self.health_failures -= 1;
					(503, "starting".into())
				} else {
					(200, "OK".into())
				}
			}
			("GET", "openapi.json") => match &self.version {
				Some(v) => (200, json!({ "info": { "version": format!("EmbeddedPlatform REST API {v}") } }).to_string()),
				None => (404, String::new()),
			},
			("POST", "message-markers") => (200, json!({ "date": MARKER_DATE }).to_string()),
			("GET", p) if p.starts_with("message-markers/") => {
				if self.messages_fail {
					(500, "Message service unavailable".into())
				} else if self.messages.is_empty() {
					(404, "No message found for the given query.".into())
				} else {
					(200, Value::Array(self.messages.clone()).to_string())
				}
			}
			("PUT", "preferences") => {
				let prefs: Vec<Value> = serde_json::from_str(body).unwrap_or_default();
				let names: Vec<&str> = prefs.iter().filter_map(|p| p["preferenceName"].as_str()).collect();
				if names.len() > 1 && self.reject_batches {
					return (400, "Preference batch rejected".into());
				}
				match names.iter().find(|n| self.rejected_preferences.iter().any(|r| r == *n)) {
					Some(bad) => (400, format!("Unknown preference {bad}")),
					None => (204, String::new()),
				}
			}
			("POST", "jobs") => (202, json!({ "jobID": JOB_ID }).to_string()),
			("GET", "progress/cancel") => (200, String::new()),
			("GET", p) if p == "progress" || p.starts_with("progress/") => {
				if self.pending_polls > 0 {
					self.pending_polls -= 1;
					(202, json!({ "progress": 50 }).to_string())
				} else {
					(200, self.job_result.to_string())
				}
			}
			("DELETE", "application") => {
				self.quit = true;
				(200, String::new())
			}
			("GET", p) if p.starts_with("profiles/") || p == "openprofile" => (200, String::new()),
			("POST", "profiles") | ("PUT", "profiles") => (200, String::new()),
			_ => (404, "Not found".into()),
		}
	}
}

type Shared = Arc<Mutex<EngineState>>;

async fn handle(State(state): State<Shared>, method: Method, uri: Uri, body: Bytes) -> Response {
	let path = uri.path().trim_start_matches("/ep/").to_string();
	let full = match uri.query() {
		Some(query) => format!("{path}?{query}"),
		None => path.clone(),
	};
	let body = String::from_utf8_lossy(&body).into_owned();

	let mut state = state.lock();
	state.requests.push(Recorded { method: method.to_string(), path: full, body: body.clone() });
	let (status, body) = state.respond(&method, &path, &body);
	(StatusCode::from_u16(status).unwrap(), body).into_response()
}

/// An HTTP server answering like an engine under `/ep/`.
#[derive(Debug, Clone)]
pub struct MockEngine {
	pub port: u16,
	state: Shared,
}

impl MockEngine {
	pub fn start(state: EngineState) -> Self {
		Self::spawn_on(0, state)
	}

	/// Binds synchronously so it can be called from [`Launcher::launch`].
	pub fn spawn_on(port: u16, state: EngineState) -> Self {
		let listener = StdListener::bind(("127.0.0.1", port)).expect("bind mock engine");
		listener.set_nonblocking(true).unwrap();
		let port = listener.local_addr().unwrap().port();
		let listener = tokio::net::TcpListener::from_std(listener).unwrap();

		let state = Arc::new(Mutex::new(state));
		let app = Router::new().fallback(handle).with_state(state.clone());
		tokio::spawn(async move {
			let _ = axum::serve(listener, app).await;
		});
		Self { port, state }
	}

	pub fn configure(&self, f: impl FnOnce(&mut EngineState)) {
		f(&mut self.state.lock());
	}

	pub fn requests(&self) -> Vec<Recorded> {
		self.state.lock().requests.clone()
	}

	/// Requests with the given method whose path starts with `prefix`.
	pub fn count(&self, method: &str, prefix: &str) -> usize {
		self.state
			.lock()
			.requests
			.iter()
			.filter(|r| r.method == method && r.path.starts_with(prefix))
			.count()
	}

	pub fn matching(&self, method: &str, prefix: &str) -> Vec<Recorded> {
		self.state
			.lock()
			.requests
			.iter()
			.filter(|r| r.method == method && r.path.starts_with(prefix))
			.cloned()
			.collect()
	}
}

/// Returns a port nothing is listening on.
pub fn free_port() -> u16 {
	StdListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port()
}

#[derive(Debug)]
struct FakeProcess {
	alive: Arc<AtomicBool>,
	terminated: Arc<AtomicBool>,
}

impl EngineProcess for FakeProcess {
	fn id(&self) -> Option<u32> {
		Some(4242)
	}

	fn is_alive(&mut self) -> bool {
		self.alive.load(Ordering::SeqCst)
	}

	fn terminate(&mut self) -> ep_runtime::Result<()> {
		self.alive.store(false, Ordering::SeqCst);
		self.terminated.store(true, Ordering::SeqCst);
		Ok(())
	}
}

/// What [`ScriptedLauncher::launch`] does.
#[derive(Debug, Clone)]
pub enum Behavior {
	/// A process that stays alive but serves nothing.
	Idle,
	/// A process that is already gone.
	Exit,
	/// Starts a mock engine of the given version on the requested port.
	Serve(String),
}

#[derive(Debug)]
pub struct ScriptedLauncher {
	behavior: Behavior,
	kind: LauncherKind,
	port_search: bool,
	log_file: Option<PathBuf>,
	pub launches: AtomicUsize,
	pub alive: Arc<AtomicBool>,
	pub terminated: Arc<AtomicBool>,
	pub engine: Mutex<Option<MockEngine>>,
}

impl ScriptedLauncher {
	pub fn new(behavior: Behavior) -> Self {
		Self {
			behavior,
			kind: LauncherKind::Desktop,
			port_search: false,
			log_file: None,
			launches: AtomicUsize::new(0),
			alive: Arc::new(AtomicBool::new(true)),
			terminated: Arc::new(AtomicBool::new(false)),
			engine: Mutex::new(None),
		}
	}

	pub fn headless(mut self) -> Self {
		self.kind = LauncherKind::Headless;
		self
	}

	pub fn with_port_search(mut self) -> Self {
		self.port_search = true;
		self
	}

	pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
		self.log_file = Some(path.into());
		self
	}

	pub fn launches(&self) -> usize {
		self.launches.load(Ordering::SeqCst)
	}

	pub fn was_terminated(&self) -> bool {
		self.terminated.load(Ordering::SeqCst)
	}

	pub fn engine(&self) -> Option<MockEngine> {
		self.engine.lock().clone()
	}
}

impl Launcher for ScriptedLauncher {
	fn kind(&self) -> LauncherKind {
		self.kind
	}

	fn allows_port_search(&self) -> bool {
		self.port_search
	}

	fn log_file(&self, _version: Option<&str>, _port: u16) -> Option<PathBuf> {
		self.log_file.clone()
	}

	fn launch(&self, request: &LaunchRequest) -> ep_runtime::Result<ProcessHandle> {
		self.launches.fetch_add(1, Ordering::SeqCst);
		match &self.behavior {
			Behavior::Idle => {}
			Behavior::Exit => self.alive.store(false, Ordering::SeqCst),
			Behavior::Serve(version) => {
				*self.engine.lock() = Some(MockEngine::spawn_on(request.port, EngineState::new(version)));
			}
		}
		Ok(ProcessHandle::new(Box::new(FakeProcess {
			alive: self.alive.clone(),
			terminated: self.terminated.clone(),
		})))
	}
}

/// Never sees a migration helper.
#[derive(Debug)]
pub struct NoMigration;

#[async_trait]
impl HelperProbe for NoMigration {
	async fn active_helper(&self) -> Option<String> {
		None
	}
}

/// Options for a fast session against `port` on localhost.
pub fn options(port: u16, launcher: Arc<ScriptedLauncher>) -> SessionOptions {
	SessionOptions::new()
		.with_host(HOST)
		.with_port(port)
		.with_launcher(launcher)
		.with_migration_probe(Arc::new(NoMigration))
		.with_startup_timeout(Duration::from_secs(5))
		.with_poll_interval(Duration::from_millis(10))
		.with_startup_poll_interval(Duration::from_millis(10))
		.with_close_grace(Duration::from_millis(200))
}
