//! Session lifecycle and the request pipeline.
//!
//! A [`Session`] binds to one engine endpoint. [`Session::open`] connects to
//! an engine that is already listening, or launches one and waits for its
//! health check, then negotiates the protocol version and applies the
//! configured preferences. Every request goes through the same pipeline:
//! profile-path rewriting and message-marker refresh, the HTTP exchange,
//! failure correlation, and polling when the engine answers with a job.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDateTime, Timelike};
use ep_protocol::{
	EngineVersion, JOB_CANCEL_SINCE, Message, MessageMarker, OpenApiDocument, Preference,
	ProgressCancel, Severity,
};
use ep_runtime::{LaunchRequest, Launcher, LauncherKind, ProcessHandle, detect_launcher, find_open_port};
use reqwest::{Method, StatusCode};
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use crate::adapter::{ProtocolAdapter, extract_version, is_profile_request, refreshes_message_marker};
use crate::config::{EngineConfig, Installation, SessionOptions, resolve_installation};
use crate::diagnostics::{
	ErrorCorrelator, LogEntry, emit_message, is_benign_response, known_failure_hint,
	read_error_entries, sort_messages,
};
use crate::error::{Diagnostics, Error, Result};
use crate::job::LongRunningJob;
use crate::preferences::{
	COMPILER_SETTING, HEADLESS_COMPILER, PreferenceApplier, PreferenceOutcome,
};
use crate::transport::{EngineClient, EngineResponse, Request};
use crate::watcher::{HelperProbe, MigrationWatcher, ProcessListProbe};

/// Boxed future, used where request handling recurses.
type BoxFut<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

const FORCE_QUIT_PATH: &str = "application?force-quit=true";
const SIGNAL_INFO_PROBE_PATH: &str = "signals/UNDEFINED/signal-datatype-information";

/// Lifecycle state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
	Unbound,
	Starting,
	Connected,
	Failed,
	Closed,
}

/// A failed exchange, before correlation.
#[derive(Debug)]
struct RequestFailure {
	method: Method,
	path: String,
	status: Option<u16>,
	message: String,
}

impl RequestFailure {
	fn into_error(self, hint: Option<String>, diagnostics: Diagnostics) -> Error {
		Error::Request {
			method: self.method.to_string(),
			path: self.path,
			status: self.status,
			message: self.message,
			hint,
			diagnostics,
		}
	}
}

/// A connection to one EmbeddedPlatform instance.
///
/// Methods take `&mut self`, so a session has at most one request in flight.
/// If the session launched the engine, dropping it without [`close`](Self::close)
/// kills the process.
#[derive(Debug)]
pub struct Session {
	client: EngineClient,
	adapter: ProtocolAdapter,
	launcher: Arc<dyn Launcher>,
	process: Option<ProcessHandle>,
	state: SessionState,
	config: EngineConfig,
	config_root: Option<PathBuf>,
	template_source: Option<PathBuf>,
	started_at: NaiveDateTime,
	log_file: Option<PathBuf>,
	message_marker: Option<String>,
	correlator: ErrorCorrelator,
	timeout_warned: bool,
	poll_interval: Duration,
	close_grace: Duration,
	migration_probe: Arc<dyn HelperProbe>,
	watcher: Option<MigrationWatcher>,
}

impl Session {
	/// Connects to a running engine, or starts one, and prepares it for use.
	pub async fn open(options: SessionOptions) -> Result<Self> {
		let started = Instant::now();
		let now = Local::now().naive_local();
		let started_at = now.with_nanosecond(0).unwrap_or(now);

		let config = options.config.clone().unwrap_or_default();
		let launcher = options.launcher.clone().unwrap_or_else(detect_launcher);
		let installation = resolve_installation(
			options.version.as_deref(),
			options.install_root.as_deref(),
			options.install_location.as_deref(),
			&config,
		);
		let known_version = installation.version.clone().or_else(|| launcher.default_version());
		let port = launcher.rest_port(options.port);
		let client = EngineClient::new(&options.host, port)?;

		let mut session = Session {
			log_file: launcher.log_file(known_version.as_deref(), port),
			adapter: ProtocolAdapter::new(
				known_version.as_deref().map(EngineVersion::parse).unwrap_or_default(),
			),
			client,
			launcher,
			process: None,
			state: SessionState::Unbound,
			config,
			config_root: options.config_root().map(Path::to_path_buf),
			template_source: options.report_template_source.clone(),
			started_at,
			message_marker: None,
			correlator: ErrorCorrelator::default(),
			timeout_warned: false,
			poll_interval: options.poll_interval,
			close_grace: options.close_grace,
			migration_probe: options
				.migration_probe
				.clone()
				.unwrap_or_else(|| Arc::new(ProcessListProbe::default())),
			watcher: None,
		};

		if session.client.is_available().await {
			info!(
				target: "ep.session",
				"Connected to BTC EmbeddedPlatform REST API at {}:{}",
				session.client.host(),
				session.client.port()
			);
		} else {
			session.state = SessionState::Starting;
			let launched = session.launch(&options, &installation, known_version.as_deref(), started).await;
			if let Err(e) = launched {
				session.state = SessionState::Failed;
				return Err(e);
			}
			info!(target: "ep.session", "BTC EmbeddedPlatform has started");
		}
		session.state = SessionState::Connected;

		session.negotiate_version(known_version).await;

		let preferences = session.config.preferences.clone();
		if !preferences.is_empty() || session.config.compiler.is_some() {
			session.apply_preferences(&preferences).await;
		}

		Ok(session)
	}

	async fn launch(
		&mut self,
		options: &SessionOptions,
		installation: &Installation,
		known_version: Option<&str>,
		started: Instant,
	) -> Result<()> {
		let mut port = self.client.port();
		if self.launcher.allows_port_search() {
			let host = self.client.host().to_string();
			port = tokio::task::spawn_blocking(move || find_open_port(&host, port))
				.await
				.map_err(|e| Error::Startup { reason: format!("port search aborted: {e}"), log_file: None })??;
			if port != self.client.port() {
				info!(target: "ep.session", port, "requested port is taken; using the next free one");
				self.client.set_port(port);
			}
		}

		let request = LaunchRequest {
			version: installation.version.clone(),
			install_location: installation.location.clone(),
			port,
			license_package: options.license_package.clone(),
			license_location: options
				.license_location
				.clone()
				.or_else(|| self.config.license_location.clone()),
			extra_vm_args: options.extra_vm_args.clone(),
			skip_companion: options.skip_companion_start,
		};
		self.log_file = self.launcher.log_file(known_version, port);
		self.process = Some(self.launcher.launch(&request)?);

		info!(
			target: "ep.session",
			"Connecting to BTC EmbeddedPlatform REST API at {}:{}",
			self.client.host(),
			port
		);
		self.wait_until_available(options.effective_startup_timeout(), options.startup_poll_interval, started)
			.await
	}

	async fn wait_until_available(
		&mut self,
		timeout: Duration,
		interval: Duration,
		started: Instant,
	) -> Result<()> {
		loop {
			if self.client.is_available().await {
				return Ok(());
			}
			if started.elapsed() > timeout {
				return Err(Error::Startup {
					reason: format!(
						"BTC EmbeddedPlatform did not respond within the startup timeout of {}s",
						timeout.as_secs_f64()
					),
					log_file: self.log_file.clone(),
				});
			}
			let alive = self.process.as_mut().is_some_and(|p| p.is_alive());
			if !alive {
				self.print_log_entries();
				return Err(Error::Startup {
					reason: "BTC EmbeddedPlatform failed to start".to_string(),
					log_file: self.log_file.clone(),
				});
			}
			tokio::time::sleep(interval).await;
		}
	}

	async fn negotiate_version(&mut self, known_version: Option<String>) {
		let reported = match self.client.send(Method::GET, "openapi.json", None).await {
			Ok(response) if response.is_success() => serde_json::from_str::<OpenApiDocument>(&response.body)
				.ok()
				.and_then(|doc| extract_version(&doc.info.version)),
			Ok(_) | Err(_) => None,
		};

		let version = match reported {
			Some(version) => version,
			None => {
				debug!(target: "ep.session", "engine did not report its version");
				known_version.as_deref().map(EngineVersion::parse).unwrap_or_default()
			}
		};
		debug!(target: "ep.session", %version, "negotiated protocol version");

		// An attached engine's log location depends on the version it reports.
		if self.process.is_none() || self.log_file.is_none() {
			if let Some(path) = self.launcher.log_file(Some(version.as_str()), self.client.port()) {
				self.log_file = Some(path);
			}
		}
		self.adapter = ProtocolAdapter::new(version);
	}

	pub fn state(&self) -> SessionState {
		self.state
	}

	pub fn version(&self) -> &EngineVersion {
		self.adapter.version()
	}

	pub fn host(&self) -> &str {
		self.client.host()
	}

	pub fn port(&self) -> u16 {
		self.client.port()
	}

	pub fn config(&self) -> &EngineConfig {
		&self.config
	}

	pub fn log_file(&self) -> Option<&Path> {
		self.log_file.as_deref()
	}

	/// Date of the most recent message marker.
	pub fn message_marker(&self) -> Option<&str> {
		self.message_marker.as_deref()
	}

	/// Local wall-clock time the session was opened, at second precision.
	pub fn started_at(&self) -> NaiveDateTime {
		self.started_at
	}

	/// Returns `true` if this session started the engine process itself.
	pub fn launched(&self) -> bool {
		self.process.is_some()
	}

	pub async fn get(&mut self, path: &str) -> Result<Value> {
		self.request(Request::get(path)).await
	}

	pub async fn post(&mut self, path: &str, body: Option<Value>) -> Result<Value> {
		self.request(with_optional_body(Request::post(path), body)).await
	}

	pub async fn put(&mut self, path: &str, body: Option<Value>) -> Result<Value> {
		self.request(with_optional_body(Request::put(path), body)).await
	}

	pub async fn patch(&mut self, path: &str, body: Option<Value>) -> Result<Value> {
		self.request(with_optional_body(Request::patch(path), body)).await
	}

	pub async fn delete(&mut self, path: &str) -> Result<Value> {
		self.request(Request::delete(path)).await
	}

	/// Sends a request and returns the useful part of the final response.
	///
	/// See [`EngineResponse::into_result`] for how the payload is picked.
	pub async fn request(&mut self, request: Request) -> Result<Value> {
		Ok(self.request_raw(request).await?.into_result())
	}

	/// Sends a request and returns the final response as received.
	///
	/// A `202` with a job id is polled to completion. If `request.timeout`
	/// elapses first, one cancellation request is sent and polling continues.
	pub async fn request_raw(&mut self, request: Request) -> Result<EngineResponse> {
		self.ensure_open()?;
		let Request { method, path, body, message, timeout } = request;

		if !is_profile_request(&path) {
			self.stop_watcher();
		}

		let path = if self.adapter.is_profile_load(&method, &path) {
			self.prepare_profile_load(&path).await?
		} else {
			if refreshes_message_marker(&method, &path) {
				self.refresh_message_marker().await?;
			}
			path
		};

		if let Some(message) = message {
			if !path.contains("progress") {
				info!(target: "ep.session", "{message}");
			}
		}

		let timeout = self.effective_timeout(timeout);
		let response = self.exchange(method, &path, body.as_ref()).await?;
		match response.job_id() {
			Some(job_id) => self.poll_job(job_id, timeout).await,
			None => Ok(response),
		}
	}

	fn ensure_open(&mut self) -> Result<()> {
		if self.state == SessionState::Connected {
			let exited = self.process.as_mut().is_some_and(|p| !p.is_alive());
			if exited {
				warn!(target: "ep.session", "engine process has exited");
				self.state = SessionState::Closed;
			}
		}
		match self.state {
			SessionState::Connected => Ok(()),
			_ => Err(Error::Closed),
		}
	}

	async fn prepare_profile_load(&mut self, path: &str) -> Result<String> {
		let Some(load) = self.adapter.profile_load(path) else {
			return Ok(path.to_string());
		};
		if self.is_localhost() && !load.file.is_file() {
			return Err(Error::Config(format!(
				"The profile '{}' cannot be found. Please ensure that the file is available.",
				load.file.display()
			)));
		}

		self.refresh_message_marker().await?;
		self.start_watcher();
		Ok(load.path)
	}

	async fn refresh_message_marker(&mut self) -> Result<()> {
		let value = self.exchange(Method::POST, "message-markers", None).await?.into_result();
		let marker: MessageMarker = serde_json::from_value(value)?;
		debug!(target: "ep.session", date = %marker.date, "message marker set");
		self.message_marker = Some(marker.date);
		Ok(())
	}

	fn effective_timeout(&mut self, timeout: Option<Duration>) -> Option<Duration> {
		let timeout = timeout?;
		if self.adapter.supports_job_cancel() {
			return Some(timeout);
		}
		if !self.timeout_warned {
			self.timeout_warned = true;
			warn!(
				target: "ep.job",
				version = %self.adapter.version(),
				"request timeouts need EmbeddedPlatform {JOB_CANCEL_SINCE} or newer; ignoring the timeout"
			);
		}
		None
	}

	fn is_localhost(&self) -> bool {
		url::Url::parse(self.client.host())
			.ok()
			.and_then(|url| url.host_str().map(str::to_string))
			.is_some_and(|host| matches!(host.as_str(), "localhost" | "127.0.0.1" | "[::1]"))
	}

	/// One HTTP round trip. Failures are correlated with engine diagnostics.
	async fn exchange(
		&mut self,
		method: Method,
		path: &str,
		body: Option<&Value>,
	) -> Result<EngineResponse> {
		let response = match self.client.send(method.clone(), path, body).await {
			Ok(response) => response,
			Err(e) => {
				let failure = RequestFailure {
					method,
					path: path.to_string(),
					status: None,
					message: e.to_string(),
				};
				return Err(self.correlate(failure).await);
			}
		};

		if response.is_success() {
			return Ok(response);
		}
		if is_benign_response(&response.body) {
			debug!(target: "ep.session", %path, status = response.status.as_u16(), "ignoring expected error response");
			return Ok(response);
		}

		let message = match response.body.trim() {
			"" => response.status.canonical_reason().unwrap_or("request failed").to_string(),
			body => body.to_string(),
		};
		let failure = RequestFailure {
			method,
			path: path.to_string(),
			status: Some(response.status.as_u16()),
			message,
		};
		Err(self.correlate(failure).await)
	}

	/// Turns a failure into an error carrying engine messages and log entries.
	///
	/// Collecting messages issues requests itself; a failure while collecting
	/// is returned without further collection.
	fn correlate(&mut self, failure: RequestFailure) -> BoxFut<'_, Error> {
		Box::pin(async move {
			if !self.correlator.enter() {
				self.correlator.exit();
				return failure.into_error(None, Diagnostics::default());
			}

			error!(target: "ep.diagnostics", "Encountered error: {}", failure.message);

			if let Some(hint) = known_failure_hint(&failure.message, &failure.path) {
				error!(target: "ep.diagnostics", "{hint}");
				self.correlator.exit();
				return failure.into_error(Some(hint), Diagnostics::default());
			}

			let messages = self.get_messages(None, None).await;
			let log_entries = self.get_errors_from_log(Some(self.started_at));
			self.correlator.exit();

			if !messages.is_empty() {
				error!(target: "ep.diagnostics", "Messages:");
				messages.iter().for_each(emit_message);
			}
			if !log_entries.is_empty() {
				error!(target: "ep.diagnostics", "Errors from log file:");
				for entry in &log_entries {
					error!(target: "ep.diagnostics", "{entry}");
				}
			}

			failure.into_error(None, Diagnostics { messages, log_entries })
		})
	}

	async fn poll_job(&mut self, job_id: String, timeout: Option<Duration>) -> Result<EngineResponse> {
		let mut job = LongRunningJob::new(job_id);
		debug!(target: "ep.job", job = job.id(), "waiting for long-running job");

		loop {
			tokio::time::sleep(self.poll_interval).await;

			if job.take_cancellation(timeout) {
				self.cancel_job(&job).await;
			}

			let path = self.adapter.progress_path(job.id());
			let response = self.exchange(Method::GET, &path, None).await?;
			job.record_poll();

			if response.status != StatusCode::ACCEPTED {
				debug!(
					target: "ep.job",
					job = job.id(),
					polls = job.polls(),
					cancelled = job.is_cancelled(),
					elapsed = ?job.elapsed(),
					"job finished"
				);
				return Ok(response);
			}
		}
	}

	/// Asks the engine to cancel a job. Never fails: the job's own final
	/// status is what the caller gets.
	async fn cancel_job(&mut self, job: &LongRunningJob) {
		warn!(target: "ep.job", job = job.id(), elapsed = ?job.elapsed(), "timeout reached; requesting cancellation");

		let body = ProgressCancel { progress_id: job.id().to_string() };
		let body = match serde_json::to_value(&body) {
			Ok(body) => body,
			Err(e) => {
				warn!(target: "ep.job", error = %e, "could not encode cancellation request");
				return;
			}
		};

		match self.client.send(Method::GET, self.adapter.cancel_path(), Some(&body)).await {
			Ok(response) if response.is_success() => {
				info!(target: "ep.job", job = job.id(), "cancellation requested");
			}
			Ok(response) => warn!(
				target: "ep.job",
				job = job.id(),
				status = response.status.as_u16(),
				body = %response.body.trim(),
				"cancellation was not accepted"
			),
			Err(e) => warn!(target: "ep.job", job = job.id(), error = %e, "cancellation request failed"),
		}
	}

	/// Messages recorded since the last profile operation, oldest first.
	///
	/// Returns an empty list when no marker is set or the query fails.
	pub async fn get_messages(&mut self, search: Option<&str>, severity: Option<Severity>) -> Vec<Message> {
		let Some(marker) = self.message_marker.clone() else {
			return Vec::new();
		};

		let mut path = format!("message-markers/{marker}/messages");
		let mut params = Vec::new();
		if let Some(search) = search {
			params.push(format!("search-string={}", urlencoding::encode(search)));
		}
		if let Some(severity) = severity {
			params.push(format!("severity={severity}"));
		}
		if !params.is_empty() {
			path.push('?');
			path.push_str(&params.join("&"));
		}

		let value = match self.get(&path).await {
			Ok(value) => value,
			Err(e) => {
				debug!(target: "ep.diagnostics", error = %e, "message query failed");
				return Vec::new();
			}
		};
		match serde_json::from_value::<Vec<Message>>(value) {
			Ok(mut messages) => {
				sort_messages(&mut messages);
				messages
			}
			Err(e) => {
				debug!(target: "ep.diagnostics", error = %e, "no messages in response");
				Vec::new()
			}
		}
	}

	/// Logs the messages since the last profile operation.
	pub async fn print_messages(&mut self, search: Option<&str>, severity: Option<Severity>) {
		let messages = self.get_messages(search, severity).await;
		if messages.is_empty() {
			info!(target: "ep.diagnostics", "No messages available.");
		}
		messages.iter().for_each(emit_message);
	}

	/// ERROR entries from the engine log, optionally only those at or after `since`.
	pub fn get_errors_from_log(&self, since: Option<NaiveDateTime>) -> Vec<LogEntry> {
		match &self.log_file {
			Some(path) => read_error_entries(path, since),
			None => Vec::new(),
		}
	}

	/// Logs the engine's ERROR entries written since the session started.
	pub fn print_log_entries(&self) {
		for entry in self.get_errors_from_log(Some(self.started_at)) {
			error!(target: "ep.diagnostics", "{entry}");
		}
	}

	/// Applies preferences, falling back to one-by-one updates if the batch
	/// is rejected.
	///
	/// Without a compiler setting among `preferences`, the configured
	/// `compiler` is used.
	pub async fn apply_preferences(&mut self, preferences: &BTreeMap<String, Value>) -> PreferenceOutcome {
		let plan = PreferenceApplier::new(self.config_root.as_deref(), self.template_source.as_deref())
			.plan(preferences);
		if let Some(compiler) = plan.compiler.or_else(|| self.config.compiler.clone()) {
			self.set_compiler(&compiler).await;
		}
		self.push_preferences(plan.batch).await
	}

	async fn push_preferences(&mut self, batch: Vec<Preference>) -> PreferenceOutcome {
		let total = batch.len();
		let mut outcome = PreferenceOutcome { applied: 0, total, failed: Vec::new() };
		if total == 0 {
			return outcome;
		}

		let body = match serde_json::to_value(&batch) {
			Ok(body) => body,
			Err(e) => {
				warn!(target: "ep.prefs", error = %e, "could not encode preferences");
				outcome.failed = batch.into_iter().map(|p| p.name).collect();
				return outcome;
			}
		};
		if self.put("preferences", Some(body)).await.is_ok() {
			info!(target: "ep.prefs", "Applied preferences from the config");
			outcome.applied = total;
			return outcome;
		}

		for preference in batch {
			let body = json!([{ "preferenceName": &preference.name, "preferenceValue": &preference.value }]);
			match self.put("preferences", Some(body)).await {
				Ok(_) => outcome.applied += 1,
				Err(e) => {
					warn!(target: "ep.prefs", preference = %preference.name, error = %e, "Failed to apply preference");
					outcome.failed.push(preference.name);
				}
			}
		}
		info!(
			target: "ep.prefs",
			"Successfully applied {} out of {} preferences.",
			outcome.applied,
			outcome.total
		);
		outcome
	}

	/// Configures the compiler. Headless hosts always get GCC.
	///
	/// Failures are ignored: the engine rejects setting a compiler that is
	/// already configured.
	pub async fn set_compiler(&mut self, compiler: &str) {
		let value = match self.launcher.kind() {
			LauncherKind::Headless => HEADLESS_COMPILER,
			LauncherKind::Desktop => compiler,
		};
		let body = json!([{ "preferenceName": COMPILER_SETTING, "preferenceValue": value }]);
		match self.client.send(Method::PUT, "preferences", Some(&body)).await {
			Ok(response) if response.is_success() => {
				debug!(target: "ep.prefs", compiler = value, "compiler configured");
			}
			Ok(response) => {
				debug!(target: "ep.prefs", compiler = value, status = response.status.as_u16(), "compiler not changed");
			}
			Err(e) => debug!(target: "ep.prefs", error = %e, "compiler request failed"),
		}
	}

	/// Returns `true` if the engine can report signal data-type details.
	pub async fn supports_signal_info(&mut self) -> bool {
		match self.client.send(Method::GET, SIGNAL_INFO_PROBE_PATH, None).await {
			Ok(response) => response.body.contains("No signal"),
			Err(_) => false,
		}
	}

	/// Loads a profile, discarding the current one.
	pub async fn open_profile(&mut self, path: impl AsRef<Path>) -> Result<Value> {
		let file = path.as_ref().to_string_lossy().replace('\\', "/");
		let request = Request::get(format!(
			"profiles/{}?discardCurrentProfile=true",
			urlencoding::encode(&file)
		))
		.with_message(format!("Loading profile {file}"));
		self.request(request).await
	}

	/// Creates an empty profile, discarding the current one.
	pub async fn create_profile(&mut self) -> Result<Value> {
		self.request(Request::post("profiles?discardCurrentProfile=true").with_message("Creating profile"))
			.await
	}

	pub async fn save_profile(&mut self, path: impl AsRef<Path>) -> Result<Value> {
		let file = path.as_ref().to_string_lossy().replace('\\', "/");
		self.request(
			Request::put("profiles")
				.with_body(json!({ "path": file }))
				.with_message(format!("Saving profile to {file}")),
		)
		.await
	}

	/// Asks the engine to quit and waits for it to stop answering.
	///
	/// If this session launched the engine and it still answers after the
	/// grace period, the process is killed.
	pub async fn close(&mut self) -> Result<()> {
		if self.state == SessionState::Closed {
			return Ok(());
		}
		self.stop_watcher();
		info!(target: "ep.session", "Closing BTC EmbeddedPlatform");

		if let Err(e) = self.client.send(Method::DELETE, FORCE_QUIT_PATH, None).await {
			debug!(target: "ep.session", error = %e, "quit request did not complete");
		}

		let mut result = Ok(());
		if let Some(process) = self.process.as_mut() {
			let waiting = Instant::now();
			while self.client.is_available().await {
				if waiting.elapsed() > self.close_grace {
					warn!(
						target: "ep.session",
						pid = ?process.id(),
						grace = ?self.close_grace,
						"engine still responding; killing the process"
					);
					result = process.terminate().map_err(Error::from);
					break;
				}
				tokio::time::sleep(self.poll_interval).await;
			}
		}

		self.state = SessionState::Closed;
		result
	}

	fn start_watcher(&mut self) {
		self.stop_watcher();
		self.watcher = Some(MigrationWatcher::spawn(self.migration_probe.clone(), self.poll_interval));
	}

	fn stop_watcher(&mut self) {
		if let Some(watcher) = self.watcher.take() {
			watcher.finish();
		}
	}
}

impl Drop for Session {
	fn drop(&mut self) {
		self.stop_watcher();
		if self.state == SessionState::Closed {
			return;
		}
		if let Some(process) = self.process.as_mut() {
			if process.is_alive() {
				debug!(target: "ep.session", pid = ?process.id(), "session dropped; killing engine process");
				if let Err(e) = process.terminate() {
					warn!(target: "ep.session", error = %e, "failed to kill engine process");
				}
			}
		}
	}
}

fn with_optional_body(request: Request, body: Option<Value>) -> Request {
	match body {
		Some(body) => request.with_body(body),
		None => request,
	}
}
