//! HTTP exchange with the engine's REST endpoint.
//!
//! [`EngineClient`] knows how to build URLs under `<host>:<port>/ep/`, send a
//! request with the engine's headers, and read the response back in full.
//! Anything that needs session state (job polling, error correlation,
//! message markers) lives in [`Session`](crate::Session).

use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use tracing::trace;

use ep_protocol::JobAccepted;

const HEALTH_PATH: &str = "test";
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// A request as issued by session callers.
#[derive(Debug, Clone)]
pub struct Request {
	pub method: Method,
	pub path: String,
	pub body: Option<Value>,
	/// Progress text logged before the request is sent.
	pub message: Option<String>,
	/// Cancel the resulting job if it runs longer than this.
	pub timeout: Option<Duration>,
}

impl Request {
	pub fn new(method: Method, path: impl Into<String>) -> Self {
		Self { method, path: path.into(), body: None, message: None, timeout: None }
	}

	pub fn get(path: impl Into<String>) -> Self {
		Self::new(Method::GET, path)
	}

	pub fn post(path: impl Into<String>) -> Self {
		Self::new(Method::POST, path)
	}

	pub fn put(path: impl Into<String>) -> Self {
		Self::new(Method::PUT, path)
	}

	pub fn patch(path: impl Into<String>) -> Self {
		Self::new(Method::PATCH, path)
	}

	pub fn delete(path: impl Into<String>) -> Self {
		Self::new(Method::DELETE, path)
	}

	pub fn with_body(mut self, body: Value) -> Self {
		self.body = Some(body);
		self
	}

	pub fn with_message(mut self, message: impl Into<String>) -> Self {
		self.message = Some(message.into());
		self
	}

	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = Some(timeout);
		self
	}
}

/// A fully read engine response.
#[derive(Debug, Clone)]
pub struct EngineResponse {
	pub status: StatusCode,
	pub body: String,
}

impl EngineResponse {
	pub fn is_success(&self) -> bool {
		self.status.is_success()
	}

	pub fn json(&self) -> Option<Value> {
		serde_json::from_str(&self.body).ok()
	}

	/// Job id of a `202 Accepted` reply that started a long-running job.
	pub fn job_id(&self) -> Option<String> {
		if self.status != StatusCode::ACCEPTED {
			return None;
		}
		serde_json::from_str::<JobAccepted>(&self.body)
			.ok()
			.map(|accepted| accepted.job_id)
	}

	/// The useful payload of the response.
	///
	/// JSON objects with a `result` field yield that field; other JSON is
	/// returned whole; non-JSON text becomes a string; an empty body is `null`.
	pub fn into_result(self) -> Value {
		match serde_json::from_str::<Value>(&self.body) {
			Ok(Value::Object(mut map)) => match map.remove("result") {
				Some(result) => result,
				None => Value::Object(map),
			},
			Ok(value) => value,
			Err(_) if self.body.trim().is_empty() => Value::Null,
			Err(_) => Value::String(self.body),
		}
	}
}

/// Normalizes a caller path relative to the `/ep/` root.
///
/// Leading slashes and a duplicated `ep/` prefix are dropped, backslashes
/// become forward slashes, and spaces are escaped.
pub fn normalize_path(path: &str) -> String {
	let path = path.replace('\\', "/").replace(' ', "%20");
	let mut rest = path.trim_start_matches('/');
	while let Some(stripped) = rest.strip_prefix("ep/") {
		rest = stripped.trim_start_matches('/');
	}
	rest.to_string()
}

/// HTTP client bound to one engine endpoint.
#[derive(Debug, Clone)]
pub struct EngineClient {
	http: Client,
	host: String,
	port: u16,
}

impl EngineClient {
	pub fn new(host: impl Into<String>, port: u16) -> reqwest::Result<Self> {
		let mut headers = HeaderMap::new();
		headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/plain"));
		headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
		let http = Client::builder().default_headers(headers).build()?;

		let host = host.into().trim_end_matches('/').to_string();
		Ok(Self { http, host, port })
	}

	pub fn host(&self) -> &str {
		&self.host
	}

	pub fn port(&self) -> u16 {
		self.port
	}

	/// Points the client at another port (after a port search).
	pub fn set_port(&mut self, port: u16) {
		self.port = port;
	}

	pub fn url(&self, path: &str) -> String {
		format!("{}:{}/ep/{}", self.host, self.port, normalize_path(path))
	}

	/// Sends one request and reads the whole response.
	pub async fn send(
		&self,
		method: Method,
		path: &str,
		body: Option<&Value>,
	) -> reqwest::Result<EngineResponse> {
		let url = self.url(path);
		trace!(target: "ep.session", %method, %url, "sending request");

		let mut request = self.http.request(method, &url);
		if let Some(body) = body {
			request = request.json(body);
		}
		let response = request.send().await?;
		let status = response.status();
		let body = response.text().await?;

		trace!(target: "ep.session", %url, status = status.as_u16(), "received response");
		Ok(EngineResponse { status, body })
	}

	/// Returns `true` if the health endpoint answers with a success status.
	pub async fn is_available(&self) -> bool {
		match self.http.get(self.url(HEALTH_PATH)).timeout(HEALTH_TIMEOUT).send().await {
			Ok(response) => response.status().is_success(),
			Err(_) => false,
		}
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	fn response(status: u16, body: &str) -> EngineResponse {
		EngineResponse { status: StatusCode::from_u16(status).unwrap(), body: body.into() }
	}

	#[test]
	fn url_building() {
		let client = EngineClient::new("http://localhost/", 1337).unwrap();
		assert_eq!(client.url("/ep/profiles"), "http://localhost:1337/ep/profiles");
		assert_eq!(client.url("ep/ep/profiles"), "http://localhost:1337/ep/profiles");
		assert_eq!(client.url("scopes"), "http://localhost:1337/ep/scopes");
	}

	#[test]
	fn path_escaping() {
		assert_eq!(normalize_path(r"profiles\my profile.epp"), "profiles/my%20profile.epp");
	}

	#[test]
	fn result_field_is_unwrapped() {
		assert_eq!(response(200, r#"{"result": [1, 2]}"#).into_result(), json!([1, 2]));
		assert_eq!(response(200, r#"{"uid": "a"}"#).into_result(), json!({"uid": "a"}));
		assert_eq!(response(200, "OK").into_result(), json!("OK"));
		assert_eq!(response(204, "").into_result(), Value::Null);
	}

	#[test]
	fn job_id_only_on_accepted() {
		assert_eq!(response(202, r#"{"jobID": "9"}"#).job_id().as_deref(), Some("9"));
		assert_eq!(response(200, r#"{"jobID": "9"}"#).job_id(), None);
		assert_eq!(response(202, r#"{"progress": 50}"#).job_id(), None);
	}
}
