mod support;

use std::fs;
use std::sync::Arc;

use ep::{Request, Session};
use serde_json::json;
use support::{Behavior, EngineState, MARKER_DATE, MockEngine, ScriptedLauncher, options};

async fn session_for(version: &str) -> (Session, MockEngine) {
	let engine = MockEngine::start(EngineState::new(version));
	let launcher = Arc::new(ScriptedLauncher::new(Behavior::Idle));
	let session = Session::open(options(engine.port, launcher)).await.unwrap();
	(session, engine)
}

fn profile_file() -> (tempfile::TempDir, String) {
	let dir = tempfile::tempdir().unwrap();
	let file = dir.path().join("model.epp");
	fs::write(&file, b"profile").unwrap();
	let file = file.to_string_lossy().replace('\\', "/");
	(dir, file)
}

#[tokio::test]
async fn missing_local_profile_sends_nothing() {
	let (mut session, engine) = session_for("24.2p0").await;
	let before = engine.requests().len();

	let err = session.open_profile("/definitely/not/here/model.epp").await.unwrap_err();

	assert!(err.is_config(), "unexpected error: {err}");
	assert_eq!(engine.requests().len(), before);
	assert_eq!(session.message_marker(), None);
}

#[tokio::test]
async fn legacy_engine_loads_through_profiles_path() {
	let (_dir, file) = profile_file();
	let (mut session, engine) = session_for("24.2p0").await;

	session.open_profile(&file).await.unwrap();

	let loads = engine.matching("GET", "profiles/");
	assert_eq!(loads.len(), 1);
	assert_eq!(
		loads[0].path,
		format!("profiles/{}?discardCurrentProfile=true", urlencoding::encode(&file))
	);
	assert_eq!(session.message_marker(), Some(MARKER_DATE));
}

#[tokio::test]
async fn current_engine_loads_through_openprofile() {
	let (_dir, file) = profile_file();
	let (mut session, engine) = session_for("25.3p0").await;

	session.get(&format!("profiles/{file}")).await.unwrap();

	let loads = engine.matching("GET", "openprofile");
	assert_eq!(loads.len(), 1);
	assert_eq!(loads[0].path, format!("openprofile?path={}", urlencoding::encode(&file)));
	assert_eq!(engine.count("GET", "profiles/"), 0);
}

#[tokio::test]
async fn marker_is_set_before_the_load() {
	let (_dir, file) = profile_file();
	let (mut session, engine) = session_for("25.3p0").await;

	session.open_profile(&file).await.unwrap();

	let paths: Vec<String> = engine
		.requests()
		.into_iter()
		.filter(|r| r.path.starts_with("message-markers") || r.path.starts_with("openprofile"))
		.map(|r| r.path)
		.collect();
	assert_eq!(paths.len(), 2);
	assert_eq!(paths[0], "message-markers");
	assert!(paths[1].starts_with("openprofile?path="));
}

#[tokio::test]
async fn creating_and_saving_profiles() -> anyhow::Result<()> {
	let (mut session, engine) = session_for("24.2p0").await;

	session.create_profile().await?;
	session.save_profile("/tmp/out.epp").await?;

	assert_eq!(engine.count("POST", "message-markers"), 1);
	assert_eq!(engine.count("POST", "profiles?discardCurrentProfile=true"), 1);
	let saves = engine.matching("PUT", "profiles");
	assert_eq!(saves.len(), 1);
	let body: serde_json::Value = serde_json::from_str(&saves[0].body)?;
	assert_eq!(body, json!({ "path": "/tmp/out.epp" }));
	Ok(())
}

#[tokio::test]
async fn non_profile_requests_skip_the_marker() {
	let (mut session, engine) = session_for("24.2p0").await;

	let _ = session.request(Request::get("scopes")).await;
	session.put("profiles", Some(json!({ "path": "/tmp/a.epp" }))).await.unwrap();

	assert_eq!(engine.count("POST", "message-markers"), 0);
}
