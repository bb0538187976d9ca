//! Turning configured preferences into engine preference updates.
//!
//! A few preferences need care before they are sent: the custom MATLAB
//! version only takes effect together with `GENERAL_MATLAB_VERSION=CUSTOM`,
//! the compiler goes through its own best-effort path, and folder
//! preferences may be given relative to the configuration file.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use ep_protocol::Preference;
use serde_json::Value;
use tracing::{info, warn};

pub const MATLAB_CUSTOM_VERSION: &str = "GENERAL_MATLAB_CUSTOM_VERSION";
pub const MATLAB_VERSION: &str = "GENERAL_MATLAB_VERSION";
pub const COMPILER_SETTING: &str = "GENERAL_COMPILER_SETTING";
pub const REPORT_TEMPLATE_FOLDER: &str = "REPORT_TEMPLATE_FOLDER";
pub const EC_CONFIGURATION_FOLDER: &str = "ARCHITECTURE_EC_CUSTOM_USER_CONFIGURATION_FOLDER";

/// Compiler forced on headless hosts.
pub const HEADLESS_COMPILER: &str = "GCC (64bit)";

/// What to send for a set of configured preferences.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreferencePlan {
	/// Preferences pushed together in one `PUT preferences`.
	pub batch: Vec<Preference>,
	/// Compiler to configure separately, if one was requested.
	pub compiler: Option<String>,
}

/// Result of pushing a preference batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreferenceOutcome {
	pub applied: usize,
	pub total: usize,
	/// Names of preferences the engine rejected.
	pub failed: Vec<String>,
}

impl PreferenceOutcome {
	pub fn all_applied(&self) -> bool {
		self.applied == self.total
	}
}

/// Expands configured preferences into a [`PreferencePlan`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PreferenceApplier<'a> {
	config_root: Option<&'a Path>,
	template_source: Option<&'a Path>,
}

impl<'a> PreferenceApplier<'a> {
	pub fn new(config_root: Option<&'a Path>, template_source: Option<&'a Path>) -> Self {
		Self { config_root, template_source }
	}

	pub fn plan(&self, preferences: &BTreeMap<String, Value>) -> PreferencePlan {
		let mut plan = PreferencePlan::default();

		for (name, value) in preferences {
			match name.as_str() {
				MATLAB_CUSTOM_VERSION => {
					plan.batch.push(Preference::new(MATLAB_VERSION, "CUSTOM"));
					plan.batch.push(Preference::from_value(name.as_str(), value));
				}
				COMPILER_SETTING => {
					plan.compiler = Some(Preference::from_value(name.as_str(), value).value);
				}
				REPORT_TEMPLATE_FOLDER => {
					if let Some(folder) = self.folder(name, value) {
						if !folder.is_dir() {
							install_report_templates(&folder, self.template_source);
						}
						plan.batch.push(Preference::new(name.as_str(), path_value(&folder)));
					}
				}
				EC_CONFIGURATION_FOLDER => {
					if let Some(folder) = self.folder(name, value) {
						plan.batch.push(Preference::new(name.as_str(), path_value(&folder)));
					}
				}
				_ => plan.batch.push(Preference::from_value(name.as_str(), value)),
			}
		}

		plan
	}

	/// Makes `path` absolute against the configuration file's directory.
	pub fn resolve_path(&self, path: &str) -> Option<PathBuf> {
		let path = Path::new(path);
		if path.is_absolute() {
			return Some(path.to_path_buf());
		}
		self.config_root.map(|root| root.join(path))
	}

	fn folder(&self, name: &str, value: &Value) -> Option<PathBuf> {
		let raw = Preference::from_value(name, value).value;
		let resolved = self.resolve_path(&raw);
		if resolved.is_none() {
			warn!(
				target: "ep.prefs",
				preference = name,
				path = %raw,
				"cannot resolve relative path without a configuration file location; skipping"
			);
		}
		resolved
	}
}

fn path_value(path: &Path) -> String {
	path.to_string_lossy().replace('\\', "/")
}

/// Creates `target` and copies the `*.xml` templates from `source` into it.
///
/// Failure is logged, not returned: the preference is still applied.
/// Returns the number of templates copied.
pub fn install_report_templates(target: &Path, source: Option<&Path>) -> usize {
	let installed = fs::create_dir_all(target).and_then(|()| match source {
		Some(source) => copy_templates(target, source),
		None => Ok(0),
	});
	match installed {
		Ok(copied) if source.is_some() => {
			info!(
				target: "ep.prefs",
				folder = %target.display(),
				copied,
				"Installed project report templates"
			);
			copied
		}
		Ok(_) => {
			warn!(
				target: "ep.prefs",
				folder = %target.display(),
				"No report template source configured; the template folder stays empty"
			);
			0
		}
		Err(e) => {
			warn!(
				target: "ep.prefs",
				folder = %target.display(),
				error = %e,
				"Could not install report templates"
			);
			0
		}
	}
}

fn copy_templates(target: &Path, source: &Path) -> io::Result<usize> {
	let mut copied = 0;
	for entry in fs::read_dir(source)? {
		let entry = entry?;
		let path = entry.path();
		let is_xml = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("xml"));
		if is_xml && entry.file_type()?.is_file() {
			fs::copy(&path, target.join(entry.file_name()))?;
			copied += 1;
		}
	}
	Ok(copied)
}

#[cfg(test)]
mod tests {
	use serde_json::json;
	use tempfile::TempDir;

	use super::*;

	fn prefs(entries: &[(&str, Value)]) -> BTreeMap<String, Value> {
		entries.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
	}

	#[test]
	fn custom_matlab_version_forces_custom_mode() {
		let plan = PreferenceApplier::default()
			.plan(&prefs(&[(MATLAB_CUSTOM_VERSION, json!("MATLAB R2022b (64-bit)"))]));
		assert_eq!(
			plan.batch,
			vec![
				Preference::new(MATLAB_VERSION, "CUSTOM"),
				Preference::new(MATLAB_CUSTOM_VERSION, "MATLAB R2022b (64-bit)"),
			]
		);
	}

	#[test]
	fn compiler_is_split_out() {
		let plan = PreferenceApplier::default().plan(&prefs(&[
			(COMPILER_SETTING, json!("MSVC Compiler")),
			("GENERAL_SOME_FLAG", json!(true)),
		]));
		assert_eq!(plan.compiler.as_deref(), Some("MSVC Compiler"));
		assert_eq!(plan.batch, vec![Preference::new("GENERAL_SOME_FLAG", "true")]);
	}

	#[test]
	fn relative_folder_resolved_against_config_root() {
		let root = TempDir::new().unwrap();
		fs::create_dir(root.path().join("ec")).unwrap();
		let applier = PreferenceApplier::new(Some(root.path()), None);

		let plan = applier.plan(&prefs(&[(EC_CONFIGURATION_FOLDER, json!("ec"))]));
		assert_eq!(plan.batch.len(), 1);
		assert_eq!(plan.batch[0].value, path_value(&root.path().join("ec")));
	}

	#[test]
	fn relative_folder_without_root_is_skipped() {
		let plan = PreferenceApplier::default().plan(&prefs(&[(EC_CONFIGURATION_FOLDER, json!("ec"))]));
		assert!(plan.batch.is_empty());
	}

	#[test]
	fn missing_template_folder_is_installed() {
		let root = TempDir::new().unwrap();
		let source = TempDir::new().unwrap();
		fs::write(source.path().join("report.xml"), "<template/>").unwrap();
		fs::write(source.path().join("notes.txt"), "skip").unwrap();

		let applier = PreferenceApplier::new(Some(root.path()), Some(source.path()));
		let plan = applier.plan(&prefs(&[(REPORT_TEMPLATE_FOLDER, json!("templates"))]));

		let installed = root.path().join("templates");
		assert!(installed.join("report.xml").is_file());
		assert!(!installed.join("notes.txt").exists());
		assert_eq!(plan.batch[0].value, path_value(&installed));
	}

	#[test]
	fn template_folder_without_source_warns() {
		let root = TempDir::new().unwrap();
		let target = root.path().join("templates");

		let (copied, events) = crate::logging::capture_events(|| install_report_templates(&target, None));

		assert_eq!(copied, 0);
		assert!(target.is_dir());
		assert_eq!(events, [("ep.prefs".to_string(), tracing::Level::WARN)]);
	}

	#[test]
	fn outcome_counts() {
		let outcome = PreferenceOutcome { applied: 2, total: 3, failed: vec!["X".into()] };
		assert!(!outcome.all_applied());
	}
}
