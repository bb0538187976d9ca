//! Wire types shared by the EmbeddedPlatform client crates.
//!
//! Everything in here is plain data: request and response bodies as they
//! travel over HTTP, plus [`EngineVersion`], the comparable version label the
//! engine reports about itself. No I/O happens in this crate.

mod types;
mod version;

pub use types::{
	JobAccepted, Message, MessageMarker, OpenApiDocument, OpenApiInfo, Preference, ProgressCancel,
	Severity,
};
pub use version::{
	DEFAULT_VERSION, EngineVersion, HEADLESS_APP_SINCE, JOB_CANCEL_SINCE, OPEN_PROFILE_SINCE,
	PROGRESS_QUERY_SINCE,
};
