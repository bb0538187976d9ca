//! Log output for scripts driving a session.
//!
//! Library code only emits `tracing` events under the `ep.*` targets; this
//! module is the optional subscriber for callers that have none of their own.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Filter directives for a verbosity level.
///
/// 0 shows progress and engine messages, 1 adds request-level detail, and
/// anything higher turns on debug output from every crate, reqwest included.
pub fn default_filter(verbosity: u8) -> &'static str {
	match verbosity {
		0 => "warn,ep=info",
		1 => "info,ep=debug",
		_ => "debug",
	}
}

/// Installs a compact stderr subscriber.
///
/// `RUST_LOG` overrides the verbosity mapping. Calling this twice, or after
/// the host installed its own subscriber, is a no-op.
pub fn init_logging(verbosity: u8) {
	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity)));

	let _ = tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(std::io::stderr.with_max_level(tracing::Level::TRACE))
		.with_target(true)
		.compact()
		.try_init();
}

/// Runs `f` under a subscriber that records the target and level of every event.
#[cfg(test)]
pub(crate) fn capture_events<T>(f: impl FnOnce() -> T) -> (T, Vec<(String, tracing::Level)>) {
	use std::sync::Arc;

	use parking_lot::Mutex;
	use tracing::{Event, Subscriber};
	use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

	#[derive(Clone, Default)]
	struct Recorder(Arc<Mutex<Vec<(String, tracing::Level)>>>);

	impl<S: Subscriber> Layer<S> for Recorder {
		fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
			let meta = event.metadata();
			self.0.lock().push((meta.target().to_string(), *meta.level()));
		}
	}

	let recorder = Recorder::default();
	let value = tracing::subscriber::with_default(tracing_subscriber::registry().with(recorder.clone()), f);
	let events = recorder.0.lock().clone();
	(value, events)
}

#[cfg(test)]
mod tests {
	use tracing_subscriber::layer::SubscriberExt;

	use super::*;

	#[test]
	fn verbosity_levels() {
		assert_eq!(default_filter(0), "warn,ep=info");
		assert_eq!(default_filter(1), "info,ep=debug");
		assert_eq!(default_filter(7), "debug");
	}

	#[test]
	fn repeated_init_is_harmless() {
		init_logging(0);
		init_logging(2);
	}

	#[test]
	fn target_directives_select_events() {
		let filter = EnvFilter::new("warn,ep.job=debug");
		let subscriber = tracing_subscriber::registry().with(filter);
		tracing::subscriber::with_default(subscriber, || {
			assert!(tracing::enabled!(target: "ep.job", tracing::Level::DEBUG));
			assert!(!tracing::enabled!(target: "ep.session", tracing::Level::DEBUG));
		});
	}
}
