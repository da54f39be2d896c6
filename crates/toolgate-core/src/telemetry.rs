//! Subscriber setup for binaries that embed a gate pipeline.
//!
//! The crates only emit events. A host calls [`init_tracing`] once; without
//! `RUST_LOG` the pipeline's own targets log at the requested level and
//! everything else stays at `warn`.

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Targets the pipeline emits under.
const GATE_TARGETS: [&str; 2] = ["toolgate_core", "toolgate_state"];

/// Output encoding for gate events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// Newline-delimited JSON, one object per event.
    Json,
}

/// Filter used when `RUST_LOG` is unset: gate targets at `level`, the rest
/// at `warn`.
pub fn default_directives(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    GATE_TARGETS
        .iter()
        .fold(String::from("warn"), |mut directives, target| {
            directives.push_str(&format!(",{target}={level}"));
            directives
        })
}

/// Install the global subscriber. Later calls in the same process are
/// no-ops, so tests and hosts may both call it.
pub fn init_tracing(format: LogFormat, level: Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match format {
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
        LogFormat::Pretty => registry.with(fmt::layer()).try_init(),
    };
    if installed.is_ok() {
        tracing::debug!(event = "telemetry.installed", ?format);
    }
}
