//! Tracing bootstrap for upload-sftp.
//!
//! Installs an `EnvFilter` + stderr `fmt` subscriber, and with the
//! `telemetry` feature an OTLP exporter layer when the standard OTel
//! environment variables ask for one:
//!
//! ```bash
//! OTEL_EXPORTER_OTLP_ENDPOINT=http://localhost:4317 \
//!     cargo run -p upload-sftp-server --features telemetry
//! ```
//!
//! Set `OTEL_SDK_DISABLED=true` to explicitly disable even when the endpoint is set.

#[cfg(feature = "telemetry")]
mod otel;

#[cfg(feature = "telemetry")]
pub use otel::{otel_layer, OtelGuard};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Check whether OTel export should be enabled.
///
/// Returns `true` when standard OTel env vars indicate export is desired:
/// - `OTEL_SDK_DISABLED` is NOT set to `"true"`
/// - AND at least one of:
///   - `OTEL_EXPORTER_OTLP_ENDPOINT` is set
///   - `OTEL_TRACES_EXPORTER` is set (and not `"none"`)
pub fn otel_enabled() -> bool {
    otel_enabled_with(|key| std::env::var(key).ok())
}

fn otel_enabled_with(var: impl Fn(&str) -> Option<String>) -> bool {
    // Explicit disable takes priority
    if var("OTEL_SDK_DISABLED").is_some_and(|v| v.eq_ignore_ascii_case("true")) {
        return false;
    }

    if var("OTEL_EXPORTER_OTLP_ENDPOINT").is_some() {
        return true;
    }

    var("OTEL_TRACES_EXPORTER").is_some_and(|exporter| !exporter.eq_ignore_ascii_case("none"))
}

/// `RUST_LOG` if set, otherwise `default_directive` (e.g. `"info"`).
fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Keeps exporters alive; drop it last in `main`.
#[must_use = "dropping the guard flushes and stops span export"]
pub struct TelemetryGuard {
    #[cfg(feature = "telemetry")]
    _otel: Option<OtelGuard>,
}

/// Install the global subscriber for `service_name`.
#[cfg(feature = "telemetry")]
pub fn init(service_name: &str, default_directive: &str) -> TelemetryGuard {
    let registry = tracing_subscriber::registry()
        .with(env_filter(default_directive))
        .with(fmt::layer().with_writer(std::io::stderr));

    let exporter = if otel_enabled() {
        match otel_layer(service_name) {
            Ok(pair) => Some(pair),
            Err(e) => {
                eprintln!("OTel exporter disabled: {e}");
                None
            }
        }
    } else {
        None
    };

    let (layer, guard) = match exporter {
        Some((layer, guard)) => (Some(layer), Some(guard)),
        None => (None, None),
    };
    registry.with(layer).init();
    TelemetryGuard { _otel: guard }
}

/// Install the global subscriber for `service_name`.
#[cfg(not(feature = "telemetry"))]
pub fn init(_service_name: &str, default_directive: &str) -> TelemetryGuard {
    tracing_subscriber::registry()
        .with(env_filter(default_directive))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
    TelemetryGuard {}
}
