//! Logging, panic reporting and the Prometheus recorder.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::panic;
use std::sync::OnceLock;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global tracing subscriber.
///
/// `verbose` forces the `debug` level; otherwise `RUST_LOG` is honoured and
/// falls back to `info`.
pub fn init_logging(verbose: bool, json: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    };
    if result.is_err() {
        // Already installed (tests, or a second init call)
        warn!("Tracing subscriber already initialized");
    }
}

/// Log panics through `tracing` so they reach the same sink as everything
/// else. Installed at most once per process.
pub fn install_tracing_panic_hook(app_name: &'static str) {
    static INSTALLED: OnceLock<()> = OnceLock::new();

    INSTALLED.get_or_init(|| {
        let default_hook = panic::take_hook();
        let include_backtrace = std::env::var("STAFFING_LOG_BACKTRACE")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        panic::set_hook(Box::new(move |info| {
            let thread = std::thread::current();
            let thread_name = thread.name().unwrap_or("unknown");

            let location = info
                .location()
                .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()));
            let message = info
                .payload()
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| info.payload().downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "panic payload not string".into());

            tracing::error!(
                application = app_name,
                %thread_name,
                location = location.as_deref().unwrap_or("unknown"),
                panic_message = %message,
                "Panic captured"
            );

            if include_backtrace {
                default_hook(info);
            }
        }));
    });
}

/// Install the global Prometheus recorder and return a handle for rendering
/// `/metrics`. Repeated calls return the first handle.
pub fn install_metrics_recorder() -> Option<PrometheusHandle> {
    if let Some(existing) = PROMETHEUS_HANDLE.get() {
        return Some(existing.clone());
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            let _ = PROMETHEUS_HANDLE.set(handle);
            info!("Prometheus recorder installed");
            PROMETHEUS_HANDLE.get().cloned()
        }
        Err(err) => {
            warn!(error = %err, "Failed to install Prometheus recorder");
            PROMETHEUS_HANDLE.get().cloned()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recorder_is_installed_once() {
        let first = install_metrics_recorder();
        let second = install_metrics_recorder();
        assert!(first.is_some());
        assert!(second.is_some());
    }

    #[test]
    fn test_init_logging_twice_does_not_panic() {
        init_logging(false, false);
        init_logging(true, true);
    }
}
