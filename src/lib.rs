//! Asynchronous vote pipeline
//!
//! Votes are published to a queue, counted by a background consumer and
//! read back as a tally. A W3C trace context travels with every vote across
//! the queue hop.

pub mod api;
pub mod config;
pub mod errors;
pub mod pipeline;
pub mod telemetry;
pub mod types;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use errors::{Error, Result};

use config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize logging with default settings
pub fn init() -> Result<()> {
    init_with(&LoggingConfig::default())
}

/// Initialize logging from configuration
///
/// `RUST_LOG` overrides the configured level when set.
pub fn init_with(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("{},lapin=warn", logging.level).into());

    let installed = match logging.format.as_str() {
        "json" => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init(),
        _ => tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(filter)
            .try_init(),
    };
    installed.map_err(|e| Error::configuration(format!("Failed to initialize logging: {e}")))?;

    tracing::info!("🗳️  Vote pipeline v{} initialized", VERSION);
    Ok(())
}

/// Root span carrying the process resource attributes
///
/// Everything a service logs runs inside this span, so each line carries
/// the service name and version, host, process id and platform.
pub fn service_span(service_name: &str) -> tracing::Span {
    tracing::info_span!(
        "service",
        service.name = service_name,
        service.version = VERSION,
        host.name = %host_name(),
        process.pid = std::process::id(),
        os.type = std::env::consts::OS,
        os.arch = std::env::consts::ARCH,
    )
}

fn host_name() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::capture_logs;

    #[test]
    fn test_service_span_enriches_log_lines() {
        let (logs, _guard) = capture_logs();

        {
            let _entered = service_span("vote-test").entered();
            tracing::info!("hello from the service");
        }

        let logs = logs.contents();
        assert!(logs.contains("hello from the service"));
        assert!(logs.contains("service.name=") && logs.contains("vote-test"));
        assert!(logs.contains("service.version=") && logs.contains(VERSION));
        assert!(logs.contains("host.name="));
        assert!(logs.contains(&format!("process.pid={}", std::process::id())));
        assert!(logs.contains("os.type=") && logs.contains(std::env::consts::OS));
    }

    #[test]
    fn test_host_name_is_never_empty() {
        assert!(!host_name().is_empty());
    }
}
