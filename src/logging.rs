//! Process-wide log subscriber.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Env var holding an `EnvFilter` directive, e.g. `azdep_management=debug`.
pub const LOG_ENV: &str = "AZDEPLOY_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[cfg_attr(not(feature = "logs-json"), default)]
    Text,
    #[cfg_attr(feature = "logs-json", default)]
    Json,
}

/// Install the subscriber. `log` records from the management crate are
/// forwarded into it. Returns `false` when a subscriber was already set.
pub fn init_logging(format: LogFormat) -> bool {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let installed = match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
    };
    installed.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_a_no_op() {
        let _ = init_logging(LogFormat::Text);
        assert!(!init_logging(LogFormat::Json));
        log::info!("still logging after a repeated init");
    }
}
