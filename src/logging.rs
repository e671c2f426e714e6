// src/logging.rs

use tracing::Subscriber;
use tracing_subscriber::{fmt, fmt::format::FmtSpan, EnvFilter};

/// Build the run's subscriber: `RUST_LOG` if set, else `default_directive`.
/// Spans report on close, output goes to stderr so stdout stays machine-readable.
///
/// Callers scope it with `tracing::subscriber::with_default`.
pub fn subscriber(default_directive: &str) -> impl Subscriber + Send + Sync {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .finish()
}

/// Captured-output subscriber for tests, active until the guard drops.
#[cfg(test)]
pub fn test_guard() -> tracing::subscriber::DefaultGuard {
    let sub = fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .finish();
    tracing::subscriber::set_default(sub)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::Level;

    #[test]
    fn default_directive_applies_inside_scope() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let (info_on, warn_on) = tracing::subscriber::with_default(subscriber("warn"), || {
            (tracing::enabled!(Level::INFO), tracing::enabled!(Level::WARN))
        });
        assert!(!info_on);
        assert!(warn_on);
    }
}
