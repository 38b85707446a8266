//! Logging setup for a language-server process.
//!
//! stdout carries the LSP protocol stream, so all log output goes to stderr.
//! Filtering uses tracing's directive syntax directly: `SWIFTLS_LOG` wins,
//! then `RUST_LOG`, then the default the embedder passes to [`init`]
//! (typically `"info"` or `"swiftls_worker=debug"`).

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable consulted before `RUST_LOG`.
pub const LOG_ENV: &str = "SWIFTLS_LOG";

/// Initialize logging once at startup.
///
/// `default_directives` is used when neither `SWIFTLS_LOG` nor `RUST_LOG`
/// holds a parsable filter.
pub fn init(default_directives: &str) {
    let env = std::env::var(LOG_ENV)
        .or_else(|_| std::env::var(EnvFilter::DEFAULT_ENV))
        .ok();
    let filter = resolve_filter(env, default_directives);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_level(true),
        )
        .init();
}

/// Pick the environment's directives when they parse, the default otherwise.
fn resolve_filter(env_directives: Option<String>, default_directives: &str) -> EnvFilter {
    env_directives
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(default_directives))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_apply_without_env() {
        let filter = resolve_filter(None, "info");
        assert_eq!(filter.to_string(), "info");
    }

    #[test]
    fn test_env_directives_win() {
        let filter = resolve_filter(Some("swiftls_worker=debug".to_string()), "info");
        assert_eq!(filter.to_string(), "swiftls_worker=debug");
    }

    #[test]
    fn test_unparsable_env_falls_back() {
        let filter = resolve_filter(Some("swiftls_worker=notalevel".to_string()), "warn");
        assert_eq!(filter.to_string(), "warn");
    }
}
