//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the Swift language service worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerConfig {
    /// Path to the compiler-service client library.
    pub library_path: PathBuf,

    /// URI schemes treated as read-only shadows: documents may be opened but
    /// diagnostics are never published for them.
    #[serde(default = "default_excluded_schemes")]
    pub excluded_schemes: Vec<String>,

    /// Per-request deadline against the daemon, in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Upper bound on returned completion items.
    #[serde(default = "default_completion_max_results")]
    pub completion_max_results: usize,
}

fn default_excluded_schemes() -> Vec<String> {
    vec!["git".to_string(), "hg".to_string()]
}

fn default_request_timeout_ms() -> u64 {
    15_000
}

fn default_completion_max_results() -> usize {
    1_000
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::new("libsourcekitdInProc.so")
    }
}

impl WorkerConfig {
    /// Create a configuration for the client library at `library_path`.
    pub fn new(library_path: impl Into<PathBuf>) -> Self {
        Self {
            library_path: library_path.into(),
            excluded_schemes: default_excluded_schemes(),
            request_timeout_ms: default_request_timeout_ms(),
            completion_max_results: default_completion_max_results(),
        }
    }

    /// Replace the excluded scheme set.
    pub fn with_excluded_schemes(mut self, schemes: Vec<impl Into<String>>) -> Self {
        self.excluded_schemes = schemes.into_iter().map(|s| s.into()).collect();
        self
    }

    /// Set the per-request deadline.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Cap the number of completion items returned per request.
    pub fn with_completion_max_results(mut self, max: usize) -> Self {
        self.completion_max_results = max;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Whether the scheme is in the exclusion set.
    pub fn is_excluded_scheme(&self, scheme: &str) -> bool {
        self.excluded_schemes.iter().any(|s| s == scheme)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_excludes_vcs_schemes() {
        let config = WorkerConfig::default();
        assert!(config.is_excluded_scheme("git"));
        assert!(config.is_excluded_scheme("hg"));
        assert!(!config.is_excluded_scheme("file"));
    }

    #[test]
    fn test_builders() {
        let config = WorkerConfig::new("/usr/lib/libsourcekitdInProc.so")
            .with_excluded_schemes(vec!["git"])
            .with_request_timeout(Duration::from_secs(2))
            .with_completion_max_results(50);
        assert_eq!(config.request_timeout(), Duration::from_secs(2));
        assert_eq!(config.completion_max_results, 50);
        assert!(!config.is_excluded_scheme("hg"));
    }

    #[test]
    fn test_deserialize_fills_defaults() {
        let config: WorkerConfig =
            serde_json::from_str(r#"{"libraryPath": "/opt/libsourcekitd.so"}"#)
                .expect("valid config");
        assert_eq!(config.library_path, PathBuf::from("/opt/libsourcekitd.so"));
        assert!(config.is_excluded_scheme("git"));
        assert_eq!(config.request_timeout_ms, 15_000);
    }
}
