//! # Controller Configuration
//!
//! Runtime settings loaded from environment variables with compiled
//! defaults from [`crate::constants`].

use std::path::PathBuf;
use std::time::Duration;

use crate::constants::*;

/// Controller configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Root directory of the local artifact store
    pub storage_root: PathBuf,
    /// Hostname advertised in artifact URLs (the file server in front of the store)
    pub storage_hostname: String,
    /// Requeue delay when a referenced source is missing or not ready
    pub dependency_requeue: Duration,
    /// Grace window for storage garbage collection
    pub gc_grace: Duration,
    /// Download attempts per source before the reconciliation fails
    pub fetch_retries: usize,
    /// HTTP timeout for a single artifact download
    pub fetch_timeout: Duration,
    /// When true, generators may only reference sources in their own namespace
    pub no_cross_namespace_refs: bool,
    /// HTTP server port for metrics and health probes
    pub metrics_port: u16,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from(DEFAULT_STORAGE_ROOT),
            storage_hostname: DEFAULT_STORAGE_HOSTNAME.to_string(),
            dependency_requeue: Duration::from_secs(DEFAULT_DEPENDENCY_REQUEUE_SECS),
            gc_grace: Duration::from_secs(DEFAULT_GC_GRACE_SECS),
            fetch_retries: DEFAULT_FETCH_RETRIES,
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            no_cross_namespace_refs: false,
            metrics_port: DEFAULT_METRICS_PORT,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            storage_root: PathBuf::from(
                std::env::var("STORAGE_PATH").unwrap_or_else(|_| DEFAULT_STORAGE_ROOT.to_string()),
            ),
            storage_hostname: std::env::var("STORAGE_ADDR")
                .unwrap_or_else(|_| DEFAULT_STORAGE_HOSTNAME.to_string()),
            dependency_requeue: Duration::from_secs(env_var_or_default(
                "DEPENDENCY_REQUEUE_SECS",
                DEFAULT_DEPENDENCY_REQUEUE_SECS,
            )),
            gc_grace: Duration::from_secs(env_var_or_default(
                "GC_GRACE_SECS",
                DEFAULT_GC_GRACE_SECS,
            )),
            fetch_retries: env_var_or_default("FETCH_RETRIES", DEFAULT_FETCH_RETRIES),
            fetch_timeout: Duration::from_secs(env_var_or_default(
                "FETCH_TIMEOUT_SECS",
                DEFAULT_FETCH_TIMEOUT_SECS,
            )),
            no_cross_namespace_refs: env_var_or_default("NO_CROSS_NAMESPACE_REFS", false),
            metrics_port: env_var_or_default("METRICS_PORT", DEFAULT_METRICS_PORT),
        }
    }
}

/// Read environment variable or return default value
fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T
where
    <T as std::str::FromStr>::Err: std::fmt::Debug,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parse Kubernetes duration string into std::time::Duration
/// Supports formats: "30s", "1m", "5m", "1h", "2h", "1d"
pub fn parse_kubernetes_duration(duration_str: &str) -> anyhow::Result<Duration> {
    let trimmed = duration_str.trim().to_lowercase();

    if trimmed.is_empty() {
        return Err(anyhow::anyhow!("duration string cannot be empty"));
    }

    let last = trimmed
        .chars()
        .last()
        .filter(char::is_ascii)
        .ok_or_else(|| anyhow::anyhow!("invalid duration '{duration_str}': missing unit"))?;
    let (number_str, unit) = trimmed.split_at(trimmed.len() - last.len_utf8());
    let number: u64 = number_str.parse().map_err(|e| {
        anyhow::anyhow!("invalid duration number '{number_str}' in '{duration_str}': {e}")
    })?;

    if number == 0 {
        return Err(anyhow::anyhow!(
            "duration must be greater than 0, got '{duration_str}'"
        ));
    }

    let seconds = match unit {
        "s" => number,
        "m" => number * 60,
        "h" => number * 3600,
        "d" => number * 86400,
        _ => {
            return Err(anyhow::anyhow!(
                "invalid unit '{unit}' in duration '{duration_str}'. Expected: s, m, h, or d"
            ));
        }
    };

    Ok(Duration::from_secs(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kubernetes_duration() {
        assert_eq!(
            parse_kubernetes_duration("30s").unwrap(),
            Duration::from_secs(30)
        );
        assert_eq!(
            parse_kubernetes_duration("5m").unwrap(),
            Duration::from_secs(300)
        );
        assert_eq!(
            parse_kubernetes_duration("1h").unwrap(),
            Duration::from_secs(3600)
        );
        assert_eq!(
            parse_kubernetes_duration("1d").unwrap(),
            Duration::from_secs(86400)
        );
    }

    #[test]
    fn test_parse_kubernetes_duration_rejects_garbage() {
        assert!(parse_kubernetes_duration("").is_err());
        assert!(parse_kubernetes_duration("5x").is_err());
        assert!(parse_kubernetes_duration("m").is_err());
        assert!(parse_kubernetes_duration("0m").is_err());
    }
}
