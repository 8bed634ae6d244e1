use std::str::FromStr;
use std::time::Duration;

use crate::error::CoreError;

/// Default interval between progress polls once the push stream fails.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;

/// Default cap on poll attempts (30 minutes at the default interval).
pub const DEFAULT_POLL_MAX_ATTEMPTS: u32 = 900;

/// Progress percentage above which an ETA is reported.
pub const DEFAULT_ETA_MIN_PROGRESS: f64 = 5.0;

/// Default number of alerts retained by the billing monitor.
pub const DEFAULT_ALERT_WINDOW: usize = 50;

/// Default upload size cap (10 MiB).
pub const DEFAULT_MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;

/// Settings for the per-operation progress client.
#[derive(Debug, Clone)]
pub struct ProgressConfig {
    /// Delay between requests to the poll fallback endpoint.
    pub poll_interval: Duration,
    /// Number of poll requests after which the operation is given up.
    pub max_poll_attempts: u32,
    /// ETA is withheld until progress exceeds this percentage.
    pub eta_min_progress: f64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            max_poll_attempts: DEFAULT_POLL_MAX_ATTEMPTS,
            eta_min_progress: DEFAULT_ETA_MIN_PROGRESS,
        }
    }
}

/// Settings for the session-wide event bus connection.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Interval between `ping` frames used for latency estimation.
    pub heartbeat_interval: Duration,
    /// Delay before the first reconnection attempt.
    pub reconnect_initial_delay: Duration,
    /// Upper bound on the delay between reconnection attempts.
    pub reconnect_max_delay: Duration,
    /// Factor by which the reconnect delay grows after each failure.
    pub reconnect_multiplier: f64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            reconnect_initial_delay: Duration::from_secs(1),
            reconnect_max_delay: Duration::from_secs(30),
            reconnect_multiplier: 2.0,
        }
    }
}

/// Client configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base HTTP API URL, e.g. `https://app.example.com/api`.
    pub api_url: String,
    /// Event bus WebSocket URL, e.g. `wss://app.example.com/ws`.
    pub ws_url: String,
    pub progress: ProgressConfig,
    pub bus: BusConfig,
    /// Maximum number of billing alerts retained per session.
    pub alert_window: usize,
    /// Largest lead file accepted for upload.
    pub max_file_bytes: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000/api".into(),
            ws_url: "ws://localhost:8000/ws".into(),
            progress: ProgressConfig::default(),
            bus: BusConfig::default(),
            alert_window: DEFAULT_ALERT_WINDOW,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
        }
    }
}

impl ClientConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                      | Default                      |
    /// |------------------------------|------------------------------|
    /// | `COLDREACH_API_URL`          | `http://localhost:8000/api`  |
    /// | `COLDREACH_WS_URL`           | `ws://localhost:8000/ws`     |
    /// | `PROGRESS_POLL_INTERVAL_MS`  | `2000`                       |
    /// | `PROGRESS_POLL_MAX_ATTEMPTS` | `900`                        |
    /// | `BUS_HEARTBEAT_SECS`         | `30`                         |
    /// | `BUS_RECONNECT_INITIAL_MS`   | `1000`                       |
    /// | `BUS_RECONNECT_MAX_SECS`     | `30`                         |
    /// | `BILLING_ALERT_WINDOW`       | `50`                         |
    /// | `IMPORT_MAX_FILE_BYTES`      | `10485760`                   |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    ///
    /// Missing keys fall back to defaults; present but unparsable values
    /// are reported as [`CoreError::Config`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let api_url = lookup("COLDREACH_API_URL").unwrap_or(defaults.api_url);
        let ws_url = lookup("COLDREACH_WS_URL").unwrap_or(defaults.ws_url);

        let poll_interval_ms: u64 = non_zero(
            "PROGRESS_POLL_INTERVAL_MS",
            parse_or(&lookup, "PROGRESS_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS)?,
        )?;
        let max_poll_attempts: u32 = non_zero(
            "PROGRESS_POLL_MAX_ATTEMPTS",
            parse_or(&lookup, "PROGRESS_POLL_MAX_ATTEMPTS", DEFAULT_POLL_MAX_ATTEMPTS)?,
        )?;

        let heartbeat_secs: u64 =
            non_zero("BUS_HEARTBEAT_SECS", parse_or(&lookup, "BUS_HEARTBEAT_SECS", 30)?)?;
        let reconnect_initial_ms: u64 = non_zero(
            "BUS_RECONNECT_INITIAL_MS",
            parse_or(&lookup, "BUS_RECONNECT_INITIAL_MS", 1_000)?,
        )?;
        let reconnect_max_secs: u64 = parse_or(&lookup, "BUS_RECONNECT_MAX_SECS", 30)?;
        if reconnect_max_secs.saturating_mul(1_000) < reconnect_initial_ms {
            return Err(CoreError::Config {
                key: "BUS_RECONNECT_MAX_SECS",
                reason: format!(
                    "{reconnect_max_secs}s is below BUS_RECONNECT_INITIAL_MS ({reconnect_initial_ms}ms)"
                ),
            });
        }

        let alert_window: usize = parse_or(&lookup, "BILLING_ALERT_WINDOW", DEFAULT_ALERT_WINDOW)?;
        let max_file_bytes: u64 =
            parse_or(&lookup, "IMPORT_MAX_FILE_BYTES", DEFAULT_MAX_FILE_BYTES)?;

        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            ws_url,
            progress: ProgressConfig {
                poll_interval: Duration::from_millis(poll_interval_ms),
                max_poll_attempts,
                ..defaults.progress
            },
            bus: BusConfig {
                heartbeat_interval: Duration::from_secs(heartbeat_secs),
                reconnect_initial_delay: Duration::from_millis(reconnect_initial_ms),
                reconnect_max_delay: Duration::from_secs(reconnect_max_secs),
                ..defaults.bus
            },
            alert_window,
            max_file_bytes,
        })
    }
}

fn parse_or<T, F>(lookup: &F, key: &'static str, default: T) -> Result<T, CoreError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| CoreError::Config {
            key,
            reason: format!("{raw:?}: {e}"),
        }),
    }
}

/// Reject zero for settings that drive timers or retry loops.
fn non_zero<T>(key: &'static str, value: T) -> Result<T, CoreError>
where
    T: Default + PartialEq,
{
    if value == T::default() {
        return Err(CoreError::Config {
            key,
            reason: "must be greater than zero".into(),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = ClientConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.api_url, "http://localhost:8000/api");
        assert_eq!(config.progress.poll_interval, Duration::from_secs(2));
        assert_eq!(config.progress.max_poll_attempts, 900);
        assert_eq!(config.bus.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.alert_window, 50);
        assert_eq!(config.max_file_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn overrides_are_applied() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("COLDREACH_API_URL", "https://app.example.com/api/"),
            ("PROGRESS_POLL_INTERVAL_MS", "500"),
            ("BUS_RECONNECT_MAX_SECS", "10"),
        ]))
        .unwrap();
        assert_eq!(config.api_url, "https://app.example.com/api");
        assert_eq!(config.progress.poll_interval, Duration::from_millis(500));
        assert_eq!(config.bus.reconnect_max_delay, Duration::from_secs(10));
        assert_eq!(config.bus.reconnect_multiplier, 2.0);
    }

    #[test]
    fn invalid_number_is_a_config_error() {
        let result = ClientConfig::from_lookup(lookup_from(&[("BUS_HEARTBEAT_SECS", "soon")]));
        assert_matches!(
            result,
            Err(CoreError::Config {
                key: "BUS_HEARTBEAT_SECS",
                ..
            })
        );
    }

    #[test]
    fn zero_poll_attempts_is_rejected() {
        let result =
            ClientConfig::from_lookup(lookup_from(&[("PROGRESS_POLL_MAX_ATTEMPTS", "0")]));
        assert!(result.is_err());
    }

    #[test]
    fn zero_timer_settings_are_rejected() {
        for key in [
            "PROGRESS_POLL_INTERVAL_MS",
            "BUS_HEARTBEAT_SECS",
            "BUS_RECONNECT_INITIAL_MS",
        ] {
            let result = ClientConfig::from_lookup(lookup_from(&[(key, "0")]));
            assert_matches!(result, Err(CoreError::Config { key: k, .. }) if k == key);
        }
    }

    #[test]
    fn reconnect_max_below_initial_is_rejected() {
        let result = ClientConfig::from_lookup(lookup_from(&[
            ("BUS_RECONNECT_INITIAL_MS", "5000"),
            ("BUS_RECONNECT_MAX_SECS", "2"),
        ]));
        assert_matches!(
            result,
            Err(CoreError::Config {
                key: "BUS_RECONNECT_MAX_SECS",
                ..
            })
        );

        let config = ClientConfig::from_lookup(lookup_from(&[
            ("BUS_RECONNECT_INITIAL_MS", "2000"),
            ("BUS_RECONNECT_MAX_SECS", "2"),
        ]))
        .unwrap();
        assert_eq!(config.bus.reconnect_initial_delay, config.bus.reconnect_max_delay);
    }
}
