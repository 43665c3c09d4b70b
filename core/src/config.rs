//! Client configuration: base URL, transport timeouts and default headers.

use std::collections::BTreeMap;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Transport timeouts. Set once when the client is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    pub write: Duration,
    pub read: Duration,
    /// Upper bound for the whole call. `None` means unlimited.
    pub total: Option<Duration>,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: DEFAULT_TIMEOUT,
            write: DEFAULT_TIMEOUT,
            read: DEFAULT_TIMEOUT,
            total: None,
        }
    }
}

impl Timeouts {
    /// Same duration for connect, write and read; no total limit.
    pub fn uniform(timeout: Duration) -> Self {
        Self {
            connect: timeout,
            write: timeout,
            read: timeout,
            total: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: Option<String>,
    pub timeouts: Timeouts,
    pub default_headers: BTreeMap<String, String>,
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn default_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.default_headers
            .insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Read configuration from `SIMPLEHTTP_*` environment variables.
    ///
    /// Missing or unparsable values keep their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let millis = |key: &str| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_millis)
        };

        let defaults = Timeouts::default();
        let timeouts = Timeouts {
            connect: millis("SIMPLEHTTP_CONNECT_TIMEOUT_MS").unwrap_or(defaults.connect),
            write: millis("SIMPLEHTTP_WRITE_TIMEOUT_MS").unwrap_or(defaults.write),
            read: millis("SIMPLEHTTP_READ_TIMEOUT_MS").unwrap_or(defaults.read),
            total: millis("SIMPLEHTTP_TOTAL_TIMEOUT_MS").or(defaults.total),
        };

        Self {
            base_url: lookup("SIMPLEHTTP_BASE_URL").filter(|v| !v.is_empty()),
            timeouts,
            default_headers: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_timeouts_are_fifteen_seconds_without_total() {
        let t = Timeouts::default();
        assert_eq!(t.connect, Duration::from_secs(15));
        assert_eq!(t.write, Duration::from_secs(15));
        assert_eq!(t.read, Duration::from_secs(15));
        assert!(t.total.is_none());
    }

    #[test]
    fn lookup_overrides_defaults() {
        let vars: HashMap<&str, &str> = [
            ("SIMPLEHTTP_BASE_URL", "https://a/api"),
            ("SIMPLEHTTP_CONNECT_TIMEOUT_MS", "250"),
            ("SIMPLEHTTP_TOTAL_TIMEOUT_MS", "1000"),
            ("SIMPLEHTTP_READ_TIMEOUT_MS", "soon"),
        ]
        .into_iter()
        .collect();
        let config = ClientConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.base_url.as_deref(), Some("https://a/api"));
        assert_eq!(config.timeouts.connect, Duration::from_millis(250));
        assert_eq!(config.timeouts.total, Some(Duration::from_secs(1)));
        // unparsable falls back
        assert_eq!(config.timeouts.read, Duration::from_secs(15));
    }

    #[test]
    fn default_header_names_are_lowercased() {
        let config = ClientConfig::new().default_header("X-Token", "abc");
        assert_eq!(config.default_headers.get("x-token").map(String::as_str), Some("abc"));
    }
}
