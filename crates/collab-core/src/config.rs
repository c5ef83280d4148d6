//! Recognized session/hub configuration options and their defaults. The
//! binary populates this from CLI flags and environment variables
//! (`clap`, `env` feature) and hands it to the hub.
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub inactivity_timeout_seconds: u64,
    pub cleanup_interval_seconds: u64,
    pub ping_interval_seconds: u64,
    pub read_deadline_seconds: u64,
    pub write_deadline_seconds: u64,
    pub max_message_bytes: usize,
    pub history_depth: usize,
    pub allowed_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            inactivity_timeout_seconds: 300,
            cleanup_interval_seconds: 15,
            ping_interval_seconds: 30,
            read_deadline_seconds: 90,
            write_deadline_seconds: 10,
            max_message_bytes: 65536,
            history_depth: 100,
            allowed_origins: Vec::new(),
        }
    }
}

impl Config {
    /// Clamps to sane minimums rather than rejecting an out-of-range
    /// config outright.
    pub fn normalized(mut self) -> Self {
        self.inactivity_timeout_seconds = self.inactivity_timeout_seconds.max(15);
        self.cleanup_interval_seconds = self.cleanup_interval_seconds.max(15);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let c = Config::default();
        assert_eq!(c.inactivity_timeout_seconds, 300);
        assert_eq!(c.cleanup_interval_seconds, 15);
        assert_eq!(c.ping_interval_seconds, 30);
        assert_eq!(c.read_deadline_seconds, 90);
        assert_eq!(c.write_deadline_seconds, 10);
        assert_eq!(c.max_message_bytes, 65536);
        assert_eq!(c.history_depth, 100);
    }

    #[test]
    fn normalization_enforces_minimums() {
        let c = Config {
            inactivity_timeout_seconds: 1,
            cleanup_interval_seconds: 1,
            ..Config::default()
        }
        .normalized();
        assert_eq!(c.inactivity_timeout_seconds, 15);
        assert_eq!(c.cleanup_interval_seconds, 15);
    }
}
