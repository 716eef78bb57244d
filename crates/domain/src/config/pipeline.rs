use std::time::Duration;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message pipeline
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-turn behaviour of the message pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// IANA timezone used to render timestamps in the prompt.
    #[serde(default = "d_timezone")]
    pub timezone: String,
    /// How long a one-to-one turn may run before the "typing" indicator
    /// is shown.  `0` shows it as soon as the turn starts.
    #[serde(default = "d_indicator_delay_ms")]
    pub indicator_delay_ms: u64,
    /// How long the platform keeps the indicator visible.
    #[serde(default = "d_indicator_timeout_secs")]
    pub indicator_timeout_secs: u64,
    /// Deadline for a whole turn.  `0` disables it.
    #[serde(default = "d_turn_timeout_secs")]
    pub turn_timeout_secs: u64,
    /// Send the generated reply back to the chat.
    #[serde(default = "d_true")]
    pub deliver_reply: bool,
    /// Append the generated reply to the Message Log.
    #[serde(default)]
    pub persist_reply: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            timezone: d_timezone(),
            indicator_delay_ms: d_indicator_delay_ms(),
            indicator_timeout_secs: d_indicator_timeout_secs(),
            turn_timeout_secs: d_turn_timeout_secs(),
            deliver_reply: true,
            persist_reply: false,
        }
    }
}

impl PipelineConfig {
    pub fn timezone(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| Error::Config(format!("unknown timezone {:?}", self.timezone)))
    }

    pub fn indicator_delay(&self) -> Duration {
        Duration::from_millis(self.indicator_delay_ms)
    }

    pub fn indicator_timeout(&self) -> Duration {
        Duration::from_secs(self.indicator_timeout_secs)
    }

    pub fn turn_timeout(&self) -> Option<Duration> {
        (self.turn_timeout_secs > 0).then(|| Duration::from_secs(self.turn_timeout_secs))
    }
}

fn d_timezone() -> String {
    "UTC".into()
}

fn d_indicator_delay_ms() -> u64 {
    3_000
}

fn d_indicator_timeout_secs() -> u64 {
    20
}

fn d_turn_timeout_secs() -> u64 {
    120
}

fn d_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_section_uses_defaults() {
        let cfg: PipelineConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.timezone, "UTC");
        assert_eq!(cfg.indicator_delay(), Duration::from_secs(3));
        assert!(cfg.deliver_reply);
        assert!(!cfg.persist_reply);
    }

    #[test]
    fn zero_turn_timeout_disables_deadline() {
        let cfg: PipelineConfig = toml::from_str("turn_timeout_secs = 0").unwrap();
        assert!(cfg.turn_timeout().is_none());
    }

    #[test]
    fn timezone_parses() {
        let cfg: PipelineConfig = toml::from_str(r#"timezone = "Asia/Tokyo""#).unwrap();
        assert_eq!(cfg.timezone().unwrap(), chrono_tz::Asia::Tokyo);
    }
}
