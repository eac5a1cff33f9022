use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub recorder: RecorderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Terminal identifier announced to the recorder; the per-resource
    /// suffix (-TEL / -RAD) is appended by the session.
    pub terminal_id: String,
    /// Gateway IP address sent in the NotifyIp command.
    pub ip_address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecorderConfig {
    /// Recorder command endpoint, e.g. "127.0.0.1:65003".
    pub address: String,
    /// Fixed local port for the unsolicited restart notice.
    #[serde(default = "default_notice_port")]
    pub notice_port: u16,
    /// Per-try wait for a command response, in seconds.
    #[serde(default = "default_response_timeout")]
    pub response_timeout_secs: u64,
    /// Send attempts per command before the session is marked in error.
    #[serde(default = "default_tries")]
    pub tries: u32,
    /// Idle refresh: force a session reset if no command has been
    /// acknowledged since the last reset within this window.
    #[serde(default = "default_idle_refresh")]
    pub idle_refresh_secs: u64,
    /// Minimum gap between a control command send and the next media frame.
    #[serde(default)]
    pub media_gap_ms: u64,
}

fn default_notice_port() -> u16 {
    65001
}

fn default_response_timeout() -> u64 {
    3
}

fn default_tries() -> u32 {
    3
}

fn default_idle_refresh() -> u64 {
    15
}

impl RecorderConfig {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }

    pub fn idle_refresh(&self) -> Duration {
        Duration::from_secs(self.idle_refresh_secs)
    }

    pub fn media_gap(&self) -> Duration {
        Duration::from_millis(self.media_gap_ms)
    }

    /// Overall bound for callers waiting on a session status transition.
    pub fn wait_budget(&self) -> Duration {
        self.response_timeout() * self.tries
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:65003".to_string(),
            notice_port: default_notice_port(),
            response_timeout_secs: default_response_timeout(),
            tries: default_tries(),
            idle_refresh_secs: default_idle_refresh(),
            media_gap_ms: 0,
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
