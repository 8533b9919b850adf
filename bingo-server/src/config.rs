use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use bingo_core::code::DEFAULT_CODE_LEN;
use bingo_core::event::DEFAULT_RECENT_SECS;
use thiserror::Error;

/// Longest recent-events window accepted from the environment (one day).
pub const MAX_EVENT_WINDOW_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub persist_path: Option<PathBuf>,
    pub admin_password: String,
    /// Skip durable event logging; live broadcasts still happen.
    pub forget_events: bool,
    pub end_game_on_win: bool,
    pub event_window_secs: u64,
    pub subscriber_buffer: usize,
    pub code_length: usize,
    pub seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            persist_path: None,
            admin_password: "changeme".to_string(),
            forget_events: false,
            end_game_on_win: false,
            event_window_secs: DEFAULT_RECENT_SECS,
            subscriber_buffer: 64,
            code_length: DEFAULT_CODE_LEN,
            seed: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            addr: parsed("BINGO_ADDR")?.unwrap_or(defaults.addr),
            persist_path: env::var_os("PERSIST_PATH").map(PathBuf::from),
            admin_password: env::var("ADMIN_PASSWORD").unwrap_or(defaults.admin_password),
            forget_events: flag("BINGO_FORGET_EVENTS")?.unwrap_or(defaults.forget_events),
            end_game_on_win: flag("BINGO_END_ON_WIN")?.unwrap_or(defaults.end_game_on_win),
            event_window_secs: parsed("BINGO_EVENT_WINDOW_SECS")?
                .map(event_window)
                .transpose()?
                .unwrap_or(defaults.event_window_secs),
            subscriber_buffer: parsed::<usize>("BINGO_SUBSCRIBER_BUFFER")?
                .unwrap_or(defaults.subscriber_buffer)
                .max(1),
            code_length: parsed::<usize>("BINGO_CODE_LENGTH")?
                .unwrap_or(defaults.code_length)
                .max(1),
            seed: parsed("BINGO_SEED")?,
        })
    }
}

fn parsed<T: FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value }),
        Err(_) => Ok(None),
    }
}

fn event_window(secs: u64) -> Result<u64, ConfigError> {
    if secs > MAX_EVENT_WINDOW_SECS {
        return Err(ConfigError::Invalid {
            key: "BINGO_EVENT_WINDOW_SECS",
            value: secs.to_string(),
        });
    }
    Ok(secs)
}

fn flag(key: &'static str) -> Result<Option<bool>, ConfigError> {
    match env::var(key) {
        Ok(value) => parse_flag(&value)
            .map(Some)
            .ok_or(ConfigError::Invalid { key, value }),
        Err(_) => Ok(None),
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_accept_common_spellings() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag(" on "), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn event_window_is_capped() {
        assert_eq!(event_window(0).unwrap(), 0);
        assert_eq!(event_window(MAX_EVENT_WINDOW_SECS).unwrap(), MAX_EVENT_WINDOW_SECS);
        let err = event_window(u64::MAX).unwrap_err();
        assert!(err.to_string().contains("BINGO_EVENT_WINDOW_SECS"));
    }

    #[test]
    fn defaults_keep_playing_after_a_win() {
        let config = Config::default();
        assert!(!config.end_game_on_win);
        assert!(!config.forget_events);
        assert_eq!(config.event_window_secs, 60);
        assert_eq!(config.code_length, 3);
    }
}
