//! Process-wide configuration.
//!
//! A single `Settings` struct is the one source of truth every component reads from, the way
//! `DaemonConfig` centralizes settings for the daemon in the wider ecosystem this crate is
//! descended from. Built from CLI flags (see `main.rs`); there is no external file loader, since
//! a handful of scalar settings doesn't warrant one.

use std::path::PathBuf;

use crate::error::ConfigError;

#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,

    /// Shell to launch when no per-session `cmd` override is given.
    pub shell: String,
    /// Global command override (e.g. `"htop"`); per-session `cmd` query param wins over this.
    pub cmd: String,

    pub term: String,
    pub default_cols: u16,
    pub default_rows: u16,
    pub history_size: usize,

    pub log_enabled: bool,
    pub log_dir: PathBuf,

    /// MOTD banner: "builtin", "none", or a path to a custom art file.
    pub motd_art: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 57575,
            shell: std::env::var("SHELL").unwrap_or_else(|_| "/bin/bash".to_string()),
            cmd: String::new(),
            term: "xterm-256color".to_string(),
            default_cols: 80,
            default_rows: 24,
            history_size: 50_000,
            log_enabled: true,
            log_dir: PathBuf::from("logs"),
            motd_art: "builtin".to_string(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }
        if self.history_size == 0 {
            return Err(ConfigError::InvalidHistorySize);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn zero_port_is_rejected() {
        let mut settings = Settings::default();
        settings.port = 0;
        assert!(matches!(settings.validate(), Err(ConfigError::InvalidPort(0))));
    }

    #[test]
    fn zero_history_size_is_rejected() {
        let mut settings = Settings::default();
        settings.history_size = 0;
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidHistorySize)
        ));
    }
}
