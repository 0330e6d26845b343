//! Error types for the terminal relay core.
//!
//! Matchable failure shapes use `thiserror`; everything else propagates as `anyhow::Result`
//! and is only ever logged or turned into an HTTP status, never inspected by callers.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PtyError {
    #[error("no usable shell found (checked $SHELL, /bin/bash, /bin/sh)")]
    NoShell,

    #[error("failed to open pty: {0}")]
    OpenFailed(#[source] anyhow::Error),

    #[error("failed to spawn child command: {0}")]
    SpawnFailed(#[source] anyhow::Error),

    #[error("pty is closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("failed to create log directory {path}: {source}")]
    CreateDir {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open log file {path}: {source}")]
    OpenFile {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid port: {0} (must be 1-65535)")]
    InvalidPort(u16),

    #[error("invalid history size: must be greater than 0")]
    InvalidHistorySize,
}
