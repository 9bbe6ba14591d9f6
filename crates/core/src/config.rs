//! Daemon configuration surface (spec §6 "Command-line surface").
//!
//! This mirrors the shape of `neo-config`'s server configs: a plain,
//! serializable struct with a `Default` impl and a handful of named
//! constructors, populated by the CLI layer in `gapir-daemon` and then
//! threaded through to every other crate instead of read from globals.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Candidate volatile-memory sizes the memory manager probes in order
/// (spec §6 "Arena sizing"), largest first.
pub const VOLATILE_SIZE_CANDIDATES: &[usize] = &[
    2 * 1024 * 1024 * 1024, // 2 GiB
    1024 * 1024 * 1024,     // 1 GiB
    512 * 1024 * 1024,      // 512 MiB
    256 * 1024 * 1024,      // 256 MiB
    128 * 1024 * 1024,      // 128 MiB
];

/// Configuration for a single daemon process, built from CLI flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Path to a file containing the shared-secret auth token, if any.
    /// `--auth-token-file`.
    pub auth_token_file: Option<PathBuf>,
    /// Directory backing the on-disk resource archive. `--cache`.
    pub cache_dir: PathBuf,
    /// TCP port to bind; 0 means "pick a free one". `--port`.
    pub port: u16,
    /// Minimum severity that reaches the log sink. `--log-level`.
    pub log_level: crate::severity::Severity,
    /// Optional log file path; stderr is used when absent. `--log`.
    pub log_path: Option<PathBuf>,
    /// Idle-session watchdog threshold. `--idle-timeout-ms`.
    pub idle_timeout: Duration,
    /// Whether to pause at startup for a debugger to attach.
    /// `--wait-for-debugger`.
    pub wait_for_debugger: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            auth_token_file: None,
            cache_dir: PathBuf::from("."),
            port: 0,
            log_level: crate::severity::Severity::Info,
            log_path: None,
            idle_timeout: Duration::from_millis(DEFAULT_IDLE_TIMEOUT_MS),
            wait_for_debugger: false,
        }
    }
}

/// Default idle timeout when `--idle-timeout-ms` is not given: five minutes.
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 5 * 60 * 1000;

impl DaemonConfig {
    /// Reads the configured auth token from `auth_token_file`, if set.
    /// Trailing newlines are trimmed, matching how the original strips the
    /// file's contents before comparison.
    pub fn load_auth_token(&self) -> crate::error::CoreResult<Option<Vec<u8>>> {
        match &self.auth_token_file {
            None => Ok(None),
            Some(path) => {
                let contents = std::fs::read_to_string(path).map_err(|e| {
                    crate::error::CoreError::AuthTokenFile {
                        path: path.display().to_string(),
                        reason: e.to_string(),
                    }
                })?;
                Ok(Some(contents.trim_end_matches(['\n', '\r']).as_bytes().to_vec()))
            }
        }
    }
}
