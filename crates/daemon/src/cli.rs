//! Command-line surface (spec §6): flags the controller launches the
//! daemon process with. Mirrors the teacher's `neo-node`/`neo-cli`
//! `clap::Parser` shape — one flat struct, `Option<T>` for anything with a
//! config-file-style default, plain `bool` for switches.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use gapir_core::config::DEFAULT_IDLE_TIMEOUT_MS;
use gapir_core::{DaemonConfig, Severity};

#[derive(Parser, Debug)]
#[command(name = "gapir-daemon", about = "Replays a recorded graphics API command stream against a live driver", version)]
pub struct Cli {
    /// Path to a file holding the shared-secret auth token expected on the
    /// `Replay` control handshake.
    #[arg(long, value_name = "PATH")]
    pub auth_token_file: Option<PathBuf>,

    /// Directory backing the on-disk resource archive.
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub cache: PathBuf,

    /// TCP port to bind; 0 picks a free ephemeral port.
    #[arg(long, default_value_t = 0)]
    pub port: u16,

    /// Minimum severity that reaches the log sink: F, E, W, I, D or V.
    #[arg(long, value_name = "LEVEL", default_value = "I")]
    pub log_level: String,

    /// Optional log file path; stderr is used when absent.
    #[arg(long, value_name = "PATH")]
    pub log: Option<PathBuf>,

    /// Idle-session watchdog threshold, in milliseconds.
    #[arg(long, default_value_t = DEFAULT_IDLE_TIMEOUT_MS)]
    pub idle_timeout_ms: u64,

    /// Pauses at startup until a debugger attaches.
    #[arg(long)]
    pub wait_for_debugger: bool,
}

impl Cli {
    /// Parses `--log-level` and folds the flags into a [`DaemonConfig`].
    /// An unrecognized level falls back to `Info`, matching how the
    /// original treats a malformed flag as "use the default" rather than
    /// refusing to start.
    pub fn into_config(self) -> DaemonConfig {
        let log_level = Severity::from_flag(&self.log_level).unwrap_or(Severity::Info);
        DaemonConfig {
            auth_token_file: self.auth_token_file,
            cache_dir: self.cache,
            port: self.port,
            log_level,
            log_path: self.log,
            idle_timeout: Duration::from_millis(self.idle_timeout_ms),
            wait_for_debugger: self.wait_for_debugger,
        }
    }
}
