//! Crash reporting (spec §4.M, supplementing the distilled spec from
//! `crash_handler.cpp`'s upload path): forwards a captured minidump to the
//! controller via `ReplayService::send_crash_dump`. Actual signal
//! interception and minidump generation are platform-native concerns this
//! crate does not reproduce; this is only the subscribe/forward contract
//! a platform-specific handler would call into.

use std::path::Path;

use gapir_transport::{ReplayService, TransportResult};

/// Registers interest in crash events; the no-op default is what a replay
/// run on a platform without a native handler installed gets.
pub trait CrashHandler: Send {
    fn on_crash(&mut self, minidump_path: &Path);
}

pub struct NoCrashHandler;

impl CrashHandler for NoCrashHandler {
    fn on_crash(&mut self, _minidump_path: &Path) {}
}

/// Reads `minidump_path` and forwards its bytes through `service` as a
/// `CrashDump` message, tagged with the path the minidump was written to.
pub struct CrashUploader<'a> {
    service: &'a mut dyn ReplayService,
}

impl<'a> CrashUploader<'a> {
    pub fn new(service: &'a mut dyn ReplayService) -> Self {
        Self { service }
    }
}

impl CrashHandler for CrashUploader<'_> {
    fn on_crash(&mut self, minidump_path: &Path) {
        match std::fs::read(minidump_path) {
            Ok(bytes) => {
                if let Err(e) = self.upload(minidump_path, bytes) {
                    tracing::error!("failed to upload crash dump {}: {e}", minidump_path.display());
                }
            }
            Err(e) => {
                tracing::error!("failed to read crash dump {}: {e}", minidump_path.display());
            }
        }
    }
}

impl CrashUploader<'_> {
    fn upload(&mut self, path: &Path, bytes: Vec<u8>) -> TransportResult<()> {
        self.service.send_crash_dump(&path.display().to_string(), bytes)
    }
}
