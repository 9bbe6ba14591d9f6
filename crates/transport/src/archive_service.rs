//! The archive [`ReplayService`] (spec §4.G "archive implementation"):
//! reads `Payload` from a local file instead of a live stream and writes
//! post-data as per-id files under a configured directory. Every other
//! outbound message is a no-op, matching a headless "replay this capture
//! and keep the readbacks" workflow with no controller on the other end.

use std::fs;
use std::path::PathBuf;

use gapir_core::Severity;

use crate::error::{TransportError, TransportResult};
use crate::service::{PayloadData, ReplayService};
use crate::wire::{PostPiece, ReplayRequest};

pub struct ArchiveReplayService {
    payload_path: PathBuf,
    output_dir: PathBuf,
}

impl ArchiveReplayService {
    /// `payload_path` holds one JSON-encoded `ReplayRequest::Payload`
    /// message; `output_dir` receives one file per posted piece.
    pub fn new(payload_path: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> TransportResult<Self> {
        let output_dir = output_dir.into();
        fs::create_dir_all(&output_dir)?;
        Ok(Self { payload_path: payload_path.into(), output_dir })
    }
}

impl ReplayService for ArchiveReplayService {
    fn get_payload(&mut self, _id: &str) -> TransportResult<PayloadData> {
        let bytes = fs::read(&self.payload_path)?;
        let msg: ReplayRequest = serde_json::from_slice(&bytes)?;
        match msg {
            ReplayRequest::Payload { stack_size, volatile_memory_size, constants, opcodes, resources } => {
                Ok(PayloadData { stack_size, volatile_memory_size, constants, opcodes, resources })
            }
            other => Err(TransportError::KindMismatch { expected: "Payload", got: other.kind_name() }),
        }
    }

    /// Archive replays source resource bytes through the on-disk cache's
    /// own fallback fetcher, not through this service; asking it directly
    /// is a caller error.
    fn get_resources(&mut self, _ids: &[String], _total_size: u64) -> TransportResult<Vec<u8>> {
        Err(TransportError::KindMismatch { expected: "Resources (unsupported in archive mode)", got: "none" })
    }

    /// Nothing signals fences when replaying a capture with no
    /// controller attached; treat every wait as immediately satisfied.
    fn get_fence_ready(&mut self, id: u32) -> TransportResult<u32> {
        Ok(id)
    }

    fn send_posts(&mut self, posts: Vec<PostPiece>) -> TransportResult<()> {
        for piece in posts {
            let path = self.output_dir.join(format!("post-{}.bin", piece.id));
            fs::write(path, piece.bytes)?;
        }
        Ok(())
    }

    fn send_replay_status(&mut self, _label: u64, _total: u32, _done: u32) -> TransportResult<()> {
        Ok(())
    }

    fn send_notification_data(
        &mut self,
        _id: u64,
        _api_index: u32,
        _label: u64,
        _severity: Severity,
        _bytes: &[u8],
    ) -> TransportResult<()> {
        Ok(())
    }

    fn send_crash_dump(&mut self, _path: &str, _bytes: Vec<u8>) -> TransportResult<()> {
        Ok(())
    }

    fn send_replay_finished(&mut self) -> TransportResult<()> {
        Ok(())
    }
}
