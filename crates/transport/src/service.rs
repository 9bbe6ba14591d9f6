//! The `ReplayService` abstraction (spec §4.G): a bidirectional message
//! channel the interpreter's builtins call through without knowing whether
//! they are talking to a live controller ([`crate::stream_service`]) or
//! replaying from a local archive ([`crate::archive_service`]).

use gapir_core::Severity;

use crate::error::TransportResult;
use crate::wire::{PostPiece, ResourceDesc};

/// The materialized contents of a `Payload` message (spec §3 "Replay
/// request" minus the arena placement, which is `gapir-daemon`'s job).
#[derive(Debug, Clone)]
pub struct PayloadData {
    pub stack_size: u32,
    pub volatile_memory_size: u32,
    pub constants: Vec<u8>,
    pub opcodes: Vec<u8>,
    pub resources: Vec<ResourceDesc>,
}

pub trait ReplayService: Send {
    /// Sends `PayloadRequest` and blocks for the matching `Payload`.
    fn get_payload(&mut self, id: &str) -> TransportResult<PayloadData>;

    /// Sends `ResourceRequest` for `ids` (whose total size is `total_size`)
    /// and blocks for `Resources`, verifying the byte count matches.
    fn get_resources(&mut self, ids: &[String], total_size: u64) -> TransportResult<Vec<u8>>;

    /// Sends a `FenceReady` request for `id` and blocks until a matching
    /// inbound `FenceReady` arrives.
    fn get_fence_ready(&mut self, id: u32) -> TransportResult<u32>;

    /// Enqueues a `PostData` batch. Non-blocking.
    fn send_posts(&mut self, posts: Vec<PostPiece>) -> TransportResult<()>;

    /// Convenience wrapper sending a single `Error`-severity notification.
    fn send_error_msg(&mut self, label: u64, msg: &str) -> TransportResult<()> {
        self.send_notification_data(0, 0, label, Severity::Error, msg.as_bytes())
    }

    fn send_replay_status(&mut self, label: u64, total: u32, done: u32) -> TransportResult<()>;

    fn send_notification_data(
        &mut self,
        id: u64,
        api_index: u32,
        label: u64,
        severity: Severity,
        bytes: &[u8],
    ) -> TransportResult<()>;

    fn send_crash_dump(&mut self, path: &str, bytes: Vec<u8>) -> TransportResult<()>;

    fn send_replay_finished(&mut self) -> TransportResult<()>;
}
