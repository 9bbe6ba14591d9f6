//! The live [`ReplayService`] implementation: a TCP connection to the
//! controller, framed per [`crate::framing`], with a dedicated
//! communication thread demultiplexing inbound messages into two queues
//! so a blocking `getPayload`/`getResources` never swallows an
//! interleaved `FenceReady` (spec §4.G).

use std::net::TcpStream;
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use gapir_core::Severity;

use crate::error::{TransportError, TransportResult};
use crate::framing::{read_frame, write_frame};
use crate::service::{PayloadData, ReplayService};
use crate::wire::{PostPiece, ReplayRequest, ReplayResponse};

/// Live transport over a raw TCP stream.
pub struct StreamReplayService {
    writer: Arc<Mutex<TcpStream>>,
    request_rx: Receiver<ReplayRequest>,
    fence_rx: Receiver<ReplayRequest>,
    _comm_thread: std::thread::JoinHandle<()>,
}

impl StreamReplayService {
    /// Takes ownership of an already-connected, authenticated socket and
    /// spins up its communication thread.
    pub fn new(stream: TcpStream) -> TransportResult<Self> {
        let reader_stream = stream.try_clone()?;
        let writer = Arc::new(Mutex::new(stream));

        let (request_tx, request_rx) = unbounded();
        let (fence_tx, fence_rx) = unbounded();
        let comm_thread = std::thread::Builder::new()
            .name("gapir-replay-comm".into())
            .spawn(move || comm_loop(reader_stream, request_tx, fence_tx))
            .expect("failed to spawn communication thread");

        Ok(Self { writer, request_rx, fence_rx, _comm_thread: comm_thread })
    }

    fn send(&self, msg: &ReplayResponse) -> TransportResult<()> {
        let mut w = self.writer.lock();
        write_frame(&mut *w, msg)
    }

    fn recv_request_kind(&self) -> TransportResult<ReplayRequest> {
        self.request_rx.recv().map_err(|_| TransportError::StreamClosed("request"))
    }
}

/// Reads frames off `stream` until EOF or a decode error, routing each
/// into the request-kind or data-kind (fence) queue (spec §4.G).
fn comm_loop(mut stream: TcpStream, request_tx: Sender<ReplayRequest>, fence_tx: Sender<ReplayRequest>) {
    loop {
        match read_frame::<_, ReplayRequest>(&mut stream) {
            Ok(Some(msg)) => {
                let target = if msg.is_request_kind() { &request_tx } else { &fence_tx };
                if target.send(msg).is_err() {
                    return;
                }
            }
            Ok(None) => return,
            Err(e) => {
                tracing::warn!("replay comm thread stopping: {e}");
                return;
            }
        }
    }
}

impl ReplayService for StreamReplayService {
    fn get_payload(&mut self, _id: &str) -> TransportResult<PayloadData> {
        self.send(&ReplayResponse::PayloadRequest)?;
        match self.recv_request_kind()? {
            ReplayRequest::Payload { stack_size, volatile_memory_size, constants, opcodes, resources } => {
                Ok(PayloadData { stack_size, volatile_memory_size, constants, opcodes, resources })
            }
            other => Err(TransportError::KindMismatch { expected: "Payload", got: other.kind_name() }),
        }
    }

    fn get_resources(&mut self, ids: &[String], total_size: u64) -> TransportResult<Vec<u8>> {
        self.send(&ReplayResponse::ResourceRequest { ids: ids.to_vec(), expected_total_size: total_size })?;
        match self.recv_request_kind()? {
            ReplayRequest::Resources { data } => {
                if data.len() as u64 != total_size {
                    return Err(TransportError::SizeMismatch { got: data.len() as u64, expected: total_size });
                }
                Ok(data)
            }
            other => Err(TransportError::KindMismatch { expected: "Resources", got: other.kind_name() }),
        }
    }

    fn get_fence_ready(&mut self, id: u32) -> TransportResult<u32> {
        self.send(&ReplayResponse::FenceRequest { id })?;
        loop {
            match self.fence_rx.recv() {
                Ok(ReplayRequest::FenceReady { id: got }) if got == id => return Ok(got),
                // A stale fence signal for an id we already moved past; keep
                // waiting for ours (spec §5 "blocks indefinitely" guidance).
                Ok(ReplayRequest::FenceReady { .. }) => continue,
                Ok(_) => continue,
                Err(_) => return Err(TransportError::StreamClosed("FenceReady")),
            }
        }
    }

    fn send_posts(&mut self, posts: Vec<PostPiece>) -> TransportResult<()> {
        self.send(&ReplayResponse::PostData { pieces: posts })
    }

    fn send_replay_status(&mut self, label: u64, total: u32, done: u32) -> TransportResult<()> {
        self.send(&ReplayResponse::ReplayStatus { label, total_instructions: total, finished_instructions: done })
    }

    fn send_notification_data(
        &mut self,
        id: u64,
        api_index: u32,
        label: u64,
        severity: Severity,
        bytes: &[u8],
    ) -> TransportResult<()> {
        self.send(&ReplayResponse::Notification { id, severity, api_index, label, msg: String::new(), data: bytes.to_vec() })
    }

    fn send_crash_dump(&mut self, path: &str, bytes: Vec<u8>) -> TransportResult<()> {
        self.send(&ReplayResponse::CrashDump { filepath: path.to_string(), bytes })
    }

    fn send_replay_finished(&mut self) -> TransportResult<()> {
        self.send(&ReplayResponse::Finished)
    }
}
