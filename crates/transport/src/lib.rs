//! Replay session transport (spec §4.G/H/I): the bidirectional message
//! stream between daemon and controller, the file-backed archive
//! alternative, the server session that accepts and authenticates
//! connections, and the buffered post-back.

pub mod archive_service;
pub mod error;
pub mod framing;
pub mod post_buffer;
pub mod service;
pub mod session;
pub mod stream_service;
pub mod wire;

pub use archive_service::ArchiveReplayService;
pub use error::{TransportError, TransportResult};
pub use post_buffer::PostBuffer;
pub use service::{PayloadData, ReplayService};
pub use session::{ServerSession, ShutdownHandle};
pub use stream_service::StreamReplayService;
pub use wire::{ControlMessage, PostPiece, ReplayRequest, ReplayResponse, ResourceDesc, AUTH_TOKEN_METADATA_KEY};
