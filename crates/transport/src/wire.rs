//! The wire protocol carried by the bidirectional replay stream (spec §6
//! "Wire protocol").
//!
//! Messages are framed with [`crate::framing`] and serialized as JSON; the
//! shapes below mirror the two outbound/inbound tables verbatim. `kind` is
//! a plain tag so a peer can dispatch without decoding the whole payload.

use serde::{Deserialize, Serialize};

use gapir_core::Severity;

/// One resource descriptor as carried by `Payload` (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceDesc {
    pub id: String,
    pub size: u32,
}

/// One readback piece inside a `PostData` batch; `id` is the post buffer's
/// monotonic sequence number (spec §3 "Post buffer entry").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostPiece {
    pub id: u64,
    pub bytes: Vec<u8>,
}

/// Outbound messages, daemon → controller (spec §6 first table).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum ReplayResponse {
    PayloadRequest,
    ResourceRequest {
        ids: Vec<String>,
        expected_total_size: u64,
    },
    PostData {
        pieces: Vec<PostPiece>,
    },
    Notification {
        id: u64,
        severity: Severity,
        api_index: u32,
        label: u64,
        msg: String,
        data: Vec<u8>,
    },
    ReplayStatus {
        label: u64,
        total_instructions: u32,
        finished_instructions: u32,
    },
    CrashDump {
        filepath: String,
        bytes: Vec<u8>,
    },
    Finished,
    /// Requests a `FenceReady` signal for `id`. Spec §6's outbound table
    /// does not list this kind explicitly, but §4.G's narrative requires
    /// it ("send a FenceReady(id) request"); see DESIGN.md.
    FenceRequest {
        id: u32,
    },
}

impl ReplayResponse {
    pub fn kind_name(&self) -> &'static str {
        match self {
            ReplayResponse::PayloadRequest => "PayloadRequest",
            ReplayResponse::ResourceRequest { .. } => "ResourceRequest",
            ReplayResponse::PostData { .. } => "PostData",
            ReplayResponse::Notification { .. } => "Notification",
            ReplayResponse::ReplayStatus { .. } => "ReplayStatus",
            ReplayResponse::CrashDump { .. } => "CrashDump",
            ReplayResponse::Finished => "Finished",
            ReplayResponse::FenceRequest { .. } => "FenceRequest",
        }
    }
}

/// Inbound messages, controller → daemon (spec §6 second table).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum ReplayRequest {
    Payload {
        stack_size: u32,
        volatile_memory_size: u32,
        constants: Vec<u8>,
        opcodes: Vec<u8>,
        resources: Vec<ResourceDesc>,
    },
    Resources {
        data: Vec<u8>,
    },
    FenceReady {
        id: u32,
    },
}

impl ReplayRequest {
    pub fn kind_name(&self) -> &'static str {
        match self {
            ReplayRequest::Payload { .. } => "Payload",
            ReplayRequest::Resources { .. } => "Resources",
            ReplayRequest::FenceReady { .. } => "FenceReady",
        }
    }

    /// True for messages that answer a `PayloadRequest`/`ResourceRequest`
    /// (the "request-kind" queue); false for `FenceReady` (the
    /// "data-kind" queue) which may interleave at any time (spec §4.G).
    pub fn is_request_kind(&self) -> bool {
        !matches!(self, ReplayRequest::FenceReady { .. })
    }
}

/// The metadata key an incoming session's auth token must arrive under
/// (spec §6 "Authentication").
pub const AUTH_TOKEN_METADATA_KEY: &str = "gapir-auth-token";

/// The very first frame sent by a connecting controller, carrying the
/// connection's purpose and (for replay connections) its auth token.
/// Ping/Shutdown are the "auxiliary endpoints" of spec §4.H; anything else
/// proceeds straight into the `ReplayRequest`/`ReplayResponse` exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum ControlMessage {
    Replay { auth_token: Vec<u8> },
    Ping,
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replay_request_kind_routes_fence_ready_to_data_queue() {
        assert!(!ReplayRequest::FenceReady { id: 1 }.is_request_kind());
        assert!(ReplayRequest::Resources { data: vec![] }.is_request_kind());
    }

    #[test]
    fn replay_response_round_trips_through_json() {
        let msg = ReplayResponse::ReplayStatus { label: 7, total_instructions: 100, finished_instructions: 50 };
        let json = serde_json::to_string(&msg).unwrap();
        let back: ReplayResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind_name(), "ReplayStatus");
    }
}
