//! The `(id, size)` resource identity shared by the VM, the resource
//! pipeline and the transport layer (spec §3 "Resource").

use serde::{Deserialize, Serialize};

/// An opaque, content-addressed resource identity.
///
/// The id is a content-hash string minted by the upstream compiler; this
/// crate never inspects its bytes beyond equality. Two resources are equal
/// iff both the id and the size match, per spec §3.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub size: u32,
}

impl Resource {
    pub fn new(id: impl Into<String>, size: u32) -> Self {
        Self { id: id.into(), size }
    }
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({}B)", self.id, self.size)
    }
}
