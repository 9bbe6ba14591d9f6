//! The fetch-only fallback every cache ultimately falls back to: a single
//! batched request for a list of resources, returning one concatenated
//! byte range in request order. Modeled on the original's
//! `resource_requester`/`resource_provider` split: the fetcher knows
//! nothing about caching, only how to pull bytes for ids it is given.

use gapir_core::Resource;

use crate::error::ResourceResult;

pub trait ResourceFetcher: Send + Sync {
    /// Fetches `resources` in one batched round trip and returns their
    /// bytes concatenated in the same order, with no padding between
    /// entries.
    fn fetch(&self, resources: &[Resource]) -> ResourceResult<Vec<u8>>;
}

/// An in-memory fetcher for tests: resources must have been registered
/// ahead of time via [`MockFetcher::insert`]. Modeled on the original's
/// `mock_resource_provider`.
#[cfg(any(test, feature = "testing"))]
pub struct MockFetcher {
    contents: std::sync::Mutex<std::collections::HashMap<String, Vec<u8>>>,
    pub fetch_calls: std::sync::atomic::AtomicUsize,
}

#[cfg(any(test, feature = "testing"))]
impl MockFetcher {
    pub fn new() -> Self {
        Self {
            contents: std::sync::Mutex::new(std::collections::HashMap::new()),
            fetch_calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn insert(&self, id: impl Into<String>, bytes: Vec<u8>) {
        self.contents.lock().unwrap().insert(id.into(), bytes);
    }
}

#[cfg(any(test, feature = "testing"))]
impl Default for MockFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "testing"))]
impl ResourceFetcher for MockFetcher {
    fn fetch(&self, resources: &[Resource]) -> ResourceResult<Vec<u8>> {
        self.fetch_calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let contents = self.contents.lock().unwrap();
        let mut out = Vec::new();
        for r in resources {
            let bytes = contents.get(&r.id).ok_or_else(|| crate::error::ResourceError::MissingFromFetch { id: r.id.clone() })?;
            if bytes.len() != r.size as usize {
                return Err(crate::error::ResourceError::FetchSizeMismatch { got: bytes.len(), expected: r.size as usize });
            }
            out.extend_from_slice(bytes);
        }
        Ok(out)
    }
}
