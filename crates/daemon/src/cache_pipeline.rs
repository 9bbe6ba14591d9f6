//! Wires the replay transport's `getResources` call and the on-disk archive
//! into a single [`ResourceFetcher`] (spec §4.F): the batching loader's
//! ultimate fallback checks the disk archive first and only asks the
//! controller for what is still missing, persisting what it gets back.

use std::sync::Arc;

use parking_lot::Mutex;

use gapir_core::Resource;
use gapir_resources::{DiskCache, ResourceError, ResourceFetcher, ResourceResult};
use gapir_transport::ReplayService;

/// Adapts a live or archived `ReplayService`'s `getResources` into a
/// [`ResourceFetcher`], the seam `CachedResourceLoader`/`MemoryCache`
/// expect. `&self`-only interior mutability is required because the
/// service's own methods take `&mut self`, while `fetch` does not.
pub struct ServiceFetcher {
    service: Arc<Mutex<Box<dyn ReplayService>>>,
}

impl ServiceFetcher {
    pub fn new(service: Arc<Mutex<Box<dyn ReplayService>>>) -> Self {
        Self { service }
    }
}

impl ResourceFetcher for ServiceFetcher {
    fn fetch(&self, resources: &[Resource]) -> ResourceResult<Vec<u8>> {
        let ids: Vec<String> = resources.iter().map(|r| r.id.clone()).collect();
        let total: u64 = resources.iter().map(|r| r.size as u64).sum();
        self.service.lock().get_resources(&ids, total).map_err(|e| ResourceError::FetchFailed(e.to_string()))
    }
}

/// Checks the on-disk archive before falling through to `upstream`,
/// persisting anything `upstream` returns so the next replay of the same
/// capture hits disk instead of the controller (spec §4.E/F).
pub struct CachingFetcher {
    disk: Mutex<DiskCache>,
    upstream: Arc<dyn ResourceFetcher>,
}

impl CachingFetcher {
    pub fn new(disk: DiskCache, upstream: Arc<dyn ResourceFetcher>) -> Self {
        Self { disk: Mutex::new(disk), upstream }
    }
}

impl ResourceFetcher for CachingFetcher {
    fn fetch(&self, resources: &[Resource]) -> ResourceResult<Vec<u8>> {
        let mut disk = self.disk.lock();
        let mut hits: Vec<Option<Vec<u8>>> = Vec::with_capacity(resources.len());
        let mut misses = Vec::new();

        for r in resources {
            let mut buf = vec![0u8; r.size as usize];
            if disk.load_cache(r, &mut buf)? {
                hits.push(Some(buf));
            } else {
                hits.push(None);
                misses.push(r.clone());
            }
        }

        let fetched = if misses.is_empty() { Vec::new() } else { self.upstream.fetch(&misses)? };

        let mut out = Vec::new();
        let mut fetched_offset = 0;
        for (i, r) in resources.iter().enumerate() {
            match &hits[i] {
                Some(bytes) => out.extend_from_slice(bytes),
                None => {
                    let size = r.size as usize;
                    let slice = &fetched[fetched_offset..fetched_offset + size];
                    disk.put_cache(r, slice)?;
                    out.extend_from_slice(slice);
                    fetched_offset += size;
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gapir_resources::MockFetcher;

    fn resource(id: &str, size: u32) -> Resource {
        Resource::new(id.to_string(), size)
    }

    #[test]
    fn disk_hit_avoids_upstream_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let mut disk = DiskCache::open(dir.path(), "archive").unwrap();
        disk.put_cache(&resource("a", 4), b"aaaa").unwrap();

        let upstream = Arc::new(MockFetcher::new());
        let fetcher = CachingFetcher::new(disk, upstream.clone());
        let bytes = fetcher.fetch(&[resource("a", 4)]).unwrap();
        assert_eq!(bytes, b"aaaa");
        assert_eq!(upstream.fetch_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[test]
    fn disk_miss_falls_through_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let disk = DiskCache::open(dir.path(), "archive").unwrap();

        let upstream = Arc::new(MockFetcher::new());
        upstream.insert("a", b"aaaa".to_vec());
        let fetcher = CachingFetcher::new(disk, upstream.clone());

        let bytes = fetcher.fetch(&[resource("a", 4)]).unwrap();
        assert_eq!(bytes, b"aaaa");
        assert_eq!(upstream.fetch_calls.load(std::sync::atomic::Ordering::SeqCst), 1);

        // Second fetch hits disk now, no further upstream call.
        let bytes = fetcher.fetch(&[resource("a", 4)]).unwrap();
        assert_eq!(bytes, b"aaaa");
        assert_eq!(upstream.fetch_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
