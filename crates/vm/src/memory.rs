//! The arena memory manager (spec §4.A).
//!
//! One contiguous byte buffer is carved into three non-overlapping
//! sub-ranges — volatile (low), constant (middle), opcode (high) — whose
//! bases are placed downward from the arena's end in the order opcode,
//! constant, volatile. A "host pointer" in this Rust port is simply an
//! offset into the arena buffer rather than a raw native pointer; that
//! substitution is the only departure from the original's address model
//! (see DESIGN.md) and every classification/translation operation below
//! still holds.

use crate::error::{VmError, VmResult};

/// Sentinel absolute address meaning "this location was never observed by
/// the tracer." Reads return indeterminate data; writes are errors.
pub const UNOBSERVED_SENTINEL: u64 = 0x0BADF00D;

fn align_down(value: usize, align: usize) -> usize {
    value - (value % align)
}

/// One non-overlapping sub-range of the arena.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Region {
    base: usize,
    size: usize,
}

impl Region {
    fn end(&self) -> usize {
        self.base + self.size
    }

    fn contains(&self, addr: usize, size: usize) -> bool {
        self.size > 0 && addr >= self.base && addr.saturating_add(size) <= self.end()
    }
}

/// The arena and its three sub-regions.
pub struct MemoryManager {
    arena: Vec<u8>,
    alignment: usize,
    opcode: Region,
    constant: Region,
    volatile: Region,
}

impl MemoryManager {
    /// Attempts each candidate size in order: probe by allocating
    /// `size * 1.3`, release, then allocate exactly `size`. Fails only if
    /// every candidate is exhausted (spec §4.A construction).
    pub fn new(candidate_sizes: &[usize]) -> VmResult<Self> {
        for &size in candidate_sizes {
            let probe_size = (size as f64 * 1.3) as usize;
            if try_allocate(probe_size).is_none() {
                continue;
            }
            // Probe succeeded; the real allocation is the one we keep.
            if let Some(arena) = try_allocate(size) {
                return Ok(Self {
                    arena,
                    alignment: std::mem::align_of::<f64>(),
                    opcode: Region::default(),
                    constant: Region::default(),
                    volatile: Region::default(),
                });
            }
        }
        Err(VmError::ArenaAllocationFailed {
            tried: candidate_sizes.to_vec(),
        })
    }

    /// Total arena size in bytes.
    pub fn arena_size(&self) -> usize {
        self.arena.len()
    }

    /// Reserves `opcode_size` bytes at the arena's top, then `const_size`
    /// immediately below it, both aligned down to `alignof::<f64>()`.
    pub fn set_replay_data_size(&mut self, const_size: usize, opcode_size: usize) -> VmResult<()> {
        let arena_len = self.arena.len();
        let opcode_base = align_down(arena_len.saturating_sub(opcode_size), self.alignment);
        if opcode_base + opcode_size > arena_len {
            return Err(VmError::RegionDoesNotFit {
                region: "opcode",
                size: opcode_size,
            });
        }
        let const_base = align_down(opcode_base.saturating_sub(const_size), self.alignment);
        if const_base + const_size > opcode_base {
            return Err(VmError::RegionDoesNotFit {
                region: "constant",
                size: const_size,
            });
        }
        self.opcode = Region { base: opcode_base, size: opcode_size };
        self.constant = Region { base: const_base, size: const_size };
        Ok(())
    }

    /// Reserves `vol_size` bytes below the constant region.
    pub fn set_volatile_memory(&mut self, vol_size: usize) -> VmResult<()> {
        let ceiling = if self.constant.size > 0 { self.constant.base } else { self.opcode.base };
        let ceiling = if ceiling == 0 && self.opcode.size == 0 && self.constant.size == 0 {
            self.arena.len()
        } else {
            ceiling
        };
        if vol_size > ceiling {
            return Err(VmError::RegionDoesNotFit { region: "volatile", size: vol_size });
        }
        let base = align_down(ceiling - vol_size, self.alignment);
        let region = Region { base, size: vol_size };
        if self.constant.size > 0 && region.end() > self.constant.base {
            return Err(VmError::RegionOverlap { region: "volatile", other: "constant" });
        }
        self.volatile = region;
        Ok(())
    }

    pub fn is_constant_address(&self, addr: u64) -> bool {
        self.is_constant_address_with_size(addr, 1)
    }

    pub fn is_volatile_address(&self, addr: u64) -> bool {
        self.is_volatile_address_with_size(addr, 1)
    }

    pub fn is_constant_address_with_size(&self, addr: u64, size: u32) -> bool {
        usize::try_from(addr).map(|a| self.constant.contains(a, size as usize)).unwrap_or(false)
    }

    pub fn is_volatile_address_with_size(&self, addr: u64, size: u32) -> bool {
        usize::try_from(addr).map(|a| self.volatile.contains(a, size as usize)).unwrap_or(false)
    }

    pub fn is_opcode_address_with_size(&self, addr: u64, size: u32) -> bool {
        usize::try_from(addr).map(|a| self.opcode.contains(a, size as usize)).unwrap_or(false)
    }

    /// `false` for the sentinel, `true` for anything else (spec §3).
    pub fn is_observed(addr: u64) -> bool {
        addr != UNOBSERVED_SENTINEL
    }

    pub fn constant_to_absolute(&self, offset: u32) -> VmResult<u64> {
        let abs = self.constant.base + offset as usize;
        if abs > self.constant.end() {
            return Err(VmError::InvalidAddress { addr: abs as u64, size: 0, expected: "constant" });
        }
        Ok(abs as u64)
    }

    pub fn volatile_to_absolute(&self, offset: u32) -> VmResult<u64> {
        let abs = self.volatile.base + offset as usize;
        if abs > self.volatile.end() {
            return Err(VmError::InvalidAddress { addr: abs as u64, size: 0, expected: "volatile" });
        }
        Ok(abs as u64)
    }

    pub fn absolute_to_constant_offset(&self, addr: u64) -> VmResult<u32> {
        let addr = addr as usize;
        if !self.constant.contains(addr, 0) {
            return Err(VmError::InvalidAddress { addr: addr as u64, size: 0, expected: "constant" });
        }
        Ok((addr - self.constant.base) as u32)
    }

    pub fn absolute_to_volatile_offset(&self, addr: u64) -> VmResult<u32> {
        let addr = addr as usize;
        if !self.volatile.contains(addr, 0) {
            return Err(VmError::InvalidAddress { addr: addr as u64, size: 0, expected: "volatile" });
        }
        Ok((addr - self.volatile.base) as u32)
    }

    pub fn volatile_base(&self) -> u64 {
        self.volatile.base as u64
    }

    pub fn constant_base(&self) -> u64 {
        self.constant.base as u64
    }

    pub fn opcode_base(&self) -> u64 {
        self.opcode.base as u64
    }

    pub fn opcode_size(&self) -> usize {
        self.opcode.size
    }

    pub fn constant_size(&self) -> usize {
        self.constant.size
    }

    pub fn volatile_size(&self) -> usize {
        self.volatile.size
    }

    /// Raw byte access for reads, validated against the three regions by
    /// callers before use.
    pub fn bytes(&self) -> &[u8] {
        &self.arena
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.arena
    }

    pub fn read(&self, addr: u64, len: usize) -> VmResult<&[u8]> {
        let addr = addr as usize;
        self.arena.get(addr..addr + len).ok_or(VmError::InvalidAddress {
            addr: addr as u64,
            size: len as u32,
            expected: "arena",
        })
    }

    pub fn write(&mut self, addr: u64, data: &[u8]) -> VmResult<()> {
        if addr == UNOBSERVED_SENTINEL {
            return Err(VmError::WriteThroughSentinel);
        }
        let addr = addr as usize;
        let slice = self.arena.get_mut(addr..addr + data.len()).ok_or(VmError::InvalidAddress {
            addr: addr as u64,
            size: data.len() as u32,
            expected: "arena",
        })?;
        slice.copy_from_slice(data);
        Ok(())
    }
}

fn try_allocate(size: usize) -> Option<Vec<u8>> {
    let mut v = Vec::new();
    v.try_reserve_exact(size).ok()?;
    v.resize(size, 0);
    Some(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(arena_size: usize) -> MemoryManager {
        MemoryManager::new(&[arena_size]).unwrap()
    }

    #[test]
    fn regions_are_non_overlapping_and_within_arena() {
        let mut mm = manager(4096);
        mm.set_replay_data_size(256, 128).unwrap();
        mm.set_volatile_memory(512).unwrap();

        assert!(mm.opcode_base() + mm.opcode_size() as u64 <= 4096);
        assert!(mm.constant_base() + mm.constant_size() as u64 <= mm.opcode_base());
        assert!(mm.volatile_base() + mm.volatile_size() as u64 <= mm.constant_base());
    }

    #[test]
    fn translation_round_trips() {
        let mut mm = manager(4096);
        mm.set_replay_data_size(256, 128).unwrap();
        mm.set_volatile_memory(512).unwrap();

        let abs = mm.volatile_to_absolute(10).unwrap();
        assert!(mm.is_volatile_address(abs));
        assert_eq!(mm.absolute_to_volatile_offset(abs).unwrap(), 10);

        let abs = mm.constant_to_absolute(5).unwrap();
        assert!(mm.is_constant_address(abs));
        assert_eq!(mm.absolute_to_constant_offset(abs).unwrap(), 5);
    }

    #[test]
    fn oversized_region_fails() {
        let mut mm = manager(1024);
        assert!(mm.set_replay_data_size(900, 900).is_err());
    }

    #[test]
    fn sentinel_is_never_observed() {
        assert!(!MemoryManager::is_observed(UNOBSERVED_SENTINEL));
        assert!(MemoryManager::is_observed(0x1000));
    }

    #[test]
    fn write_through_sentinel_errors() {
        let mut mm = manager(4096);
        mm.set_replay_data_size(256, 128).unwrap();
        mm.set_volatile_memory(512).unwrap();
        let err = mm.write(UNOBSERVED_SENTINEL, &[1, 2, 3]).unwrap_err();
        assert_eq!(err, VmError::WriteThroughSentinel);
    }

    #[test]
    fn allocation_falls_back_through_candidates() {
        // The first candidate is absurd; the manager must fall through to
        // one that actually fits in memory.
        let mm = MemoryManager::new(&[usize::MAX / 2, 4096]).unwrap();
        assert_eq!(mm.arena_size(), 4096);
    }
}
