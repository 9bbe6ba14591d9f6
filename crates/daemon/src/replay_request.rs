//! The replay request (spec §4.J): turns a [`PayloadData`] fetched from a
//! `ReplayService` into a sized, populated arena and the materialized
//! resource list the rest of the replay runs against.

use byteorder::{BigEndian, ByteOrder};
use gapir_core::Resource;
use gapir_transport::{PayloadData, ReplayService};
use gapir_vm::MemoryManager;

use crate::error::DaemonResult;

/// Everything the interpreter needs to start running: the sized arena's
/// views plus the resource list, independent of the arena's own storage.
pub struct LoadedReplay {
    pub stack_size_words: u32,
    pub volatile_memory_size: u32,
    pub opcode_word_count: usize,
    pub resources: Vec<Resource>,
}

/// Fetches the payload for `id`, sizes `mm`'s replay sub-regions, and
/// copies the constant/opcode bytes in. The wire's `opcodes` bytes are
/// packed big-endian per word, matching the "32 bits, MSB-first" layout
/// the bytecode decoder assumes (see DESIGN.md).
pub fn load_replay_request(service: &mut dyn ReplayService, mm: &mut MemoryManager, id: &str) -> DaemonResult<(LoadedReplay, Vec<u32>)> {
    let payload: PayloadData = service.get_payload(id)?;

    mm.set_replay_data_size(payload.constants.len(), payload.opcodes.len())?;
    if !payload.constants.is_empty() {
        mm.write(mm.constant_base(), &payload.constants)?;
    }
    if !payload.opcodes.is_empty() {
        mm.write(mm.opcode_base(), &payload.opcodes)?;
    }

    let resources: Vec<Resource> = payload.resources.iter().map(|r| Resource::new(r.id.clone(), r.size)).collect();

    let opcode_words: Vec<u32> = payload
        .opcodes
        .chunks_exact(4)
        .map(BigEndian::read_u32)
        .collect();

    let loaded = LoadedReplay {
        stack_size_words: payload.stack_size,
        volatile_memory_size: payload.volatile_memory_size,
        opcode_word_count: opcode_words.len(),
        resources,
    };
    Ok((loaded, opcode_words))
}
