//! Error types for the bytecode virtual machine.
//!
//! Mirrors the teacher crate's error module: one flat `thiserror` enum
//! covering memory, stack and interpreter failures, with a crate-level
//! `Result` alias. Spec §7 classifies VM errors as "invariant violations":
//! recoverable at the session level, never silently dropped.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VmError {
    /// The memory manager could not allocate any of its candidate sizes.
    #[error("arena allocation failed: tried sizes {tried:?}")]
    ArenaAllocationFailed { tried: Vec<usize> },

    /// A requested sub-region does not fit within the arena.
    #[error("region {region} of size {size} does not fit in the arena")]
    RegionDoesNotFit { region: &'static str, size: usize },

    /// A requested sub-region would overlap an already-placed one.
    #[error("region {region} would overlap the {other} region")]
    RegionOverlap { region: &'static str, other: &'static str },

    /// An address did not classify into the region the caller expected.
    #[error("address {addr:#x} (size {size}) is not a valid {expected} address")]
    InvalidAddress {
        addr: u64,
        size: u32,
        expected: &'static str,
    },

    /// A write was attempted through the "never observed" sentinel address.
    #[error("write through unobserved sentinel address")]
    WriteThroughSentinel,

    /// The stack's sticky invalid latch is set; this op is a no-op.
    #[error("stack is in the invalid state")]
    StackInvalid,

    /// Stack underflow: fewer values present than requested.
    #[error("stack underflow: requested {requested}, available {available}")]
    StackUnderflow { requested: usize, available: usize },

    /// Stack overflow: push would exceed fixed capacity.
    #[error("stack overflow: capacity {capacity} exceeded")]
    StackOverflow { capacity: usize },

    /// Pop/peek requested a type that does not match the value on top.
    #[error("stack type mismatch: expected {expected:?}, found {found:?}")]
    StackTypeMismatch {
        expected: crate::value::ValueType,
        found: crate::value::ValueType,
    },

    /// `ADD` was invoked on a type that has no native addition (`Bool`,
    /// `VolatilePointer`).
    #[error("cannot add values of type {0:?}")]
    UnaddableType(crate::value::ValueType),

    /// Inserting a second handler for the same (api, id) pair.
    #[error("duplicate function id {id:#06x} registered for api {api}")]
    DuplicateFunction { api: u8, id: u16 },

    /// `CALL` referenced an API index outside 0..15.
    #[error("api index {0} out of range (0..15)")]
    ApiIndexOutOfRange(u8),

    /// `CALL` referenced an id with no registered handler.
    #[error("unknown function id {id:#06x} for api {api}")]
    UnknownFunction { api: u8, id: u16 },

    /// An opcode word did not decode to a known opcode.
    #[error("unknown opcode {0:#04x}")]
    UnknownOpcode(u8),

    /// `INLINE_RESOURCE`'s patch-up tables did not conform to spec §9.
    #[error("malformed INLINE_RESOURCE patch-up layout: {reason}")]
    MalformedInlineResource { reason: String },

    /// A jump targeted a label that does not exist in the opcode stream.
    #[error("unresolved jump label {0}")]
    UnresolvedLabel(u32),

    /// `JUMP_NZ`/`JUMP_Z` fired with a non-empty stack.
    #[error("stack must be empty at jump, found {0} values")]
    StackNotEmptyAtJump(usize),

    /// A thread id referenced by `SWITCH_THREAD` is not in the pool.
    #[error("unknown thread id {0}")]
    UnknownThread(u32),

    /// Forwarded failure from a builtin invoked via `CALL`.
    #[error("builtin {0} failed: {1}")]
    BuiltinFailed(String, String),

    /// The instruction stream was exhausted mid-execution.
    #[error("opcode stream exhausted at index {0}")]
    OpcodeStreamExhausted(usize),
}

pub type VmResult<T> = Result<T, VmError>;
