//! Bytecode virtual machine: arena memory manager, typed stack, per-API
//! function tables and the fetch-decode-execute interpreter that ties
//! them together (spec §4.A-C, K).
//!
//! This crate is a leaf: it knows nothing about resource loading, the
//! replay transport or the graphics renderer. Those hang off the
//! [`interpreter::BuiltinHost`] trait, implemented by the daemon crate's
//! `Context`.

pub mod builtins;
pub mod error;
pub mod function_table;
pub mod interpreter;
pub mod memory;
pub mod opcode;
pub mod stack;
pub mod value;

pub use error::{VmError, VmResult};
pub use function_table::{FunctionTable, FunctionTables, GLOBAL_API, NUM_APIS};
pub use interpreter::{BuiltinCall, BuiltinFn, BuiltinHost, BuiltinOutcome, Interpreter};
pub use memory::MemoryManager;
pub use opcode::{decode, Op, RawFields};
pub use stack::Stack;
pub use value::{Value, ValueType};
