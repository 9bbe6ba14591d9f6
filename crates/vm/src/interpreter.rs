//! Fetch-decode-execute loop (spec §4.K) and the builtin dispatch contract
//! that lets the VM call out to post-buffering, resource loading,
//! notifications, fences and the graphics renderer without depending on
//! any of those concretely.

use std::collections::HashMap;

use crate::error::{VmError, VmResult};
use crate::function_table::FunctionTables;
use crate::memory::MemoryManager;
use crate::opcode::{decode, sign_extend_20, Op};
use crate::stack::Stack;
use crate::value::{Value, ValueType};

/// Result of invoking a builtin: either it left nothing on the stack, or
/// it produced a value the caller may choose to push (`CALL`'s
/// `pushReturn` flag).
#[derive(Debug, Clone, Copy)]
pub enum BuiltinOutcome {
    NoReturn,
    Return(Value),
}

/// Everything one builtin invocation needs.
pub struct BuiltinCall<'a> {
    pub stack: &'a mut Stack,
    pub mm: &'a mut MemoryManager,
    pub host: &'a mut dyn BuiltinHost,
    pub label: u32,
    pub api_index: u8,
    pub func_id: u16,
}

pub type BuiltinFn = fn(&mut BuiltinCall) -> VmResult<BuiltinOutcome>;

/// The side of the world the interpreter cannot see directly: the
/// resource loader, the post buffer, the replay service and the graphics
/// renderer all hang off this trait, implemented by `Context` in the
/// daemon crate (spec §4.L).
pub trait BuiltinHost {
    /// Lazily constructs and installs `api_index`'s renderer table if it
    /// is not already populated; returns whether the renderer is valid.
    fn ensure_api_table(&mut self, api_index: u8, tables: &mut FunctionTables) -> VmResult<bool>;

    /// Enqueues `bytes` onto the post buffer (`POST_FUNCTION_ID`).
    fn post(&mut self, bytes: &[u8]) -> VmResult<()>;

    /// Loads resource `index` into `dst_addr` (`RESOURCE_FUNCTION_ID`).
    fn load_resource(&mut self, index: u32, dst_addr: u64, mm: &mut MemoryManager) -> VmResult<()>;

    /// Forwards a notification (`NOTIFICATION_FUNCTION_ID`).
    fn notify(&mut self, id: u32, label: u32, bytes: &[u8]) -> VmResult<()>;

    /// Blocks until fence `id` is signalled, returning the signalled id
    /// (`WAIT_FUNCTION_ID`).
    fn wait_fence(&mut self, id: u32) -> VmResult<u32>;

    /// Invoked before every `CALL` with `(label, total, current)` so the
    /// host can decide when to emit `sendReplayStatus`.
    fn check_replay_status(&mut self, label: u32, total: u32, current: u32);

    /// Dispatches a graphics builtin (`CreateVkInstance` and friends) to
    /// the renderer registered for `api_index`. Installed into each API's
    /// own `FunctionTable` by `ensure_api_table`'s implementation, which
    /// is why the generic handler needs a host seam to reach the
    /// concrete renderer rather than closing over it directly (spec
    /// §4.L/N).
    fn invoke_graphics_builtin(&mut self, api_index: u8, func_id: u16, args: &[u8]) -> VmResult<i32>;
}

struct ThreadState {
    ip: usize,
    stack: Stack,
    last_label: u32,
}

/// The interpreter itself: owns the per-API function tables and the
/// lazily built label→index jump table, and drives execution across
/// however many cooperative virtual threads `SWITCH_THREAD` creates.
pub struct Interpreter {
    tables: FunctionTables,
    labels: HashMap<u32, usize>,
    scanned_to: usize,
}

impl Interpreter {
    pub fn new() -> Self {
        let mut tables = FunctionTables::new();
        crate::builtins::register(tables.table_mut(crate::function_table::GLOBAL_API).unwrap());
        Self { tables, labels: HashMap::new(), scanned_to: 0 }
    }

    /// Registers an additional handler in the global (API 0) table, used
    /// by the daemon to install its graphics builtins alongside the four
    /// intrinsic ones this crate already registers (spec §4.L).
    pub fn register_global(&mut self, id: u16, handler: BuiltinFn) -> VmResult<()> {
        self.tables
            .table_mut(crate::function_table::GLOBAL_API)
            .unwrap()
            .insert(crate::function_table::GLOBAL_API, id, handler)
    }

    fn resolve_label(&mut self, id: u32, opcodes: &[u32]) -> VmResult<usize> {
        if let Some(&idx) = self.labels.get(&id) {
            return Ok(idx);
        }
        let mut i = self.scanned_to;
        while i < opcodes.len() {
            if let Ok(f) = decode(opcodes[i]) {
                if f.op == Op::JumpLabel {
                    self.labels.insert(f.imm26, i);
                    if f.imm26 == id {
                        self.scanned_to = i + 1;
                        return Ok(i);
                    }
                }
            }
            i += 1;
        }
        self.scanned_to = i;
        Err(VmError::UnresolvedLabel(id))
    }

    /// Runs the whole replay: starts thread 0 at instruction 0 and keeps
    /// switching threads per `SWITCH_THREAD` until the currently active
    /// thread's instruction pointer runs off the end of the stream.
    ///
    /// At most one virtual thread executes at any instant (spec §5); real
    /// OS-thread handoff for `SWITCH_THREAD` is simulated in-process here
    /// rather than literally dispatched to a pool, since the mutable
    /// arena and host references this loop holds cannot safely cross a
    /// real thread boundary without synchronization that would defeat the
    /// point of a strictly-sequential handoff (see DESIGN.md). `SWITCH_THREAD`
    /// carries the one live continuation's instruction pointer and stack
    /// over to its new thread id rather than starting a fresh one — the
    /// original keeps a single shared stack and simply resumes from
    /// `mCurrentInstruction + 1` on a different worker, it does not give
    /// each thread id its own independent execution state.
    pub fn run(
        &mut self,
        mm: &mut MemoryManager,
        opcodes: &[u32],
        host: &mut dyn BuiltinHost,
        stack_capacity: usize,
    ) -> VmResult<()> {
        let mut threads: HashMap<u32, ThreadState> = HashMap::new();
        threads.insert(0, ThreadState { ip: 0, stack: Stack::new(stack_capacity), last_label: 0 });
        let mut current: u32 = 0;

        loop {
            let next = {
                let thread = threads.get_mut(&current).expect("active thread always exists");
                self.step_thread(thread, mm, opcodes, host)?
            };
            match next {
                Some(target) => {
                    let state = threads.remove(&current).expect("active thread always exists");
                    threads.insert(target, state);
                    current = target;
                }
                None => {
                    let thread = threads.get(&current).unwrap();
                    if thread.ip >= opcodes.len() {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Executes instructions on `thread` until it either exhausts the
    /// stream or hits `SWITCH_THREAD`, in which case it returns the
    /// target thread id.
    fn step_thread(
        &mut self,
        thread: &mut ThreadState,
        mm: &mut MemoryManager,
        opcodes: &[u32],
        host: &mut dyn BuiltinHost,
    ) -> VmResult<Option<u32>> {
        while thread.ip < opcodes.len() {
            let word = opcodes[thread.ip];
            let fields = decode(word).map_err(|e| {
                tracing::error!(ip = thread.ip, word, "opcode decode failed: {e}");
                e
            })?;
            thread.ip += 1;

            match fields.op {
                Op::Call => {
                    host.check_replay_status(thread.last_label, opcodes.len() as u32, thread.ip as u32);
                    self.exec_call(thread, mm, host, fields.api_index, fields.func_id, fields.push_return)?;
                }
                Op::PushI => {
                    let ty = ValueType::from_tag(fields.type_tag).ok_or(VmError::UnknownOpcode(fields.type_tag))?;
                    let raw = encode_push_immediate(ty, fields.imm20);
                    thread.stack.push_value(mm, ty, raw);
                }
                Op::LoadC => {
                    let ty = ValueType::from_tag(fields.type_tag).ok_or(VmError::UnknownOpcode(fields.type_tag))?;
                    let addr = mm.constant_to_absolute(fields.imm20)?;
                    thread.stack.push_from(mm, ty, addr);
                }
                Op::LoadV => {
                    let ty = ValueType::from_tag(fields.type_tag).ok_or(VmError::UnknownOpcode(fields.type_tag))?;
                    let addr = mm.volatile_to_absolute(fields.imm20)?;
                    thread.stack.push_from(mm, ty, addr);
                }
                Op::Load => {
                    let ty = ValueType::from_tag(fields.type_tag).ok_or(VmError::UnknownOpcode(fields.type_tag))?;
                    let addr = thread.stack.pop_pointer(mm)?;
                    thread.stack.push_from(mm, ty, addr);
                }
                Op::Pop => thread.stack.discard(fields.imm26 as usize),
                Op::StoreV => {
                    let addr = mm.volatile_to_absolute(fields.imm26)?;
                    thread.stack.pop_to(mm, addr)?;
                }
                Op::Store => {
                    let addr = thread.stack.pop_pointer(mm)?;
                    thread.stack.pop_to(mm, addr)?;
                }
                Op::Resource => {
                    thread.stack.push(mm, Value::Uint32(fields.imm26));
                    self.exec_call(
                        thread,
                        mm,
                        host,
                        crate::function_table::GLOBAL_API,
                        crate::builtins::RESOURCE_FUNCTION_ID,
                        false,
                    )?;
                }
                Op::InlineResource => {
                    exec_inline_resource(thread, mm, opcodes)?;
                }
                Op::Post => {
                    self.exec_call(thread, mm, host, crate::function_table::GLOBAL_API, crate::builtins::POST_FUNCTION_ID, false)?;
                }
                Op::Notification => {
                    self.exec_call(
                        thread,
                        mm,
                        host,
                        crate::function_table::GLOBAL_API,
                        crate::builtins::NOTIFICATION_FUNCTION_ID,
                        false,
                    )?;
                }
                Op::Wait => {
                    thread.stack.push(mm, Value::Uint32(fields.imm26));
                    self.exec_call(thread, mm, host, crate::function_table::GLOBAL_API, crate::builtins::WAIT_FUNCTION_ID, false)?;
                }
                Op::Copy => {
                    let dst = thread.stack.pop_pointer(mm)?;
                    let src = thread.stack.pop_pointer(mm)?;
                    let count = fields.imm26 as usize;
                    let bytes = mm.read(src, count)?.to_vec();
                    mm.write(dst, &bytes)?;
                }
                Op::Clone => thread.stack.clone_slot(mm, fields.imm26 as usize),
                Op::Strcpy => {
                    let dst = thread.stack.pop_pointer(mm)?;
                    let src = thread.stack.pop_pointer(mm)?;
                    let count = fields.imm26 as usize;
                    exec_strcpy(mm, src, dst, count)?;
                }
                Op::Extend => exec_extend(&mut thread.stack, mm, fields.imm26),
                Op::Add => exec_add(&mut thread.stack, mm, fields.imm26 as usize)?,
                Op::Label => thread.last_label = fields.imm26,
                Op::SwitchThread => return Ok(Some(fields.imm26)),
                Op::JumpLabel => {
                    self.labels.insert(fields.imm26, thread.ip - 1);
                }
                Op::JumpNz | Op::JumpZ => {
                    // Popped as the raw 32-bit word regardless of signed/unsigned
                    // tag: the compiler emits whichever of Int32/Uint32 it had in
                    // hand, and the jump only cares about zero-ness.
                    let n = thread.stack.pop_base_value() as u32;
                    if !thread.stack.is_valid() {
                        return Err(VmError::StackInvalid);
                    }
                    if !thread.stack.is_empty() {
                        return Err(VmError::StackNotEmptyAtJump(thread.stack.len()));
                    }
                    let take = match fields.op {
                        Op::JumpNz => n != 0,
                        Op::JumpZ => n == 0,
                        _ => unreachable!(),
                    };
                    if take {
                        let idx = self.resolve_label(fields.imm26, opcodes)?;
                        thread.ip = idx;
                    }
                }
                _ => unreachable!("opcode {:?} has no generic handler", fields.op),
            }

            if !thread.stack.is_valid() {
                tracing::error!(ip = thread.ip - 1, label = thread.last_label, "stack invalidated");
                return Err(VmError::StackInvalid);
            }
        }
        Ok(None)
    }

    fn exec_call(
        &mut self,
        thread: &mut ThreadState,
        mm: &mut MemoryManager,
        host: &mut dyn BuiltinHost,
        api: u8,
        id: u16,
        push_return: bool,
    ) -> VmResult<()> {
        if api != crate::function_table::GLOBAL_API && !self.tables.is_populated(api) {
            host.ensure_api_table(api, &mut self.tables)?;
        }

        let global = self.tables.table(crate::function_table::GLOBAL_API)?.get(id);
        let handler = match global {
            Some(h) => h,
            None => self
                .tables
                .table(api)?
                .get(id)
                .ok_or(VmError::UnknownFunction { api, id })?,
        };

        let mut call = BuiltinCall {
            stack: &mut thread.stack,
            mm,
            host,
            label: thread.last_label,
            api_index: api,
            func_id: id,
        };
        match handler(&mut call)? {
            BuiltinOutcome::NoReturn => {}
            BuiltinOutcome::Return(v) => {
                if push_return {
                    thread.stack.push(mm, v);
                }
            }
        }
        Ok(())
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

/// Converts a `PUSH_I` 20-bit immediate into the value's raw bit pattern,
/// sign-extending integers and mantissa-shifting floats/doubles so a
/// following `EXTEND` can build the rest of the mantissa.
fn encode_push_immediate(ty: ValueType, imm20: u32) -> u64 {
    match ty {
        ValueType::Int8 | ValueType::Int16 | ValueType::Int32 | ValueType::Int64 => {
            sign_extend_20(imm20) as i64 as u64
        }
        ValueType::Float => ((imm20 as u64) << 23),
        ValueType::Double => ((imm20 as u64) << 52),
        _ => imm20 as u64,
    }
}

fn exec_extend(stack: &mut Stack, mm: &MemoryManager, imm26: u32) {
    let Some(ty) = stack.top_type() else {
        return;
    };
    let top = stack.pop_typed(ty);
    let extended = match top {
        Value::Float(v) => {
            // Mantissa is 23 bits; PUSH_I already placed the sign/exponent
            // (and the mantissa's top bits) via its own 23-bit shift, so
            // EXTEND just ORs the low mantissa bits in, masked to 23 bits.
            let bits = v.to_bits() | (imm26 & 0x007F_FFFF);
            Value::Float(f32::from_bits(bits))
        }
        Value::Double(v) => {
            // Mantissa is 52 bits, wider than one 26-bit immediate, so it
            // is built up across two EXTENDs: shift the whole value left
            // by 26, OR in the new bits, mask to the mantissa field, then
            // restore the sign/exponent bits untouched by that shift.
            let bits = v.to_bits();
            let exponent = bits & 0xFFF0_0000_0000_0000;
            let shifted = (bits << 26) | imm26 as u64;
            let mantissa = shifted & 0x000F_FFFF_FFFF_FFFF;
            Value::Double(f64::from_bits(mantissa | exponent))
        }
        other => {
            let shifted = (other.raw_bits() << 26) | imm26 as u64;
            Value::from_raw_bits(ty, shifted)
        }
    };
    stack.push(mm, extended);
}

fn exec_add(stack: &mut Stack, mm: &MemoryManager, count: usize) -> VmResult<()> {
    if count == 0 {
        return Ok(());
    }
    let ty = stack.top_type().ok_or(VmError::StackUnderflow { requested: count, available: 0 })?;
    if matches!(ty, ValueType::Bool | ValueType::VolatilePointer) {
        return Err(VmError::UnaddableType(ty));
    }
    let mut acc: u64 = 0;
    let mut is_float = false;
    let mut is_double = false;
    let mut float_acc = 0f32;
    let mut double_acc = 0f64;
    for _ in 0..count {
        let v = stack.pop_typed(ty);
        match v {
            Value::Float(f) => {
                is_float = true;
                float_acc += f;
            }
            Value::Double(d) => {
                is_double = true;
                double_acc += d;
            }
            Value::Int8(x) => acc = acc.wrapping_add(x as i64 as u64),
            Value::Int16(x) => acc = acc.wrapping_add(x as i64 as u64),
            Value::Int32(x) => acc = acc.wrapping_add(x as i64 as u64),
            Value::Int64(x) => acc = acc.wrapping_add(x as u64),
            Value::Uint8(x) => acc = acc.wrapping_add(x as u64),
            Value::Uint16(x) => acc = acc.wrapping_add(x as u64),
            Value::Uint32(x) => acc = acc.wrapping_add(x as u64),
            Value::Uint64(x) => acc = acc.wrapping_add(x),
            Value::AbsolutePointer(x) => acc = acc.wrapping_add(x),
            Value::ConstantPointer(x) => acc = acc.wrapping_add(x as u64),
            Value::Bool(_) | Value::VolatilePointer(_) => unreachable!("rejected above"),
        }
    }
    let result = if is_double {
        Value::Double(double_acc)
    } else if is_float {
        Value::Float(float_acc)
    } else {
        Value::from_raw_bits(ty, acc)
    };
    stack.push(mm, result);
    Ok(())
}

fn exec_strcpy(mm: &mut MemoryManager, src: u64, dst: u64, count: usize) -> VmResult<()> {
    if count == 0 {
        return Ok(());
    }
    let src_bytes = mm.read(src, count)?.to_vec();
    let mut out = vec![0u8; count];
    let nul = src_bytes.iter().position(|&b| b == 0).unwrap_or(count - 1).min(count - 1);
    out[..nul].copy_from_slice(&src_bytes[..nul]);
    mm.write(dst, &out)
}

/// `INLINE_RESOURCE` (spec §4.K, layout per spec §9's open-question
/// resolution): pops the destination pointer, then reads a `blobLen`-byte
/// blob packed as `ceil(blobLen/4)` words from the stream, followed by a
/// value-patch-up count and pairs, then a pointer-patch-up count and
/// pairs, all as plain `u32` words.
fn exec_inline_resource(thread: &mut ThreadState, mm: &mut MemoryManager, opcodes: &[u32]) -> VmResult<()> {
    let dst = thread.stack.pop_pointer(mm)?;
    let fields = decode(opcodes[thread.ip - 1]).unwrap();
    let blob_len = fields.imm26 as usize;
    let blob_words = blob_len.div_ceil(4);

    let read_word = |ip: &mut usize| -> VmResult<u32> {
        let w = *opcodes.get(*ip).ok_or(VmError::OpcodeStreamExhausted(*ip))?;
        *ip += 1;
        Ok(w)
    };

    let mut ip = thread.ip;
    let mut blob = Vec::with_capacity(blob_words * 4);
    for _ in 0..blob_words {
        blob.extend_from_slice(&read_word(&mut ip)?.to_le_bytes());
    }
    blob.truncate(blob_len);

    let num_value_patchups = read_word(&mut ip)?;
    for _ in 0..num_value_patchups {
        let blob_offset = read_word(&mut ip)? as usize;
        let volatile_offset = read_word(&mut ip)?;
        let abs = mm.volatile_to_absolute(volatile_offset)?;
        blob_write(&mut blob, blob_offset, &abs.to_le_bytes())?;
    }

    let num_pointer_patchups = read_word(&mut ip)?;
    for _ in 0..num_pointer_patchups {
        let src_offset = read_word(&mut ip)? as usize;
        let dst_offset = read_word(&mut ip)? as usize;
        let bytes = blob
            .get(src_offset..src_offset + 4)
            .ok_or(VmError::MalformedInlineResource { reason: "pointer patch-up source out of range".into() })?
            .to_vec();
        blob_write(&mut blob, dst_offset, &bytes)?;
    }

    thread.ip = ip;
    mm.write(dst, &blob)
}

fn blob_write(blob: &mut [u8], offset: usize, bytes: &[u8]) -> VmResult<()> {
    let slice = blob
        .get_mut(offset..offset + bytes.len())
        .ok_or(VmError::MalformedInlineResource { reason: "patch-up target out of range".into() })?;
    slice.copy_from_slice(bytes);
    Ok(())
}
