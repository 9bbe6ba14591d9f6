//! The four intrinsic global builtins every replay can call regardless of
//! which graphics API is being replayed (spec §4.L). Graphics-specific
//! builtins (`CreateVkInstance` and friends) are registered separately by
//! the daemon crate via `Interpreter::register_global`, since they need
//! access to an actual renderer this crate has no concept of.

use crate::error::VmResult;
use crate::function_table::FunctionTable;
use crate::interpreter::{BuiltinCall, BuiltinOutcome};
use crate::value::{Value, ValueType};

pub const POST_FUNCTION_ID: u16 = 0xff00;
pub const RESOURCE_FUNCTION_ID: u16 = 0xff01;
pub const NOTIFICATION_FUNCTION_ID: u16 = 0xff02;
pub const WAIT_FUNCTION_ID: u16 = 0xff03;

pub(crate) fn register(table: &mut FunctionTable) {
    table.insert(crate::function_table::GLOBAL_API, POST_FUNCTION_ID, post).unwrap();
    table.insert(crate::function_table::GLOBAL_API, RESOURCE_FUNCTION_ID, resource).unwrap();
    table.insert(crate::function_table::GLOBAL_API, NOTIFICATION_FUNCTION_ID, notification).unwrap();
    table.insert(crate::function_table::GLOBAL_API, WAIT_FUNCTION_ID, wait).unwrap();
}

/// `POST size, srcPtr`: forwards `size` bytes read from `srcPtr` to the
/// post buffer.
fn post(call: &mut BuiltinCall) -> VmResult<BuiltinOutcome> {
    let size = call.stack.pop_typed(ValueType::Uint32);
    let Value::Uint32(size) = size else { unreachable!() };
    let src = call.stack.pop_pointer(call.mm)?;
    let bytes = call.mm.read(src, size as usize)?;
    call.host.post(bytes)?;
    Ok(BuiltinOutcome::NoReturn)
}

/// `RESOURCE index, dstPtr`: loads resource `index` into `dstPtr`. Pops
/// `id` then `dst`, matching the opcode's push order (index pushed last,
/// so it sits on top at builtin entry).
fn resource(call: &mut BuiltinCall) -> VmResult<BuiltinOutcome> {
    let index = call.stack.pop_typed(ValueType::Uint32);
    let Value::Uint32(index) = index else { unreachable!() };
    let dst = call.stack.pop_pointer(call.mm)?;
    call.host.load_resource(index, dst, call.mm)?;
    Ok(BuiltinOutcome::NoReturn)
}

/// `NOTIFICATION id, size, srcPtr`: forwards a blob to the replay service
/// tagged with the current label. Pops `count`, then `id`, then `src`.
fn notification(call: &mut BuiltinCall) -> VmResult<BuiltinOutcome> {
    let size = call.stack.pop_typed(ValueType::Uint32);
    let Value::Uint32(size) = size else { unreachable!() };
    let id = call.stack.pop_typed(ValueType::Uint32);
    let Value::Uint32(id) = id else { unreachable!() };
    let src = call.stack.pop_pointer(call.mm)?;
    let bytes = call.mm.read(src, size as usize)?.to_vec();
    call.host.notify(id, call.label, &bytes)?;
    Ok(BuiltinOutcome::NoReturn)
}

/// `WAIT id`: blocks until fence `id` is signalled.
fn wait(call: &mut BuiltinCall) -> VmResult<BuiltinOutcome> {
    let id = call.stack.pop_typed(ValueType::Uint32);
    let Value::Uint32(id) = id else { unreachable!() };
    let signalled = call.host.wait_fence(id)?;
    Ok(BuiltinOutcome::Return(Value::Uint32(signalled)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function_table::FunctionTables;
    use crate::memory::MemoryManager;
    use crate::stack::Stack;

    #[derive(Default)]
    struct RecordingHost {
        posted: Vec<u8>,
        loaded_resource: Option<(u32, u64)>,
        notified: Option<(u32, u32, Vec<u8>)>,
    }

    impl crate::interpreter::BuiltinHost for RecordingHost {
        fn ensure_api_table(&mut self, _: u8, _: &mut FunctionTables) -> VmResult<bool> {
            Ok(false)
        }
        fn post(&mut self, bytes: &[u8]) -> VmResult<()> {
            self.posted = bytes.to_vec();
            Ok(())
        }
        fn load_resource(&mut self, index: u32, dst_addr: u64, _: &mut MemoryManager) -> VmResult<()> {
            self.loaded_resource = Some((index, dst_addr));
            Ok(())
        }
        fn notify(&mut self, id: u32, label: u32, bytes: &[u8]) -> VmResult<()> {
            self.notified = Some((id, label, bytes.to_vec()));
            Ok(())
        }
        fn wait_fence(&mut self, id: u32) -> VmResult<u32> {
            Ok(id + 1)
        }
        fn check_replay_status(&mut self, _: u32, _: u32, _: u32) {}
        fn invoke_graphics_builtin(&mut self, _api_index: u8, _func_id: u16, _args: &[u8]) -> VmResult<i32> {
            Ok(0)
        }
    }

    fn mm() -> MemoryManager {
        let mut mm = MemoryManager::new(&[4096]).unwrap();
        mm.set_replay_data_size(128, 64).unwrap();
        mm.set_volatile_memory(256).unwrap();
        mm
    }

    #[test]
    fn post_reads_then_forwards() {
        let mut mm = mm();
        let addr = mm.volatile_to_absolute(0).unwrap();
        mm.write(addr, b"hi!!").unwrap();
        let mut stack = Stack::new(8);
        stack.push(&mm, Value::VolatilePointer(0));
        stack.push(&mm, Value::Uint32(4));
        let mut host = RecordingHost::default();
        let mut call = BuiltinCall { stack: &mut stack, mm: &mut mm, host: &mut host, label: 0, api_index: 0, func_id: POST_FUNCTION_ID };
        post(&mut call).unwrap();
        assert_eq!(host.posted, b"hi!!");
    }

    #[test]
    fn resource_pops_index_then_dst() {
        let mut mm = mm();
        let dst_addr = mm.volatile_to_absolute(100).unwrap();
        let mut stack = Stack::new(8);
        // Pushed in the opcode's order: dst first, index last (on top).
        stack.push(&mm, Value::VolatilePointer(100));
        stack.push(&mm, Value::Uint32(3));
        let mut host = RecordingHost::default();
        let mut call = BuiltinCall { stack: &mut stack, mm: &mut mm, host: &mut host, label: 0, api_index: 0, func_id: RESOURCE_FUNCTION_ID };
        resource(&mut call).unwrap();
        assert_eq!(host.loaded_resource, Some((3, dst_addr)));
    }

    #[test]
    fn notification_pops_count_id_then_src() {
        let mut mm = mm();
        let addr = mm.volatile_to_absolute(0).unwrap();
        mm.write(addr, b"xy").unwrap();
        let mut stack = Stack::new(8);
        // Pushed in the opcode's order: src, id, count (count on top).
        stack.push(&mm, Value::VolatilePointer(0));
        stack.push(&mm, Value::Uint32(99));
        stack.push(&mm, Value::Uint32(2));
        let mut host = RecordingHost::default();
        let mut call = BuiltinCall { stack: &mut stack, mm: &mut mm, host: &mut host, label: 7, api_index: 0, func_id: NOTIFICATION_FUNCTION_ID };
        notification(&mut call).unwrap();
        assert_eq!(host.notified, Some((99, 7, b"xy".to_vec())));
    }

    #[test]
    fn wait_returns_signalled_id() {
        let mut mm = mm();
        let mut stack = Stack::new(8);
        stack.push(&mm, Value::Uint32(41));
        let mut host = RecordingHost::default();
        let mut call = BuiltinCall { stack: &mut stack, mm: &mut mm, host: &mut host, label: 0, api_index: 0, func_id: WAIT_FUNCTION_ID };
        match wait(&mut call).unwrap() {
            BuiltinOutcome::Return(Value::Uint32(v)) => assert_eq!(v, 42),
            other => panic!("unexpected outcome {other:?}"),
        }
    }
}
