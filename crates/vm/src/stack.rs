//! The fixed-depth typed value stack (spec §4.B).
//!
//! Construction takes a capacity and a reference to the memory manager so
//! that pushing a typed pointer can be validated against the arena's
//! sub-regions. Once `invalid` is set it never clears (spec §8 property 3):
//! every subsequent operation is a no-op that returns a zero value.

use crate::error::{VmError, VmResult};
use crate::memory::MemoryManager;
use crate::value::{Value, ValueType};

pub struct Stack {
    slots: Vec<Value>,
    capacity: usize,
    invalid: bool,
}

impl Stack {
    pub fn new(capacity: usize) -> Self {
        Self { slots: Vec::with_capacity(capacity.min(1 << 20)), capacity, invalid: false }
    }

    pub fn is_valid(&self) -> bool {
        !self.invalid
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    fn invalidate(&mut self) {
        self.invalid = true;
    }

    /// Pushes a value, validating pointer variants against `mm`'s
    /// sub-regions. On failure the stack becomes invalid.
    pub fn push(&mut self, mm: &MemoryManager, value: Value) {
        if self.invalid {
            return;
        }
        if self.slots.len() >= self.capacity {
            self.invalidate();
            return;
        }
        let ok = match value {
            Value::ConstantPointer(off) => mm.constant_to_absolute(off).is_ok(),
            Value::VolatilePointer(off) => mm.volatile_to_absolute(off).is_ok(),
            _ => true,
        };
        if !ok {
            self.invalidate();
            return;
        }
        self.slots.push(value);
    }

    /// Type-erased push from raw bits (spec's `pushValue`).
    pub fn push_value(&mut self, mm: &MemoryManager, ty: ValueType, raw: u64) {
        self.push(mm, Value::from_raw_bits(ty, raw));
    }

    /// Pushes a value of `ty` read from arena address `src_addr`
    /// (spec's `pushFrom`).
    pub fn push_from(&mut self, mm: &mut MemoryManager, ty: ValueType, src_addr: u64) {
        if self.invalid {
            return;
        }
        match mm.read(src_addr, ty.byte_size()) {
            Ok(bytes) => {
                let v = Value::read_from(ty, bytes);
                self.push(mm, v);
            }
            Err(_) => self.invalidate(),
        }
    }

    fn pop_raw(&mut self) -> VmResult<Value> {
        if self.invalid {
            return Err(VmError::StackInvalid);
        }
        match self.slots.pop() {
            Some(v) => Ok(v),
            None => {
                self.invalidate();
                Err(VmError::StackUnderflow { requested: 1, available: 0 })
            }
        }
    }

    /// Pops a value expected to have type `ty`; on type mismatch or
    /// underflow the stack is invalidated and a zeroed value returned.
    pub fn pop_typed(&mut self, ty: ValueType) -> Value {
        match self.pop_raw() {
            Ok(v) if v.value_type() == ty => v,
            Ok(v) => {
                self.invalidate();
                let _ = v;
                Value::from_raw_bits(ty, 0)
            }
            Err(_) => Value::from_raw_bits(ty, 0),
        }
    }

    /// Type-erased pop returning the raw 64-bit value (spec's
    /// `popBaseValue`).
    pub fn pop_base_value(&mut self) -> u64 {
        match self.pop_raw() {
            Ok(v) => v.raw_bits(),
            Err(_) => 0,
        }
    }

    /// Pops a `ConstantPointer`/`VolatilePointer`/`AbsolutePointer` and
    /// resolves it to an absolute arena address (spec's
    /// `pop<const T*>`/`pop<T*>`).
    pub fn pop_pointer(&mut self, mm: &MemoryManager) -> VmResult<u64> {
        let v = self.pop_raw()?;
        match v {
            Value::AbsolutePointer(addr) => Ok(addr),
            Value::ConstantPointer(off) => mm.constant_to_absolute(off),
            Value::VolatilePointer(off) => mm.volatile_to_absolute(off),
            other => {
                self.invalidate();
                Err(VmError::StackTypeMismatch { expected: ValueType::AbsolutePointer, found: other.value_type() })
            }
        }
    }

    /// Writes the top value's bits to `dst_addr`, sized by its tag, and
    /// pops it (spec's `popTo`).
    pub fn pop_to(&mut self, mm: &mut MemoryManager, dst_addr: u64) -> VmResult<()> {
        let v = self.pop_raw()?;
        let size = v.value_type().byte_size();
        let mut buf = [0u8; 8];
        v.write_to(&mut buf[..size]);
        mm.write(dst_addr, &buf[..size]).map_err(|e| {
            self.invalidate();
            e
        })
    }

    /// Duplicates the slot `n` below the top onto a new top.
    pub fn clone_slot(&mut self, mm: &MemoryManager, n: usize) {
        if self.invalid {
            return;
        }
        if n >= self.slots.len() {
            self.invalidate();
            return;
        }
        let idx = self.slots.len() - 1 - n;
        let v = self.slots[idx];
        self.push(mm, v);
    }

    /// Pops and drops `n` slots.
    pub fn discard(&mut self, n: usize) {
        if self.invalid {
            return;
        }
        if n > self.slots.len() {
            self.invalidate();
            return;
        }
        self.slots.truncate(self.slots.len() - n);
    }

    pub fn top_type(&self) -> Option<ValueType> {
        self.slots.last().map(|v| v.value_type())
    }

    pub fn peek(&self, n: usize) -> Option<Value> {
        if n >= self.slots.len() {
            return None;
        }
        Some(self.slots[self.slots.len() - 1 - n])
    }

    /// A human-readable dump, safe even once `invalid` is set.
    pub fn print_stack(&self) -> String {
        let mut out = String::new();
        if self.invalid {
            out.push_str("[invalid] ");
        }
        out.push('[');
        for (i, v) in self.slots.iter().rev().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            out.push_str(&format!("{:?}", v));
        }
        out.push(']');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mm() -> MemoryManager {
        let mut mm = MemoryManager::new(&[4096]).unwrap();
        mm.set_replay_data_size(128, 64).unwrap();
        mm.set_volatile_memory(256).unwrap();
        mm
    }

    #[test]
    fn push_pop_round_trip() {
        let mm = mm();
        let mut s = Stack::new(8);
        s.push(&mm, Value::Uint32(42));
        assert_eq!(s.pop_typed(ValueType::Uint32), Value::Uint32(42));
        assert!(s.is_valid());
    }

    #[test]
    fn overflow_sets_invalid_sticky() {
        let mm = mm();
        let mut s = Stack::new(1);
        s.push(&mm, Value::Uint32(1));
        s.push(&mm, Value::Uint32(2));
        assert!(!s.is_valid());
        // Sticky: further pushes/pops do not clear it.
        s.push(&mm, Value::Uint32(3));
        assert!(!s.is_valid());
    }

    #[test]
    fn underflow_sets_invalid() {
        let mut s = Stack::new(4);
        let _ = s.pop_base_value();
        assert!(!s.is_valid());
    }

    #[test]
    fn type_mismatch_invalidates() {
        let mm = mm();
        let mut s = Stack::new(4);
        s.push(&mm, Value::Uint32(1));
        let v = s.pop_typed(ValueType::Int32);
        assert_eq!(v, Value::Int32(0));
        assert!(!s.is_valid());
    }

    #[test]
    fn clone_duplicates_slot_below_top() {
        let mm = mm();
        let mut s = Stack::new(8);
        s.push(&mm, Value::Uint32(10));
        s.push(&mm, Value::Uint32(20));
        s.clone_slot(&mm, 1);
        assert_eq!(s.pop_typed(ValueType::Uint32), Value::Uint32(10));
        assert_eq!(s.pop_typed(ValueType::Uint32), Value::Uint32(20));
        assert_eq!(s.pop_typed(ValueType::Uint32), Value::Uint32(10));
    }

    #[test]
    fn volatile_pointer_push_validates_offset() {
        let mm = mm();
        let mut s = Stack::new(4);
        s.push(&mm, Value::VolatilePointer(0));
        assert!(s.is_valid());

        let mut s = Stack::new(4);
        s.push(&mm, Value::VolatilePointer(100_000));
        assert!(!s.is_valid());
    }
}
