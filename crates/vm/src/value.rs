//! Typed stack values (spec §3 "Typed stack value").
//!
//! The stack never stores anything beyond platform-independent bits plus a
//! tag: every variant below carries either its native bit pattern or, for
//! pointer variants, a 32-bit sub-range-relative offset. `AbsolutePointer`
//! is the one exception, carrying an already-resolved arena offset (see
//! `memory.rs`'s module doc for why this stands in for a host pointer).

/// The tag half of a tagged stack value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float,
    Double,
    AbsolutePointer,
    ConstantPointer,
    VolatilePointer,
}

impl ValueType {
    /// Size in bytes of the value's native representation (pointers are
    /// always stored as 32-bit offsets, or 64-bit for `AbsolutePointer`).
    pub fn byte_size(self) -> usize {
        match self {
            ValueType::Bool | ValueType::Int8 | ValueType::Uint8 => 1,
            ValueType::Int16 | ValueType::Uint16 => 2,
            ValueType::Int32
            | ValueType::Uint32
            | ValueType::Float
            | ValueType::ConstantPointer
            | ValueType::VolatilePointer => 4,
            ValueType::Int64 | ValueType::Uint64 | ValueType::Double | ValueType::AbsolutePointer => 8,
        }
    }

    /// Decodes the 6-bit type tag embedded in an opcode word.
    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => ValueType::Bool,
            1 => ValueType::Int8,
            2 => ValueType::Int16,
            3 => ValueType::Int32,
            4 => ValueType::Int64,
            5 => ValueType::Uint8,
            6 => ValueType::Uint16,
            7 => ValueType::Uint32,
            8 => ValueType::Uint64,
            9 => ValueType::Float,
            10 => ValueType::Double,
            11 => ValueType::AbsolutePointer,
            12 => ValueType::ConstantPointer,
            13 => ValueType::VolatilePointer,
            _ => return None,
        })
    }

    pub fn to_tag(self) -> u8 {
        match self {
            ValueType::Bool => 0,
            ValueType::Int8 => 1,
            ValueType::Int16 => 2,
            ValueType::Int32 => 3,
            ValueType::Int64 => 4,
            ValueType::Uint8 => 5,
            ValueType::Uint16 => 6,
            ValueType::Uint32 => 7,
            ValueType::Uint64 => 8,
            ValueType::Float => 9,
            ValueType::Double => 10,
            ValueType::AbsolutePointer => 11,
            ValueType::ConstantPointer => 12,
            ValueType::VolatilePointer => 13,
        }
    }
}

/// A single tagged stack slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Uint8(u8),
    Uint16(u16),
    Uint32(u32),
    Uint64(u64),
    Float(f32),
    Double(f64),
    /// Resolved arena offset (stands in for a host pointer).
    AbsolutePointer(u64),
    /// Offset relative to the constant sub-region.
    ConstantPointer(u32),
    /// Offset relative to the volatile sub-region.
    VolatilePointer(u32),
}

impl Value {
    pub fn value_type(self) -> ValueType {
        match self {
            Value::Bool(_) => ValueType::Bool,
            Value::Int8(_) => ValueType::Int8,
            Value::Int16(_) => ValueType::Int16,
            Value::Int32(_) => ValueType::Int32,
            Value::Int64(_) => ValueType::Int64,
            Value::Uint8(_) => ValueType::Uint8,
            Value::Uint16(_) => ValueType::Uint16,
            Value::Uint32(_) => ValueType::Uint32,
            Value::Uint64(_) => ValueType::Uint64,
            Value::Float(_) => ValueType::Float,
            Value::Double(_) => ValueType::Double,
            Value::AbsolutePointer(_) => ValueType::AbsolutePointer,
            Value::ConstantPointer(_) => ValueType::ConstantPointer,
            Value::VolatilePointer(_) => ValueType::VolatilePointer,
        }
    }

    /// The value's bit pattern, zero/sign/pointer-extended to 64 bits, as
    /// used by `popBaseValue`/`pushValue` (spec §4.B).
    pub fn raw_bits(self) -> u64 {
        match self {
            Value::Bool(v) => v as u64,
            Value::Int8(v) => v as i64 as u64,
            Value::Int16(v) => v as i64 as u64,
            Value::Int32(v) => v as i64 as u64,
            Value::Int64(v) => v as u64,
            Value::Uint8(v) => v as u64,
            Value::Uint16(v) => v as u64,
            Value::Uint32(v) => v as u64,
            Value::Uint64(v) => v,
            Value::Float(v) => v.to_bits() as u64,
            Value::Double(v) => v.to_bits(),
            Value::AbsolutePointer(v) => v,
            Value::ConstantPointer(v) => v as u64,
            Value::VolatilePointer(v) => v as u64,
        }
    }

    /// Reconstructs a value of `ty` from its raw bit pattern.
    pub fn from_raw_bits(ty: ValueType, bits: u64) -> Self {
        match ty {
            ValueType::Bool => Value::Bool(bits != 0),
            ValueType::Int8 => Value::Int8(bits as i8),
            ValueType::Int16 => Value::Int16(bits as i16),
            ValueType::Int32 => Value::Int32(bits as i32),
            ValueType::Int64 => Value::Int64(bits as i64),
            ValueType::Uint8 => Value::Uint8(bits as u8),
            ValueType::Uint16 => Value::Uint16(bits as u16),
            ValueType::Uint32 => Value::Uint32(bits as u32),
            ValueType::Uint64 => Value::Uint64(bits),
            ValueType::Float => Value::Float(f32::from_bits(bits as u32)),
            ValueType::Double => Value::Double(f64::from_bits(bits)),
            ValueType::AbsolutePointer => Value::AbsolutePointer(bits),
            ValueType::ConstantPointer => Value::ConstantPointer(bits as u32),
            ValueType::VolatilePointer => Value::VolatilePointer(bits as u32),
        }
    }

    /// Serializes the value's native representation into `dst`, sized by
    /// its tag, little-endian (spec §4.K `STORE`/`popTo`).
    pub fn write_to(self, dst: &mut [u8]) {
        match self {
            Value::Bool(v) => dst[0] = v as u8,
            Value::Int8(v) => dst[0] = v as u8,
            Value::Int16(v) => dst[..2].copy_from_slice(&v.to_le_bytes()),
            Value::Int32(v) => dst[..4].copy_from_slice(&v.to_le_bytes()),
            Value::Int64(v) => dst[..8].copy_from_slice(&v.to_le_bytes()),
            Value::Uint8(v) => dst[0] = v,
            Value::Uint16(v) => dst[..2].copy_from_slice(&v.to_le_bytes()),
            Value::Uint32(v) => dst[..4].copy_from_slice(&v.to_le_bytes()),
            Value::Uint64(v) => dst[..8].copy_from_slice(&v.to_le_bytes()),
            Value::Float(v) => dst[..4].copy_from_slice(&v.to_le_bytes()),
            Value::Double(v) => dst[..8].copy_from_slice(&v.to_le_bytes()),
            Value::AbsolutePointer(v) => dst[..8].copy_from_slice(&v.to_le_bytes()),
            Value::ConstantPointer(v) => dst[..4].copy_from_slice(&v.to_le_bytes()),
            Value::VolatilePointer(v) => dst[..4].copy_from_slice(&v.to_le_bytes()),
        }
    }

    /// Reads a value of `ty` from `src`, little-endian.
    pub fn read_from(ty: ValueType, src: &[u8]) -> Self {
        match ty {
            ValueType::Bool => Value::Bool(src[0] != 0),
            ValueType::Int8 => Value::Int8(src[0] as i8),
            ValueType::Int16 => Value::Int16(i16::from_le_bytes([src[0], src[1]])),
            ValueType::Int32 => Value::Int32(i32::from_le_bytes(src[..4].try_into().unwrap())),
            ValueType::Int64 => Value::Int64(i64::from_le_bytes(src[..8].try_into().unwrap())),
            ValueType::Uint8 => Value::Uint8(src[0]),
            ValueType::Uint16 => Value::Uint16(u16::from_le_bytes([src[0], src[1]])),
            ValueType::Uint32 => Value::Uint32(u32::from_le_bytes(src[..4].try_into().unwrap())),
            ValueType::Uint64 => Value::Uint64(u64::from_le_bytes(src[..8].try_into().unwrap())),
            ValueType::Float => Value::Float(f32::from_le_bytes(src[..4].try_into().unwrap())),
            ValueType::Double => Value::Double(f64::from_le_bytes(src[..8].try_into().unwrap())),
            ValueType::AbsolutePointer => {
                Value::AbsolutePointer(u64::from_le_bytes(src[..8].try_into().unwrap()))
            }
            ValueType::ConstantPointer => {
                Value::ConstantPointer(u32::from_le_bytes(src[..4].try_into().unwrap()))
            }
            ValueType::VolatilePointer => {
                Value::VolatilePointer(u32::from_le_bytes(src[..4].try_into().unwrap()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_round_trips() {
        for tag in 0u8..14 {
            let ty = ValueType::from_tag(tag).unwrap();
            assert_eq!(ty.to_tag(), tag);
        }
        assert!(ValueType::from_tag(14).is_none());
    }

    #[test]
    fn raw_bits_round_trip() {
        let v = Value::Int32(-5);
        let bits = v.raw_bits();
        assert_eq!(Value::from_raw_bits(ValueType::Int32, bits), v);

        let v = Value::Uint8(250);
        assert_eq!(Value::from_raw_bits(ValueType::Uint8, v.raw_bits()), v);
    }

    #[test]
    fn byte_round_trip() {
        let mut buf = [0u8; 8];
        let v = Value::Double(3.5);
        v.write_to(&mut buf);
        assert_eq!(Value::read_from(ValueType::Double, &buf), v);
    }
}
