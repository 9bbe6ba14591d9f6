//! Opcode encoding (spec §4.K "Opcode encoding").
//!
//! Every instruction is one 32-bit, MSB-first word:
//!
//! ```text
//! bits 26..31 (6): opcode code
//! bits 20..25 (6): type tag (typed opcodes) / reserved (others)
//! bit     24  : pushReturn flag (CALL only, aliases the type-tag field)
//! bits 16..19 (4): API index (CALL only, aliases the low immediate field)
//! bits  0..19 (20): immediate (typed opcodes: PUSH_I, LOAD_C, LOAD_V)
//! bits  0..15 (16): function id (CALL only)
//! bits  0..25 (26): immediate (single-operand opcodes)
//! ```

use crate::error::{VmError, VmResult};
use crate::value::ValueType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Op {
    Call = 0,
    PushI = 1,
    LoadC = 2,
    LoadV = 3,
    Load = 4,
    Pop = 5,
    StoreV = 6,
    Store = 7,
    Resource = 8,
    InlineResource = 9,
    Post = 10,
    Notification = 11,
    Wait = 12,
    Copy = 13,
    Clone = 14,
    Strcpy = 15,
    Extend = 16,
    Add = 17,
    Label = 18,
    SwitchThread = 19,
    JumpLabel = 20,
    JumpNz = 21,
    JumpZ = 22,
}

impl Op {
    pub fn from_code(code: u8) -> VmResult<Self> {
        Ok(match code {
            0 => Op::Call,
            1 => Op::PushI,
            2 => Op::LoadC,
            3 => Op::LoadV,
            4 => Op::Load,
            5 => Op::Pop,
            6 => Op::StoreV,
            7 => Op::Store,
            8 => Op::Resource,
            9 => Op::InlineResource,
            10 => Op::Post,
            11 => Op::Notification,
            12 => Op::Wait,
            13 => Op::Copy,
            14 => Op::Clone,
            15 => Op::Strcpy,
            16 => Op::Extend,
            17 => Op::Add,
            18 => Op::Label,
            19 => Op::SwitchThread,
            20 => Op::JumpLabel,
            21 => Op::JumpNz,
            22 => Op::JumpZ,
            other => return Err(VmError::UnknownOpcode(other)),
        })
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

/// The decoded fields of one opcode word, before opcode-specific
/// interpretation.
#[derive(Debug, Clone, Copy)]
pub struct RawFields {
    pub op: Op,
    pub type_tag: u8,
    pub api_index: u8,
    pub push_return: bool,
    pub imm20: u32,
    pub func_id: u16,
    pub imm26: u32,
}

pub fn decode(word: u32) -> VmResult<RawFields> {
    let code = ((word >> 26) & 0x3F) as u8;
    let op = Op::from_code(code)?;
    Ok(RawFields {
        op,
        type_tag: ((word >> 20) & 0x3F) as u8,
        api_index: ((word >> 16) & 0xF) as u8,
        push_return: (word >> 24) & 0x1 != 0,
        imm20: word & 0xFFFFF,
        func_id: (word & 0xFFFF) as u16,
        imm26: word & 0x3FF_FFFF,
    })
}

pub fn encode_call(api_index: u8, func_id: u16, push_return: bool) -> u32 {
    ((Op::Call.code() as u32) << 26)
        | ((push_return as u32) << 24)
        | ((api_index as u32 & 0xF) << 16)
        | func_id as u32
}

pub fn encode_typed(op: Op, ty: ValueType, imm20: u32) -> u32 {
    ((op.code() as u32) << 26) | ((ty.to_tag() as u32) << 20) | (imm20 & 0xFFFFF)
}

pub fn encode_single(op: Op, imm26: u32) -> u32 {
    ((op.code() as u32) << 26) | (imm26 & 0x3FF_FFFF)
}

/// Sign-extends a 20-bit immediate for signed-integer `PUSH_I`, per spec
/// §4.K.
pub fn sign_extend_20(imm20: u32) -> i32 {
    let shifted = (imm20 << 12) as i32;
    shifted >> 12
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_round_trips() {
        let word = encode_call(7, 0x1234, true);
        let f = decode(word).unwrap();
        assert_eq!(f.op, Op::Call);
        assert_eq!(f.api_index, 7);
        assert_eq!(f.func_id, 0x1234);
        assert!(f.push_return);
    }

    #[test]
    fn typed_round_trips() {
        for tag in 0u8..14 {
            let ty = ValueType::from_tag(tag).unwrap();
            let word = encode_typed(Op::PushI, ty, 0x7A5);
            let f = decode(word).unwrap();
            assert_eq!(f.op, Op::PushI);
            assert_eq!(f.type_tag, tag);
            assert_eq!(f.imm20, 0x7A5);
        }
    }

    #[test]
    fn single_operand_round_trips() {
        let word = encode_single(Op::Pop, 0x3FF_FFFF);
        let f = decode(word).unwrap();
        assert_eq!(f.op, Op::Pop);
        assert_eq!(f.imm26, 0x3FF_FFFF);
    }

    #[test]
    fn sign_extension_of_all_ones_is_negative_one() {
        assert_eq!(sign_extend_20(0xFFFFF), -1);
        assert_eq!(sign_extend_20(0), 0);
    }

    #[test]
    fn unknown_opcode_errors() {
        let word = 63u32 << 26;
        assert!(decode(word).is_err());
    }
}
