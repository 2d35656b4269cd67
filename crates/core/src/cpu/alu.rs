// MemSim - ARMv4 Instruction Set Simulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::decoder::arm::{AluOp, ShiftType};

/// Result of a data-processing operation. `overflow` is `None` for logical
/// operations, which leave V untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AluOutput {
    pub value: u32,
    pub carry: bool,
    pub overflow: Option<bool>,
}

/// `a + b + carry_in` with the unsigned carry-out and signed overflow.
///
/// Subtraction is `add_with_carry(a, !b, true)`, which makes the carry-out
/// the inverted borrow.
pub fn add_with_carry(a: u32, b: u32, carry_in: bool) -> (u32, bool, bool) {
    let wide = a as u64 + b as u64 + carry_in as u64;
    let result = wide as u32;
    let carry = wide > u32::MAX as u64;
    let overflow = ((a ^ result) & (b ^ result)) & 0x8000_0000 != 0;
    (result, carry, overflow)
}

/// Operand 2 immediate: `imm8` rotated right by `rotate * 2` within its own
/// eight bits.
pub fn rotated_immediate(imm8: u8, rotate: u8) -> u32 {
    imm8.rotate_right(rotate as u32 * 2) as u32
}

/// Shift by an amount encoded in the instruction. Zero selects the special
/// forms: no shift for LSL, a 32-bit shift for LSR and ASR, and RRX for ROR.
pub fn shift_immediate(shift: ShiftType, value: u32, amount: u8, carry_in: bool) -> (u32, bool) {
    match (shift, amount) {
        (ShiftType::Lsl, 0) => (value, carry_in),
        (ShiftType::Lsr | ShiftType::Asr, 0) => shift_by(shift, value, 32),
        (ShiftType::Ror, 0) => ((carry_in as u32) << 31 | value >> 1, value & 1 != 0),
        _ => shift_by(shift, value, amount as u32),
    }
}

/// Shift by the low byte of a register. Zero leaves value and carry alone.
pub fn shift_register(shift: ShiftType, value: u32, rs: u32, carry_in: bool) -> (u32, bool) {
    match rs & 0xFF {
        0 => (value, carry_in),
        amount => shift_by(shift, value, amount),
    }
}

fn shift_by(shift: ShiftType, value: u32, amount: u32) -> (u32, bool) {
    debug_assert!(amount > 0);
    let bit = |n: u32| (value >> n) & 1 != 0;
    match shift {
        ShiftType::Lsl => match amount {
            1..=31 => (value << amount, bit(32 - amount)),
            32 => (0, bit(0)),
            _ => (0, false),
        },
        ShiftType::Lsr => match amount {
            1..=31 => (value >> amount, bit(amount - 1)),
            32 => (0, bit(31)),
            _ => (0, false),
        },
        ShiftType::Asr => match amount {
            1..=31 => (((value as i32) >> amount) as u32, bit(amount - 1)),
            _ => (((value as i32) >> 31) as u32, bit(31)),
        },
        ShiftType::Ror => match amount & 31 {
            0 => (value, bit(31)),
            n => (value.rotate_right(n), bit(n - 1)),
        },
    }
}

pub fn execute(op: AluOp, rn: u32, op2: u32, carry_in: bool, shifter_carry: bool) -> AluOutput {
    let logical = |value| AluOutput {
        value,
        carry: shifter_carry,
        overflow: None,
    };
    let arithmetic = |(value, carry, overflow): (u32, bool, bool)| AluOutput {
        value,
        carry,
        overflow: Some(overflow),
    };

    match op {
        AluOp::And | AluOp::Tst => logical(rn & op2),
        AluOp::Eor | AluOp::Teq => logical(rn ^ op2),
        AluOp::Orr => logical(rn | op2),
        AluOp::Mov => logical(op2),
        AluOp::Bic => logical(rn & !op2),
        AluOp::Mvn => logical(!op2),
        AluOp::Add | AluOp::Cmn => arithmetic(add_with_carry(rn, op2, false)),
        AluOp::Adc => arithmetic(add_with_carry(rn, op2, carry_in)),
        AluOp::Sub | AluOp::Cmp => arithmetic(add_with_carry(rn, !op2, true)),
        AluOp::Sbc => arithmetic(add_with_carry(rn, !op2, carry_in)),
        AluOp::Rsb => arithmetic(add_with_carry(op2, !rn, true)),
        AluOp::Rsc => arithmetic(add_with_carry(op2, !rn, carry_in)),
    }
}
