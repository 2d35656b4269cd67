// MemSim - ARMv4 Instruction Set Simulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::cpu::registers::Reg;
use crate::Unsupported;

/// Condition field, bits 28..=31.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Eq,
    Ne,
    Cs,
    Cc,
    Mi,
    Pl,
    Vs,
    Vc,
    Hi,
    Ls,
    Ge,
    Lt,
    Gt,
    Le,
    Al,
}

impl Condition {
    /// Returns `None` for `0b1111`, which is not a condition on ARMv4.
    pub fn from_bits(bits: u32) -> Option<Self> {
        use Condition::*;
        Some(match bits & 0xF {
            0x0 => Eq,
            0x1 => Ne,
            0x2 => Cs,
            0x3 => Cc,
            0x4 => Mi,
            0x5 => Pl,
            0x6 => Vs,
            0x7 => Vc,
            0x8 => Hi,
            0x9 => Ls,
            0xA => Ge,
            0xB => Lt,
            0xC => Gt,
            0xD => Le,
            0xE => Al,
            _ => return None,
        })
    }
}

/// Data-processing opcode, bits 21..=24.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluOp {
    And,
    Eor,
    Sub,
    Rsb,
    Add,
    Adc,
    Sbc,
    Rsc,
    Tst,
    Teq,
    Cmp,
    Cmn,
    Orr,
    Mov,
    Bic,
    Mvn,
}

impl AluOp {
    pub fn from_bits(bits: u32) -> Self {
        use AluOp::*;
        match bits & 0xF {
            0x0 => And,
            0x1 => Eor,
            0x2 => Sub,
            0x3 => Rsb,
            0x4 => Add,
            0x5 => Adc,
            0x6 => Sbc,
            0x7 => Rsc,
            0x8 => Tst,
            0x9 => Teq,
            0xA => Cmp,
            0xB => Cmn,
            0xC => Orr,
            0xD => Mov,
            0xE => Bic,
            _ => Mvn,
        }
    }

    /// TST, TEQ, CMP and CMN only update flags.
    pub fn writes_result(self) -> bool {
        !matches!(self, AluOp::Tst | AluOp::Teq | AluOp::Cmp | AluOp::Cmn)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftType {
    Lsl,
    Lsr,
    Asr,
    Ror,
}

impl ShiftType {
    pub fn from_bits(bits: u32) -> Self {
        match bits & 0x3 {
            0 => ShiftType::Lsl,
            1 => ShiftType::Lsr,
            2 => ShiftType::Asr,
            _ => ShiftType::Ror,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftAmount {
    /// 5-bit amount encoded in the instruction.
    Immediate(u8),
    /// Low byte of a register.
    Register(Reg),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand2 {
    Immediate {
        imm8: u8,
        rotate: u8,
    },
    Register {
        rm: Reg,
        shift: ShiftType,
        amount: ShiftAmount,
    },
}

/// Offset of a single or halfword transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offset {
    Immediate(u32),
    Register {
        rm: Reg,
        shift: ShiftType,
        amount: u8,
    },
}

/// P/U/W bits shared by every load/store form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Indexing {
    pub pre: bool,
    pub up: bool,
    pub writeback: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalfwordKind {
    Halfword,
    SignedByte,
    SignedHalfword,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    DataProcessing {
        op: AluOp,
        set_flags: bool,
        rn: Reg,
        rd: Reg,
        operand2: Operand2,
    }, // AND..MVN
    Multiply {
        accumulate: bool,
        set_flags: bool,
        rd: Reg,
        rn: Reg,
        rs: Reg,
        rm: Reg,
    }, // MUL / MLA
    MultiplyLong {
        signed: bool,
        accumulate: bool,
        set_flags: bool,
        rd_hi: Reg,
        rd_lo: Reg,
        rs: Reg,
        rm: Reg,
    }, // UMULL / UMLAL / SMULL / SMLAL
    Swap {
        byte: bool,
        rn: Reg,
        rd: Reg,
        rm: Reg,
    }, // SWP / SWPB
    BranchExchange {
        rm: Reg,
    }, // BX Rm
    Branch {
        link: bool,
        offset: i32,
    }, // B / BL
    SingleTransfer {
        load: bool,
        byte: bool,
        rn: Reg,
        rd: Reg,
        offset: Offset,
        indexing: Indexing,
    }, // LDR / STR / LDRB / STRB
    HalfwordTransfer {
        load: bool,
        kind: HalfwordKind,
        rn: Reg,
        rd: Reg,
        offset: Offset,
        indexing: Indexing,
    }, // LDRH / STRH / LDRSB / LDRSH
    BlockTransfer {
        load: bool,
        rn: Reg,
        registers: u16,
        pre: bool,
        up: bool,
        writeback: bool,
    }, // LDM / STM
}

/// Outcome of classifying one instruction word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded {
    Instruction(Condition, Instruction),
    UnknownFormat,
    Unimplemented(Unsupported),
}

enum Rejected {
    UnknownFormat,
    Unimplemented(Unsupported),
}

type Classified = Result<Instruction, Rejected>;

#[inline]
fn bit(word: u32, n: u32) -> bool {
    (word >> n) & 1 == 1
}

#[inline]
fn field(word: u32, lo: u32, width: u32) -> u32 {
    (word >> lo) & ((1 << width) - 1)
}

#[inline]
fn reg(word: u32, lo: u32) -> Reg {
    Reg::from_bits(word >> lo)
}

fn indexing(word: u32) -> Indexing {
    Indexing {
        pre: bit(word, 24),
        up: bit(word, 23),
        writeback: bit(word, 21),
    }
}

/// Bits 24:23 = 10 with S clear: the TST/TEQ/CMP/CMN slots that are not
/// data processing without the S bit.
fn is_misc_space(word: u32) -> bool {
    field(word, 23, 2) == 0b10 && !bit(word, 20)
}

pub fn decode(word: u32) -> Decoded {
    let group = field(word, 25, 3);

    let Some(cond) = Condition::from_bits(word >> 28) else {
        return if group == 0b101 {
            Decoded::Unimplemented(Unsupported::Blx)
        } else {
            Decoded::UnknownFormat
        };
    };

    let classified = match group {
        0b000 => decode_group0(word),
        0b001 => decode_group1(word),
        0b010 => Ok(single_transfer(word, Offset::Immediate(word & 0xFFF))),
        0b011 => {
            if bit(word, 4) {
                Err(Rejected::UnknownFormat)
            } else {
                Ok(single_transfer(
                    word,
                    Offset::Register {
                        rm: reg(word, 0),
                        shift: ShiftType::from_bits(word >> 5),
                        amount: field(word, 7, 5) as u8,
                    },
                ))
            }
        }
        0b100 => Ok(Instruction::BlockTransfer {
            load: bit(word, 20),
            rn: reg(word, 16),
            registers: (word & 0xFFFF) as u16,
            pre: bit(word, 24),
            up: bit(word, 23),
            writeback: bit(word, 21),
        }),
        0b101 => Ok(Instruction::Branch {
            link: bit(word, 24),
            offset: ((word << 8) as i32 >> 8) << 2,
        }),
        0b110 => Err(Rejected::Unimplemented(Unsupported::LdcStc)),
        _ => Err(Rejected::Unimplemented(if bit(word, 24) {
            Unsupported::Swi
        } else if bit(word, 4) {
            Unsupported::McrMrc
        } else {
            Unsupported::Cdp
        })),
    };

    match classified {
        Ok(instruction) => Decoded::Instruction(cond, instruction),
        Err(Rejected::UnknownFormat) => Decoded::UnknownFormat,
        Err(Rejected::Unimplemented(which)) => Decoded::Unimplemented(which),
    }
}

fn decode_group0(word: u32) -> Classified {
    if !bit(word, 4) {
        // Immediate shift amount.
        if is_misc_space(word) {
            return if bit(word, 7) {
                Err(Rejected::UnknownFormat)
            } else if bit(word, 21) {
                Err(Rejected::Unimplemented(Unsupported::Msr))
            } else {
                Err(Rejected::Unimplemented(Unsupported::Mrs))
            };
        }
        return Ok(data_processing(
            word,
            Operand2::Register {
                rm: reg(word, 0),
                shift: ShiftType::from_bits(word >> 5),
                amount: ShiftAmount::Immediate(field(word, 7, 5) as u8),
            },
        ));
    }

    if !bit(word, 7) {
        // Register shift amount.
        if is_misc_space(word) {
            return match field(word, 4, 4) {
                0b0001 => match field(word, 21, 2) {
                    0b01 => Ok(Instruction::BranchExchange { rm: reg(word, 0) }),
                    // CLZ is ARMv5.
                    _ => Err(Rejected::UnknownFormat),
                },
                0b0011 => Err(Rejected::Unimplemented(Unsupported::Blx)),
                0b0101 => Err(Rejected::Unimplemented(Unsupported::DspAddSub)),
                0b0111 => Err(Rejected::Unimplemented(Unsupported::Bkpt)),
                _ => Err(Rejected::UnknownFormat),
            };
        }
        return Ok(data_processing(
            word,
            Operand2::Register {
                rm: reg(word, 0),
                shift: ShiftType::from_bits(word >> 5),
                amount: ShiftAmount::Register(reg(word, 8)),
            },
        ));
    }

    decode_multiply_extension(word)
}

/// Bits 7 and 4 both set: multiplies, swaps and the extra load/stores.
fn decode_multiply_extension(word: u32) -> Classified {
    let load = bit(word, 20);
    let offset = if bit(word, 22) {
        Offset::Immediate((field(word, 8, 4) << 4) | field(word, 0, 4))
    } else {
        Offset::Register {
            rm: reg(word, 0),
            shift: ShiftType::Lsl,
            amount: 0,
        }
    };
    let halfword = |kind: HalfwordKind| -> Classified {
        Ok(Instruction::HalfwordTransfer {
            load,
            kind,
            rn: reg(word, 16),
            rd: reg(word, 12),
            offset,
            indexing: indexing(word),
        })
    };

    match field(word, 5, 2) {
        0b00 => {
            if field(word, 22, 6) == 0 {
                Ok(Instruction::Multiply {
                    accumulate: bit(word, 21),
                    set_flags: bit(word, 20),
                    rd: reg(word, 16),
                    rn: reg(word, 12),
                    rs: reg(word, 8),
                    rm: reg(word, 0),
                })
            } else if field(word, 23, 5) == 0b00001 {
                Ok(Instruction::MultiplyLong {
                    signed: bit(word, 22),
                    accumulate: bit(word, 21),
                    set_flags: bit(word, 20),
                    rd_hi: reg(word, 16),
                    rd_lo: reg(word, 12),
                    rs: reg(word, 8),
                    rm: reg(word, 0),
                })
            } else if field(word, 23, 5) == 0b00010
                && field(word, 20, 2) == 0
                && field(word, 8, 4) == 0
            {
                Ok(Instruction::Swap {
                    byte: bit(word, 22),
                    rn: reg(word, 16),
                    rd: reg(word, 12),
                    rm: reg(word, 0),
                })
            } else {
                Err(Rejected::UnknownFormat)
            }
        }
        0b01 => halfword(HalfwordKind::Halfword),
        // Doubleword transfers (L clear) are ARMv5E.
        _ if !load => Err(Rejected::UnknownFormat),
        0b10 => halfword(HalfwordKind::SignedByte),
        _ => halfword(HalfwordKind::SignedHalfword),
    }
}

fn decode_group1(word: u32) -> Classified {
    if is_misc_space(word) {
        return if bit(word, 21) {
            Err(Rejected::Unimplemented(Unsupported::Msr))
        } else {
            Err(Rejected::UnknownFormat)
        };
    }
    Ok(data_processing(
        word,
        Operand2::Immediate {
            imm8: (word & 0xFF) as u8,
            rotate: field(word, 8, 4) as u8,
        },
    ))
}

fn data_processing(word: u32, operand2: Operand2) -> Instruction {
    Instruction::DataProcessing {
        op: AluOp::from_bits(word >> 21),
        set_flags: bit(word, 20),
        rn: reg(word, 16),
        rd: reg(word, 12),
        operand2,
    }
}

fn single_transfer(word: u32, offset: Offset) -> Instruction {
    Instruction::SingleTransfer {
        load: bit(word, 20),
        byte: bit(word, 22),
        rn: reg(word, 16),
        rd: reg(word, 12),
        offset,
        indexing: indexing(word),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(n: u32) -> Reg {
        Reg::from_bits(n)
    }

    fn decoded(word: u32) -> Instruction {
        match decode(word) {
            Decoded::Instruction(_, instruction) => instruction,
            other => panic!("{:#010x} did not decode: {:?}", word, other),
        }
    }

    #[test]
    fn test_decode_mov_immediate() {
        // MOV r0, #5
        assert_eq!(
            decode(0xE3A0_0005),
            Decoded::Instruction(
                Condition::Al,
                Instruction::DataProcessing {
                    op: AluOp::Mov,
                    set_flags: false,
                    rn: r(0),
                    rd: r(0),
                    operand2: Operand2::Immediate { imm8: 5, rotate: 0 },
                }
            )
        );
    }

    #[test]
    fn test_decode_data_processing_shifted_register() {
        // ADDS r1, r2, r3, LSL #2
        assert_eq!(
            decoded(0xE092_1103),
            Instruction::DataProcessing {
                op: AluOp::Add,
                set_flags: true,
                rn: r(2),
                rd: r(1),
                operand2: Operand2::Register {
                    rm: r(3),
                    shift: ShiftType::Lsl,
                    amount: ShiftAmount::Immediate(2),
                },
            }
        );
        // MOV r0, r1, ROR r2
        assert_eq!(
            decoded(0xE1A0_0271),
            Instruction::DataProcessing {
                op: AluOp::Mov,
                set_flags: false,
                rn: r(0),
                rd: r(0),
                operand2: Operand2::Register {
                    rm: r(1),
                    shift: ShiftType::Ror,
                    amount: ShiftAmount::Register(r(2)),
                },
            }
        );
    }

    #[test]
    fn test_decode_compare_with_s_is_data_processing() {
        // CMP r0, #1
        assert!(matches!(
            decoded(0xE350_0001),
            Instruction::DataProcessing { op: AluOp::Cmp, set_flags: true, .. }
        ));
        // TST r1, r2
        assert!(matches!(
            decoded(0xE111_0002),
            Instruction::DataProcessing { op: AluOp::Tst, .. }
        ));
    }

    #[test]
    fn test_decode_condition_field() {
        // BNE +0
        assert!(matches!(
            decode(0x1A00_0000),
            Decoded::Instruction(Condition::Ne, Instruction::Branch { .. })
        ));
        // MOVGT r0, #1
        assert!(matches!(
            decode(0xC3A0_0001),
            Decoded::Instruction(Condition::Gt, _)
        ));
    }

    #[test]
    fn test_decode_branches() {
        // B . (offset -8)
        assert_eq!(
            decoded(0xEAFF_FFFE),
            Instruction::Branch { link: false, offset: -8 }
        );
        // BL +0x100
        assert_eq!(
            decoded(0xEB00_0040),
            Instruction::Branch { link: true, offset: 0x100 }
        );
        // BX lr
        assert_eq!(
            decoded(0xE12F_FF1E),
            Instruction::BranchExchange { rm: Reg::LR }
        );
    }

    #[test]
    fn test_decode_multiplies() {
        // MUL r0, r1, r2
        assert_eq!(
            decoded(0xE000_0291),
            Instruction::Multiply {
                accumulate: false,
                set_flags: false,
                rd: r(0),
                rn: r(0),
                rs: r(2),
                rm: r(1),
            }
        );
        // MLAS r4, r1, r2, r3
        assert!(matches!(
            decoded(0xE034_3291),
            Instruction::Multiply { accumulate: true, set_flags: true, .. }
        ));
        // UMULL r0, r1, r2, r3
        assert_eq!(
            decoded(0xE081_0392),
            Instruction::MultiplyLong {
                signed: false,
                accumulate: false,
                set_flags: false,
                rd_hi: r(1),
                rd_lo: r(0),
                rs: r(3),
                rm: r(2),
            }
        );
        // SMLAL r0, r1, r2, r3
        assert!(matches!(
            decoded(0xE0E1_0392),
            Instruction::MultiplyLong { signed: true, accumulate: true, .. }
        ));
    }

    #[test]
    fn test_decode_swap() {
        // SWP r0, r1, [r2]
        assert_eq!(
            decoded(0xE102_0091),
            Instruction::Swap { byte: false, rn: r(2), rd: r(0), rm: r(1) }
        );
        // SWPB r0, r1, [r2]
        assert!(matches!(
            decoded(0xE142_0091),
            Instruction::Swap { byte: true, .. }
        ));
        // Swap pattern with bits 11:8 set is not a swap.
        assert_eq!(decode(0xE102_0191), Decoded::UnknownFormat);
    }

    #[test]
    fn test_decode_single_transfers() {
        // LDR r0, [r1, #4]
        assert_eq!(
            decoded(0xE591_0004),
            Instruction::SingleTransfer {
                load: true,
                byte: false,
                rn: r(1),
                rd: r(0),
                offset: Offset::Immediate(4),
                indexing: Indexing { pre: true, up: true, writeback: false },
            }
        );
        // STRB r2, [r3], -r4, LSL #1
        assert_eq!(
            decoded(0xE643_2084),
            Instruction::SingleTransfer {
                load: false,
                byte: true,
                rn: r(3),
                rd: r(2),
                offset: Offset::Register { rm: r(4), shift: ShiftType::Lsl, amount: 1 },
                indexing: Indexing { pre: false, up: false, writeback: false },
            }
        );
        // Register-offset group with bit 4 set is undefined.
        assert_eq!(decode(0xE791_0014), Decoded::UnknownFormat);
    }

    #[test]
    fn test_decode_halfword_transfers() {
        // LDRH r0, [r1, #0x12]
        assert_eq!(
            decoded(0xE1D1_01B2),
            Instruction::HalfwordTransfer {
                load: true,
                kind: HalfwordKind::Halfword,
                rn: r(1),
                rd: r(0),
                offset: Offset::Immediate(0x12),
                indexing: Indexing { pre: true, up: true, writeback: false },
            }
        );
        // STRH r0, [r1], r2
        assert!(matches!(
            decoded(0xE081_00B2),
            Instruction::HalfwordTransfer {
                load: false,
                kind: HalfwordKind::Halfword,
                offset: Offset::Register { .. },
                ..
            }
        ));
        // LDRSB r0, [r1]
        assert!(matches!(
            decoded(0xE1D1_00D0),
            Instruction::HalfwordTransfer { kind: HalfwordKind::SignedByte, .. }
        ));
        // LDRSH r0, [r1]
        assert!(matches!(
            decoded(0xE1D1_00F0),
            Instruction::HalfwordTransfer { kind: HalfwordKind::SignedHalfword, .. }
        ));
        // LDRD slot (SH=10, L=0)
        assert_eq!(decode(0xE1C1_00D0), Decoded::UnknownFormat);
    }

    #[test]
    fn test_decode_block_transfer() {
        // STMDB sp!, {r0, r1, lr}
        assert_eq!(
            decoded(0xE92D_4003),
            Instruction::BlockTransfer {
                load: false,
                rn: r(13),
                registers: 0x4003,
                pre: true,
                up: false,
                writeback: true,
            }
        );
    }

    #[test]
    fn test_decode_unsupported_forms() {
        let cases = [
            (0xE10F_0000, Unsupported::Mrs),       // MRS r0, CPSR
            (0xE129_F000, Unsupported::Msr),       // MSR CPSR_fc, r0
            (0xE329_F01F, Unsupported::Msr),       // MSR CPSR_fc, #0x1F
            (0xE12F_FF33, Unsupported::Blx),       // BLX r3
            (0xE101_0052, Unsupported::DspAddSub), // QADD r0, r2, r1
            (0xE120_0070, Unsupported::Bkpt),      // BKPT #0
            (0xEF00_0000, Unsupported::Swi),       // SWI #0
            (0xEE00_0000, Unsupported::Cdp),       // CDP
            (0xEE00_0010, Unsupported::McrMrc),    // MCR
            (0xED90_0000, Unsupported::LdcStc),    // LDC
            (0xFA00_0000, Unsupported::Blx),       // BLX #imm
        ];
        for (word, expected) in cases {
            assert_eq!(decode(word), Decoded::Unimplemented(expected), "{:#010x}", word);
        }
    }

    #[test]
    fn test_decode_unknown_formats() {
        let cases = [
            0xE16F_0F11, // CLZ r0, r1
            0xE300_0000, // MOVW slot (group 1, bits 24:23 = 10, S clear, bit 21 clear)
            0xE100_0080, // SMLABB slot
            0xF3A0_0000, // condition 0xF outside the branch group
            0xE040_0091, // multiply-style bits with bits 27:22 not matching any form
        ];
        for word in cases {
            assert_eq!(decode(word), Decoded::UnknownFormat, "{:#010x}", word);
        }
    }
}
