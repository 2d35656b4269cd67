// MemSim - ARMv4 Instruction Set Simulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Register index, always in `0..16`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Reg(u8);

impl Reg {
    pub const LR: Reg = Reg(14);
    pub const PC: Reg = Reg(15);

    /// Takes the low four bits of `bits`, which is how every register field
    /// of an instruction word is extracted.
    pub const fn from_bits(bits: u32) -> Self {
        Reg((bits & 0xF) as u8)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }

    pub fn is_pc(self) -> bool {
        self == Reg::PC
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            14 => f.write_str("lr"),
            15 => f.write_str("pc"),
            n => write!(f, "r{}", n),
        }
    }
}

/// The sixteen general registers; r14 is the link register and r15 the
/// program counter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterFile {
    regs: [u32; 16],
}

impl RegisterFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self, reg: Reg) -> u32 {
        self.regs[reg.index()]
    }

    pub fn write(&mut self, reg: Reg, value: u32) {
        self.regs[reg.index()] = value;
    }

    pub fn pc(&self) -> u32 {
        self.regs[Reg::PC.index()]
    }

    pub fn set_pc(&mut self, value: u32) {
        self.regs[Reg::PC.index()] = value;
    }

    pub fn lr(&self) -> u32 {
        self.regs[Reg::LR.index()]
    }

    pub fn set_lr(&mut self, value: u32) {
        self.regs[Reg::LR.index()] = value;
    }

    pub fn as_slice(&self) -> &[u32; 16] {
        &self.regs
    }

    /// Copies up to sixteen values into r0 upwards.
    pub fn load_from(&mut self, values: &[u32]) {
        for (slot, value) in self.regs.iter_mut().zip(values) {
            *slot = *value;
        }
    }
}

bitflags::bitflags! {
    /// Condition flags, kept at their CPSR bit positions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StatusRegister: u32 {
        const N = 1 << 31;
        const Z = 1 << 30;
        const C = 1 << 29;
        const V = 1 << 28;
    }
}

impl StatusRegister {
    pub fn n(self) -> bool {
        self.contains(Self::N)
    }

    pub fn z(self) -> bool {
        self.contains(Self::Z)
    }

    pub fn c(self) -> bool {
        self.contains(Self::C)
    }

    pub fn v(self) -> bool {
        self.contains(Self::V)
    }

    pub fn update_nz(&mut self, result: u32) {
        self.set(Self::N, result & 0x8000_0000 != 0);
        self.set(Self::Z, result == 0);
    }

    pub fn update_nzc(&mut self, result: u32, carry: bool) {
        self.update_nz(result);
        self.set(Self::C, carry);
    }

    pub fn update_nzcv(&mut self, result: u32, carry: bool, overflow: bool) {
        self.update_nzc(result, carry);
        self.set(Self::V, overflow);
    }
}
