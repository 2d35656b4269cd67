// MemSim - ARMv4 Instruction Set Simulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod alu;
pub mod registers;

pub use registers::{Reg, RegisterFile, StatusRegister};

use crate::decoder::arm::{HalfwordKind, Indexing, Offset, Operand2, ShiftAmount};
use crate::decoder::{decode, Condition, Decoded, Instruction};
use crate::memory::{Bound, Region};
use crate::snapshot::CoreSnapshot;
use crate::{SimResult, SimulationError, SimulationObserver};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A fault that halted a core, with the address of the instruction that
/// raised it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreFault {
    pub pc: u32,
    pub error: SimulationError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HaltReason {
    /// The program counter left the loaded program.
    ProgramEnd,
    /// A stop request was observed between instructions.
    Stopped,
    Fault(CoreFault),
}

impl HaltReason {
    pub fn is_fault(&self) -> bool {
        matches!(self, HaltReason::Fault(_))
    }
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HaltReason::ProgramEnd => f.write_str("program end"),
            HaltReason::Stopped => f.write_str("stopped"),
            HaltReason::Fault(fault) => write!(f, "fault at {:#010x}: {}", fault.pc, fault.error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreState {
    Running,
    Halted(HaltReason),
}

/// One processor core: registers, flags and the two memory windows it
/// fetches from and loads/stores through.
#[derive(Debug)]
pub struct Core {
    index: usize,
    regs: RegisterFile,
    flags: StatusRegister,
    program: Region,
    data: Region,
    program_end: u64,
    state: CoreState,
    retired: u64,
    pc_written: bool,
    observers: Vec<Arc<dyn SimulationObserver>>,
}

impl Core {
    pub fn new(index: usize, program: Region, data: Region) -> Self {
        let program_end = program.bound().span();
        Self {
            index,
            regs: RegisterFile::new(),
            flags: StatusRegister::empty(),
            program,
            data,
            program_end,
            state: CoreState::Running,
            retired: 0,
            pc_written: false,
            observers: Vec::new(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.regs
    }

    pub fn registers_mut(&mut self) -> &mut RegisterFile {
        &mut self.regs
    }

    pub fn flags(&self) -> StatusRegister {
        self.flags
    }

    pub fn set_flags(&mut self, flags: StatusRegister) {
        self.flags = flags;
    }

    pub fn pc(&self) -> u32 {
        self.regs.pc()
    }

    pub fn state(&self) -> &CoreState {
        &self.state
    }

    pub fn is_halted(&self) -> bool {
        matches!(self.state, CoreState::Halted(_))
    }

    pub fn halt_reason(&self) -> Option<&HaltReason> {
        match &self.state {
            CoreState::Halted(reason) => Some(reason),
            CoreState::Running => None,
        }
    }

    /// Instructions executed so far, including ones skipped by their condition.
    pub fn retired(&self) -> u64 {
        self.retired
    }

    pub fn program_region(&self) -> &Region {
        &self.program
    }

    pub fn data_region(&self) -> &Region {
        &self.data
    }

    pub fn program_bound(&self) -> Bound {
        self.program.bound()
    }

    pub fn data_bound(&self) -> Bound {
        self.data.bound()
    }

    pub fn program_end(&self) -> u64 {
        self.program_end
    }

    /// Limits execution to the first `bytes` of the program window, rounded
    /// up to a whole word.
    pub fn set_program_len(&mut self, bytes: usize) {
        let rounded = (bytes as u64 + 3) & !3;
        self.program_end = rounded.min(self.program.bound().span());
    }

    pub fn attach_observer(&mut self, observer: Arc<dyn SimulationObserver>) {
        self.observers.push(observer);
    }

    /// Clears registers and flags and makes the core runnable again. Memory
    /// contents are left alone.
    pub fn reset(&mut self) {
        self.regs = RegisterFile::new();
        self.flags = StatusRegister::empty();
        self.state = CoreState::Running;
        self.retired = 0;
    }

    pub fn snapshot(&self) -> CoreSnapshot {
        CoreSnapshot {
            index: self.index,
            registers: self.regs.as_slice().to_vec(),
            pc: self.regs.pc(),
            flags: self.flags.bits(),
            retired: self.retired,
            halt: self.halt_reason().map(|r| r.to_string()),
        }
    }

    pub fn apply_snapshot(&mut self, snapshot: &CoreSnapshot) {
        self.regs.load_from(&snapshot.registers);
        self.regs.set_pc(snapshot.pc);
        self.flags = StatusRegister::from_bits_truncate(snapshot.flags);
        self.retired = snapshot.retired;
    }

    /// Runs until the core halts, checking `stop` before every instruction.
    pub fn run(&mut self, stop: &AtomicBool) -> HaltReason {
        loop {
            if let CoreState::Halted(reason) = &self.state {
                return reason.clone();
            }
            if stop.load(Ordering::Relaxed) {
                self.halt(HaltReason::Stopped);
                continue;
            }
            self.step();
        }
    }

    /// Performs one fetch-decode-execute cycle. Does nothing once halted.
    pub fn step(&mut self) -> &CoreState {
        if self.is_halted() {
            return &self.state;
        }

        let pc = self.regs.pc();
        if pc as u64 >= self.program_end {
            self.halt(HaltReason::ProgramEnd);
            return &self.state;
        }

        let word = match self.program.read_word(pc) {
            Ok(word) => word,
            Err(error) => {
                self.fault(pc, error);
                return &self.state;
            }
        };

        for observer in &self.observers {
            observer.on_step_start(self.index, pc, word);
        }

        match self.execute(word) {
            Ok(()) => {
                self.retired += 1;
                for observer in &self.observers {
                    observer.on_step_end(self.index);
                }
            }
            Err(error) => self.fault(pc, error),
        }

        &self.state
    }

    fn halt(&mut self, reason: HaltReason) {
        tracing::info!("Core {} halted: {}", self.index, reason);
        for observer in &self.observers {
            observer.on_halt(self.index, &reason);
        }
        self.state = CoreState::Halted(reason);
    }

    fn fault(&mut self, pc: u32, error: SimulationError) {
        tracing::warn!("Core {} fault at {:#010x}: {}", self.index, pc, error);
        self.halt(HaltReason::Fault(CoreFault { pc, error }));
    }

    /// Decodes and executes one word at the current pc.
    pub fn execute(&mut self, word: u32) -> SimResult<()> {
        let (cond, instruction) = match decode(word) {
            Decoded::Instruction(cond, instruction) => (cond, instruction),
            Decoded::UnknownFormat => return Err(SimulationError::UnknownFormat(word)),
            Decoded::Unimplemented(which) => {
                return Err(SimulationError::UnimplementedInstruction(which))
            }
        };

        let pc = self.regs.pc();
        tracing::debug!(
            "Core {} PC={:#010x}, Word={:#010x}, Instr={:?}",
            self.index,
            pc,
            word,
            instruction
        );

        self.pc_written = false;
        if self.condition_passed(cond) {
            self.execute_instruction(pc, instruction)?;
        }
        if !self.pc_written {
            self.regs.set_pc(pc.wrapping_add(4));
        }
        Ok(())
    }

    fn condition_passed(&self, cond: Condition) -> bool {
        let f = self.flags;
        let (n, z, c, v) = (f.n(), f.z(), f.c(), f.v());

        match cond {
            Condition::Eq => z,
            Condition::Ne => !z,
            Condition::Cs => c,
            Condition::Cc => !c,
            Condition::Mi => n,
            Condition::Pl => !n,
            Condition::Vs => v,
            Condition::Vc => !v,
            Condition::Hi => c && !z,
            Condition::Ls => !c || z,
            Condition::Ge => n == v,
            Condition::Lt => n != v,
            Condition::Gt => !z && (n == v),
            Condition::Le => z || (n != v),
            Condition::Al => true,
        }
    }

    fn read_reg(&self, reg: Reg) -> u32 {
        self.regs.read(reg)
    }

    fn write_reg(&mut self, reg: Reg, value: u32) {
        if reg.is_pc() {
            self.pc_written = true;
        }
        self.regs.write(reg, value);
    }

    fn execute_instruction(&mut self, pc: u32, instruction: Instruction) -> SimResult<()> {
        match instruction {
            Instruction::DataProcessing {
                op,
                set_flags,
                rn,
                rd,
                operand2,
            } => {
                let (op2, shifter_carry) = self.operand2(operand2);
                let out = alu::execute(op, self.read_reg(rn), op2, self.flags.c(), shifter_carry);
                if op.writes_result() {
                    self.write_reg(rd, out.value);
                }
                if set_flags {
                    match out.overflow {
                        Some(overflow) => self.flags.update_nzcv(out.value, out.carry, overflow),
                        None => self.flags.update_nzc(out.value, out.carry),
                    }
                }
            }
            Instruction::Branch { link, offset } => {
                if link {
                    self.regs.set_lr(pc.wrapping_add(4));
                }
                self.write_reg(Reg::PC, pc.wrapping_add(offset as u32));
            }
            Instruction::BranchExchange { rm } => {
                let target = self.read_reg(rm);
                self.regs.set_lr(pc.wrapping_add(4));
                self.write_reg(Reg::PC, target);
            }
            Instruction::Multiply {
                accumulate,
                set_flags,
                rd,
                rn,
                rs,
                rm,
            } => {
                let mut result = self.read_reg(rm).wrapping_mul(self.read_reg(rs));
                if accumulate {
                    result = result.wrapping_add(self.read_reg(rn));
                }
                self.write_reg(rd, result);
                if set_flags {
                    self.flags.update_nz(result);
                }
            }
            Instruction::MultiplyLong {
                signed,
                accumulate,
                set_flags,
                rd_hi,
                rd_lo,
                rs,
                rm,
            } => {
                let (a, b) = (self.read_reg(rm), self.read_reg(rs));
                let product = if signed {
                    (a as i32 as i64 * b as i32 as i64) as u64
                } else {
                    a as u64 * b as u64
                };
                let result = if accumulate {
                    let acc = (self.read_reg(rd_hi) as u64) << 32 | self.read_reg(rd_lo) as u64;
                    product.wrapping_add(acc)
                } else {
                    product
                };
                self.write_reg(rd_lo, result as u32);
                self.write_reg(rd_hi, (result >> 32) as u32);
                if set_flags {
                    self.flags.set(StatusRegister::N, result >> 63 != 0);
                    self.flags.set(StatusRegister::Z, result == 0);
                }
            }
            Instruction::Swap { byte, rn, rd, rm } => {
                let addr = self.read_reg(rn);
                let source = self.read_reg(rm);
                let old = if byte {
                    let old = self.data.read_byte(addr)?;
                    self.data.write_byte(addr, source as u8)?;
                    old as u32
                } else {
                    let old = self.data.read_word(addr)?;
                    self.data.write_word(addr, source)?;
                    old
                };
                self.write_reg(rd, old);
            }
            Instruction::SingleTransfer {
                load,
                byte,
                rn,
                rd,
                offset,
                indexing,
            } => {
                let (addr, writeback) = self.transfer_address(rn, offset, indexing);
                if load {
                    let value = if byte {
                        self.data.read_byte(addr)? as u32
                    } else {
                        self.data.read_word(addr)?
                    };
                    if let Some(base) = writeback {
                        self.write_reg(rn, base);
                    }
                    self.write_reg(rd, value);
                } else {
                    let value = self.read_reg(rd);
                    if byte {
                        self.data.write_byte(addr, value as u8)?;
                    } else {
                        self.data.write_word(addr, value)?;
                    }
                    if let Some(base) = writeback {
                        self.write_reg(rn, base);
                    }
                }
            }
            Instruction::HalfwordTransfer {
                load,
                kind,
                rn,
                rd,
                offset,
                indexing,
            } => {
                let (addr, writeback) = self.transfer_address(rn, offset, indexing);
                if load {
                    let value = match kind {
                        HalfwordKind::Halfword => self.data.read_halfword(addr)? as u32,
                        HalfwordKind::SignedByte => self.data.read_byte(addr)? as i8 as i32 as u32,
                        HalfwordKind::SignedHalfword => {
                            self.data.read_halfword(addr)? as i16 as i32 as u32
                        }
                    };
                    if let Some(base) = writeback {
                        self.write_reg(rn, base);
                    }
                    self.write_reg(rd, value);
                } else {
                    self.data.write_halfword(addr, self.read_reg(rd) as u16)?;
                    if let Some(base) = writeback {
                        self.write_reg(rn, base);
                    }
                }
            }
            Instruction::BlockTransfer {
                load,
                rn,
                registers,
                pre,
                up,
                writeback,
            } => self.block_transfer(load, rn, registers, pre, up, writeback)?,
        }
        Ok(())
    }

    fn operand2(&self, operand2: Operand2) -> (u32, bool) {
        let carry = self.flags.c();
        match operand2 {
            Operand2::Immediate { imm8, rotate } => (alu::rotated_immediate(imm8, rotate), carry),
            Operand2::Register { rm, shift, amount } => {
                let value = self.read_reg(rm);
                match amount {
                    ShiftAmount::Immediate(n) => alu::shift_immediate(shift, value, n, carry),
                    ShiftAmount::Register(rs) => {
                        alu::shift_register(shift, value, self.read_reg(rs), carry)
                    }
                }
            }
        }
    }

    /// Effective address of a single or halfword transfer and, when the base
    /// register must be updated, its new value.
    fn transfer_address(&self, rn: Reg, offset: Offset, indexing: Indexing) -> (u32, Option<u32>) {
        let base = self.read_reg(rn);
        let offset = match offset {
            Offset::Immediate(imm) => imm,
            Offset::Register { rm, shift, amount } => {
                alu::shift_immediate(shift, self.read_reg(rm), amount, self.flags.c()).0
            }
        };
        let offset_addr = if indexing.up {
            base.wrapping_add(offset)
        } else {
            base.wrapping_sub(offset)
        };

        if indexing.pre {
            (offset_addr, indexing.writeback.then_some(offset_addr))
        } else {
            (base, Some(offset_addr))
        }
    }

    fn block_transfer(
        &mut self,
        load: bool,
        rn: Reg,
        registers: u16,
        pre: bool,
        up: bool,
        writeback: bool,
    ) -> SimResult<()> {
        let base = self.read_reg(rn);
        let span = registers.count_ones() * 4;
        let lowest = match (pre, up) {
            (false, true) => base,
            (true, true) => base.wrapping_add(4),
            (false, false) => base.wrapping_sub(span).wrapping_add(4),
            (true, false) => base.wrapping_sub(span),
        };
        let final_base = if up {
            base.wrapping_add(span)
        } else {
            base.wrapping_sub(span)
        };

        let selected = (0..16u32).filter(|&i| registers & (1 << i) != 0);
        if load {
            let mut loaded = [0u32; 16];
            for (slot, i) in selected.clone().enumerate() {
                let addr = lowest.wrapping_add(slot as u32 * 4);
                loaded[i as usize] = self.data.read_word(addr)?;
            }
            if writeback {
                self.write_reg(rn, final_base);
            }
            for i in selected {
                self.write_reg(Reg::from_bits(i), loaded[i as usize]);
            }
        } else {
            for (slot, i) in selected.enumerate() {
                let addr = lowest.wrapping_add(slot as u32 * 4);
                self.data.write_word(addr, self.read_reg(Reg::from_bits(i)))?;
            }
            if writeback {
                self.write_reg(rn, final_base);
            }
        }
        Ok(())
    }
}
