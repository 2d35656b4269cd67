// MemSim - ARMv4 Instruction Set Simulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod cpu;
pub mod decoder;
pub mod memory;
pub mod metrics;
pub mod processor;
pub mod snapshot;

pub use cpu::{Core, CoreFault, CoreState, HaltReason};
pub use memory::{Bound, LoadError, LoadLength, Memory, Region};
pub use memsim_config::Topology;
pub use processor::{CoreReport, Processor, ProcessorError, StopHandle};


/// Faults raised while configuring the processor or its memories.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Core count must be greater than zero (got {0})")]
    InvalidCoreCount(usize),
    #[error("Cannot reconfigure the processor while cores are running")]
    Running,
    #[error("Memory size {0} must be a power of two and at least {min} bytes", min = memory::MIN_SIZE)]
    InvalidMemorySize(usize),
    #[error("Invalid bound [{low:#x}, {high:#x}]: low must be word-aligned and not above high")]
    InvalidBound { low: u32, high: u32 },
    #[error("No core with index {0}")]
    NoSuchCore(usize),
    #[error("Memory of {size} bytes cannot be split into {cores} word-aligned windows")]
    WindowTooSmall { size: usize, cores: usize },
}

/// Faults raised by a memory access through a [`Bound`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MemoryFault {
    #[error("Misaligned word access at {addr:#x}")]
    Misaligned { addr: u32 },
    #[error("Address {addr:#x} resolves to {resolved:#x}, beyond bound high {high:#x}")]
    OutOfBounds { addr: u32, resolved: u64, high: u32 },
}

/// Instruction forms the decoder recognizes but the core does not execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unsupported {
    Msr,
    Mrs,
    Blx,
    DspAddSub,
    Bkpt,
    Swi,
    Cdp,
    McrMrc,
    LdcStc,
}

impl std::fmt::Display for Unsupported {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Unsupported::Msr => "MSR",
            Unsupported::Mrs => "MRS",
            Unsupported::Blx => "BLX",
            Unsupported::DspAddSub => "DSP add/sub",
            Unsupported::Bkpt => "BKPT",
            Unsupported::Swi => "SWI",
            Unsupported::Cdp => "CDP",
            Unsupported::McrMrc => "MCR/MRC",
            Unsupported::LdcStc => "LDC/STC",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimulationError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("Memory access fault: {0}")]
    MemoryAccess(#[from] MemoryFault),
    #[error("Unknown instruction format {0:#010x}")]
    UnknownFormat(u32),
    #[error("Unimplemented instruction: {0}")]
    UnimplementedInstruction(Unsupported),
}

pub type SimResult<T> = Result<T, SimulationError>;

/// Trait for observing simulation events in a modular way.
///
/// Observers are shared by every core, so hooks may be called concurrently
/// from several threads.
pub trait SimulationObserver: std::fmt::Debug + Send + Sync {
    fn on_simulation_start(&self) {}
    fn on_simulation_stop(&self) {}
    fn on_step_start(&self, _core: usize, _pc: u32, _opcode: u32) {}
    fn on_step_end(&self, _core: usize) {}
    fn on_halt(&self, _core: usize, _reason: &HaltReason) {}
}
