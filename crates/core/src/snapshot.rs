// MemSim - ARMv4 Instruction Set Simulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::Topology;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MachineSnapshot {
    pub topology: Topology,
    pub memory_size: usize,
    pub cores: Vec<CoreSnapshot>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CoreSnapshot {
    pub index: usize,
    pub registers: Vec<u32>,
    pub pc: u32,
    /// N/Z/C/V at their CPSR bit positions.
    pub flags: u32,
    pub retired: u64,
    /// Halt reason, or `None` while the core can still run.
    pub halt: Option<String>,
}

impl MachineSnapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
