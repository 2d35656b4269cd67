// MemSim - ARMv4 Instruction Set Simulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::{HaltReason, SimulationObserver};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

#[derive(Debug)]
pub struct PerformanceMetrics {
    instruction_count: AtomicU64,
    faulted_cores: AtomicU64,
    instructions_by_core: Mutex<HashMap<usize, u64>>,
    start_time: Mutex<Instant>,
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PerformanceMetrics {
    pub fn new() -> Self {
        Self {
            instruction_count: AtomicU64::new(0),
            faulted_cores: AtomicU64::new(0),
            instructions_by_core: Mutex::new(HashMap::new()),
            start_time: Mutex::new(Instant::now()),
        }
    }

    pub fn reset(&self) {
        self.instruction_count.store(0, Ordering::SeqCst);
        self.faulted_cores.store(0, Ordering::SeqCst);
        if let Ok(mut m) = self.instructions_by_core.lock() {
            m.clear();
        }
        if let Ok(mut start) = self.start_time.lock() {
            *start = Instant::now();
        }
    }

    pub fn get_instructions(&self) -> u64 {
        self.instruction_count.load(Ordering::SeqCst)
    }

    pub fn get_core_instructions(&self, core: usize) -> u64 {
        self.instructions_by_core
            .lock()
            .ok()
            .and_then(|m| m.get(&core).copied())
            .unwrap_or(0)
    }

    pub fn get_faulted_cores(&self) -> u64 {
        self.faulted_cores.load(Ordering::SeqCst)
    }

    pub fn get_ips(&self) -> f64 {
        let elapsed = self
            .start_time
            .lock()
            .map(|start| start.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        if elapsed > 0.0 {
            self.get_instructions() as f64 / elapsed
        } else {
            0.0
        }
    }
}

impl SimulationObserver for PerformanceMetrics {
    fn on_simulation_start(&self) {
        if let Ok(mut start) = self.start_time.lock() {
            *start = Instant::now();
        }
    }

    fn on_step_end(&self, core: usize) {
        self.instruction_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut m) = self.instructions_by_core.lock() {
            *m.entry(core).or_insert(0) += 1;
        }
    }

    fn on_halt(&self, _core: usize, reason: &HaltReason) {
        if reason.is_fault() {
            self.faulted_cores.fetch_add(1, Ordering::SeqCst);
        }
    }
}
