// MemSim - ARMv4 Instruction Set Simulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::memory::{Bound, LoadError, LoadLength, Memory, Region, MIN_SIZE};
use crate::snapshot::MachineSnapshot;
use crate::{ConfigurationError, Core, HaltReason, SimulationObserver, Topology};
use anyhow::Context;
use memsim_config::MachineManifest;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("Core {0} thread panicked; cores were rebuilt")]
    CorePanicked(usize),
}

/// How one core's run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreReport {
    pub index: usize,
    pub halt: HaltReason,
    pub retired: u64,
}

/// Cloneable handle that asks every running core to stop after its current
/// instruction.
#[derive(Debug, Clone)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn request_stop(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }
}

/// The set of cores and the memories they run on.
///
/// Under [`Topology::Harvard`] every core owns a private program memory and a
/// private data memory. Under [`Topology::VonNeumann`] all cores share one
/// memory cut into equal, disjoint windows, one per core, used for both
/// program and data.
#[derive(Debug)]
pub struct Processor {
    topology: Topology,
    memory_size: usize,
    core_count: usize,
    cores: Vec<Core>,
    shared: Option<Arc<Memory>>,
    has_program: Vec<bool>,
    running: Vec<JoinHandle<Core>>,
    stop: Arc<AtomicBool>,
    observers: Vec<Arc<dyn SimulationObserver>>,
}

impl Processor {
    pub fn new(topology: Topology, memory_size: usize) -> Result<Self, ConfigurationError> {
        if memory_size < MIN_SIZE
            || !memory_size.is_power_of_two()
            || memory_size as u64 > u32::MAX as u64 + 1
        {
            return Err(ConfigurationError::InvalidMemorySize(memory_size));
        }

        let mut processor = Self {
            topology,
            memory_size,
            core_count: 0,
            cores: Vec::new(),
            shared: None,
            has_program: Vec::new(),
            running: Vec::new(),
            stop: Arc::new(AtomicBool::new(false)),
            observers: Vec::new(),
        };
        processor.set_core_count(1)?;
        Ok(processor)
    }

    /// Builds a processor with the topology, memory size and core count of
    /// `manifest`. Images are loaded separately.
    pub fn from_manifest(manifest: &MachineManifest) -> anyhow::Result<Self> {
        let size = manifest.memory_bytes()?;
        let size = usize::try_from(size)
            .with_context(|| format!("Memory size {} does not fit this host", size))?;
        let mut processor = Self::new(manifest.topology, size)
            .context("Failed to create processor from manifest")?;
        processor
            .set_core_count(manifest.cores)
            .context("Failed to configure cores from manifest")?;
        Ok(processor)
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    pub fn memory_size(&self) -> usize {
        self.memory_size
    }

    pub fn core_count(&self) -> usize {
        self.core_count
    }

    pub fn is_running(&self) -> bool {
        !self.running.is_empty()
    }

    /// The memory every core shares under Von Neumann topology.
    pub fn shared_memory(&self) -> Option<&Arc<Memory>> {
        self.shared.as_ref()
    }

    /// Discards the current cores and builds `n` fresh ones, each with its
    /// own window. Memory contents are lost.
    pub fn set_core_count(&mut self, n: usize) -> Result<(), ConfigurationError> {
        if self.is_running() {
            return Err(ConfigurationError::Running);
        }
        if n == 0 {
            return Err(ConfigurationError::InvalidCoreCount(n));
        }

        let (cores, shared) = match self.topology {
            Topology::Harvard => (self.harvard_cores(n)?, None),
            Topology::VonNeumann => {
                let memory = Arc::new(Memory::new(self.memory_size)?);
                (self.von_neumann_cores(n, &memory)?, Some(memory))
            }
        };
        debug_assert!(windows_are_disjoint(&cores));

        self.cores = cores;
        self.shared = shared;
        self.core_count = n;
        self.has_program = vec![false; n];
        for core in &mut self.cores {
            for observer in &self.observers {
                core.attach_observer(observer.clone());
            }
        }

        tracing::info!(
            "Configured {} core(s), {} topology, {} bytes of memory",
            n,
            self.topology,
            self.memory_size
        );
        Ok(())
    }

    fn harvard_cores(&self, n: usize) -> Result<Vec<Core>, ConfigurationError> {
        let bound = Bound::new(0, (self.memory_size - 1) as u32)?;
        (0..n)
            .map(|index| {
                let program = Arc::new(Memory::new(self.memory_size)?);
                let data = Arc::new(Memory::new(self.memory_size)?);
                Ok(Core::new(
                    index,
                    Region::new(program, bound),
                    Region::new(data, bound),
                ))
            })
            .collect()
    }

    fn von_neumann_cores(
        &self,
        n: usize,
        memory: &Arc<Memory>,
    ) -> Result<Vec<Core>, ConfigurationError> {
        let window = self.memory_size / n;
        if window == 0 || window % 4 != 0 {
            return Err(ConfigurationError::WindowTooSmall {
                size: self.memory_size,
                cores: n,
            });
        }

        (0..n)
            .map(|index| {
                let low = (index * window) as u32;
                let bound = Bound::new(low, low + (window - 1) as u32)?;
                let region = Region::new(memory.clone(), bound);
                Ok(Core::new(index, region.clone(), region))
            })
            .collect()
    }

    pub fn attach_observer(&mut self, observer: Arc<dyn SimulationObserver>) {
        for core in &mut self.cores {
            core.attach_observer(observer.clone());
        }
        self.observers.push(observer);
    }

    pub fn core(&self, index: usize) -> Result<&Core, ConfigurationError> {
        if self.is_running() {
            return Err(ConfigurationError::Running);
        }
        self.cores
            .get(index)
            .ok_or(ConfigurationError::NoSuchCore(index))
    }

    pub fn core_mut(&mut self, index: usize) -> Result<&mut Core, ConfigurationError> {
        if self.is_running() {
            return Err(ConfigurationError::Running);
        }
        self.cores
            .get_mut(index)
            .ok_or(ConfigurationError::NoSuchCore(index))
    }

    /// All cores, or an empty slice while they are running.
    pub fn cores(&self) -> &[Core] {
        &self.cores
    }

    /// Loads a program image at the start of the core's program window and
    /// limits execution to the loaded bytes.
    pub fn load_program<R: Read>(
        &mut self,
        index: usize,
        source: R,
        length: LoadLength,
    ) -> Result<usize, ProcessorError> {
        let core = self.core_mut(index)?;
        let loaded = core.program_region().load(source, length);
        // A partial image still runs up to the point where the read failed.
        let bytes = match &loaded {
            Ok(n) => *n,
            Err(e) => e.loaded,
        };
        core.set_program_len(bytes);
        self.has_program[index] = true;

        tracing::info!("Loaded {} program bytes into core {}", bytes, index);
        Ok(loaded?)
    }

    /// Loads a data image into the core's data window. Under Von Neumann
    /// topology the window is shared with the program, so data is placed
    /// right after the loaded program.
    pub fn load_data<R: Read>(
        &mut self,
        index: usize,
        source: R,
        length: LoadLength,
    ) -> Result<usize, ProcessorError> {
        let after_program = self.has_program.get(index).copied().unwrap_or(false);
        let topology = self.topology;
        let core = self.core(index)?;

        let region = match topology {
            Topology::VonNeumann if after_program => {
                let bound = core.data_bound();
                let low = bound.low() as u64 + core.program_end();
                if low > bound.high() as u64 {
                    tracing::warn!("Core {} has no room for data after its program", index);
                    return Ok(0);
                }
                Region::new(
                    core.data_region().memory().clone(),
                    Bound::new(low as u32, bound.high())?,
                )
            }
            _ => core.data_region().clone(),
        };

        let loaded = region.load(source, length)?;
        tracing::info!("Loaded {} data bytes into core {}", loaded, index);
        Ok(loaded)
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            flag: self.stop.clone(),
        }
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Starts one thread per core and returns without waiting for them.
    pub fn run(&mut self) -> Result<(), ConfigurationError> {
        if self.is_running() {
            return Err(ConfigurationError::Running);
        }

        self.stop.store(false, Ordering::Relaxed);
        for observer in &self.observers {
            observer.on_simulation_start();
        }
        tracing::info!("Starting {} core(s)", self.cores.len());

        self.running = self
            .cores
            .drain(..)
            .map(|mut core| {
                let stop = self.stop.clone();
                std::thread::spawn(move || {
                    core.run(&stop);
                    core
                })
            })
            .collect();
        Ok(())
    }

    /// Waits for every running core and takes the cores back.
    pub fn join(&mut self) -> Result<Vec<CoreReport>, ProcessorError> {
        let handles = std::mem::take(&mut self.running);
        let mut panicked = None;
        for (index, handle) in handles.into_iter().enumerate() {
            match handle.join() {
                Ok(core) => self.cores.push(core),
                Err(_) => {
                    tracing::error!("Core {} thread panicked", index);
                    panicked.get_or_insert(index);
                }
            }
        }

        for observer in &self.observers {
            observer.on_simulation_stop();
        }

        if let Some(index) = panicked {
            self.set_core_count(self.core_count)?;
            return Err(ProcessorError::CorePanicked(index));
        }

        let reports = self
            .cores
            .iter()
            .map(|core| CoreReport {
                index: core.index(),
                halt: core
                    .halt_reason()
                    .cloned()
                    .unwrap_or(HaltReason::Stopped),
                retired: core.retired(),
            })
            .collect();
        Ok(reports)
    }

    pub fn run_to_completion(&mut self) -> Result<Vec<CoreReport>, ProcessorError> {
        self.run()?;
        self.join()
    }

    pub fn snapshot(&self) -> Result<MachineSnapshot, ConfigurationError> {
        if self.is_running() {
            return Err(ConfigurationError::Running);
        }
        Ok(MachineSnapshot {
            topology: self.topology,
            memory_size: self.memory_size,
            cores: self.cores.iter().map(Core::snapshot).collect(),
        })
    }
}

impl Drop for Processor {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop();
            for handle in self.running.drain(..) {
                let _ = handle.join();
            }
        }
    }
}

fn windows_are_disjoint(cores: &[Core]) -> bool {
    cores.iter().enumerate().all(|(i, a)| {
        cores[i + 1..].iter().all(|b| {
            !Arc::ptr_eq(a.data_region().memory(), b.data_region().memory())
                || !a.data_bound().overlaps(&b.data_bound())
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_starts_with_one_core() {
        let processor = Processor::new(Topology::Harvard, 1024).unwrap();
        assert_eq!(processor.core_count(), 1);
        assert_eq!(processor.cores().len(), 1);
        assert!(!processor.is_running());
    }

    #[test]
    fn test_invalid_configuration_is_rejected() {
        assert_eq!(
            Processor::new(Topology::Harvard, 100).unwrap_err(),
            ConfigurationError::InvalidMemorySize(100)
        );

        let mut processor = Processor::new(Topology::VonNeumann, 128).unwrap();
        assert_eq!(
            processor.set_core_count(0),
            Err(ConfigurationError::InvalidCoreCount(0))
        );
        assert_eq!(
            processor.set_core_count(3),
            Err(ConfigurationError::WindowTooSmall { size: 128, cores: 3 })
        );
        // A failed reconfiguration leaves the previous cores in place.
        assert_eq!(processor.core_count(), 1);
        assert_eq!(processor.core(1).unwrap_err(), ConfigurationError::NoSuchCore(1));
    }

    #[test]
    fn test_von_neumann_windows_partition_memory() {
        let mut processor = Processor::new(Topology::VonNeumann, 1024).unwrap();
        processor.set_core_count(4).unwrap();

        let bounds: Vec<(u32, u32)> = processor
            .cores()
            .iter()
            .map(|c| (c.data_bound().low(), c.data_bound().high()))
            .collect();
        assert_eq!(bounds, vec![(0, 255), (256, 511), (512, 767), (768, 1023)]);
        assert!(processor.shared_memory().is_some());
        assert!(windows_are_disjoint(processor.cores()));
    }

    #[test]
    fn test_harvard_cores_get_private_memories() {
        let mut processor = Processor::new(Topology::Harvard, 256).unwrap();
        processor.set_core_count(2).unwrap();

        let a = processor.core(0).unwrap();
        let b = processor.core(1).unwrap();
        assert!(!Arc::ptr_eq(a.data_region().memory(), b.data_region().memory()));
        assert!(!Arc::ptr_eq(a.program_region().memory(), a.data_region().memory()));
        assert_eq!(a.program_bound(), Bound::new(0, 255).unwrap());
        assert!(processor.shared_memory().is_none());
    }

    #[test]
    fn test_von_neumann_data_follows_program() {
        let mut processor = Processor::new(Topology::VonNeumann, 256).unwrap();
        processor.set_core_count(2).unwrap();

        let program = [0xE3, 0xA0, 0x00, 0x05, 0xE1, 0xA0];
        assert_eq!(processor.load_program(1, &program[..], LoadLength::Entire).unwrap(), 6);
        assert_eq!(
            processor.load_data(1, &[0xAA, 0xBB][..], LoadLength::Entire).unwrap(),
            2
        );

        let core = processor.core(1).unwrap();
        assert_eq!(core.program_end(), 8);
        assert_eq!(core.data_region().read_word(0).unwrap(), 0xE3A0_0005);
        assert_eq!(core.data_region().read_word(8).unwrap(), 0xAABB_0000);
    }

    #[test]
    fn test_run_and_join_returns_reports() {
        let mut processor = Processor::new(Topology::Harvard, 128).unwrap();
        let image = [0xE3u8, 0xA0, 0x00, 0x05];
        processor.load_program(0, &image[..], LoadLength::Entire).unwrap();

        let reports = processor.run_to_completion().unwrap();
        assert_eq!(
            reports,
            vec![CoreReport {
                index: 0,
                halt: HaltReason::ProgramEnd,
                retired: 1,
            }]
        );
        let core = processor.core(0).unwrap();
        assert_eq!(core.registers().read(crate::cpu::Reg::from_bits(0)), 5);
    }

    #[test]
    fn test_reconfiguration_while_running_is_rejected() {
        let mut processor = Processor::new(Topology::Harvard, 128).unwrap();
        // B . runs until stopped.
        let image = [0xEAu8, 0xFF, 0xFF, 0xFE];
        processor.load_program(0, &image[..], LoadLength::Entire).unwrap();

        processor.run().unwrap();
        assert!(processor.is_running());
        assert_eq!(processor.set_core_count(2), Err(ConfigurationError::Running));
        assert_eq!(processor.run(), Err(ConfigurationError::Running));
        assert!(processor.core(0).is_err());

        processor.stop_handle().request_stop();
        let reports = processor.join().unwrap();
        assert_eq!(reports[0].halt, HaltReason::Stopped);
        assert!(!processor.is_running());
        processor.set_core_count(2).unwrap();
    }

    #[test]
    fn test_snapshot_lists_every_core() {
        let mut processor = Processor::new(Topology::VonNeumann, 512).unwrap();
        processor.set_core_count(2).unwrap();
        let snapshot = processor.snapshot().unwrap();
        assert_eq!(snapshot.cores.len(), 2);
        assert_eq!(snapshot.topology, Topology::VonNeumann);

        let json = snapshot.to_json().unwrap();
        assert_eq!(MachineSnapshot::from_json(&json).unwrap(), snapshot);
    }
}
