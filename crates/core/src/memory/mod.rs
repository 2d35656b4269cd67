// MemSim - ARMv4 Instruction Set Simulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::{ConfigurationError, MemoryFault, SimResult};
use std::io::{self, Read};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

/// Smallest memory the simulator accepts, in bytes.
pub const MIN_SIZE: usize = 128;

const WORD_BYTES: usize = 4;

/// Inclusive `[low, high]` window of a [`Memory`] that accesses resolve into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Bound {
    low: u32,
    high: u32,
}

impl Bound {
    /// `low` must be word-aligned so that word accesses never reach below it.
    pub fn new(low: u32, high: u32) -> Result<Self, ConfigurationError> {
        if low > high || low % WORD_BYTES as u32 != 0 {
            return Err(ConfigurationError::InvalidBound { low, high });
        }
        Ok(Self { low, high })
    }

    pub fn low(&self) -> u32 {
        self.low
    }

    pub fn high(&self) -> u32 {
        self.high
    }

    /// Number of addresses covered by the window.
    pub fn span(&self) -> u64 {
        (self.high - self.low) as u64 + 1
    }

    pub fn overlaps(&self, other: &Bound) -> bool {
        self.low <= other.high && other.low <= self.high
    }
}

/// How many bytes a bulk load should consume from its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadLength {
    Entire,
    Bytes(usize),
}

#[derive(Debug, thiserror::Error)]
#[error("Image load failed after {loaded} bytes: {source}")]
pub struct LoadError {
    pub loaded: usize,
    #[source]
    pub source: io::Error,
}

/// Word-addressed byte store shared between cores.
///
/// Words are kept as atomics so that several cores can hold the same memory
/// through an `Arc` without locking. Cores only ever touch the disjoint
/// windows handed out by the processor, so relaxed ordering is enough.
/// Bytes are packed big-endian: byte 0 of a word is its most significant byte.
#[derive(Debug)]
pub struct Memory {
    words: Vec<AtomicU32>,
    size: AtomicUsize,
}

impl Memory {
    pub fn new(capacity: usize) -> Result<Self, ConfigurationError> {
        if capacity < MIN_SIZE || !capacity.is_power_of_two() {
            return Err(ConfigurationError::InvalidMemorySize(capacity));
        }

        Ok(Self {
            words: (0..capacity / WORD_BYTES).map(|_| AtomicU32::new(0)).collect(),
            size: AtomicUsize::new(capacity),
        })
    }

    /// Logical size in bytes: the capacity, or the byte count of the last load.
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    pub fn capacity(&self) -> usize {
        self.words.len() * WORD_BYTES
    }

    fn word_slot(&self, addr: u32, aligned: u32, bound: &Bound) -> Result<&AtomicU32, MemoryFault> {
        let resolved = bound.low as u64 + aligned as u64;
        let out_of_bounds = MemoryFault::OutOfBounds {
            addr,
            resolved,
            high: bound.high,
        };

        if resolved > bound.high as u64 {
            return Err(out_of_bounds);
        }
        self.words
            .get((resolved / WORD_BYTES as u64) as usize)
            .ok_or(out_of_bounds)
    }

    pub fn read_word(&self, addr: u32, bound: &Bound) -> Result<u32, MemoryFault> {
        if addr % WORD_BYTES as u32 != 0 {
            return Err(MemoryFault::Misaligned { addr });
        }
        Ok(self.word_slot(addr, addr, bound)?.load(Ordering::Relaxed))
    }

    pub fn write_word(&self, addr: u32, data: u32, bound: &Bound) -> Result<(), MemoryFault> {
        if addr % WORD_BYTES as u32 != 0 {
            return Err(MemoryFault::Misaligned { addr });
        }
        self.word_slot(addr, addr, bound)?
            .store(data, Ordering::Relaxed);
        Ok(())
    }

    fn byte_slot(&self, addr: u32, bound: &Bound) -> Result<&AtomicU32, MemoryFault> {
        let resolved = bound.low as u64 + addr as u64;
        if resolved > bound.high as u64 {
            return Err(MemoryFault::OutOfBounds {
                addr,
                resolved,
                high: bound.high,
            });
        }
        self.word_slot(addr, addr & !3, bound)
    }

    pub fn read_byte(&self, addr: u32, bound: &Bound) -> Result<u8, MemoryFault> {
        let word = self.byte_slot(addr, bound)?.load(Ordering::Relaxed);
        Ok((word >> byte_shift(addr)) as u8)
    }

    pub fn write_byte(&self, addr: u32, data: u8, bound: &Bound) -> Result<(), MemoryFault> {
        let slot = self.byte_slot(addr, bound)?;
        let shift = byte_shift(addr);
        let mask = 0xFFu32 << shift;
        // The closure never returns None, so the update cannot fail.
        let _ = slot.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |word| {
            Some((word & !mask) | ((data as u32) << shift))
        });
        Ok(())
    }

    /// Loads a big-endian word image into the window of `bound`, starting at
    /// its first word.
    ///
    /// A trailing group of one to three bytes still fills a word, with the
    /// missing low-order bytes left zero. Loading stops early when the source
    /// is exhausted or the window is full. The logical size becomes the number
    /// of bytes consumed, including when a read error aborts the load.
    pub fn load<R: Read>(
        &self,
        mut source: R,
        length: LoadLength,
        bound: &Bound,
    ) -> Result<usize, LoadError> {
        let window = bound.span().min(self.capacity() as u64) as usize;
        let limit = match length {
            LoadLength::Entire => window,
            LoadLength::Bytes(n) => n.min(window),
        };

        let mut loaded = 0usize;
        let mut result = Ok(());
        while loaded < limit {
            let want = WORD_BYTES.min(limit - loaded);
            let mut chunk = [0u8; WORD_BYTES];
            let got = match read_up_to(&mut source, &mut chunk[..want]) {
                Ok(n) => n,
                Err(source) => {
                    result = Err(source);
                    break;
                }
            };
            if got == 0 {
                break;
            }

            let addr = loaded as u32;
            if self
                .write_word(addr, u32::from_be_bytes(chunk), bound)
                .is_err()
            {
                break;
            }
            loaded += got;
            if got < want {
                break;
            }
        }

        if let LoadLength::Bytes(requested) = length {
            if loaded < requested {
                tracing::warn!(
                    "Image load stopped after {} of {} requested bytes",
                    loaded,
                    requested
                );
            }
        }

        self.size.store(loaded, Ordering::Relaxed);
        result.map(|_| loaded).map_err(|source| LoadError { loaded, source })
    }
}

/// A memory together with the window one core may address in it.
#[derive(Debug, Clone)]
pub struct Region {
    memory: Arc<Memory>,
    bound: Bound,
}

impl Region {
    pub fn new(memory: Arc<Memory>, bound: Bound) -> Self {
        Self { memory, bound }
    }

    pub fn memory(&self) -> &Arc<Memory> {
        &self.memory
    }

    pub fn bound(&self) -> Bound {
        self.bound
    }

    pub fn read_word(&self, addr: u32) -> SimResult<u32> {
        Ok(self.memory.read_word(addr, &self.bound)?)
    }

    pub fn write_word(&self, addr: u32, data: u32) -> SimResult<()> {
        Ok(self.memory.write_word(addr, data, &self.bound)?)
    }

    pub fn read_byte(&self, addr: u32) -> SimResult<u8> {
        Ok(self.memory.read_byte(addr, &self.bound)?)
    }

    pub fn write_byte(&self, addr: u32, data: u8) -> SimResult<()> {
        Ok(self.memory.write_byte(addr, data, &self.bound)?)
    }

    /// Halfwords are stored low byte first.
    pub fn read_halfword(&self, addr: u32) -> SimResult<u16> {
        let low = self.read_byte(addr)?;
        let high = self.read_byte(addr.wrapping_add(1))?;
        Ok(u16::from_le_bytes([low, high]))
    }

    pub fn write_halfword(&self, addr: u32, data: u16) -> SimResult<()> {
        let [low, high] = data.to_le_bytes();
        self.write_byte(addr, low)?;
        self.write_byte(addr.wrapping_add(1), high)
    }

    pub fn load<R: Read>(&self, source: R, length: LoadLength) -> Result<usize, LoadError> {
        self.memory.load(source, length, &self.bound)
    }
}

fn byte_shift(addr: u32) -> u32 {
    (3 - (addr & 3)) * 8
}

/// Reads until `buf` is full or the source reports end of input.
fn read_up_to<R: Read>(source: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
