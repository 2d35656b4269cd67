// MemSim - ARMv4 Instruction Set Simulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use memsim_config::MachineManifest;
use memsim_core::{LoadLength, Processor};
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Which window of a core an image goes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Program,
    Data,
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageKind::Program => f.write_str("program"),
            ImageKind::Data => f.write_str("data"),
        }
    }
}

/// Loads a raw big-endian word image from `path` into one core.
pub fn load_image_file(
    processor: &mut Processor,
    core: usize,
    path: &Path,
    kind: ImageKind,
) -> Result<usize> {
    let file =
        File::open(path).with_context(|| format!("Failed to open {} image {:?}", kind, path))?;
    let file_len = file.metadata().map(|m| m.len()).ok();
    let reader = BufReader::new(file);

    let loaded = match kind {
        ImageKind::Program => processor.load_program(core, reader, LoadLength::Entire),
        ImageKind::Data => processor.load_data(core, reader, LoadLength::Entire),
    }
    .with_context(|| format!("Failed to load {} image {:?} into core {}", kind, path, core))?;

    if let Some(len) = file_len {
        if (loaded as u64) < len {
            warn!(
                "{:?}: only {} of {} bytes fit into core {}'s {} window",
                path, loaded, len, core, kind
            );
        }
    }
    if loaded % 4 != 0 {
        debug!("{:?}: last word padded with {} zero byte(s)", path, 4 - loaded % 4);
    }

    info!("Loaded {} image {:?} ({} bytes) into core {}", kind, path, loaded, core);
    Ok(loaded)
}

/// Loads every image listed in `manifest`. Relative paths are resolved
/// against `base_dir`, normally the directory holding the manifest.
pub fn load_manifest_images(
    processor: &mut Processor,
    manifest: &MachineManifest,
    base_dir: &Path,
) -> Result<usize> {
    let mut total = 0;
    for entry in &manifest.images {
        // Program first, so that shared windows place data after it.
        if let Some(program) = &entry.program {
            let path = resolve(base_dir, program);
            total += load_image_file(processor, entry.core, &path, ImageKind::Program)?;
        }
        if let Some(data) = &entry.data {
            let path = resolve(base_dir, data);
            total += load_image_file(processor, entry.core, &path, ImageKind::Data)?;
        }
    }
    Ok(total)
}

fn resolve(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

/// Serializes instruction words into the big-endian image format.
pub fn encode_words(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_be_bytes()).collect()
}
