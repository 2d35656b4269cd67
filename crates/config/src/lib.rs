// MemSim - ARMv4 Instruction Set Simulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// Memory size used when a manifest does not specify one.
pub const DEFAULT_MEMORY_SIZE: u64 = 1024;

/// Default schema version for YAML configs
fn default_schema_version() -> String {
    "1.0".to_string()
}

fn default_cores() -> usize {
    1
}

fn default_memory_size() -> String {
    format!("{}B", DEFAULT_MEMORY_SIZE)
}

/// How program/data memory is laid out across cores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topology {
    /// Every core gets private program and data memories.
    Harvard,
    /// All cores share one memory, sliced into disjoint windows.
    #[serde(alias = "vonneumann", alias = "von-neumann")]
    VonNeumann,
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topology::Harvard => f.write_str("harvard"),
            Topology::VonNeumann => f.write_str("von-neumann"),
        }
    }
}

impl std::str::FromStr for Topology {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "harvard" => Ok(Topology::Harvard),
            "von-neumann" | "von_neumann" | "vonneumann" => Ok(Topology::VonNeumann),
            other => Err(format!("Unknown topology '{}'", other)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ImageEntry {
    pub core: usize,
    #[serde(default)]
    pub program: Option<PathBuf>,
    #[serde(default)]
    pub data: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MachineManifest {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    pub topology: Topology,
    #[serde(default = "default_cores")]
    pub cores: usize,
    #[serde(default = "default_memory_size")]
    pub memory_size: String, // e.g. "1KiB"
    #[serde(default)]
    pub images: Vec<ImageEntry>,
}

impl MachineManifest {
    pub fn new(topology: Topology, cores: usize, memory_size: u64) -> Self {
        Self {
            schema_version: default_schema_version(),
            topology,
            cores,
            memory_size: format!("{}B", memory_size),
            images: Vec::new(),
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read machine manifest at {:?}", path))?;
        let manifest = Self::from_yaml(&content)
            .with_context(|| format!("Invalid machine manifest {:?}", path))?;
        tracing::debug!(
            "Manifest {:?}: {} topology, {} core(s), {} image entries",
            path,
            manifest.topology,
            manifest.cores,
            manifest.images.len()
        );
        Ok(manifest)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let manifest: Self =
            serde_yaml::from_str(yaml).context("Failed to parse Machine Manifest")?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Memory size in bytes, as parsed from the human-readable string.
    pub fn memory_bytes(&self) -> Result<u64> {
        parse_size(&self.memory_size)
            .with_context(|| format!("Invalid memory_size '{}'", self.memory_size))
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != "1.0" {
            anyhow::bail!(
                "Unsupported schema_version '{}'. Supported versions: '1.0'",
                self.schema_version
            );
        }

        if self.cores == 0 {
            anyhow::bail!("'cores' must be greater than zero");
        }

        self.memory_bytes()?;

        let mut seen = HashSet::new();
        for image in &self.images {
            if image.core >= self.cores {
                anyhow::bail!(
                    "Image entry for core {} but the machine only has {} core(s)",
                    image.core,
                    self.cores
                );
            }
            if !seen.insert(image.core) {
                anyhow::bail!("Duplicate image entry for core {}", image.core);
            }
        }

        Ok(())
    }
}

pub fn parse_size(size_str: &str) -> Result<u64> {
    use human_size::{Byte, Size, SpecificSize};
    let s: Size = size_str
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid size format: {}", e))?;
    let bytes: SpecificSize<Byte> = s.into();
    Ok(bytes.value() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_manifest_defaults() {
        let manifest = MachineManifest::from_yaml("topology: harvard\n").unwrap();
        assert_eq!(manifest.topology, Topology::Harvard);
        assert_eq!(manifest.cores, 1);
        assert_eq!(manifest.memory_bytes().unwrap(), DEFAULT_MEMORY_SIZE);
        assert!(manifest.images.is_empty());
    }

    #[test]
    fn test_parse_size_binary_units() {
        assert_eq!(parse_size("1KiB").unwrap(), 1024);
        assert_eq!(parse_size("128B").unwrap(), 128);
        assert!(parse_size("lots").is_err());
    }

    #[test]
    fn test_topology_from_str() {
        assert_eq!("harvard".parse::<Topology>(), Ok(Topology::Harvard));
        assert_eq!("Von-Neumann".parse::<Topology>(), Ok(Topology::VonNeumann));
        assert!("ring".parse::<Topology>().is_err());
    }

    #[test]
    fn test_rejects_zero_cores() {
        let err = MachineManifest::from_yaml("topology: harvard\ncores: 0\n").unwrap_err();
        assert!(format!("{:#}", err).contains("cores"));
    }
}
