// MemSim - ARMv4 Instruction Set Simulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use clap::Parser;
use memsim_config::{MachineManifest, Topology, DEFAULT_MEMORY_SIZE};
use memsim_core::metrics::PerformanceMetrics;
use memsim_core::{CoreReport, Processor};
use memsim_loader::{load_image_file, load_manifest_images, ImageKind};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

const EXIT_PASS: u8 = 0;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_RUNTIME_ERROR: u8 = 3;

const RESULT_SCHEMA_VERSION: &str = "1.0";

fn parse_memory_size(s: &str) -> Result<u64, String> {
    memsim_config::parse_size(s).map_err(|e| format!("{:#}", e))
}

#[derive(Parser, Debug)]
#[command(author, version, about = "MemSim ARMv4 Instruction Set Simulator", long_about = None)]
struct Cli {
    /// Path to the machine manifest (YAML)
    #[arg(short, long)]
    system: Option<PathBuf>,

    /// Program image for core 0 (raw big-endian words)
    #[arg(short, long)]
    program: Option<PathBuf>,

    /// Data image for core 0
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// Memory topology: harvard or von-neumann
    #[arg(long)]
    topology: Option<Topology>,

    /// Number of cores
    #[arg(long)]
    cores: Option<usize>,

    /// Memory size, e.g. "1KiB" or "4096B"
    #[arg(long, value_parser = parse_memory_size)]
    memory_size: Option<u64>,

    /// Write the final machine state (JSON) to this file
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Enable instruction-level execution tracing
    #[arg(short, long)]
    trace: bool,

    /// Print a one-line JSON run summary on stdout
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct RunSummary {
    result_schema_version: String,
    status: String,
    topology: Topology,
    memory_size: usize,
    instructions: u64,
    cores: Vec<CoreSummary>,
}

#[derive(Debug, Serialize)]
struct CoreSummary {
    index: usize,
    halt: String,
    faulted: bool,
    retired: u64,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries only the --json summary.
    let level = if cli.trace {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    info!("Starting MemSim");

    let mut processor = match build_processor(&cli) {
        Ok(processor) => processor,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let metrics = Arc::new(PerformanceMetrics::new());
    processor.attach_observer(metrics.clone());

    info!(
        "Running {} core(s), {} topology, {} bytes of memory",
        processor.core_count(),
        processor.topology(),
        processor.memory_size()
    );

    let reports = match processor.run_to_completion() {
        Ok(reports) => reports,
        Err(e) => {
            error!("Simulation failed: {:#}", e);
            return ExitCode::from(EXIT_RUNTIME_ERROR);
        }
    };

    for report in &reports {
        if report.halt.is_fault() {
            warn!(
                "Core {} halted after {} instruction(s): {}",
                report.index, report.retired, report.halt
            );
        } else {
            info!(
                "Core {} halted after {} instruction(s): {}",
                report.index, report.retired, report.halt
            );
        }
    }
    info!(
        "Retired {} instruction(s) at {:.0} IPS, {} core(s) faulted",
        metrics.get_instructions(),
        metrics.get_ips(),
        metrics.get_faulted_cores()
    );

    if let Some(path) = &cli.snapshot {
        write_snapshot(&processor, path);
    }

    let faulted = reports.iter().any(|r| r.halt.is_fault());

    if cli.json {
        let summary = summarize(&processor, &reports, metrics.get_instructions(), faulted);
        match serde_json::to_string(&summary) {
            Ok(line) => println!("{}", line),
            Err(e) => error!("Failed to serialize run summary: {}", e),
        }
    }

    if faulted {
        ExitCode::from(EXIT_RUNTIME_ERROR)
    } else {
        ExitCode::from(EXIT_PASS)
    }
}

/// Builds the machine from `--system` or from the individual flags, then
/// loads every requested image. Flags override manifest values.
fn build_processor(cli: &Cli) -> Result<Processor> {
    let (mut manifest, base_dir) = match &cli.system {
        Some(path) => {
            info!("Loading machine manifest: {:?}", path);
            let manifest = MachineManifest::from_file(path)?;
            let base_dir = path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
            (manifest, base_dir)
        }
        None => {
            if cli.program.is_none() {
                anyhow::bail!("Either --system or --program is required");
            }
            let manifest = MachineManifest::new(Topology::Harvard, 1, DEFAULT_MEMORY_SIZE);
            (manifest, PathBuf::from("."))
        }
    };

    if let Some(topology) = cli.topology {
        manifest.topology = topology;
    }
    if let Some(cores) = cli.cores {
        manifest.cores = cores;
    }
    if let Some(size) = cli.memory_size {
        manifest.memory_size = format!("{}B", size);
    }
    manifest
        .validate()
        .context("Invalid machine configuration")?;

    let mut processor = Processor::from_manifest(&manifest)?;
    load_manifest_images(&mut processor, &manifest, &base_dir)?;

    // Command-line images go to core 0, after any manifest images.
    if let Some(program) = &cli.program {
        load_image_file(&mut processor, 0, program, ImageKind::Program)?;
    }
    if let Some(data) = &cli.data {
        load_image_file(&mut processor, 0, data, ImageKind::Data)?;
    }

    Ok(processor)
}

fn summarize(
    processor: &Processor,
    reports: &[CoreReport],
    instructions: u64,
    faulted: bool,
) -> RunSummary {
    RunSummary {
        result_schema_version: RESULT_SCHEMA_VERSION.to_string(),
        status: if faulted { "fault" } else { "ok" }.to_string(),
        topology: processor.topology(),
        memory_size: processor.memory_size(),
        instructions,
        cores: reports
            .iter()
            .map(|r| CoreSummary {
                index: r.index,
                halt: r.halt.to_string(),
                faulted: r.halt.is_fault(),
                retired: r.retired,
            })
            .collect(),
    }
}

fn write_snapshot(processor: &Processor, path: &Path) {
    let snapshot = match processor.snapshot() {
        Ok(snapshot) => snapshot,
        Err(e) => {
            error!("Failed to capture snapshot: {}", e);
            return;
        }
    };

    match std::fs::File::create(path) {
        Ok(f) => {
            if let Err(e) = serde_json::to_writer_pretty(f, &snapshot) {
                error!("Failed to write snapshot {:?}: {}", path, e);
            } else {
                info!("Snapshot written to {:?}", path);
            }
        }
        Err(e) => error!("Failed to create snapshot {:?}: {}", path, e),
    }
}
