// MemSim - ARMv4 Instruction Set Simulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use memsim_config::MachineManifest;
use memsim_core::cpu::Reg;
use memsim_core::{HaltReason, Processor, Topology};
use memsim_loader::{encode_words, load_image_file, load_manifest_images, ImageKind};
use std::path::PathBuf;

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("memsim-loader-{}-{}", name, std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn test_program_file_runs() {
    let dir = scratch_dir("program");
    let path = dir.join("mov.bin");
    std::fs::write(&path, encode_words(&[0xE3A0_0005])).unwrap(); // MOV r0, #5

    let mut processor = Processor::new(Topology::Harvard, 128).unwrap();
    let loaded = load_image_file(&mut processor, 0, &path, ImageKind::Program).unwrap();
    assert_eq!(loaded, 4);

    let reports = processor.run_to_completion().unwrap();
    assert_eq!(reports[0].halt, HaltReason::ProgramEnd);
    let core = processor.core(0).unwrap();
    assert_eq!(core.registers().read(Reg::from_bits(0)), 5);
    assert_eq!(core.pc(), 4);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_partial_trailing_word_is_zero_padded() {
    let dir = scratch_dir("partial");
    let path = dir.join("data.bin");
    std::fs::write(&path, [0xDE, 0xAD, 0xBE, 0xEF, 0x7F]).unwrap();

    let mut processor = Processor::new(Topology::Harvard, 128).unwrap();
    let loaded = load_image_file(&mut processor, 0, &path, ImageKind::Data).unwrap();
    assert_eq!(loaded, 5);

    let core = processor.core(0).unwrap();
    assert_eq!(core.data_region().read_word(0).unwrap(), 0xDEAD_BEEF);
    assert_eq!(core.data_region().read_word(4).unwrap(), 0x7F00_0000);
    assert_eq!(core.data_region().memory().size(), 5);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_oversized_image_is_truncated_to_window() {
    let dir = scratch_dir("oversized");
    let path = dir.join("big.bin");
    std::fs::write(&path, vec![0u8; 512]).unwrap();

    let mut processor = Processor::new(Topology::VonNeumann, 256).unwrap();
    processor.set_core_count(2).unwrap();
    let loaded = load_image_file(&mut processor, 1, &path, ImageKind::Program).unwrap();
    assert_eq!(loaded, 128);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_missing_file_names_path() {
    let mut processor = Processor::new(Topology::Harvard, 128).unwrap();
    let err = load_image_file(
        &mut processor,
        0,
        std::path::Path::new("/nonexistent/prog.bin"),
        ImageKind::Program,
    )
    .unwrap_err();
    assert!(format!("{:#}", err).contains("prog.bin"));
}

#[test]
fn test_manifest_images_resolve_relative_to_base_dir() {
    let dir = scratch_dir("manifest");
    std::fs::write(dir.join("p0.bin"), encode_words(&[0xE3A0_0001])).unwrap(); // MOV r0, #1
    std::fs::write(dir.join("p1.bin"), encode_words(&[0xE3A0_0002])).unwrap(); // MOV r0, #2
    std::fs::write(dir.join("d1.bin"), encode_words(&[0xCAFE_BABE])).unwrap();

    let manifest = MachineManifest::from_yaml(
        r#"
topology: von_neumann
cores: 2
memory_size: "1KiB"
images:
  - core: 0
    program: p0.bin
  - core: 1
    program: p1.bin
    data: d1.bin
"#,
    )
    .unwrap();

    let mut processor = Processor::from_manifest(&manifest).unwrap();
    let total = load_manifest_images(&mut processor, &manifest, &dir).unwrap();
    assert_eq!(total, 12);

    // Core 1's data lands right after its one-word program.
    let core1 = processor.core(1).unwrap();
    assert_eq!(core1.data_region().read_word(4).unwrap(), 0xCAFE_BABE);

    processor.run_to_completion().unwrap();
    for (index, expected) in [(0, 1), (1, 2)] {
        let core = processor.core(index).unwrap();
        assert_eq!(core.registers().read(Reg::from_bits(0)), expected);
    }

    std::fs::remove_dir_all(&dir).ok();
}
