// Licensed under the Apache-2.0 license

mod assembler;
pub mod config;
mod error;
pub mod hex_map;
pub mod verify;
pub mod vmf;

pub use assembler::{pad_firmware, AssembledImage, ImageAssembler, LoadDescriptor, PayloadBlock};
pub use config::{ImageManifest, LayoutConfig, PayloadSource};
pub use error::{ImageError, Result};
pub use hex_map::{HexMapEmitter, MemoryMap};
pub use verify::{verify_memory_map, ImageSummary};
pub use vmf::{parse_vmf, TextEmitter};

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Inputs for one flash image build.
#[derive(Debug, Clone)]
pub struct FlashImageArgs<'a> {
    pub firmware: &'a Path,
    /// Path of the VMF output; the Intel HEX output shares its base name.
    pub output: &'a Path,
    pub layout: LayoutConfig,
    pub payload: Option<PayloadSource>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashImageOutputs {
    pub vmf: PathBuf,
    pub hex: PathBuf,
}

pub fn hex_output_path(output: &Path) -> PathBuf {
    output.with_extension("hex")
}

fn load_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|source| ImageError::Input {
        path: path.to_path_buf(),
        source,
    })
}

fn output_error(path: &Path, source: io::Error) -> ImageError {
    ImageError::Output {
        path: path.to_path_buf(),
        source,
    }
}

/// Writes `contents` to a temporary file next to `path`.
fn stage_file(path: &Path, contents: &[u8]) -> Result<NamedTempFile> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut file = NamedTempFile::new_in(dir).map_err(|e| output_error(path, e))?;
    file.write_all(contents)
        .and_then(|_| file.as_file().sync_all())
        .map_err(|e| output_error(path, e))?;
    Ok(file)
}

fn persist_file(file: NamedTempFile, path: &Path) -> Result<()> {
    file.persist(path)
        .map(|_| ())
        .map_err(|e| output_error(path, e.error))
}

/// Puts back the previous contents of `path`, or removes it if there were none.
fn restore_file(path: &Path, previous: Option<&[u8]>) -> Result<()> {
    match previous {
        Some(contents) => persist_file(stage_file(path, contents)?, path),
        None => fs::remove_file(path).map_err(|e| output_error(path, e)),
    }
}

/// Builds the VMF and Intel HEX artifacts for a boot image.
///
/// Both artifacts are rendered in memory and staged before either is moved
/// into place, so a failure never leaves a half-written output behind. If the
/// hex map cannot be moved into place, the VMF is rolled back to its previous
/// state.
pub fn flash_image_create(args: &FlashImageArgs) -> Result<FlashImageOutputs> {
    let vmf_path = args.output.to_path_buf();
    let hex_path = hex_output_path(args.output);
    if vmf_path == hex_path {
        return Err(output_error(
            &vmf_path,
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "text output must not use the .hex extension",
            ),
        ));
    }

    let firmware = load_file(args.firmware)?;
    let payload_data = args
        .payload
        .as_ref()
        .map(|payload| load_file(&payload.path))
        .transpose()?;
    let payload = args
        .payload
        .as_ref()
        .zip(payload_data.as_deref())
        .map(|(source, data)| PayloadBlock {
            address: source.address,
            data,
        });

    let image = ImageAssembler::new(args.layout).assemble(&firmware, payload)?;
    let vmf_text = TextEmitter::render(&image);
    let hex_text = HexMapEmitter::render(&image)?;

    let vmf_file = stage_file(&vmf_path, vmf_text.as_bytes())?;
    let hex_file = stage_file(&hex_path, hex_text.as_bytes())?;
    let previous_vmf = fs::read(&vmf_path).ok();
    persist_file(vmf_file, &vmf_path)?;
    if let Err(e) = persist_file(hex_file, &hex_path) {
        if let Err(rollback) = restore_file(&vmf_path, previous_vmf.as_deref()) {
            log::error!("Failed to roll back {}: {}", vmf_path.display(), rollback);
        }
        return Err(e);
    }

    log::info!(
        "Wrote {} and {} ({:#x} firmware bytes at flash offset {:#x})",
        vmf_path.display(),
        hex_path.display(),
        image.descriptor.payload_size,
        image.flash_offset
    );
    if let Some(payload) = &image.payload {
        log::info!(
            "Payload of {:#x} bytes placed at {:#x}",
            payload.data.len(),
            payload.address
        );
    }

    Ok(FlashImageOutputs {
        vmf: vmf_path,
        hex: hex_path,
    })
}

/// Reads a generated artifact back and checks its boot header.
///
/// Files with a `.hex` extension are read as Intel HEX, anything else as VMF.
pub fn flash_image_verify(path: &Path, flash_offset: u64) -> Result<ImageSummary> {
    let text = fs::read_to_string(path).map_err(|source| ImageError::Input {
        path: path.to_path_buf(),
        source,
    })?;
    let map = match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("hex") => MemoryMap::from_ihex(&text)?,
        _ => parse_vmf(&text)?,
    };
    let summary = verify_memory_map(&map, flash_offset)?;
    log::info!(
        "{} is valid: target {:#x}, boot {:#x}, size {:#x}, checksum {:#018x}",
        path.display(),
        summary.target_address,
        summary.boot_address,
        summary.payload_size,
        summary.checksum
    );
    Ok(summary)
}
