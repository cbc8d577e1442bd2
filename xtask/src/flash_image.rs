// Licensed under the Apache-2.0 license

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use vmf_builder::config::{
    parse_hex, DEFAULT_BOOT_ADDRESS, DEFAULT_FLASH_OFFSET, DEFAULT_TARGET_ADDRESS,
};
use vmf_builder::{FlashImageArgs, ImageManifest, LayoutConfig, PayloadSource};

/// Raw command line values for `flash-image create`.
#[derive(Debug)]
pub(crate) struct CreateOptions<'a> {
    pub infile: &'a Path,
    pub outfile: &'a Path,
    pub fl_offset: Option<&'a str>,
    pub im_offset: Option<&'a str>,
    pub boot_addr: Option<&'a str>,
    pub payload: Option<&'a [String]>,
    pub manifest: Option<&'a Path>,
    pub max_size: Option<&'a str>,
}

impl<'a> CreateOptions<'a> {
    pub fn new(infile: &'a Path, outfile: &'a Path) -> Self {
        Self {
            infile,
            outfile,
            fl_offset: None,
            im_offset: None,
            boot_addr: None,
            payload: None,
            manifest: None,
            max_size: None,
        }
    }
}

fn layout_field(
    given: Option<&str>,
    name: &'static str,
    from_manifest: Option<u64>,
    default: &str,
) -> vmf_builder::Result<u64> {
    match (given, from_manifest) {
        (Some(value), _) => parse_hex(name, value),
        (None, Some(value)) => Ok(value),
        (None, None) => parse_hex(name, default),
    }
}

/// Command line values win over the manifest, the manifest over the defaults.
fn resolve_layout(
    options: &CreateOptions,
    manifest: Option<&ImageManifest>,
) -> Result<(LayoutConfig, Option<PayloadSource>)> {
    let base = manifest.map(|m| m.layout);
    let mut layout = LayoutConfig {
        flash_offset: layout_field(
            options.fl_offset,
            "flash offset",
            base.map(|b| b.flash_offset),
            DEFAULT_FLASH_OFFSET,
        )?,
        target_address: layout_field(
            options.im_offset,
            "target address",
            base.map(|b| b.target_address),
            DEFAULT_TARGET_ADDRESS,
        )?,
        boot_address: layout_field(
            options.boot_addr,
            "boot address",
            base.map(|b| b.boot_address),
            DEFAULT_BOOT_ADDRESS,
        )?,
        max_image_size: base.and_then(|b| b.max_image_size),
    };
    if let Some(max_size) = options.max_size {
        layout.max_image_size = Some(parse_hex("max image size", max_size)?);
    }

    let payload = match options.payload {
        Some([offset, file]) => Some(PayloadSource::from_hex(offset, PathBuf::from(file))?),
        Some(other) => bail!(
            "--payload expects <offset> <filename>, got {} values",
            other.len()
        ),
        None => manifest.and_then(|m| m.payload.clone()),
    };
    Ok((layout, payload))
}

pub(crate) fn create(options: &CreateOptions) -> Result<()> {
    let manifest = options
        .manifest
        .map(ImageManifest::parse_manifest_file)
        .transpose()?;
    let (layout, payload) = resolve_layout(options, manifest.as_ref())?;
    log::debug!("Layout: {:x?}, payload: {:?}", layout, payload);

    let args = FlashImageArgs {
        firmware: options.infile,
        output: options.outfile,
        layout,
        payload,
    };
    let infile = options.infile.display();
    let outputs = vmf_builder::flash_image_create(&args)
        .with_context(|| format!("Failed to create flash image from {infile}"))?;
    println!(
        "Created {} and {}",
        outputs.vmf.display(),
        outputs.hex.display()
    );
    Ok(())
}

pub(crate) fn verify(file: &Path, offset: &str) -> Result<()> {
    let flash_offset = parse_hex("flash offset", offset)?;
    let summary = vmf_builder::flash_image_verify(file, flash_offset)?;
    println!(
        "Image is valid! target {:#x}, boot {:#x}, size {:#x}, checksum {:#018x}",
        summary.target_address, summary.boot_address, summary.payload_size, summary.checksum
    );
    Ok(())
}
