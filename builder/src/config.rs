// Licensed under the Apache-2.0 license

//! Layout configuration for a flash boot image.
//!
//! Addresses are supplied as hexadecimal text, either on the command line or
//! in a TOML manifest:
//!
//! ```toml
//! [layout]
//! flash_offset = "2000000"
//! target_address = "0"
//! boot_address = "0"
//! max_image_size = "100000"
//!
//! [payload]
//! offset = "100000"
//! file = "payload.bin"
//! ```

use crate::error::{ImageError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_FLASH_OFFSET: &str = "2000000";
pub const DEFAULT_TARGET_ADDRESS: &str = "0";
pub const DEFAULT_BOOT_ADDRESS: &str = "0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutConfig {
    /// Base address of the image within the flash device.
    pub flash_offset: u64,
    /// SoC address the firmware is copied to.
    pub target_address: u64,
    /// SoC address execution starts from after the copy.
    pub boot_address: u64,
    /// Upper bound for header plus padded firmware, if the flash region is limited.
    pub max_image_size: Option<u64>,
}

impl LayoutConfig {
    pub fn from_hex(flash_offset: &str, target_address: &str, boot_address: &str) -> Result<Self> {
        Ok(Self {
            flash_offset: parse_hex("flash offset", flash_offset)?,
            target_address: parse_hex("target address", target_address)?,
            boot_address: parse_hex("boot address", boot_address)?,
            max_image_size: None,
        })
    }

    pub fn with_max_image_size(mut self, max_image_size: Option<u64>) -> Self {
        self.max_image_size = max_image_size;
        self
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            flash_offset: 0x200_0000,
            target_address: 0,
            boot_address: 0,
            max_image_size: None,
        }
    }
}

/// Secondary payload placed at its own flash address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadSource {
    pub address: u64,
    pub path: PathBuf,
}

impl PayloadSource {
    pub fn from_hex(offset: &str, path: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            address: parse_hex("payload offset", offset)?,
            path: path.into(),
        })
    }
}

/// Parses a hexadecimal field. A leading `0x` and `_` separators are accepted.
pub fn parse_hex(field: &'static str, value: &str) -> Result<u64> {
    let trimmed = value.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed)
        .replace('_', "");
    u64::from_str_radix(&digits, 16).map_err(|source| ImageError::Format {
        field,
        value: value.to_string(),
        source,
    })
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestFile {
    #[serde(default)]
    layout: LayoutSection,
    payload: Option<PayloadSection>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LayoutSection {
    #[serde(default = "default_flash_offset")]
    flash_offset: String,
    #[serde(default = "default_target_address")]
    target_address: String,
    #[serde(default = "default_boot_address")]
    boot_address: String,
    max_image_size: Option<String>,
}

impl Default for LayoutSection {
    fn default() -> Self {
        Self {
            flash_offset: default_flash_offset(),
            target_address: default_target_address(),
            boot_address: default_boot_address(),
            max_image_size: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PayloadSection {
    offset: String,
    file: PathBuf,
}

fn default_flash_offset() -> String {
    DEFAULT_FLASH_OFFSET.to_string()
}

fn default_target_address() -> String {
    DEFAULT_TARGET_ADDRESS.to_string()
}

fn default_boot_address() -> String {
    DEFAULT_BOOT_ADDRESS.to_string()
}

/// Layout and optional payload read from a TOML manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageManifest {
    pub layout: LayoutConfig,
    pub payload: Option<PayloadSource>,
}

impl ImageManifest {
    pub fn parse_manifest_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ImageError::Input {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
        Self::parse_manifest_str(&text, base_dir).map_err(|e| match e {
            ImageError::Manifest { message, .. } => ImageError::Manifest {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })
    }

    /// Parses manifest text. Relative payload paths are resolved against `base_dir`.
    pub fn parse_manifest_str(text: &str, base_dir: &Path) -> Result<Self> {
        let file: ManifestFile = toml::from_str(text).map_err(|e| ImageError::Manifest {
            path: PathBuf::new(),
            message: e.to_string(),
        })?;

        let max_image_size = file
            .layout
            .max_image_size
            .as_deref()
            .map(|size| parse_hex("max image size", size))
            .transpose()?;
        let layout = LayoutConfig::from_hex(
            &file.layout.flash_offset,
            &file.layout.target_address,
            &file.layout.boot_address,
        )?
        .with_max_image_size(max_image_size);

        let payload = file
            .payload
            .map(|p| PayloadSource::from_hex(&p.offset, base_dir.join(p.file)))
            .transpose()?;

        Ok(Self { layout, payload })
    }
}
