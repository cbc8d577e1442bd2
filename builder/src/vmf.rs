// Licensed under the Apache-2.0 license

//! VMF text stream: one byte per line, `@<hex>` lines set the write address.
//!
//! The image starts with an `@` directive for the flash offset, followed by
//! the four header fields (eight byte lines each, lowest address first, each
//! field closed by a blank line) and the firmware bytes. A payload block is
//! separated by five blank lines and carries its own `@` directive.

use crate::assembler::AssembledImage;
use crate::error::{ImageError, Result};
use crate::hex_map::MemoryMap;
use std::io::{self, Write};

const PAYLOAD_SEPARATOR_LINES: usize = 5;

pub struct TextEmitter;

fn push_bytes(out: &mut String, bytes: &[u8]) {
    for byte in bytes {
        out.push_str(&format!("{byte:02x}\n"));
    }
}

impl TextEmitter {
    pub fn render(image: &AssembledImage) -> String {
        let mut out = format!("@{:x}\n", image.flash_offset);

        for (_, value) in image.header_fields() {
            push_bytes(&mut out, &value.to_le_bytes());
            out.push('\n');
        }

        push_bytes(&mut out, &image.padded_firmware);

        if let Some(payload) = &image.payload {
            out.push_str(&"\n".repeat(PAYLOAD_SEPARATOR_LINES));
            out.push_str(&format!("@{:08x}\n", payload.address));
            push_bytes(&mut out, payload.data);
        }
        out
    }

    pub fn write<W: Write>(image: &AssembledImage, out: &mut W) -> io::Result<()> {
        out.write_all(Self::render(image).as_bytes())
    }
}

/// Reads a VMF stream back into a memory map.
pub fn parse_vmf(text: &str) -> Result<MemoryMap> {
    let mut map = MemoryMap::new();
    let mut address = 0u64;

    for (index, raw) in text.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.split("//").next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }

        if let Some(addr) = line.strip_prefix('@') {
            address = u64::from_str_radix(addr.trim(), 16).map_err(|e| ImageError::VmfSyntax {
                line: line_no,
                message: format!("invalid address '{addr}': {e}"),
            })?;
            continue;
        }

        for token in line.split_whitespace() {
            if token.len() > 2 {
                return Err(ImageError::VmfSyntax {
                    line: line_no,
                    message: format!("'{token}' is not a single byte"),
                });
            }
            let byte = u8::from_str_radix(token, 16).map_err(|e| ImageError::VmfSyntax {
                line: line_no,
                message: format!("invalid byte '{token}': {e}"),
            })?;
            map.insert("vmf data", address, &[byte])?;
            address += 1;
        }
    }
    Ok(map)
}
