// Licensed under the Apache-2.0 license

use crate::error::{ImageError, Result};
use crate::hex_map::MemoryMap;
use boot_image::{BootHeader, BOOT_HEADER_SIZE, WORD_SIZE};
use zerocopy::FromBytes;

/// Header values recovered from a verified image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSummary {
    pub target_address: u64,
    pub boot_address: u64,
    pub payload_size: u64,
    pub checksum: u64,
}

/// Checks the boot header at `flash_offset` against the firmware that follows it.
pub fn verify_memory_map(map: &MemoryMap, flash_offset: u64) -> Result<ImageSummary> {
    let header_bytes = map.read(flash_offset, BOOT_HEADER_SIZE).ok_or_else(|| {
        ImageError::Verification(format!("no complete header at {flash_offset:#x}"))
    })?;
    let header = BootHeader::read_from_bytes(&header_bytes)
        .map_err(|_| ImageError::Verification("failed to parse header".to_string()))?;

    let payload_size = header.payload_size.get();
    if payload_size == 0 || payload_size % WORD_SIZE as u64 != 0 {
        return Err(ImageError::Verification(format!(
            "payload size {payload_size:#x} is not a positive multiple of {WORD_SIZE}"
        )));
    }
    let Ok(body_len) = usize::try_from(payload_size) else {
        return Err(ImageError::Verification(format!("oversized payload {payload_size:#x}")));
    };
    let body = map
        .read(flash_offset + BOOT_HEADER_SIZE as u64, body_len)
        .ok_or_else(|| {
            ImageError::Verification(format!(
                "firmware region of {payload_size:#x} bytes is incomplete"
            ))
        })?;

    if !header.verify(&body) {
        return Err(ImageError::Verification(format!(
            "checksum mismatch: header has {:#018x}",
            header.checksum.get()
        )));
    }

    Ok(ImageSummary {
        target_address: header.target_address.get(),
        boot_address: header.boot_address.get(),
        payload_size,
        checksum: header.checksum.get(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::ImageAssembler;
    use crate::config::LayoutConfig;
    use crate::hex_map::HexMapEmitter;

    fn build_map() -> MemoryMap {
        let image = ImageAssembler::new(LayoutConfig::default())
            .assemble(b"Bootloader image - ABCDEFGH", None)
            .unwrap();
        HexMapEmitter::build(&image).unwrap()
    }

    #[test]
    fn test_verify_happy_path() {
        let summary = verify_memory_map(&build_map(), 0x200_0000).unwrap();
        assert_eq!(summary.target_address, 0);
        assert_eq!(summary.boot_address, 0);
        assert_eq!(summary.payload_size, 32);
    }

    #[test]
    fn test_verify_corrupted_body() {
        let mut map = build_map();
        map.insert("corruption", 0x200_0020 + 5, &[0xff]).unwrap();
        let err = verify_memory_map(&map, 0x200_0000).unwrap_err();
        assert!(err.to_string().contains("checksum mismatch"));
    }

    #[test]
    fn test_verify_wrong_offset() {
        assert!(verify_memory_map(&build_map(), 0).is_err());
    }

    #[test]
    fn test_verify_truncated_body() {
        let full = build_map();
        let mut map = MemoryMap::new();
        for (addr, byte) in full.iter().filter(|&(addr, _)| addr < 0x200_0030) {
            map.insert("copy", addr as u64, &[byte]).unwrap();
        }
        let err = verify_memory_map(&map, 0x200_0000).unwrap_err();
        assert!(err.to_string().contains("incomplete"));
    }
}
