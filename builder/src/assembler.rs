// Licensed under the Apache-2.0 license

use crate::config::LayoutConfig;
use crate::error::{ImageError, Result};
use boot_image::{padded_len, BootHeader, BOOT_HEADER_SIZE};
use zerocopy::IntoBytes;

/// Target load address, entry point and padded firmware length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadDescriptor {
    pub target_address: u64,
    pub boot_address: u64,
    pub payload_size: u64,
}

/// Secondary blob placed at its own address, outside the header and checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadBlock<'a> {
    pub address: u64,
    pub data: &'a [u8],
}

/// Derived state shared by both emitters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledImage<'a> {
    pub flash_offset: u64,
    pub descriptor: LoadDescriptor,
    pub checksum: u64,
    pub padded_firmware: Vec<u8>,
    pub payload: Option<PayloadBlock<'a>>,
}

impl AssembledImage<'_> {
    /// Header fields in the order they appear in flash.
    pub fn header_fields(&self) -> [(&'static str, u64); 4] {
        [
            ("target address", self.descriptor.target_address),
            ("boot address", self.descriptor.boot_address),
            ("payload size", self.descriptor.payload_size),
            ("checksum", self.checksum),
        ]
    }

    pub fn header(&self) -> BootHeader {
        BootHeader {
            target_address: self.descriptor.target_address.into(),
            boot_address: self.descriptor.boot_address.into(),
            payload_size: self.descriptor.payload_size.into(),
            checksum: self.checksum.into(),
        }
    }

    pub fn header_bytes(&self) -> [u8; BOOT_HEADER_SIZE] {
        let mut bytes = [0u8; BOOT_HEADER_SIZE];
        bytes.copy_from_slice(self.header().as_bytes());
        bytes
    }

    /// Length of header plus padded firmware.
    pub fn image_len(&self) -> u64 {
        (BOOT_HEADER_SIZE + self.padded_firmware.len()) as u64
    }
}

/// Right-pads `firmware` with zero bytes to a whole number of 8-byte words.
pub fn pad_firmware(firmware: &[u8]) -> Vec<u8> {
    let mut padded = Vec::with_capacity(padded_len(firmware.len()));
    padded.extend_from_slice(firmware);
    padded.resize(padded_len(firmware.len()), 0);
    padded
}

pub struct ImageAssembler {
    layout: LayoutConfig,
}

impl ImageAssembler {
    pub fn new(layout: LayoutConfig) -> Self {
        Self { layout }
    }

    pub fn assemble<'a>(
        &self,
        firmware: &[u8],
        payload: Option<PayloadBlock<'a>>,
    ) -> Result<AssembledImage<'a>> {
        if firmware.is_empty() {
            return Err(ImageError::EmptyFirmware);
        }

        let padded_firmware = pad_firmware(firmware);
        let header = BootHeader::new(
            self.layout.target_address,
            self.layout.boot_address,
            &padded_firmware,
        );
        let image = AssembledImage {
            flash_offset: self.layout.flash_offset,
            descriptor: LoadDescriptor {
                target_address: header.target_address.get(),
                boot_address: header.boot_address.get(),
                payload_size: header.payload_size.get(),
            },
            checksum: header.checksum.get(),
            padded_firmware,
            payload,
        };

        if let Some(capacity) = self.layout.max_image_size {
            if image.image_len() > capacity {
                return Err(ImageError::ImageTooLarge {
                    size: image.image_len(),
                    capacity,
                });
            }
        }

        log::debug!(
            "Assembled image: target {:#018x}, boot {:#018x}, size {:#x}, checksum {:#018x}",
            image.descriptor.target_address,
            image.descriptor.boot_address,
            image.descriptor.payload_size,
            image.checksum
        );
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boot_image::image_checksum;

    fn layout(flash_offset: u64, target_address: u64, boot_address: u64) -> LayoutConfig {
        LayoutConfig {
            flash_offset,
            target_address,
            boot_address,
            max_image_size: None,
        }
    }

    #[test]
    fn test_pad_firmware() {
        for len in 1..40usize {
            let firmware: Vec<u8> = (0..len as u8).map(|b| b.wrapping_mul(37) | 1).collect();
            let padded = pad_firmware(&firmware);
            assert_eq!(padded.len() % 8, 0);
            assert!(padded.len() - firmware.len() < 8);
            assert!(padded.starts_with(&firmware));
            assert!(padded[firmware.len()..].iter().all(|&b| b == 0));
        }
    }

    #[test]
    fn test_aligned_firmware_is_not_padded() {
        let firmware = [0xffu8; 16];
        assert_eq!(pad_firmware(&firmware), firmware.to_vec());
    }

    #[test]
    fn test_two_byte_firmware() {
        let image = ImageAssembler::new(layout(0, 0, 0))
            .assemble(b"\x01\x02", None)
            .unwrap();
        assert_eq!(image.padded_firmware, vec![0x01, 0x02, 0, 0, 0, 0, 0, 0]);
        assert_eq!(image.descriptor.payload_size, 8);
        assert_eq!(
            format!("{:016x}", image.descriptor.payload_size),
            "0000000000000008"
        );
        assert_eq!(image.checksum, 0xFFFF_FFFF_FFFF_FDF6);
    }

    #[test]
    fn test_checksum_is_deterministic() {
        let firmware: Vec<u8> = (0..=255u8).collect();
        let assembler = ImageAssembler::new(layout(0x200_0000, 0x8000_0000, 0x8000_0004));
        let first = assembler.assemble(&firmware, None).unwrap();
        let second = assembler.assemble(&firmware, None).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            first.checksum,
            image_checksum(0x8000_0000, 0x8000_0004, 256, &first.padded_firmware)
        );
    }

    #[test]
    fn test_payload_outside_checksum() {
        let assembler = ImageAssembler::new(layout(0x200_0000, 0, 0));
        let without = assembler.assemble(&[7u8; 16], None).unwrap();
        let with = assembler
            .assemble(
                &[7u8; 16],
                Some(PayloadBlock {
                    address: 0x10_0000,
                    data: &[1, 2, 3, 4],
                }),
            )
            .unwrap();
        assert_eq!(without.checksum, with.checksum);
        assert_eq!(without.descriptor, with.descriptor);
    }

    #[test]
    fn test_header_bytes_match_fields() {
        let image = ImageAssembler::new(layout(0, 0x1122_3344_5566_7788, u64::MAX))
            .assemble(&[0xa5; 5], None)
            .unwrap();
        let bytes = image.header_bytes();
        for (i, (_, value)) in image.header_fields().iter().enumerate() {
            let field: [u8; 8] = bytes[i * 8..i * 8 + 8].try_into().unwrap();
            assert_eq!(u64::from_le_bytes(field), *value);
        }
        assert!(image.header().verify(&image.padded_firmware));
    }

    #[test]
    fn test_empty_firmware_rejected() {
        let err = ImageAssembler::new(LayoutConfig::default())
            .assemble(&[], None)
            .unwrap_err();
        assert!(matches!(err, ImageError::EmptyFirmware));
    }

    #[test]
    fn test_capacity_exceeded() {
        let assembler =
            ImageAssembler::new(LayoutConfig::default().with_max_image_size(Some(0x40)));
        // 32 byte header + 32 bytes firmware fits exactly
        assert!(assembler.assemble(&[0u8; 32], None).is_ok());
        let err = assembler.assemble(&[0u8; 33], None).unwrap_err();
        match err {
            ImageError::ImageTooLarge { size, capacity } => {
                assert_eq!(size, 0x48);
                assert_eq!(capacity, 0x40);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
