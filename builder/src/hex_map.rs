// Licensed under the Apache-2.0 license

use crate::assembler::AssembledImage;
use crate::error::{ImageError, Result};
use boot_image::BOOT_HEADER_SIZE;
use ihex::Record;
use std::collections::BTreeMap;

/// Maximum number of data bytes per Intel HEX record.
const RECORD_LEN: usize = 16;
const SEGMENT_SIZE: usize = 0x1_0000;

/// Sparse byte-addressable memory image. Later writes to an address win.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryMap {
    bytes: BTreeMap<u32, u8>,
}

impl MemoryMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Places `data` at `address`. `field` names the region in errors.
    pub fn insert(&mut self, field: &'static str, address: u64, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        address
            .checked_add(data.len() as u64 - 1)
            .filter(|&last| last <= u32::MAX as u64)
            .ok_or(ImageError::AddressOutOfRange { field, address })?;
        for (i, &byte) in data.iter().enumerate() {
            self.bytes.insert((address + i as u64) as u32, byte);
        }
        Ok(())
    }

    pub fn get(&self, address: u32) -> Option<u8> {
        self.bytes.get(&address).copied()
    }

    /// Reads `len` consecutive bytes, or `None` if any of them is unset.
    pub fn read(&self, address: u64, len: usize) -> Option<Vec<u8>> {
        (0..len as u64)
            .map(|i| {
                let addr = u32::try_from(address.checked_add(i)?).ok()?;
                self.get(addr)
            })
            .collect()
    }

    pub fn read_u64_le(&self, address: u64) -> Option<u64> {
        let bytes: [u8; 8] = self.read(address, 8)?.try_into().ok()?;
        Some(u64::from_le_bytes(bytes))
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, u8)> + '_ {
        self.bytes.iter().map(|(&addr, &byte)| (addr, byte))
    }

    /// Contiguous runs of set bytes, in address order.
    pub fn segments(&self) -> Vec<(u32, Vec<u8>)> {
        let mut segments: Vec<(u32, Vec<u8>)> = Vec::new();
        for (addr, byte) in self.iter() {
            match segments.last_mut() {
                Some((start, data)) if *start as u64 + data.len() as u64 == addr as u64 => {
                    data.push(byte)
                }
                _ => segments.push((addr, vec![byte])),
            }
        }
        segments
    }

    /// Serializes the map as Intel HEX.
    pub fn to_ihex(&self) -> Result<String> {
        let mut records = Vec::new();
        let mut upper = 0u16;
        for (start, data) in self.segments() {
            let mut addr = start;
            let mut rest = data.as_slice();
            while !rest.is_empty() {
                let high = (addr >> 16) as u16;
                if high != upper {
                    records.push(Record::ExtendedLinearAddress(high));
                    upper = high;
                }
                let low = (addr & 0xffff) as usize;
                let len = rest.len().min(RECORD_LEN).min(SEGMENT_SIZE - low);
                records.push(Record::Data {
                    offset: low as u16,
                    value: rest[..len].to_vec(),
                });
                rest = &rest[len..];
                addr = addr.wrapping_add(len as u32);
            }
        }
        records.push(Record::EndOfFile);

        ihex::create_object_file_representation(&records)
            .map_err(|e| ImageError::HexRecord(format!("{e:?}")))
    }

    /// Parses Intel HEX text back into a map.
    pub fn from_ihex(text: &str) -> Result<Self> {
        let normalized: Vec<&str> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        let normalized = normalized.join("\n");

        let mut map = Self::new();
        let mut base = 0u32;
        for record in ihex::Reader::new(&normalized) {
            match record.map_err(|e| ImageError::HexRecord(format!("{e:?}")))? {
                Record::Data { offset, value } => {
                    map.insert("hex record", base as u64 + offset as u64, &value)?
                }
                Record::ExtendedLinearAddress(high) => base = (high as u32) << 16,
                Record::ExtendedSegmentAddress(segment) => base = (segment as u32) << 4,
                Record::EndOfFile => break,
                Record::StartSegmentAddress { .. } | Record::StartLinearAddress(_) => {}
            }
        }
        Ok(map)
    }
}

fn region_address(field: &'static str, base: u64, offset: u64) -> Result<u64> {
    match base.checked_add(offset) {
        Some(address) => Ok(address),
        None => Err(ImageError::AddressOutOfRange {
            field,
            address: base,
        }),
    }
}

/// Places the image header, firmware and payload at their flash addresses.
pub struct HexMapEmitter;

impl HexMapEmitter {
    pub fn build(image: &AssembledImage) -> Result<MemoryMap> {
        let mut map = MemoryMap::new();
        for (i, (field, value)) in image.header_fields().into_iter().enumerate() {
            let address = region_address(field, image.flash_offset, (i * 8) as u64)?;
            map.insert(field, address, &value.to_le_bytes())?;
        }

        let body = region_address("firmware", image.flash_offset, BOOT_HEADER_SIZE as u64)?;
        map.insert("firmware", body, &image.padded_firmware)?;

        if let Some(payload) = &image.payload {
            map.insert("payload", payload.address, payload.data)?;
        }
        Ok(map)
    }

    pub fn render(image: &AssembledImage) -> Result<String> {
        Self::build(image)?.to_ihex()
    }
}
