// Licensed under the Apache-2.0 license
#![no_std]

//! Boot header layout shared by the flash image builder and the boot ROM.
//!
//! The header occupies the first 32 bytes of the image at the flash offset.
//! Every field is stored least significant byte first. The checksum covers
//! the three preceding fields and every 8-byte word of the firmware body.

use zerocopy::{
    byteorder::{LittleEndian, U64},
    FromBytes, Immutable, IntoBytes, KnownLayout,
};

/// Size of one checksummed word.
pub const WORD_SIZE: usize = 8;

/// Initial value of the running checksum.
pub const CHECKSUM_SEED: u64 = 0xFFFF_FFFF_FFFF_FFFF;

pub const BOOT_HEADER_SIZE: usize = core::mem::size_of::<BootHeader>();

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct BootHeader {
    pub target_address: U64<LittleEndian>,
    pub boot_address: U64<LittleEndian>,
    pub payload_size: U64<LittleEndian>,
    pub checksum: U64<LittleEndian>,
}

impl BootHeader {
    /// Builds a header for `body`, which must already be padded to whole words.
    pub fn new(target_address: u64, boot_address: u64, body: &[u8]) -> Self {
        let payload_size = body.len() as u64;
        Self {
            target_address: U64::new(target_address),
            boot_address: U64::new(boot_address),
            payload_size: U64::new(payload_size),
            checksum: U64::new(image_checksum(
                target_address,
                boot_address,
                payload_size,
                body,
            )),
        }
    }

    /// Header fields in flash order.
    pub fn fields(&self) -> [u64; 4] {
        [
            self.target_address.get(),
            self.boot_address.get(),
            self.payload_size.get(),
            self.checksum.get(),
        ]
    }

    pub fn verify(&self, body: &[u8]) -> bool {
        if body.len() as u64 != self.payload_size.get() || body.len() % WORD_SIZE != 0 {
            return false;
        }
        image_checksum(
            self.target_address.get(),
            self.boot_address.get(),
            self.payload_size.get(),
            body,
        ) == self.checksum.get()
    }
}

/// Reverses the byte order of a word read in storage order.
pub fn reverse_word_bytes(word: u64) -> u64 {
    word.swap_bytes()
}

/// Folds the header fields and the body words into the running checksum.
///
/// The order is fixed by the boot ROM verifier: seed, target address, boot
/// address, payload size, then each body word. A trailing partial word is
/// treated as zero-extended.
pub fn image_checksum(
    target_address: u64,
    boot_address: u64,
    payload_size: u64,
    body: &[u8],
) -> u64 {
    let header = CHECKSUM_SEED ^ target_address ^ boot_address ^ payload_size;
    body.chunks(WORD_SIZE).fold(header, |acc, chunk| {
        let mut word = [0u8; WORD_SIZE];
        word[..chunk.len()].copy_from_slice(chunk);
        acc ^ reverse_word_bytes(u64::from_be_bytes(word))
    })
}

/// Length of `len` bytes rounded up to a whole number of words.
pub fn padded_len(len: usize) -> usize {
    len.next_multiple_of(WORD_SIZE)
}
