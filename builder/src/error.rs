// Licensed under the Apache-2.0 license

use std::io;
use std::num::ParseIntError;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ImageError>;

/// Errors raised while building or checking a flash boot image.
#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Cannot read input file '{}': {source}", .path.display())]
    Input {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Invalid hexadecimal value '{value}' for {field}: {source}")]
    Format {
        field: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },
    #[error("Firmware image is empty")]
    EmptyFirmware,
    #[error("Image of {size:#x} bytes exceeds the capacity of {capacity:#x} bytes")]
    ImageTooLarge { size: u64, capacity: u64 },
    #[error("Address {address:#x} of {field} is outside the 32-bit hex address space")]
    AddressOutOfRange { field: &'static str, address: u64 },
    #[error("Cannot write output file '{}': {source}", .path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Invalid manifest '{}': {message}", .path.display())]
    Manifest { path: PathBuf, message: String },
    #[error("Intel HEX error: {0}")]
    HexRecord(String),
    #[error("VMF syntax error on line {line}: {message}")]
    VmfSyntax { line: usize, message: String },
    #[error("Image verification failed: {0}")]
    Verification(String),
}
