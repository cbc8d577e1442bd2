// Licensed under the Apache-2.0 license

use std::fs;
use tempfile::TempDir;
use vmf_builder::{
    flash_image_create, flash_image_verify, parse_vmf, FlashImageArgs, ImageError, ImageManifest,
    MemoryMap,
};

#[test]
fn test_build_from_manifest() {
    let dir = TempDir::new().unwrap();
    let firmware: Vec<u8> = (0..16u8).collect();
    fs::write(dir.path().join("boot.bin"), &firmware).unwrap();
    fs::write(dir.path().join("fs.img"), [0xdeu8, 0xad, 0xbe, 0xef]).unwrap();
    let manifest_path = dir.path().join("image.toml");
    fs::write(
        &manifest_path,
        r#"
        [layout]
        flash_offset = "2000000"
        target_address = "0"
        boot_address = "0"

        [payload]
        offset = "100000"
        file = "fs.img"
        "#,
    )
    .unwrap();

    let manifest = ImageManifest::parse_manifest_file(&manifest_path).unwrap();
    let firmware_path = dir.path().join("boot.bin");
    let output = dir.path().join("out").join("boot.vmf");
    fs::create_dir(dir.path().join("out")).unwrap();

    let outputs = flash_image_create(&FlashImageArgs {
        firmware: &firmware_path,
        output: &output,
        layout: manifest.layout,
        payload: manifest.payload,
    })
    .unwrap();

    let text = fs::read_to_string(&outputs.vmf).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "@2000000");
    let blank_after_header = (0..4)
        .filter(|&i: &usize| lines[9 + i * 9].is_empty())
        .count();
    assert_eq!(blank_after_header, 4);
    let body: Vec<u8> = lines[37..53]
        .iter()
        .map(|l| u8::from_str_radix(l, 16).unwrap())
        .collect();
    assert_eq!(body, firmware);
    assert!(lines[53..58].iter().all(|l| l.is_empty()));
    assert_eq!(lines[58], "@00100000");

    let from_text = parse_vmf(&text).unwrap();
    let from_hex = MemoryMap::from_ihex(&fs::read_to_string(&outputs.hex).unwrap()).unwrap();
    assert_eq!(from_text, from_hex);

    // payload lies outside the primary image region
    let primary = 0x200_0000u32..0x200_0000 + 32 + 16;
    assert!((0x10_0000u32..0x10_0004).all(|addr| !primary.contains(&addr)));

    let summary = flash_image_verify(&outputs.hex, 0x200_0000).unwrap();
    assert_eq!(summary.payload_size, 16);
}

#[test]
fn test_missing_firmware_is_input_error() {
    let dir = TempDir::new().unwrap();
    let firmware = dir.path().join("absent.bin");
    let output = dir.path().join("boot.vmf");
    let err = flash_image_create(&FlashImageArgs {
        firmware: &firmware,
        output: &output,
        layout: Default::default(),
        payload: None,
    })
    .unwrap_err();
    assert!(matches!(err, ImageError::Input { .. }));
    assert!(!output.exists());
}

#[test]
fn test_empty_firmware_is_rejected() {
    let dir = TempDir::new().unwrap();
    let firmware = dir.path().join("empty.bin");
    fs::write(&firmware, b"").unwrap();
    let output = dir.path().join("boot.vmf");
    let err = flash_image_create(&FlashImageArgs {
        firmware: &firmware,
        output: &output,
        layout: Default::default(),
        payload: None,
    })
    .unwrap_err();
    assert!(matches!(err, ImageError::EmptyFirmware));
    assert!(!output.exists());
}
