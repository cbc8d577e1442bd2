// Licensed under the Apache-2.0 license

use clap::{Parser, Subcommand};
use log::LevelFilter;
use std::path::PathBuf;
use vmf_builder::config::DEFAULT_FLASH_OFFSET;

mod flash_image;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Xtask {
    /// Enable debug logging
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    xtask: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Commands related to flash images
    FlashImage {
        #[command(subcommand)]
        subcommand: FlashImageCommands,
    },
}

#[derive(Subcommand)]
enum FlashImageCommands {
    /// Create .vmf and .hex images for the configuration flash to boot from
    Create {
        /// Input .bin file
        #[arg(value_name = "INFILE")]
        infile: PathBuf,

        /// Output .vmf file; the .hex file is written next to it
        #[arg(value_name = "OUTFILE")]
        outfile: PathBuf,

        /// Offset of the binary data in flash (hex). Default: 2000000
        #[arg(value_name = "FL_OFFSET")]
        fl_offset: Option<String>,

        /// SoC address to copy the .bin file to (hex). Default: 0
        #[arg(value_name = "IM_OFFSET")]
        im_offset: Option<String>,

        /// SoC address to start execution from (hex). Default: 0
        #[arg(value_name = "BOOT_ADDR")]
        boot_addr: Option<String>,

        /// Add a payload file to the flash image, outside the bootloader image
        #[arg(short, long, num_args = 2, value_names = ["OFFSET", "FILENAME"])]
        payload: Option<Vec<String>>,

        /// TOML manifest with [layout] and [payload] sections
        #[arg(short, long, value_name = "MANIFEST")]
        manifest: Option<PathBuf>,

        /// Maximum size of header plus firmware (hex)
        #[arg(long, value_name = "SIZE")]
        max_size: Option<String>,
    },
    /// Verify the boot header of a generated .vmf or .hex image
    Verify {
        /// Path to the image file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Flash offset of the image (hex)
        #[arg(long, value_name = "OFFSET", default_value = DEFAULT_FLASH_OFFSET)]
        offset: String,
    },
}

fn main() {
    let cli = Xtask::parse();
    let _ = simple_logger::SimpleLogger::new()
        .with_level(if cli.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
        .init();

    let result = match &cli.xtask {
        Commands::FlashImage { subcommand } => match subcommand {
            FlashImageCommands::Create {
                infile,
                outfile,
                fl_offset,
                im_offset,
                boot_addr,
                payload,
                manifest,
                max_size,
            } => flash_image::create(&flash_image::CreateOptions {
                fl_offset: fl_offset.as_deref(),
                im_offset: im_offset.as_deref(),
                boot_addr: boot_addr.as_deref(),
                payload: payload.as_deref(),
                manifest: manifest.as_deref(),
                max_size: max_size.as_deref(),
                ..flash_image::CreateOptions::new(infile, outfile)
            }),
            FlashImageCommands::Verify { file, offset } => flash_image::verify(file, offset),
        },
    };
    result.unwrap_or_else(|e| {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    });
}
