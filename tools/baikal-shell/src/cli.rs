//! Command-line interface definitions for baikal-shell.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Flash and DDR maintenance tools for Baikal boards, run against an
/// emulated secure monitor backed by a flash image file.
#[derive(Parser)]
#[command(name = "baikal-shell", version, about)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Flash image backing the emulated part. Created erased if missing.
    #[arg(long, short = 'i', global = true, default_value = "flash.img")]
    pub image: PathBuf,

    /// Board description (TOML). Defaults to the BM1000 reference board.
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Only report errors.
    #[arg(long, short = 'q', global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log every flash transaction.
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Command {
    /// Show or change the per-port DDR tuning record.
    DdrSettings(DdrSettingsArgs),
    /// Raw access to the boot flash.
    SpiFlash(SpiFlashArgs),
    /// Program a firmware image into a flash-map region.
    SpiFlashImage(SpiFlashImageArgs),
}

/// Arguments for `ddr-settings`.
///
/// Values are impedances in ohms, or `off`/`hiz` where the field allows
/// them. Fields not given keep their stored value.
#[derive(Parser)]
pub struct DdrSettingsArgs {
    /// DDR port whose record to edit.
    #[arg(long, short = 'p')]
    pub port: u32,

    /// DRAM output driver impedance: 34 or 48.
    #[arg(long)]
    pub dic: Option<String>,

    /// Dynamic write ODT: off, 80, 120, 240 or hiz.
    #[arg(long)]
    pub rttwr: Option<String>,

    /// Nominal ODT: off, 34, 40, 48, 60, 80, 120 or 240.
    #[arg(long)]
    pub rttnom: Option<String>,

    /// Park ODT: off, 34, 40, 48, 60, 80, 120 or 240.
    #[arg(long)]
    pub rttpark: Option<String>,

    /// PHY on-die termination: 40, 48, 60, 80, 120 or 240.
    #[arg(long)]
    pub phyodt: Option<String>,

    /// PHY output driver impedance: 34, 40, 48, 60 or 80.
    #[arg(long)]
    pub phyodi: Option<String>,

    /// Print the stored record.
    #[arg(long)]
    pub show: bool,

    /// Reset every field to the firmware default before applying changes.
    #[arg(long)]
    pub clear: bool,
}

/// Arguments for `spi-flash`.
#[derive(Parser)]
pub struct SpiFlashArgs {
    /// Flash operation.
    #[command(subcommand)]
    pub command: SpiFlashCommand,
}

/// Raw flash operations. Addresses and lengths take decimal or `0x` hex.
#[derive(Subcommand)]
pub enum SpiFlashCommand {
    /// Print the part geometry and the flash map.
    Info,
    /// Copy a flash range into a file.
    Read {
        /// Start address.
        #[arg(value_parser = parse_number)]
        addr: u64,
        /// Number of bytes.
        #[arg(value_parser = parse_number)]
        len: u64,
        /// Destination file.
        file: PathBuf,
    },
    /// Write a file at an address, preserving the rest of each sector.
    Write {
        /// Start address.
        #[arg(value_parser = parse_number)]
        addr: u64,
        /// Source file.
        file: PathBuf,
    },
    /// Erase a sector-aligned range.
    Erase {
        /// Start address.
        #[arg(value_parser = parse_number)]
        addr: u64,
        /// Number of bytes.
        #[arg(value_parser = parse_number)]
        len: u64,
    },
    /// Hex dump a flash range.
    Dump {
        /// Start address.
        #[arg(value_parser = parse_number)]
        addr: u64,
        /// Number of bytes.
        #[arg(value_parser = parse_number, default_value = "256")]
        len: u64,
    },
}

/// Arguments for `spi-flash-image`.
#[derive(Parser)]
pub struct SpiFlashImageArgs {
    /// Image to program.
    pub file: PathBuf,

    /// Flash-map region the image is written to.
    #[arg(long, short = 'r', value_enum, default_value_t = ImageRegion::Fip)]
    pub region: ImageRegion,
}

/// Regions `spi-flash-image` may target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ImageRegion {
    /// TF-A firmware image package.
    Fip,
    /// Flattened device tree.
    Fdt,
    /// The whole part, from offset zero.
    Full,
}

/// Parses a decimal or `0x`-prefixed hexadecimal number.
pub fn parse_number(text: &str) -> Result<u64, String> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|err| format!("`{text}` is not a number: {err}"))
}
