//! `spi-flash`: raw access to the boot flash.

use std::path::Path;

use anyhow::{Context, Result};
use baikal_efi::EfiStatus;
use baikal_flash::{FlashDevice, FlashGeometry, FlashMap, erase_window, update_region, with_unlocked};

use crate::cli::SpiFlashCommand;
use crate::status::StatusContext;

/// Bytes per hex dump line.
const DUMP_WIDTH: usize = 16;

/// Checks that `[addr, addr + len)` lies inside the part.
fn check_range(geometry: &FlashGeometry, addr: u64, len: u64) -> Result<(), EfiStatus> {
    geometry.check_range(addr, len).map_err(EfiStatus::from)
}

/// Checks that `[addr, addr + len)` starts and ends on sector boundaries.
fn check_sector_aligned(geometry: &FlashGeometry, addr: u64, len: u64) -> Result<(), EfiStatus> {
    match erase_window(addr, len, geometry.sector_size) {
        Ok(window) if window == (addr, len) => Ok(()),
        _ => Err(EfiStatus::INVALID_PARAMETER),
    }
}

/// Rejects zero-length requests.
fn check_nonempty(len: u64) -> Result<usize, EfiStatus> {
    match usize::try_from(len) {
        Ok(0) | Err(_) => Err(EfiStatus::INVALID_PARAMETER),
        Ok(len) => Ok(len),
    }
}

fn geometry<D: FlashDevice>(dev: &mut D) -> Result<FlashGeometry> {
    dev.geometry().status_context("querying flash geometry")
}

fn read_range<D: FlashDevice>(dev: &mut D, addr: u64, len: u64) -> Result<Vec<u8>> {
    let geometry = geometry(dev)?;
    let size = check_nonempty(len).status_context("length must be non-zero")?;
    check_range(&geometry, addr, len).status_context(format_args!(
        "{addr:#x}+{len:#x} is outside the {:#x}-byte part",
        geometry.size()
    ))?;
    let mut buf = vec![0u8; size];
    dev.read(addr, &mut buf)
        .status_context(format_args!("reading {addr:#x}+{len:#x}"))?;
    Ok(buf)
}

/// Formats `data` as `offset: bytes |ascii|` lines, addressed from `base`.
pub fn hex_dump(base: u64, data: &[u8]) -> String {
    let mut out = String::new();
    let mut addr = base;
    for line in data.chunks(DUMP_WIDTH) {
        out.push_str(&format!("{addr:08x}:"));
        for byte in line {
            out.push_str(&format!(" {byte:02x}"));
        }
        for _ in line.len()..DUMP_WIDTH {
            out.push_str("   ");
        }
        out.push_str("  |");
        out.extend(line.iter().map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                char::from(b)
            } else {
                '.'
            }
        }));
        out.push_str("|\n");
        addr += DUMP_WIDTH as u64;
    }
    out
}

fn info<D: FlashDevice>(dev: &mut D, map: &FlashMap) -> Result<()> {
    let geometry = geometry(dev)?;
    println!(
        "flash: {} KiB, {} sectors of {} bytes",
        geometry.size() / 1024,
        geometry.sector_count,
        geometry.sector_size
    );
    for (name, region) in map.regions() {
        println!(
            "  {name:<6} {:#010x}..{:#010x} ({} KiB)",
            region.offset,
            region.end(),
            region.size / 1024
        );
    }
    Ok(())
}

fn write_file<D: FlashDevice>(dev: &mut D, addr: u64, file: &Path) -> Result<()> {
    let data = std::fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    let geometry = geometry(dev)?;
    let len = data.len() as u64;
    check_nonempty(len).status_context(format_args!("{} is empty", file.display()))?;
    check_range(&geometry, addr, len).status_context(format_args!(
        "{} ({len} bytes) does not fit at {addr:#x}",
        file.display()
    ))?;
    update_region(dev, addr, &data).status_context(format_args!("writing {addr:#x}+{len:#x}"))?;
    println!("wrote {len} bytes at {addr:#x}");
    Ok(())
}

fn erase<D: FlashDevice>(dev: &mut D, addr: u64, len: u64) -> Result<()> {
    let geometry = geometry(dev)?;
    check_nonempty(len).status_context("length must be non-zero")?;
    check_range(&geometry, addr, len).status_context(format_args!(
        "{addr:#x}+{len:#x} is outside the {:#x}-byte part",
        geometry.size()
    ))?;
    check_sector_aligned(&geometry, addr, len).status_context(format_args!(
        "{addr:#x}+{len:#x} is not aligned to {:#x}-byte sectors",
        geometry.sector_size
    ))?;
    with_unlocked(dev, |dev| dev.erase(addr, len))
        .status_context(format_args!("erasing {addr:#x}+{len:#x}"))?;
    println!("erased {len:#x} bytes at {addr:#x}");
    Ok(())
}

/// Runs one `spi-flash` operation.
pub fn run<D: FlashDevice>(dev: &mut D, map: &FlashMap, command: &SpiFlashCommand) -> Result<()> {
    match command {
        SpiFlashCommand::Info => info(dev, map),
        SpiFlashCommand::Read { addr, len, file } => {
            let data = read_range(dev, *addr, *len)?;
            std::fs::write(file, &data)
                .with_context(|| format!("failed to write {}", file.display()))?;
            println!("read {len} bytes from {addr:#x} into {}", file.display());
            Ok(())
        }
        SpiFlashCommand::Write { addr, file } => write_file(dev, *addr, file),
        SpiFlashCommand::Erase { addr, len } => erase(dev, *addr, *len),
        SpiFlashCommand::Dump { addr, len } => {
            let data = read_range(dev, *addr, *len)?;
            print!("{}", hex_dump(*addr, &data));
            Ok(())
        }
    }
}
