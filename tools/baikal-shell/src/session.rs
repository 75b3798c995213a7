//! The emulated part and the image file behind it.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use baikal_flash::FlashMap;
use baikal_smc::abi::{BAIKAL_SMC_FLASH_ERASE, BAIKAL_SMC_FLASH_WRITE};
use baikal_smc::{FlashEmulator, SmcFlash};

use crate::config::BoardConfig;

/// A flash image opened behind the secure-monitor emulator.
pub struct Session {
    path: PathBuf,
    map: FlashMap,
    flash: SmcFlash<FlashEmulator>,
}

impl Session {
    /// Loads `path` into an emulated part shaped by `config`.
    ///
    /// A missing file starts as an erased part. A short file is padded with
    /// erased bytes; a file larger than the part is rejected.
    pub fn open(path: &Path, config: &BoardConfig) -> Result<Self> {
        let size = config.flash_size()?;
        let (sector_size, sector_count) = (config.flash.sector_size, config.flash.sector_count);
        let emulator = if path.exists() {
            let image =
                std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
            match FlashEmulator::with_image(sector_size, sector_count, &image) {
                Some(emulator) => emulator,
                None => bail!(
                    "{} is {} bytes, larger than the {size}-byte part",
                    path.display(),
                    image.len()
                ),
            }
        } else {
            log::info!("{} not found, starting from erased flash", path.display());
            FlashEmulator::new(sector_size, sector_count)
        };
        log::debug!(
            "flash image {}: {sector_count} x {sector_size} bytes",
            path.display()
        );
        Ok(Self {
            path: path.to_path_buf(),
            map: config.flash_map(),
            flash: SmcFlash::new(emulator),
        })
    }

    /// The board layout.
    pub fn map(&self) -> &FlashMap {
        &self.map
    }

    /// The flash client, talking to the emulator.
    pub fn flash(&mut self) -> &mut SmcFlash<FlashEmulator> {
        &mut self.flash
    }

    /// Whether any write or erase reached the emulated monitor.
    pub fn is_modified(&self) -> bool {
        let emulator = self.flash.conduit();
        emulator.call_count(BAIKAL_SMC_FLASH_WRITE) + emulator.call_count(BAIKAL_SMC_FLASH_ERASE)
            > 0
    }

    /// Writes the emulated contents back to the image file if they may
    /// have changed.
    pub fn persist(&self) -> Result<()> {
        if !self.is_modified() {
            return Ok(());
        }
        std::fs::write(&self.path, self.flash.conduit().contents())
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        log::debug!("saved {}", self.path.display());
        Ok(())
    }
}
