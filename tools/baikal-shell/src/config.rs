//! Board description loaded from TOML.
//!
//! Every section is optional; anything left out takes the BM1000 reference
//! board value. A minimal file that only changes the DDR port count:
//!
//! ```toml
//! [map.ddr-settings]
//! ports = 4
//! ```

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use baikal_flash::layout::DdrSettingsRegion;
use baikal_flash::{FlashMap, Region};
use serde::Deserialize;

/// Top-level board description.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BoardConfig {
    /// Geometry of the emulated part.
    pub flash: FlashConfig,
    /// Flash layout.
    pub map: MapConfig,
}

/// `[flash]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct FlashConfig {
    pub sector_size: u64,
    pub sector_count: u64,
}

impl Default for FlashConfig {
    fn default() -> Self {
        Self {
            sector_size: 4096,
            sector_count: 4096,
        }
    }
}

/// `{ offset = …, size = … }` entry.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegionConfig {
    pub offset: u64,
    pub size: u64,
}

impl From<Region> for RegionConfig {
    fn from(region: Region) -> Self {
        Self {
            offset: region.offset,
            size: region.size,
        }
    }
}

impl From<RegionConfig> for Region {
    fn from(region: RegionConfig) -> Self {
        Region::new(region.offset, region.size)
    }
}

/// `[map.ddr-settings]` section.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DdrConfig {
    pub base: u64,
    pub stride: u64,
    pub ports: u32,
}

impl Default for DdrConfig {
    fn default() -> Self {
        let ddr = FlashMap::BM1000.ddr_settings;
        Self {
            base: ddr.base,
            stride: ddr.stride,
            ports: ddr.ports,
        }
    }
}

/// `[map]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct MapConfig {
    pub bl1: RegionConfig,
    pub fdt: RegionConfig,
    pub ddr_settings: DdrConfig,
    pub var: RegionConfig,
    pub fip: RegionConfig,
    pub block: RegionConfig,
}

impl Default for MapConfig {
    fn default() -> Self {
        let map = FlashMap::BM1000;
        Self {
            bl1: map.bl1.into(),
            fdt: map.fdt.into(),
            ddr_settings: DdrConfig::default(),
            var: map.var.into(),
            fip: map.fip.into(),
            block: map.block.into(),
        }
    }
}

impl BoardConfig {
    /// Reads `path`, or returns the reference board when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                Self::parse(&contents)
                    .with_context(|| format!("failed to parse {}", path.display()))?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML document.
    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Total size of the emulated part in bytes.
    pub fn flash_size(&self) -> Result<u64> {
        self.flash
            .sector_size
            .checked_mul(self.flash.sector_count)
            .ok_or_else(|| anyhow!("flash geometry overflows"))
    }

    /// The layout as the flash crate sees it.
    pub fn flash_map(&self) -> FlashMap {
        let map = &self.map;
        FlashMap {
            bl1: map.bl1.into(),
            fdt: map.fdt.into(),
            ddr_settings: DdrSettingsRegion {
                base: map.ddr_settings.base,
                stride: map.ddr_settings.stride,
                ports: map.ddr_settings.ports,
            },
            var: map.var.into(),
            fip: map.fip.into(),
            block: map.block.into(),
        }
    }

    /// Rejects geometries the emulator cannot model and layouts that do not
    /// fit the part.
    pub fn validate(&self) -> Result<()> {
        let sector = self.flash.sector_size;
        if !sector.is_power_of_two() {
            return Err(anyhow!("sector size {sector} is not a power of two"));
        }
        if self.flash.sector_count == 0 {
            return Err(anyhow!("flash has no sectors"));
        }
        let size = self.flash_size()?;
        self.flash_map()
            .validate(size, sector)
            .map_err(|err| anyhow!("invalid flash map: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_reference_board() {
        let config = BoardConfig::parse("").unwrap();
        assert_eq!(config.flash_map(), FlashMap::BM1000);
        assert_eq!(config.flash_size().unwrap(), 16 << 20);
        config.validate().unwrap();
    }

    #[test]
    fn sections_override_individually() {
        let config = BoardConfig::parse(
            r"
            [flash]
            sector-count = 8192

            [map]
            block = { offset = 0xC00000, size = 0x1400000 }

            [map.ddr-settings]
            ports = 4
            ",
        )
        .unwrap();
        let map = config.flash_map();
        assert_eq!(config.flash.sector_size, 4096);
        assert_eq!(map.ddr_settings.ports, 4);
        assert_eq!(map.ddr_settings.stride, 0x1000);
        assert_eq!(map.block, Region::new(0xC0_0000, 0x140_0000));
        assert_eq!(map.fip, FlashMap::BM1000.fip);
        config.validate().unwrap();
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(BoardConfig::parse("[flash]\nsectors = 1\n").is_err());
    }

    #[test]
    fn layout_must_fit_the_part() {
        let config = BoardConfig::parse("[flash]\nsector-count = 1024\n").unwrap();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("fip"), "{err}");
    }

    #[test]
    fn sector_size_must_be_power_of_two() {
        let config = BoardConfig::parse("[flash]\nsector-size = 3000\n").unwrap();
        assert!(config.validate().is_err());
    }
}
