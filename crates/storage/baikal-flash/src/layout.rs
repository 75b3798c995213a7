//! Persisted flash layout.
//!
//! The boot ROM, TF-A and UEFI all locate their pieces by fixed byte offsets
//! into the boot flash. [`FlashMap`] names those offsets; the defaults in
//! [`FlashMap::BM1000`] describe the 16 MiB part on the reference board.

use core::fmt;

/// A contiguous byte range of flash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    /// Offset of the first byte.
    pub offset: u64,
    /// Length in bytes.
    pub size: u64,
}

impl Region {
    /// Creates a region.
    #[must_use]
    pub const fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    /// Offset one past the last byte.
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.offset + self.size
    }

    /// Whether the two regions share at least one byte.
    #[must_use]
    pub const fn overlaps(&self, other: &Region) -> bool {
        self.offset < other.end() && other.offset < self.end()
    }
}

/// Location of the per-port DDR settings records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DdrSettingsRegion {
    /// Offset of the record for port 0.
    pub base: u64,
    /// Distance between consecutive port records.
    pub stride: u64,
    /// Number of DDR ports on the board.
    pub ports: u32,
}

impl DdrSettingsRegion {
    /// Offset of the record for `port`, or `None` if the board lacks it.
    #[must_use]
    pub const fn port_offset(&self, port: u32) -> Option<u64> {
        if port < self.ports {
            Some(self.base + self.stride * port as u64)
        } else {
            None
        }
    }

    /// The whole range covered by all port records.
    #[must_use]
    pub const fn region(&self) -> Region {
        Region::new(self.base, self.stride * self.ports as u64)
    }
}

/// Fixed flash layout of a board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashMap {
    /// Boot ROM header and BL1.
    pub bl1: Region,
    /// Flattened device tree blob.
    pub fdt: Region,
    /// Per-port DDR tuning records.
    pub ddr_settings: DdrSettingsRegion,
    /// UEFI variable store.
    pub var: Region,
    /// TF-A firmware image package (BL2, BL31, BL33).
    pub fip: Region,
    /// Region exported as a block device.
    pub block: Region,
}

/// Reasons a [`FlashMap`] does not fit a part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutError {
    /// A region extends past the end of the part.
    OutOfBounds(&'static str),
    /// A region does not start and end on a sector boundary.
    Unaligned(&'static str),
    /// Two regions share bytes.
    Overlap(&'static str, &'static str),
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfBounds(name) => write!(f, "region `{name}` extends past end of flash"),
            Self::Unaligned(name) => write!(f, "region `{name}` is not sector-aligned"),
            Self::Overlap(a, b) => write!(f, "regions `{a}` and `{b}` overlap"),
        }
    }
}

impl FlashMap {
    /// Layout of the BM1000 reference board's 16 MiB boot flash.
    pub const BM1000: Self = Self {
        bl1: Region::new(0x0000_0000, 0x0004_0000),
        fdt: Region::new(0x0004_0000, 0x0004_0000),
        ddr_settings: DdrSettingsRegion {
            base: 0x0008_0000,
            stride: 0x1000,
            ports: 2,
        },
        var: Region::new(0x000C_0000, 0x0010_0000),
        fip: Region::new(0x0020_0000, 0x00A0_0000),
        block: Region::new(0x00C0_0000, 0x0040_0000),
    };

    /// Named regions, in flash order.
    #[must_use]
    pub fn regions(&self) -> [(&'static str, Region); 6] {
        [
            ("bl1", self.bl1),
            ("fdt", self.fdt),
            ("ddr", self.ddr_settings.region()),
            ("var", self.var),
            ("fip", self.fip),
            ("block", self.block),
        ]
    }

    /// Looks up a region by the name used in [`FlashMap::regions`].
    #[must_use]
    pub fn region(&self, name: &str) -> Option<Region> {
        self.regions()
            .into_iter()
            .find(|(n, _)| *n == name)
            .map(|(_, r)| r)
    }

    /// Checks that every region fits a part of `flash_size` bytes, is
    /// aligned to `sector_size`, and does not overlap any other region.
    ///
    /// # Errors
    ///
    /// The first violation found.
    pub fn validate(&self, flash_size: u64, sector_size: u64) -> Result<(), LayoutError> {
        let regions = self.regions();
        for (name, region) in regions {
            if region.end() > flash_size {
                return Err(LayoutError::OutOfBounds(name));
            }
            if region.offset % sector_size != 0 || region.size % sector_size != 0 {
                return Err(LayoutError::Unaligned(name));
            }
        }
        for (i, (a_name, a)) in regions.iter().enumerate() {
            for (b_name, b) in &regions[i + 1..] {
                if a.overlaps(b) {
                    return Err(LayoutError::Overlap(*a_name, *b_name));
                }
            }
        }
        Ok(())
    }
}

impl Default for FlashMap {
    fn default() -> Self {
        Self::BM1000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_layout_is_consistent() {
        assert_eq!(FlashMap::BM1000.validate(16 << 20, 4096), Ok(()));
    }

    #[test]
    fn reference_layout_needs_sixteen_mib() {
        assert_eq!(
            FlashMap::BM1000.validate(8 << 20, 4096),
            Err(LayoutError::OutOfBounds("fip"))
        );
    }

    #[test]
    fn overlap_is_detected() {
        let mut map = FlashMap::BM1000;
        map.var = Region::new(0x0004_0000, 0x1000);
        assert_eq!(
            map.validate(16 << 20, 4096),
            Err(LayoutError::Overlap("fdt", "var"))
        );
    }

    #[test]
    fn coarse_sectors_expose_misalignment() {
        assert_eq!(
            FlashMap::BM1000.validate(16 << 20, 0x1_0000),
            Err(LayoutError::Unaligned("ddr"))
        );
    }

    #[test]
    fn ddr_ports_are_strided() {
        let ddr = FlashMap::BM1000.ddr_settings;
        assert_eq!(ddr.port_offset(0), Some(0x0008_0000));
        assert_eq!(ddr.port_offset(1), Some(0x0008_1000));
        assert_eq!(ddr.port_offset(2), None);
    }

    #[test]
    fn regions_by_name() {
        assert_eq!(FlashMap::BM1000.region("fip"), Some(FlashMap::BM1000.fip));
        assert_eq!(FlashMap::BM1000.region("nope"), None);
    }
}
