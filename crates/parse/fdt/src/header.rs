//! FDT header layout.

use crate::token::be32;

/// FDT magic number: `0xd00dfeed` in big-endian.
pub const FDT_MAGIC: u32 = 0xd00d_feed;

/// Minimum last-compatible version we support.
pub const FDT_MIN_COMPAT_VERSION: u32 = 16;

/// Size of the fixed header in bytes.
pub const FDT_HEADER_SIZE: usize = 40;

/// FDT header, decoded from its big-endian on-disk form.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FdtHeader {
    /// Must be [`FDT_MAGIC`] (`0xd00dfeed`).
    pub magic: u32,
    /// Total size of the DTB blob in bytes.
    pub totalsize: u32,
    /// Offset of the structure block from the start of the header.
    pub off_dt_struct: u32,
    /// Offset of the strings block from the start of the header.
    pub off_dt_strings: u32,
    /// Offset of the memory reservation block from the start of the header.
    pub off_mem_rsvmap: u32,
    /// DTB version.
    pub version: u32,
    /// Last compatible version.
    pub last_comp_version: u32,
    /// Physical ID of the boot CPU.
    pub boot_cpuid_phys: u32,
    /// Length in bytes of the strings block.
    pub size_dt_strings: u32,
    /// Length in bytes of the structure block.
    pub size_dt_struct: u32,
}

impl FdtHeader {
    /// Decodes the header at the start of `data`, or `None` if `data` is
    /// shorter than [`FDT_HEADER_SIZE`].
    #[must_use]
    pub fn read(data: &[u8]) -> Option<Self> {
        let field = |index: usize| be32(data, index * 4);
        Some(Self {
            magic: field(0)?,
            totalsize: field(1)?,
            off_dt_struct: field(2)?,
            off_dt_strings: field(3)?,
            off_mem_rsvmap: field(4)?,
            version: field(5)?,
            last_comp_version: field(6)?,
            boot_cpuid_phys: field(7)?,
            size_dt_strings: field(8)?,
            size_dt_struct: field(9)?,
        })
    }
}
