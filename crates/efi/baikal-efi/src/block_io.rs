//! Block I/O model.
//!
//! EDK II drivers publish `EFI_BLOCK_IO_PROTOCOL` as a table of function
//! pointers. Here the protocol is a trait: a driver implements [`BlockIo`]
//! and whatever hosts it (firmware glue or a host tool) calls through it.

use crate::EfiStatus;

/// Describes the characteristics of a block device's media.
///
/// Field order matches `EFI_BLOCK_IO_MEDIA` (revision 1).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockIoMedia {
    /// The current media ID. Changes whenever the medium is replaced.
    pub media_id: u32,
    /// `true` if the media is removable.
    pub removable_media: bool,
    /// `true` if there is a medium currently present in the device.
    pub media_present: bool,
    /// `true` if the device abstracts a partition rather than a whole disk.
    pub logical_partition: bool,
    /// `true` if the media is read-only.
    pub read_only: bool,
    /// `true` if `write_blocks` caches the write data.
    pub write_caching: bool,
    /// The intrinsic block size of the device in bytes.
    pub block_size: u32,
    /// Alignment requirement for any buffer used in a data transfer.
    pub io_align: u32,
    /// The last LBA on the device (number of logical blocks minus one).
    pub last_block: u64,
}

impl BlockIoMedia {
    /// Number of blocks on the device.
    #[must_use]
    pub const fn block_count(&self) -> u64 {
        self.last_block + 1
    }

    /// Total capacity of the device in bytes.
    #[must_use]
    pub const fn capacity(&self) -> u64 {
        self.block_count() * self.block_size as u64
    }
}

/// A block device, in the shape of `EFI_BLOCK_IO_PROTOCOL`.
///
/// Every method reports failure as an [`EfiStatus`] error code, using the
/// same codes the UEFI specification prescribes for the protocol
/// (`EFI_MEDIA_CHANGED`, `EFI_BAD_BUFFER_SIZE`, `EFI_INVALID_PARAMETER`,
/// `EFI_WRITE_PROTECTED`, `EFI_DEVICE_ERROR`, ...).
pub trait BlockIo {
    /// Returns the current media description.
    fn media(&self) -> &BlockIoMedia;

    /// Resets the block device hardware.
    ///
    /// # Errors
    ///
    /// `EFI_DEVICE_ERROR` if the device could not be reset.
    fn reset(&mut self, extended_verification: bool) -> Result<(), EfiStatus>;

    /// Reads `buf.len()` bytes starting at block `lba`.
    ///
    /// # Errors
    ///
    /// See the trait documentation for the status codes returned.
    fn read_blocks(&mut self, media_id: u32, lba: u64, buf: &mut [u8]) -> Result<(), EfiStatus>;

    /// Writes `buf.len()` bytes starting at block `lba`.
    ///
    /// # Errors
    ///
    /// See the trait documentation for the status codes returned.
    fn write_blocks(&mut self, media_id: u32, lba: u64, buf: &[u8]) -> Result<(), EfiStatus>;

    /// Flushes any cached writes to the device.
    ///
    /// # Errors
    ///
    /// `EFI_DEVICE_ERROR` if the flush failed.
    fn flush_blocks(&mut self) -> Result<(), EfiStatus>;
}

const _: () = {
    assert!(core::mem::size_of::<BlockIoMedia>() == 32);
    assert!(core::mem::offset_of!(BlockIoMedia, media_id) == 0);
    assert!(core::mem::offset_of!(BlockIoMedia, read_only) == 7);
    assert!(core::mem::offset_of!(BlockIoMedia, write_caching) == 8);
    assert!(core::mem::offset_of!(BlockIoMedia, block_size) == 12);
    assert!(core::mem::offset_of!(BlockIoMedia, io_align) == 16);
    assert!(core::mem::offset_of!(BlockIoMedia, last_block) == 24);
};
