//! A flash region exposed as a block device.
//!
//! [`FlashBlockIo`] sits on any [`FlashDevice`], so the secure-monitor flash
//! and the SPI NOR share one implementation. Reads go straight to the
//! device; writes go through [`update_region`], which rewrites every sector
//! the blocks touch. There is no write cache, no retry and no rollback.

use baikal_efi::{BlockIo, BlockIoMedia, EfiStatus};

use crate::device::{FlashDevice, FlashError};
use crate::layout::Region;
use crate::update::update_region;

/// Block size used unless the board configuration says otherwise.
pub const DEFAULT_BLOCK_SIZE: u32 = 512;

/// Static description of the exported region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockIoConfig {
    /// Flash byte range exported as blocks.
    pub region: Region,
    /// Block size in bytes.
    pub block_size: u32,
    /// Media id reported to callers.
    pub media_id: u32,
    /// Reject writes with `EFI_WRITE_PROTECTED`.
    pub read_only: bool,
}

impl BlockIoConfig {
    /// A writable region with the default block size and media id 0.
    #[must_use]
    pub const fn new(region: Region) -> Self {
        Self {
            region,
            block_size: DEFAULT_BLOCK_SIZE,
            media_id: 0,
            read_only: false,
        }
    }
}

/// Block I/O over a region of a [`FlashDevice`].
pub struct FlashBlockIo<D: FlashDevice> {
    device: D,
    region: Region,
    media: BlockIoMedia,
}

impl<D: FlashDevice> FlashBlockIo<D> {
    /// Queries the device geometry and builds the media description.
    ///
    /// # Errors
    ///
    /// [`FlashError::BadGeometry`] if the block size is zero or does not
    /// divide the region, or the region holds no block;
    /// [`FlashError::OutOfRange`] if the region does not fit the device;
    /// any error from the geometry query.
    pub fn new(mut device: D, config: BlockIoConfig) -> Result<Self, FlashError> {
        let block_size = u64::from(config.block_size);
        let region = config.region;
        if block_size == 0 || region.size < block_size || region.size % block_size != 0 {
            return Err(FlashError::BadGeometry);
        }
        let geometry = device.geometry()?;
        geometry.check_range(region.offset, region.size)?;

        let media = BlockIoMedia {
            media_id: config.media_id,
            removable_media: false,
            media_present: true,
            logical_partition: false,
            read_only: config.read_only,
            write_caching: false,
            block_size: config.block_size,
            io_align: 0,
            last_block: region.size / block_size - 1,
        };
        log::info!(
            "flash block device at {:#x}: {} x {} bytes{}",
            region.offset,
            media.block_count(),
            block_size,
            if media.read_only { " (read-only)" } else { "" }
        );
        Ok(Self {
            device,
            region,
            media,
        })
    }

    /// Borrows the underlying device.
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Mutably borrows the underlying device.
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Returns the underlying device.
    pub fn into_inner(self) -> D {
        self.device
    }

    // -- Request validation ------------------------------------------------

    fn check_media(&self, media_id: u32) -> Result<(), EfiStatus> {
        if media_id == self.media.media_id {
            Ok(())
        } else {
            Err(EfiStatus::MEDIA_CHANGED)
        }
    }

    fn check_writable(&self) -> Result<(), EfiStatus> {
        if self.media.read_only {
            Err(EfiStatus::WRITE_PROTECTED)
        } else {
            Ok(())
        }
    }

    /// Validates size and range, returning the device byte address.
    fn locate(&self, lba: u64, len: usize) -> Result<u64, EfiStatus> {
        let block_size = u64::from(self.media.block_size);
        let len = len as u64;
        if len % block_size != 0 {
            return Err(EfiStatus::BAD_BUFFER_SIZE);
        }
        let blocks = len / block_size;
        let last = lba
            .checked_add(blocks - 1)
            .ok_or(EfiStatus::INVALID_PARAMETER)?;
        if lba > self.media.last_block || last > self.media.last_block {
            return Err(EfiStatus::INVALID_PARAMETER);
        }
        Ok(self.region.offset + lba * block_size)
    }
}

/// Any device failure surfaces as `EFI_DEVICE_ERROR`.
fn device_error(err: FlashError) -> EfiStatus {
    log::error!("flash block I/O: {err}");
    EfiStatus::DEVICE_ERROR
}

impl<D: FlashDevice> BlockIo for FlashBlockIo<D> {
    fn media(&self) -> &BlockIoMedia {
        &self.media
    }

    fn reset(&mut self, _extended_verification: bool) -> Result<(), EfiStatus> {
        Ok(())
    }

    fn read_blocks(&mut self, media_id: u32, lba: u64, buf: &mut [u8]) -> Result<(), EfiStatus> {
        self.check_media(media_id)?;
        if buf.is_empty() {
            return Ok(());
        }
        let addr = self.locate(lba, buf.len())?;
        self.device.read(addr, buf).map_err(device_error)
    }

    fn write_blocks(&mut self, media_id: u32, lba: u64, buf: &[u8]) -> Result<(), EfiStatus> {
        self.check_media(media_id)?;
        self.check_writable()?;
        if buf.is_empty() {
            return Ok(());
        }
        let addr = self.locate(lba, buf.len())?;
        update_region(&mut self.device, addr, buf).map_err(device_error)
    }

    fn flush_blocks(&mut self) -> Result<(), EfiStatus> {
        Ok(())
    }
}
