//! `spi-flash-image`: program a firmware image into a flash-map region.

use anyhow::{Context, Result};
use baikal_efi::EfiStatus;
use baikal_flash::{FlashDevice, FlashMap, Region, update_region};

use crate::cli::{ImageRegion, SpiFlashImageArgs};
use crate::status::StatusContext;

/// Resolves the target region. `full` spans the whole part.
fn target_region(map: &FlashMap, region: ImageRegion, flash_size: u64) -> Region {
    match region {
        ImageRegion::Fip => map.fip,
        ImageRegion::Fdt => map.fdt,
        ImageRegion::Full => Region::new(0, flash_size),
    }
}

/// Checks that a `len`-byte image is non-empty and fits `region`.
fn check_fits(region: &Region, len: usize) -> Result<(), EfiStatus> {
    match u64::try_from(len) {
        Ok(0) => Err(EfiStatus::INVALID_PARAMETER),
        Ok(len) if len <= region.size => Ok(()),
        _ => Err(EfiStatus::BAD_BUFFER_SIZE),
    }
}

/// Compares what the part holds at `addr` with `expected`.
fn verify<D: FlashDevice>(dev: &mut D, addr: u64, expected: &[u8]) -> Result<(), EfiStatus> {
    let mut actual = vec![0u8; expected.len()];
    dev.read(addr, &mut actual)?;
    match actual.iter().zip(expected).position(|(a, e)| a != e) {
        None => Ok(()),
        Some(at) => {
            log::error!(
                "verify mismatch at {:#x}: read {:#04x}, expected {:#04x}",
                addr + at as u64,
                actual[at],
                expected[at]
            );
            Err(EfiStatus::DEVICE_ERROR)
        }
    }
}

/// Writes `image` into `region` and reads it back.
pub fn program<D: FlashDevice>(
    dev: &mut D,
    map: &FlashMap,
    region: ImageRegion,
    image: &[u8],
) -> Result<Region> {
    let geometry = dev.geometry().status_context("querying flash geometry")?;
    let target = target_region(map, region, geometry.size());
    check_fits(&target, image.len()).status_context(format_args!(
        "{}-byte image does not fit the {:#x}-byte {region:?} region",
        image.len(),
        target.size
    ))?;

    log::info!(
        "programming {} bytes at {:#x} ({region:?})",
        image.len(),
        target.offset
    );
    update_region(dev, target.offset, image)
        .status_context(format_args!("programming {region:?} region"))?;
    verify(dev, target.offset, image).status_context("read-back verification failed")?;
    Ok(target)
}

/// Runs `spi-flash-image`.
pub fn run<D: FlashDevice>(dev: &mut D, map: &FlashMap, args: &SpiFlashImageArgs) -> Result<()> {
    let image = std::fs::read(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let target = program(dev, map, args.region, &image)?;
    println!(
        "{}: {} bytes written at {:#x} and verified",
        args.file.display(),
        image.len(),
        target.offset
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::status_of;
    use baikal_smc::abi::BAIKAL_SMC_FLASH_WRITE;
    use baikal_smc::{FlashEmulator, SmcFlash};

    /// A 1 MiB part with a small map.
    fn setup() -> (SmcFlash<FlashEmulator>, FlashMap) {
        let mut map = FlashMap::BM1000;
        map.fdt = Region::new(0x1_0000, 0x1_0000);
        map.fip = Region::new(0x4_0000, 0x4_0000);
        (SmcFlash::new(FlashEmulator::new(4096, 256)), map)
    }

    #[test]
    fn image_lands_in_region() {
        let (mut flash, map) = setup();
        let image: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        let target = program(&mut flash, &map, ImageRegion::Fip, &image).unwrap();
        assert_eq!(target, map.fip);
        let contents = flash.conduit().contents();
        assert_eq!(&contents[0x4_0000..0x4_0000 + 5000], &image[..]);
        assert!(contents[0x4_0000 + 5000..0x4_2000].iter().all(|&b| b == 0xFF));
        assert!(flash.conduit().is_locked());
    }

    #[test]
    fn full_region_starts_at_zero() {
        let (mut flash, map) = setup();
        let target = program(&mut flash, &map, ImageRegion::Full, &[0x5A; 64]).unwrap();
        assert_eq!(target, Region::new(0, 1 << 20));
        assert_eq!(flash.conduit().contents()[..64], [0x5A; 64]);
    }

    #[test]
    fn oversized_image_is_rejected_before_writing() {
        let (mut flash, map) = setup();
        let image = vec![0; 0x1_0001];
        let err = program(&mut flash, &map, ImageRegion::Fdt, &image).unwrap_err();
        assert_eq!(status_of(&err), Some(EfiStatus::BAD_BUFFER_SIZE));
        assert_eq!(flash.conduit().call_count(BAIKAL_SMC_FLASH_WRITE), 0);
    }

    #[test]
    fn empty_image_is_invalid() {
        let (mut flash, map) = setup();
        let err = program(&mut flash, &map, ImageRegion::Fdt, &[]).unwrap_err();
        assert_eq!(status_of(&err), Some(EfiStatus::INVALID_PARAMETER));
    }

    #[test]
    fn verify_reports_first_difference() {
        let (mut flash, _) = setup();
        flash.conduit_mut().contents_mut()[..4].copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(verify(&mut flash, 0, &[1, 2, 3, 4]), Ok(()));
        assert_eq!(verify(&mut flash, 0, &[1, 2, 9, 4]), Err(EfiStatus::DEVICE_ERROR));
    }
}
