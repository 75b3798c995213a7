//! In-place DTB editing.

use crate::token::{FDT_NOP, FDT_PROP, align4, be32};
use crate::{Fdt, FdtError};

/// Edits a DTB in its own buffer. Nothing is ever inserted or moved, so the
/// blob keeps its size and every offset stays valid.
pub struct FdtPatcher<'a> {
    data: &'a mut [u8],
}

impl<'a> FdtPatcher<'a> {
    /// Validates `data` as a DTB and wraps it.
    ///
    /// # Errors
    ///
    /// Any [`Fdt::parse`] error.
    pub fn new(data: &'a mut [u8]) -> Result<Self, FdtError> {
        Fdt::parse(&*data)?;
        Ok(Self { data })
    }

    /// A read-only view of the blob as currently patched.
    ///
    /// # Errors
    ///
    /// Cannot fail for a blob accepted by [`FdtPatcher::new`], but the
    /// signature keeps the parse result visible.
    pub fn fdt(&self) -> Result<Fdt<'_>, FdtError> {
        Fdt::parse(&*self.data)
    }

    /// Returns `(token offset, value length)` of `name` on the node at
    /// `path`, both relative to the start of the blob.
    fn locate(&self, path: &str, name: &str) -> Result<(usize, usize), FdtError> {
        let fdt = Fdt::parse(&*self.data)?;
        let node = fdt.find_node(path).ok_or(FdtError::NotFound)?;
        let prop = node.property(name).ok_or(FdtError::NotFound)?;
        Ok((fdt.blob_offset(&prop), prop.value().len()))
    }

    /// Replaces the value of property `name` on the node at `path` with
    /// `value`, which must be exactly as long as the current value.
    ///
    /// # Errors
    ///
    /// [`FdtError::NotFound`] if the node or property is missing,
    /// [`FdtError::SizeMismatch`] if the lengths differ.
    pub fn set_property_inplace(
        &mut self,
        path: &str,
        name: &str,
        value: &[u8],
    ) -> Result<(), FdtError> {
        let (token, len) = self.locate(path, name)?;
        if value.len() != len {
            return Err(FdtError::SizeMismatch {
                expected: len,
                actual: value.len(),
            });
        }
        // Token, length and name offset precede the value.
        let start = token + 12;
        self.data[start..start + len].copy_from_slice(value);
        log::debug!("fdt: patched {path}:{name} ({len} bytes)");
        Ok(())
    }

    /// Removes property `name` from the node at `path` by overwriting its
    /// token, header and padded value with `FDT_NOP` words.
    ///
    /// # Errors
    ///
    /// [`FdtError::NotFound`] if the node or property is missing.
    pub fn nop_property(&mut self, path: &str, name: &str) -> Result<(), FdtError> {
        let (token, len) = self.locate(path, name)?;
        debug_assert_eq!(be32(self.data, token), Some(FDT_PROP));
        let end = align4(token + 12 + len);
        for word in self.data[token..end].chunks_exact_mut(4) {
            word.copy_from_slice(&FDT_NOP.to_be_bytes());
        }
        log::debug!("fdt: removed {path}:{name}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{DtbBuilder, bm1000_dtb};
    use alloc::vec::Vec;

    const GMAC0: &str = "/soc/ethernet@30240000";
    const MC: &str = "/memory-controller@e0200000";

    #[test]
    fn mac_and_status_are_replaced() {
        let mut dtb = bm1000_dtb();
        let size = dtb.len();
        let mac = [0x4E, 0x01, 0x02, 0x03, 0x04, 0x00];
        let mut patcher = FdtPatcher::new(&mut dtb).unwrap();
        patcher
            .set_property_inplace(GMAC0, "local-mac-address", &mac)
            .unwrap();
        patcher.set_property_inplace(MC, "status", b"fail\0").unwrap();

        let fdt = patcher.fdt().unwrap();
        let gmac = fdt.find_node(GMAC0).unwrap();
        assert_eq!(gmac.property("local-mac-address").unwrap().value(), mac);
        assert!(gmac.status_okay());
        let mc = fdt.find_node(MC).unwrap();
        assert_eq!(mc.property("status").and_then(|p| p.as_str()), Some("fail"));
        assert!(!mc.status_okay());
        assert_eq!(fdt.total_size(), size);
    }

    #[test]
    fn length_change_is_refused() {
        let mut dtb = bm1000_dtb();
        let before = dtb.clone();
        let mut patcher = FdtPatcher::new(&mut dtb).unwrap();
        assert_eq!(
            patcher.set_property_inplace(GMAC0, "status", b"disabled\0"),
            Err(FdtError::SizeMismatch {
                expected: 5,
                actual: 9
            })
        );
        assert_eq!(
            patcher.set_property_inplace(GMAC0, "local-mac-address", &[0x4E; 8]),
            Err(FdtError::SizeMismatch {
                expected: 6,
                actual: 8
            })
        );
        assert_eq!(dtb, before);
    }

    #[test]
    fn missing_targets_are_not_found() {
        let mut dtb = bm1000_dtb();
        let mut patcher = FdtPatcher::new(&mut dtb).unwrap();
        // The second GMAC has no MAC placeholder.
        assert_eq!(
            patcher.set_property_inplace("/soc/ethernet@30250000", "local-mac-address", &[0; 6]),
            Err(FdtError::NotFound)
        );
        assert_eq!(
            patcher.set_property_inplace("/soc/ethernet@30260000", "status", b"okay\0"),
            Err(FdtError::NotFound)
        );
        assert_eq!(patcher.nop_property("/soc", "status"), Err(FdtError::NotFound));
    }

    #[test]
    fn removed_property_leaves_siblings_intact() {
        let mut dtb = bm1000_dtb();
        let mut patcher = FdtPatcher::new(&mut dtb).unwrap();
        patcher.nop_property(GMAC0, "local-mac-address").unwrap();

        let fdt = patcher.fdt().unwrap();
        let gmac = fdt.find_node(GMAC0).unwrap();
        let names: Vec<&str> = gmac.properties().map(|p| p.name()).collect();
        assert_eq!(names, ["compatible", "reg", "status"]);
        let soc: Vec<&str> = fdt
            .find_node("/soc")
            .unwrap()
            .children()
            .map(|n| n.name())
            .collect();
        assert_eq!(soc, ["ethernet@30240000", "ethernet@30250000", "serial@20230000"]);
        assert_eq!(fdt.nodes().count(), 7);
    }

    #[test]
    fn odd_length_value_is_nopped_with_its_padding() {
        let mut dtb = DtbBuilder::new()
            .begin("")
            .prop_str("serial-number", "BM1000-001")
            .prop_str("model", "dbm")
            .end()
            .finish(&[]);
        let mut patcher = FdtPatcher::new(&mut dtb).unwrap();
        patcher.nop_property("/", "serial-number").unwrap();

        let fdt = patcher.fdt().unwrap();
        let names: Vec<&str> = fdt.root().properties().map(|p| p.name()).collect();
        assert_eq!(names, ["model"]);
    }

    #[test]
    fn garbage_is_rejected_up_front() {
        let mut junk = [0u8; 64];
        assert!(matches!(
            FdtPatcher::new(&mut junk),
            Err(FdtError::InvalidMagic)
        ));
    }
}
