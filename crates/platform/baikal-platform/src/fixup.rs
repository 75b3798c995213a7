//! Device tree fixups applied before the DTB is handed to the OS.

use alloc::string::String;
use alloc::vec::Vec;

use baikal_fdt::{Fdt, FdtError, FdtNode, FdtPatcher};

use crate::Platform;

/// What [`Platform::fixup_fdt`] changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FixupSummary {
    /// Ethernet nodes given a MAC address.
    pub macs: usize,
    /// Memory controllers marked `"fail"` for lack of a DIMM.
    pub disabled_controllers: usize,
}

/// A node picked out for patching.
struct Target {
    path: String,
    /// First `reg` address, decoded with the parent's cell counts.
    address: Option<u64>,
}

/// Every node whose name starts with `prefix`, in tree order.
fn find_targets(fdt: &Fdt<'_>, prefix: &str) -> Vec<Target> {
    let mut ancestors: Vec<FdtNode<'_>> = Vec::new();
    let mut targets = Vec::new();
    for (depth, node) in fdt.nodes() {
        ancestors.truncate(depth);
        if node.name().starts_with(prefix) {
            let mut path = String::new();
            for ancestor in ancestors.iter().skip(1).chain([&node]) {
                path.push('/');
                path.push_str(ancestor.name());
            }
            let address = ancestors
                .last()
                .and_then(|parent| node.reg(parent).next())
                .map(|reg| reg.address);
            targets.push(Target { path, address });
        }
        ancestors.push(node);
    }
    targets
}

impl Platform {
    /// Patches `dtb` in place for this board.
    ///
    /// Each `ethernet@…` node that already has a `local-mac-address` gets
    /// [`Platform::mac_address`] for its position among the Ethernet nodes.
    /// Memory controllers are matched to DIMM slots in order of their `reg`
    /// address, so slot 0 is the lowest controller; controllers without
    /// `reg` follow in tree order. A controller whose slot is empty is
    /// marked `"fail"`, provided its `status` can be rewritten in place.
    ///
    /// # Errors
    ///
    /// [`FdtError`] if `dtb` is not a valid blob.
    pub fn fixup_fdt(&self, dtb: &mut [u8]) -> Result<FixupSummary, FdtError> {
        let (ethernet, controllers) = {
            let fdt = Fdt::parse(&*dtb)?;
            for reservation in fdt.reservations() {
                log::debug!(
                    "fdt: reserved {:#x}+{:#x}",
                    reservation.address,
                    reservation.size
                );
            }
            let mut controllers = find_targets(&fdt, "memory-controller@");
            controllers.sort_by_key(|target| target.address.unwrap_or(u64::MAX));
            (find_targets(&fdt, "ethernet@"), controllers)
        };

        let mut patcher = FdtPatcher::new(dtb)?;
        let mut summary = FixupSummary::default();

        for (index, Target { path, .. }) in ethernet.iter().enumerate() {
            let Ok(index) = u8::try_from(index) else {
                break;
            };
            let mac = self.mac_address(index);
            match patcher.set_property_inplace(path, "local-mac-address", &mac) {
                Ok(()) => {
                    summary.macs += 1;
                    log::info!(
                        "{path}: mac {:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
                        mac[0],
                        mac[1],
                        mac[2],
                        mac[3],
                        mac[4],
                        mac[5]
                    );
                }
                Err(err) => log::debug!("{path}: mac left alone ({err})"),
            }
        }

        for (slot, Target { path, .. }) in controllers.iter().enumerate() {
            if self.spd(slot).is_some() {
                continue;
            }
            match patcher.set_property_inplace(path, "status", b"fail\0") {
                Ok(()) => {
                    summary.disabled_controllers += 1;
                    log::info!("{path}: no dimm in slot {slot}, marked fail");
                }
                Err(err) => log::warn!("{path}: cannot disable ({err})"),
            }
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::udimm;
    use baikal_spd::Spd;

    fn be32(v: u32) -> [u8; 4] {
        v.to_be_bytes()
    }

    fn pad4(v: &mut Vec<u8>) {
        while v.len() % 4 != 0 {
            v.push(0);
        }
    }

    fn begin(st: &mut Vec<u8>, name: &str) {
        st.extend_from_slice(&be32(1));
        st.extend_from_slice(name.as_bytes());
        st.push(0);
        pad4(st);
    }

    fn prop(st: &mut Vec<u8>, nameoff: u32, data: &[u8]) {
        st.extend_from_slice(&be32(3));
        st.extend_from_slice(&be32(data.len() as u32));
        st.extend_from_slice(&be32(nameoff));
        st.extend_from_slice(data);
        pad4(st);
    }

    fn end(st: &mut Vec<u8>) {
        st.extend_from_slice(&be32(2));
    }

    /// Three Ethernet nodes, the middle one without a MAC property, and two
    /// memory controllers listed with the higher address first.
    fn board_dtb() -> Vec<u8> {
        // "local-mac-address\0" is 18 bytes, "status\0" 7, then "reg" and
        // the cell counts.
        let strings = b"local-mac-address\0status\0reg\0#address-cells\0#size-cells\0";
        let (mac, status, reg, acells, scells) = (0, 18, 25, 29, 44);
        let mut st = Vec::new();
        begin(&mut st, "");
        prop(&mut st, acells, &be32(2));
        prop(&mut st, scells, &be32(2));
        begin(&mut st, "soc");
        begin(&mut st, "ethernet@30240000");
        prop(&mut st, mac, &[0; 6]);
        end(&mut st);
        begin(&mut st, "ethernet@30250000");
        end(&mut st);
        begin(&mut st, "ethernet@30260000");
        prop(&mut st, mac, &[0; 6]);
        end(&mut st);
        end(&mut st);
        for base in [0xe800_0000u32, 0xe000_0000] {
            begin(&mut st, &alloc::format!("memory-controller@{base:x}"));
            let cells: Vec<u8> = [0, base, 0, 0x1_0000].iter().flat_map(|c| be32(*c)).collect();
            prop(&mut st, reg, &cells);
            prop(&mut st, status, b"okay\0");
            end(&mut st);
        }
        end(&mut st);
        st.extend_from_slice(&be32(9));

        let struct_off = 40 + 16;
        let strings_off = struct_off + st.len();
        let total = strings_off + strings.len();
        let mut dtb = Vec::new();
        for field in [
            0xd00d_feed,
            total as u32,
            struct_off as u32,
            strings_off as u32,
            40,
            17,
            16,
            0,
            strings.len() as u32,
            st.len() as u32,
        ] {
            dtb.extend_from_slice(&be32(field));
        }
        dtb.extend_from_slice(&[0; 16]);
        dtb.extend_from_slice(&st);
        dtb.extend_from_slice(strings);
        dtb
    }

    #[test]
    fn macs_and_empty_slots_are_patched() {
        let spd = Spd::parse(&udimm()).unwrap();
        let platform = Platform::from_parts(0x0102_0304, alloc::vec![Some(spd), None], None, None);
        let mut dtb = board_dtb();

        let summary = platform.fixup_fdt(&mut dtb).unwrap();
        assert_eq!(
            summary,
            FixupSummary {
                macs: 2,
                disabled_controllers: 1
            }
        );

        let fdt = Fdt::parse(&dtb).unwrap();
        let mac = |path: &str| {
            fdt.find_node(path)
                .and_then(|n| n.property("local-mac-address"))
                .map(|p| p.value().to_vec())
        };
        assert_eq!(mac("/soc/ethernet@30240000"), Some(alloc::vec![0x4E, 1, 2, 3, 4, 0]));
        assert_eq!(mac("/soc/ethernet@30250000"), None);
        assert_eq!(mac("/soc/ethernet@30260000"), Some(alloc::vec![0x4E, 1, 2, 3, 4, 2]));
        // Slot 1 is empty and maps to the higher controller, which comes
        // first in the tree.
        assert!(fdt.find_node("/memory-controller@e0000000").unwrap().status_okay());
        assert!(!fdt.find_node("/memory-controller@e8000000").unwrap().status_okay());
    }

    #[test]
    fn invalid_blob_is_an_error() {
        let platform = Platform::from_parts(0, Vec::new(), None, None);
        let mut junk = [0u8; 16];
        assert_eq!(platform.fixup_fdt(&mut junk), Err(FdtError::TruncatedData));
    }
}
