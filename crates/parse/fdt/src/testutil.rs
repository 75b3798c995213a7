//! DTB builder for the unit tests.

use alloc::vec::Vec;

use crate::header::FDT_HEADER_SIZE;
use crate::token::{FDT_BEGIN_NODE, FDT_END, FDT_END_NODE, FDT_NOP, FDT_PROP};

/// Emits tokens in order; every property name gets its own strings entry.
#[derive(Default)]
pub(crate) struct DtbBuilder {
    structure: Vec<u8>,
    strings: Vec<u8>,
}

#[allow(clippy::cast_possible_truncation)]
impl DtbBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn word(&mut self, word: u32) {
        self.structure.extend_from_slice(&word.to_be_bytes());
    }

    fn pad(&mut self) {
        while self.structure.len() % 4 != 0 {
            self.structure.push(0);
        }
    }

    pub(crate) fn begin(&mut self, name: &str) -> &mut Self {
        self.word(FDT_BEGIN_NODE);
        self.structure.extend_from_slice(name.as_bytes());
        self.structure.push(0);
        self.pad();
        self
    }

    pub(crate) fn end(&mut self) -> &mut Self {
        self.word(FDT_END_NODE);
        self
    }

    pub(crate) fn nop(&mut self) -> &mut Self {
        self.word(FDT_NOP);
        self
    }

    pub(crate) fn prop(&mut self, name: &str, value: &[u8]) -> &mut Self {
        let nameoff = self.strings.len() as u32;
        self.strings.extend_from_slice(name.as_bytes());
        self.strings.push(0);
        self.word(FDT_PROP);
        self.word(value.len() as u32);
        self.word(nameoff);
        self.structure.extend_from_slice(value);
        self.pad();
        self
    }

    pub(crate) fn prop_str(&mut self, name: &str, value: &str) -> &mut Self {
        let mut bytes = Vec::from(value.as_bytes());
        bytes.push(0);
        self.prop(name, &bytes)
    }

    pub(crate) fn prop_cells(&mut self, name: &str, cells: &[u32]) -> &mut Self {
        let bytes: Vec<u8> = cells.iter().flat_map(|c| c.to_be_bytes()).collect();
        self.prop(name, &bytes)
    }

    /// Closes the structure block and lays out header, reservation map,
    /// structure and strings in that order.
    pub(crate) fn finish(&mut self, reservations: &[(u64, u64)]) -> Vec<u8> {
        self.word(FDT_END);

        let rsvmap = FDT_HEADER_SIZE;
        let structure = rsvmap + (reservations.len() + 1) * 16;
        let strings = structure + self.structure.len();
        let total = strings + self.strings.len();

        let mut dtb = Vec::with_capacity(total);
        for field in [
            0xd00d_feed,
            total as u32,
            structure as u32,
            strings as u32,
            rsvmap as u32,
            17,
            16,
            0,
            self.strings.len() as u32,
            self.structure.len() as u32,
        ] {
            dtb.extend_from_slice(&field.to_be_bytes());
        }
        for &(address, size) in reservations.iter().chain(&[(0, 0)]) {
            dtb.extend_from_slice(&address.to_be_bytes());
            dtb.extend_from_slice(&size.to_be_bytes());
        }
        dtb.extend_from_slice(&self.structure);
        dtb.extend_from_slice(&self.strings);
        dtb
    }
}

/// A cut-down BM1000 board tree:
///
/// ```text
/// /memreserve/ 0x80000000 0x6000000;
/// / {
///     model = "Baikal Electronics DBM";
///     compatible = "baikal,dbm\0baikal,bm1000";
///     #address-cells = <2>; #size-cells = <2>;
///     memory@80000000 {
///         device_type = "memory";
///         reg = <0x0 0x80000000 0x0 0x80000000  0x8 0x80000000 0x1 0x0>;
///     };
///     soc {
///         #address-cells = <1>; #size-cells = <1>;
///         ethernet@30240000 {
///             compatible = "baikal,bm1000-gmac\0snps,dwmac";
///             reg = <0x30240000 0x10000>;
///             local-mac-address = [00 00 00 00 00 00];
///             status = "okay";
///         };
///         ethernet@30250000 {
///             compatible = "baikal,bm1000-gmac\0snps,dwmac";
///             reg = <0x30250000 0x10000>;
///             status = "disabled";
///         };
///         serial@20230000 { compatible = "snps,dw-apb-uart"; reg = <0x20230000 0x100>; };
///     };
///     memory-controller@e0200000 {
///         compatible = "baikal,bm1000-edac-mc";
///         reg = <0x0 0xe0200000 0x0 0x10000>;
///         status = "okay";
///     };
/// };
/// ```
pub(crate) fn bm1000_dtb() -> Vec<u8> {
    DtbBuilder::new()
        .begin("")
        .prop_str("model", "Baikal Electronics DBM")
        .prop("compatible", b"baikal,dbm\0baikal,bm1000\0")
        .prop_cells("#address-cells", &[2])
        .prop_cells("#size-cells", &[2])
        .begin("memory@80000000")
        .prop_str("device_type", "memory")
        .prop_cells(
            "reg",
            &[0, 0x8000_0000, 0, 0x8000_0000, 0x8, 0x8000_0000, 0x1, 0],
        )
        .end()
        .begin("soc")
        .prop_cells("#address-cells", &[1])
        .prop_cells("#size-cells", &[1])
        .begin("ethernet@30240000")
        .prop("compatible", b"baikal,bm1000-gmac\0snps,dwmac\0")
        .prop_cells("reg", &[0x3024_0000, 0x1_0000])
        .prop("local-mac-address", &[0; 6])
        .prop_str("status", "okay")
        .end()
        .begin("ethernet@30250000")
        .prop("compatible", b"baikal,bm1000-gmac\0snps,dwmac\0")
        .prop_cells("reg", &[0x3025_0000, 0x1_0000])
        .prop_str("status", "disabled")
        .end()
        .begin("serial@20230000")
        .prop_str("compatible", "snps,dw-apb-uart")
        .prop_cells("reg", &[0x2023_0000, 0x100])
        .end()
        .end()
        .begin("memory-controller@e0200000")
        .prop_str("compatible", "baikal,bm1000-edac-mc")
        .prop_cells("reg", &[0, 0xe020_0000, 0, 0x1_0000])
        .prop_str("status", "okay")
        .end()
        .end()
        .finish(&[(0x8000_0000, 0x600_0000)])
}
