//! `baikal-fdt` --- a `no_std` Flattened Device Tree (DTB) parser with
//! in-place patching.
//!
//! [`Fdt`] borrows a blob and walks it without copying: nodes by path, by
//! `compatible` or depth-first, their properties and `reg` ranges, and the
//! memory reservation map. [`FdtPatcher`] edits a `&mut [u8]` blob without
//! moving anything, which is what the board fixups need: MAC addresses and
//! `status` strings keep their length, and a property can be removed by
//! overwriting it with `FDT_NOP`.
//!
//! # Usage
//!
//! ```ignore
//! let fdt = Fdt::parse(dtb_bytes)?;
//! let soc = fdt.find_node("/soc").ok_or(FdtError::NotFound)?;
//! for gmac in soc.children().filter(|n| n.is_compatible("snps,dwmac")) {
//!     let base = gmac.reg(&soc).next();
//! }
//!
//! let mut patcher = FdtPatcher::new(&mut dtb)?;
//! patcher.set_property_inplace("/soc/ethernet@30240000", "local-mac-address", &mac)?;
//! ```

#![no_std]

pub mod header;
pub mod node;
pub mod patch;
pub mod property;
pub mod reservation;
mod token;

#[cfg(test)]
extern crate alloc;
#[cfg(test)]
pub(crate) mod testutil;

use core::fmt;

pub use node::{Children, FdtNode, NodeWalk, RegEntry, RegIter};
pub use patch::FdtPatcher;
pub use property::{FdtProperty, Properties};
pub use reservation::{Reservation, Reservations};

use header::{FDT_HEADER_SIZE, FDT_MAGIC, FDT_MIN_COMPAT_VERSION, FdtHeader};
use token::{Blocks, Token};

/// Parse and patch errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FdtError {
    /// The header does not start with `0xd00dfeed`.
    InvalidMagic,
    /// `last_comp_version` is older than 16.
    UnsupportedVersion,
    /// The buffer ends before the header or a block it declares.
    TruncatedData,
    /// Misaligned or overflowing block offsets, or a structure block that
    /// does not open with a node.
    InvalidStructure,
    /// The node or property to patch does not exist.
    NotFound,
    /// An in-place replacement differs in length from the current value.
    SizeMismatch {
        /// Length of the existing value.
        expected: usize,
        /// Length of the replacement.
        actual: usize,
    },
}

impl fmt::Display for FdtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidMagic => f.write_str("fdt: bad magic"),
            Self::UnsupportedVersion => f.write_str("fdt: unsupported version"),
            Self::TruncatedData => f.write_str("fdt: truncated blob"),
            Self::InvalidStructure => f.write_str("fdt: malformed structure block"),
            Self::NotFound => f.write_str("fdt: node or property not found"),
            Self::SizeMismatch { expected, actual } => {
                write!(f, "fdt: value is {actual} bytes, property holds {expected}")
            }
        }
    }
}

/// `len` bytes at `offset` inside `blob`.
fn block(blob: &[u8], offset: u32, len: u32) -> Result<&[u8], FdtError> {
    let start = offset as usize;
    let end = start
        .checked_add(len as usize)
        .ok_or(FdtError::InvalidStructure)?;
    blob.get(start..end).ok_or(FdtError::TruncatedData)
}

/// A validated blob.
pub struct Fdt<'a> {
    blob: &'a [u8],
    struct_offset: usize,
    blocks: Blocks<'a>,
    rsvmap: &'a [u8],
}

impl<'a> Fdt<'a> {
    /// Checks the header and that every block it declares lies inside
    /// `totalsize`, which in turn must fit `data`. Trailing bytes past
    /// `totalsize` are ignored.
    ///
    /// # Errors
    ///
    /// The [`FdtError`] for the first failed check.
    pub fn parse(data: &'a [u8]) -> Result<Self, FdtError> {
        let header = FdtHeader::read(data).ok_or(FdtError::TruncatedData)?;
        if header.magic != FDT_MAGIC {
            return Err(FdtError::InvalidMagic);
        }
        if header.last_comp_version < FDT_MIN_COMPAT_VERSION {
            return Err(FdtError::UnsupportedVersion);
        }

        let total = header.totalsize as usize;
        if total < FDT_HEADER_SIZE {
            return Err(FdtError::TruncatedData);
        }
        let blob = data.get(..total).ok_or(FdtError::TruncatedData)?;

        let structure = block(blob, header.off_dt_struct, header.size_dt_struct)?;
        let strings = block(blob, header.off_dt_strings, header.size_dt_strings)?;
        let struct_offset = header.off_dt_struct as usize;
        if struct_offset % 4 != 0 {
            return Err(FdtError::InvalidStructure);
        }
        // The reservation map runs up to the structure block.
        let rsvmap_offset = header.off_mem_rsvmap as usize;
        if rsvmap_offset > total {
            return Err(FdtError::TruncatedData);
        }
        let rsvmap = blob.get(rsvmap_offset..struct_offset).unwrap_or_default();

        let blocks = Blocks { structure, strings };
        if !matches!(blocks.token(0), Some((Token::BeginNode(_), _))) {
            return Err(FdtError::InvalidStructure);
        }

        Ok(Self {
            blob,
            struct_offset,
            blocks,
            rsvmap,
        })
    }

    #[must_use]
    pub fn root(&self) -> FdtNode<'a> {
        match self.blocks.token(0) {
            Some((Token::BeginNode(name), body)) => FdtNode::new(self.blocks, name, body),
            // `parse` rejected blobs that do not open with a node.
            _ => FdtNode::new(self.blocks, "", self.blocks.structure.len()),
        }
    }

    /// The node at an absolute path such as `"/soc/ethernet@30240000"`.
    /// `"/"` is the root.
    #[must_use]
    pub fn find_node(&self, path: &str) -> Option<FdtNode<'a>> {
        path.split('/')
            .filter(|component| !component.is_empty())
            .try_fold(self.root(), |node, component| node.child(component))
    }

    /// The first node, in depth-first order, whose `compatible` lists
    /// `compatible`.
    #[must_use]
    pub fn find_compatible(&self, compatible: &str) -> Option<FdtNode<'a>> {
        self.nodes()
            .map(|(_, node)| node)
            .find(|node| node.is_compatible(compatible))
    }

    /// Every node with its depth, root first.
    #[must_use]
    pub fn nodes(&self) -> NodeWalk<'a> {
        NodeWalk::new(self.blocks)
    }

    #[must_use]
    pub fn reservations(&self) -> Reservations<'a> {
        Reservations::new(self.rsvmap)
    }

    /// `totalsize` from the header.
    #[must_use]
    pub fn total_size(&self) -> usize {
        self.blob.len()
    }

    /// Offset of `property`'s token from the start of the blob.
    pub(crate) fn blob_offset(&self, property: &FdtProperty<'_>) -> usize {
        self.struct_offset + property.token_offset()
    }
}
