//! Nodes, their children and `reg` decoding.

use crate::property::{FdtProperty, Properties};
use crate::token::{Blocks, Token};

/// A node of the tree.
///
/// `body` is the structure-block offset just past the node name, where its
/// properties and then its children begin.
#[derive(Debug, Clone, Copy)]
pub struct FdtNode<'a> {
    blocks: Blocks<'a>,
    name: &'a str,
    body: usize,
}

impl<'a> FdtNode<'a> {
    pub(crate) fn new(blocks: Blocks<'a>, name: &'a str, body: usize) -> Self {
        Self { blocks, name, body }
    }

    /// Full node name, e.g. `"ethernet@30240000"`; empty for the root.
    #[must_use]
    pub fn name(&self) -> &'a str {
        self.name
    }

    #[must_use]
    pub fn properties(&self) -> Properties<'a> {
        Properties::new(self.blocks, self.body)
    }

    #[must_use]
    pub fn property(&self, name: &str) -> Option<FdtProperty<'a>> {
        self.properties().find(|p| p.name() == name)
    }

    /// Direct children in blob order.
    #[must_use]
    pub fn children(&self) -> Children<'a> {
        let mut at = self.body;
        while let Some((Token::Prop { .. } | Token::Nop, next)) = self.blocks.token(at) {
            at = next;
        }
        Children {
            blocks: self.blocks,
            at,
        }
    }

    /// The direct child with exactly this name.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<FdtNode<'a>> {
        self.children().find(|n| n.name == name)
    }

    /// Whether `compatible` lists `compatible`.
    #[must_use]
    pub fn is_compatible(&self, compatible: &str) -> bool {
        self.property("compatible")
            .is_some_and(|p| p.strings().any(|entry| entry == compatible))
    }

    /// `status` is absent, `"okay"` or `"ok"`.
    #[must_use]
    pub fn status_okay(&self) -> bool {
        self.property("status")
            .and_then(|p| p.as_str())
            .is_none_or(|status| matches!(status, "okay" | "ok"))
    }

    /// `#address-cells` for this node's children, 2 when absent.
    #[must_use]
    pub fn address_cells(&self) -> u32 {
        self.property("#address-cells")
            .and_then(|p| p.as_u32())
            .unwrap_or(2)
    }

    /// `#size-cells` for this node's children, 1 when absent.
    #[must_use]
    pub fn size_cells(&self) -> u32 {
        self.property("#size-cells")
            .and_then(|p| p.as_u32())
            .unwrap_or(1)
    }

    /// Decodes `reg` with the cell counts of `parent`. Empty when the
    /// property is absent. Values wider than 64 bits keep their low 64 bits.
    #[must_use]
    pub fn reg(&self, parent: &FdtNode<'_>) -> RegIter<'a> {
        RegIter {
            value: self.property("reg").map_or(&[][..], |p| p.value()),
            address_cells: parent.address_cells() as usize,
            size_cells: parent.size_cells() as usize,
        }
    }
}

/// Iterator over the direct children of a node.
pub struct Children<'a> {
    blocks: Blocks<'a>,
    at: usize,
}

impl<'a> Iterator for Children<'a> {
    type Item = FdtNode<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (token, body) = self.blocks.token(self.at)?;
            match token {
                Token::Nop => self.at = body,
                Token::BeginNode(name) => {
                    self.at = self.blocks.skip_node(body)?;
                    return Some(FdtNode::new(self.blocks, name, body));
                }
                Token::Prop { .. } | Token::EndNode | Token::End => return None,
            }
        }
    }
}

/// One `(address, size)` pair of a `reg` property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegEntry {
    pub address: u64,
    /// Zero when the parent has `#size-cells = <0>`.
    pub size: u64,
}

/// Iterator over the entries of a `reg` property.
pub struct RegIter<'a> {
    value: &'a [u8],
    address_cells: usize,
    size_cells: usize,
}

fn fold_cells(bytes: &[u8]) -> u64 {
    bytes.chunks_exact(4).fold(0, |acc, cell| {
        (acc << 32) | u64::from(u32::from_be_bytes([cell[0], cell[1], cell[2], cell[3]]))
    })
}

impl Iterator for RegIter<'_> {
    type Item = RegEntry;

    fn next(&mut self) -> Option<RegEntry> {
        let width = (self.address_cells + self.size_cells) * 4;
        if width == 0 || self.value.len() < width {
            return None;
        }
        let (entry, rest) = self.value.split_at(width);
        self.value = rest;
        let (address, size) = entry.split_at(self.address_cells * 4);
        Some(RegEntry {
            address: fold_cells(address),
            size: fold_cells(size),
        })
    }
}

/// Depth-first walk over every node, root (depth 0) first.
pub struct NodeWalk<'a> {
    blocks: Blocks<'a>,
    at: usize,
    depth: usize,
}

impl<'a> NodeWalk<'a> {
    pub(crate) fn new(blocks: Blocks<'a>) -> Self {
        Self {
            blocks,
            at: 0,
            depth: 0,
        }
    }
}

impl<'a> Iterator for NodeWalk<'a> {
    type Item = (usize, FdtNode<'a>);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (token, next) = self.blocks.token(self.at)?;
            self.at = next;
            match token {
                Token::BeginNode(name) => {
                    let depth = self.depth;
                    self.depth += 1;
                    return Some((depth, FdtNode::new(self.blocks, name, next)));
                }
                Token::EndNode => self.depth = self.depth.checked_sub(1)?,
                Token::Prop { .. } | Token::Nop => {}
                Token::End => return None,
            }
        }
    }
}
