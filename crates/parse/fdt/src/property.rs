//! Node properties and value decoders.

use crate::token::{Blocks, Token};

/// One property of a node, borrowing its value from the blob.
#[derive(Debug, Clone, Copy)]
pub struct FdtProperty<'a> {
    name: &'a str,
    value: &'a [u8],
    /// Offset of the `FDT_PROP` word in the structure block.
    at: usize,
}

impl<'a> FdtProperty<'a> {
    #[must_use]
    pub fn name(&self) -> &'a str {
        self.name
    }

    /// The raw value bytes.
    #[must_use]
    pub fn value(&self) -> &'a [u8] {
        self.value
    }

    pub(crate) fn token_offset(&self) -> usize {
        self.at
    }

    /// A single-cell value such as `#address-cells`.
    #[must_use]
    pub fn as_u32(&self) -> Option<u32> {
        <[u8; 4]>::try_from(self.value).ok().map(u32::from_be_bytes)
    }

    /// A NUL-terminated string value such as `status` or `model`.
    #[must_use]
    pub fn as_str(&self) -> Option<&'a str> {
        match self.value.split_last() {
            Some((&0, text)) => core::str::from_utf8(text).ok(),
            _ => None,
        }
    }

    /// The entries of a string-list value such as `compatible`.
    pub fn strings(&self) -> impl Iterator<Item = &'a str> + use<'a> {
        self.value
            .split(|&b| b == 0)
            .filter(|entry| !entry.is_empty())
            .filter_map(|entry| core::str::from_utf8(entry).ok())
    }
}

/// The properties of one node, in blob order. `FDT_NOP` words are skipped;
/// the first child or the node end stops the iteration.
#[derive(Clone)]
pub struct Properties<'a> {
    blocks: Blocks<'a>,
    at: usize,
}

impl<'a> Properties<'a> {
    pub(crate) fn new(blocks: Blocks<'a>, at: usize) -> Self {
        Self { blocks, at }
    }
}

impl<'a> Iterator for Properties<'a> {
    type Item = FdtProperty<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (token, next) = self.blocks.token(self.at)?;
            match token {
                Token::Nop => self.at = next,
                Token::Prop { at, nameoff, value } => {
                    self.at = next;
                    let name = self.blocks.name(nameoff)?;
                    return Some(FdtProperty { name, value, at });
                }
                Token::BeginNode(_) | Token::EndNode | Token::End => return None,
            }
        }
    }
}
