//! Structure-block lexer.
//!
//! Every walk over the tree (properties, children, the depth-first node
//! walk, subtree skipping) goes through [`Blocks::token`], which decodes one
//! token and returns the offset of the next. Offsets are relative to the
//! start of the structure block.

pub(crate) const FDT_BEGIN_NODE: u32 = 0x1;
pub(crate) const FDT_END_NODE: u32 = 0x2;
pub(crate) const FDT_PROP: u32 = 0x3;
pub(crate) const FDT_NOP: u32 = 0x4;
pub(crate) const FDT_END: u32 = 0x9;

/// Big-endian word at `at`.
pub(crate) fn be32(data: &[u8], at: usize) -> Option<u32> {
    let bytes = data.get(at..at.checked_add(4)?)?;
    Some(u32::from_be_bytes(bytes.try_into().ok()?))
}

pub(crate) const fn align4(at: usize) -> usize {
    (at + 3) & !3
}

/// NUL-terminated UTF-8 string starting at `at`.
pub(crate) fn cstr(data: &[u8], at: usize) -> Option<&str> {
    let tail = data.get(at..)?;
    let len = tail.iter().position(|&b| b == 0)?;
    core::str::from_utf8(&tail[..len]).ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Token<'a> {
    BeginNode(&'a str),
    EndNode,
    Prop {
        /// Offset of the `FDT_PROP` word.
        at: usize,
        nameoff: usize,
        value: &'a [u8],
    },
    Nop,
    End,
}

/// The structure and strings blocks of one blob.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Blocks<'a> {
    pub(crate) structure: &'a [u8],
    pub(crate) strings: &'a [u8],
}

impl<'a> Blocks<'a> {
    /// Decodes the token at `at`. `None` on an unknown tag or a token that
    /// runs past the block.
    pub(crate) fn token(&self, at: usize) -> Option<(Token<'a>, usize)> {
        let body = at + 4;
        let token = match be32(self.structure, at)? {
            FDT_BEGIN_NODE => {
                let name = cstr(self.structure, body)?;
                return Some((Token::BeginNode(name), align4(body + name.len() + 1)));
            }
            FDT_PROP => {
                let len = be32(self.structure, body)? as usize;
                let nameoff = be32(self.structure, body + 4)? as usize;
                let start = body + 8;
                let value = self.structure.get(start..start.checked_add(len)?)?;
                return Some((Token::Prop { at, nameoff, value }, align4(start + len)));
            }
            FDT_END_NODE => Token::EndNode,
            FDT_NOP => Token::Nop,
            FDT_END => Token::End,
            _ => return None,
        };
        Some((token, body))
    }

    /// Property name at `nameoff` in the strings block.
    pub(crate) fn name(&self, nameoff: usize) -> Option<&'a str> {
        cstr(self.strings, nameoff)
    }

    /// Given the body offset of a node, returns the offset just past its
    /// matching `FDT_END_NODE`.
    pub(crate) fn skip_node(&self, mut at: usize) -> Option<usize> {
        let mut depth = 1usize;
        while depth > 0 {
            let (token, next) = self.token(at)?;
            match token {
                Token::BeginNode(_) => depth += 1,
                Token::EndNode => depth -= 1,
                Token::End => return None,
                Token::Prop { .. } | Token::Nop => {}
            }
            at = next;
        }
        Some(at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(words: &[u32]) -> alloc::vec::Vec<u8> {
        words.iter().flat_map(|w| w.to_be_bytes()).collect()
    }

    #[test]
    fn node_names_are_padded_to_a_word() {
        let mut structure = words(&[FDT_BEGIN_NODE]);
        structure.extend_from_slice(b"soc\0");
        structure.extend_from_slice(&words(&[FDT_END_NODE, FDT_END]));
        let blocks = Blocks {
            structure: &structure,
            strings: &[],
        };

        assert_eq!(blocks.token(0), Some((Token::BeginNode("soc"), 8)));
        assert_eq!(blocks.token(8), Some((Token::EndNode, 12)));
        assert_eq!(blocks.skip_node(8), Some(12));
        assert_eq!(blocks.token(12), Some((Token::End, 16)));
        assert_eq!(blocks.token(16), None);
    }

    #[test]
    fn property_value_must_fit_the_block() {
        let structure = words(&[FDT_PROP, 64, 0]);
        let blocks = Blocks {
            structure: &structure,
            strings: b"status\0",
        };
        assert_eq!(blocks.token(0), None);
        assert_eq!(blocks.name(0), Some("status"));
    }

    #[test]
    fn unknown_tag_stops_the_lexer() {
        let structure = words(&[0x7]);
        let blocks = Blocks {
            structure: &structure,
            strings: &[],
        };
        assert_eq!(blocks.token(0), None);
    }
}
