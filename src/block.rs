//! Boundary-tag layout of a block.
//!
//! ```text
//!   Allocated block:            Free block:
//!   ┌────────────────────┐      ┌────────────────────┐
//!   │ header (size|p|a)  │      │ header (size|p|0)  │
//!   ├────────────────────┤ ◄─bp ├────────────────────┤
//!   │                    │      │ next_free          │
//!   │      payload       │      │ prev_free          │
//!   │                    │      │ ...                │
//!   │                    │      │ footer (size|p|0)  │
//!   └────────────────────┘      └────────────────────┘
//! ```
//!
//! Every address here is a byte offset into the arena, and `bp` is always the
//! offset of a payload (one word past the header). Nothing in this module
//! validates that `bp` really is a block; out-of-range offsets panic on the
//! slice bounds check.

use crate::config::{DSIZE, WSIZE};

const ALLOC_BIT: usize = 0x1;
const PREV_ALLOC_BIT: usize = 0x2;
const SIZE_MASK: usize = !0x3;

/// Null free-list link. Offset 0 is the alignment padding word and never a payload.
pub const NIL: usize = 0;

/// Decoded header or footer word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
  pub size: usize,
  pub allocated: bool,
  pub prev_allocated: bool,
}

impl Tag {
  pub const fn new(
    size: usize,
    allocated: bool,
    prev_allocated: bool,
  ) -> Self {
    Self {
      size,
      allocated,
      prev_allocated,
    }
  }

  pub const fn pack(self) -> usize {
    let mut word = self.size & SIZE_MASK;
    if self.allocated {
      word |= ALLOC_BIT;
    }
    if self.prev_allocated {
      word |= PREV_ALLOC_BIT;
    }
    word
  }

  pub const fn unpack(word: usize) -> Self {
    Self {
      size: word & SIZE_MASK,
      allocated: word & ALLOC_BIT != 0,
      prev_allocated: word & PREV_ALLOC_BIT != 0,
    }
  }
}

/// A block as seen by a heap walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  /// Payload offset from the start of the arena.
  pub offset: usize,
  pub size: usize,
  pub allocated: bool,
}

pub fn read_word(
  mem: &[u8],
  at: usize,
) -> usize {
  let mut buf = [0u8; WSIZE];
  buf.copy_from_slice(&mem[at..at + WSIZE]);
  usize::from_ne_bytes(buf)
}

pub fn write_word(
  mem: &mut [u8],
  at: usize,
  value: usize,
) {
  mem[at..at + WSIZE].copy_from_slice(&value.to_ne_bytes());
}

pub const fn header_address(bp: usize) -> usize {
  bp - WSIZE
}

pub fn footer_address(
  mem: &[u8],
  bp: usize,
) -> usize {
  bp + read_header(mem, bp).size - DSIZE
}

pub fn read_header(
  mem: &[u8],
  bp: usize,
) -> Tag {
  Tag::unpack(read_word(mem, header_address(bp)))
}

pub fn write_header(
  mem: &mut [u8],
  bp: usize,
  tag: Tag,
) {
  write_word(mem, header_address(bp), tag.pack());
}

/// Only meaningful for free blocks; allocated blocks carry no footer.
pub fn read_footer(
  mem: &[u8],
  bp: usize,
) -> Tag {
  Tag::unpack(read_word(mem, footer_address(mem, bp)))
}

/// Writes the footer at the position implied by `tag.size`, so it can be
/// called before the header is updated.
pub fn write_footer(
  mem: &mut [u8],
  bp: usize,
  tag: Tag,
) {
  write_word(mem, bp + tag.size - DSIZE, tag.pack());
}

/// Writes header and footer of a free block.
pub fn write_free(
  mem: &mut [u8],
  bp: usize,
  size: usize,
  prev_allocated: bool,
) {
  let tag = Tag::new(size, false, prev_allocated);
  write_header(mem, bp, tag);
  write_footer(mem, bp, tag);
}

pub fn next_block_address(
  mem: &[u8],
  bp: usize,
) -> usize {
  bp + read_header(mem, bp).size
}

/// Requires the previous block to be free: only free blocks have a footer.
pub fn prev_block_address(
  mem: &[u8],
  bp: usize,
) -> usize {
  bp - Tag::unpack(read_word(mem, bp - DSIZE)).size
}

/// Updates the `prev_allocated` bit of the block at `bp`, mirroring it into the
/// footer when the block is free. The epilogue has no footer.
pub fn set_prev_allocated(
  mem: &mut [u8],
  bp: usize,
  prev_allocated: bool,
) {
  let mut tag = read_header(mem, bp);
  tag.prev_allocated = prev_allocated;
  write_header(mem, bp, tag);

  if !tag.allocated && tag.size > 0 {
    write_footer(mem, bp, tag);
  }
}

pub fn next_free(
  mem: &[u8],
  bp: usize,
) -> usize {
  read_word(mem, bp)
}

pub fn prev_free(
  mem: &[u8],
  bp: usize,
) -> usize {
  read_word(mem, bp + WSIZE)
}

pub fn set_next_free(
  mem: &mut [u8],
  bp: usize,
  next: usize,
) {
  write_word(mem, bp, next);
}

pub fn set_prev_free(
  mem: &mut [u8],
  bp: usize,
  prev: usize,
) {
  write_word(mem, bp + WSIZE, prev);
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_tag_packing() {
    let tag = Tag::new(48, true, false);
    assert_eq!(tag.pack(), 48 | 1);
    assert_eq!(Tag::unpack(tag.pack()), tag);

    let tag = Tag::new(4096, false, true);
    assert_eq!(tag.pack(), 4096 | 2);
    assert_eq!(Tag::unpack(tag.pack()), tag);

    let epilogue = Tag::new(0, true, true);
    assert_eq!(epilogue.pack(), 3);
    assert_eq!(Tag::unpack(3).size, 0);
  }

  #[test]
  fn test_header_footer_and_neighbours() {
    let mut mem = vec![0u8; 256];

    // Two adjacent free blocks of 64 and 96 bytes starting at payload 32.
    write_free(&mut mem, 32, 64, true);
    write_free(&mut mem, 96, 96, false);

    assert_eq!(header_address(32), 32 - WSIZE);
    assert_eq!(footer_address(&mem, 32), 32 + 64 - DSIZE);
    assert_eq!(read_header(&mem, 32), read_footer(&mem, 32));
    assert_eq!(read_header(&mem, 96), Tag::new(96, false, false));

    assert_eq!(next_block_address(&mem, 32), 96);
    assert_eq!(prev_block_address(&mem, 96), 32);

    set_prev_allocated(&mut mem, 96, true);
    assert!(read_header(&mem, 96).prev_allocated);
    assert!(read_footer(&mem, 96).prev_allocated);
  }

  #[test]
  fn test_links() {
    let mut mem = vec![0u8; 128];

    write_free(&mut mem, 32, 64, true);
    set_next_free(&mut mem, 32, 96);
    set_prev_free(&mut mem, 32, NIL);

    assert_eq!(next_free(&mem, 32), 96);
    assert_eq!(prev_free(&mem, 32), NIL);
    // Links live in the payload and leave the boundary tags intact.
    assert_eq!(read_header(&mem, 32), Tag::new(64, false, true));
    assert_eq!(read_footer(&mem, 32), Tag::new(64, false, true));
  }
}
