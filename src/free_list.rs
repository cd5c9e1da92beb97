//! Segregated free lists.
//!
//! One doubly-linked, LIFO chain of free blocks per power-of-two size class.
//! The links are stored in the payload of the free blocks themselves.

use crate::{
  block::{self, NIL},
  config::{FIRST_CLASS_LIMIT, LIST_COUNT},
};

/// Size class owning blocks of `size` bytes.
///
/// Class 0 holds sizes up to 32, class `i` holds `(16 << i, 32 << i]` and
/// the last class takes everything above.
pub fn class_of(size: usize) -> usize {
  let mut index = 0;
  let mut limit = FIRST_CLASS_LIMIT;

  while index < LIST_COUNT - 1 && size > limit {
    limit <<= 1;
    index += 1;
  }

  index
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreeListIndex {
  heads: [usize; LIST_COUNT],
}

impl Default for FreeListIndex {
  fn default() -> Self {
    Self::new()
  }
}

impl FreeListIndex {
  pub const fn new() -> Self {
    Self { heads: [NIL; LIST_COUNT] }
  }

  /// First block of `class`, or [`NIL`].
  pub fn head(
    &self,
    class: usize,
  ) -> usize {
    self.heads[class]
  }

  /// Pushes the free block at `bp` to the front of its class.
  /// The block's header must already carry its final size.
  pub fn insert(
    &mut self,
    mem: &mut [u8],
    bp: usize,
  ) {
    let class = class_of(block::read_header(mem, bp).size);
    let head = self.heads[class];

    if head != NIL {
      block::set_prev_free(mem, head, bp);
    }

    block::set_next_free(mem, bp, head);
    block::set_prev_free(mem, bp, NIL);
    self.heads[class] = bp;
  }

  /// Unlinks the free block at `bp`. Reads the header to find the class, so it
  /// must run before the header is overwritten by a merge or split.
  pub fn remove(
    &mut self,
    mem: &mut [u8],
    bp: usize,
  ) {
    let class = class_of(block::read_header(mem, bp).size);
    let prev = block::prev_free(mem, bp);
    let next = block::next_free(mem, bp);

    if prev != NIL {
      block::set_next_free(mem, prev, next);
    } else {
      self.heads[class] = next;
    }

    if next != NIL {
      block::set_prev_free(mem, next, prev);
    }
  }

  /// First block of at least `size` bytes, starting at the class of `size` and
  /// moving to larger classes.
  pub fn find_fit(
    &self,
    mem: &[u8],
    size: usize,
  ) -> Option<usize> {
    (class_of(size)..LIST_COUNT).find_map(|class| {
      self
        .iter_class(mem, class)
        .find(|&bp| block::read_header(mem, bp).size >= size)
    })
  }

  /// Walks one class from head to tail. Assumes the chain is well formed.
  pub fn iter_class<'a>(
    &self,
    mem: &'a [u8],
    class: usize,
  ) -> impl Iterator<Item = usize> + 'a {
    let mut current = self.heads[class];

    std::iter::from_fn(move || {
      if current == NIL {
        return None;
      }

      let bp = current;
      current = block::next_free(mem, bp);
      Some(bp)
    })
  }

  pub fn clear(&mut self) {
    self.heads = [NIL; LIST_COUNT];
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::block::write_free;

  #[test]
  fn test_class_of() {
    assert_eq!(class_of(16), 0);
    assert_eq!(class_of(32), 0);
    assert_eq!(class_of(33), 1);
    assert_eq!(class_of(64), 1);
    assert_eq!(class_of(65), 2);
    assert_eq!(class_of(96), 2);
    assert_eq!(class_of(4096), 7);
    assert_eq!(class_of(usize::MAX & !0xF), LIST_COUNT - 1);

    // Monotonic.
    let mut last = 0;
    for size in (16..100_000).step_by(16) {
      let class = class_of(size);
      assert!(class >= last);
      last = class;
    }
  }

  fn arena_with_blocks(sizes: &[usize]) -> (Vec<u8>, Vec<usize>) {
    let total: usize = sizes.iter().sum();
    let mut mem = vec![0u8; total + 64];
    let mut bps = Vec::new();
    let mut bp = 32;

    for &size in sizes {
      write_free(&mut mem, bp, size, true);
      bps.push(bp);
      bp += size;
    }

    (mem, bps)
  }

  #[test]
  fn test_insert_is_lifo() {
    let (mut mem, bps) = arena_with_blocks(&[32, 32, 32]);
    let mut index = FreeListIndex::new();

    for &bp in &bps {
      index.insert(&mut mem, bp);
    }

    let chain: Vec<usize> = index.iter_class(&mem, 0).collect();
    assert_eq!(chain, vec![bps[2], bps[1], bps[0]]);
    assert_eq!(block::prev_free(&mem, bps[2]), NIL);
    assert_eq!(block::prev_free(&mem, bps[1]), bps[2]);
    assert_eq!(block::prev_free(&mem, bps[0]), bps[1]);
  }

  #[test]
  fn test_remove_head_middle_tail() {
    let (mut mem, bps) = arena_with_blocks(&[48, 48, 48, 48]);
    let mut index = FreeListIndex::new();

    for &bp in &bps {
      index.insert(&mut mem, bp);
    }

    // Chain is 3, 2, 1, 0.
    index.remove(&mut mem, bps[2]);
    assert_eq!(index.iter_class(&mem, 1).collect::<Vec<_>>(), vec![bps[3], bps[1], bps[0]]);

    index.remove(&mut mem, bps[3]);
    assert_eq!(index.head(1), bps[1]);
    assert_eq!(block::prev_free(&mem, bps[1]), NIL);

    index.remove(&mut mem, bps[0]);
    assert_eq!(index.iter_class(&mem, 1).collect::<Vec<_>>(), vec![bps[1]]);

    index.remove(&mut mem, bps[1]);
    assert_eq!(index.head(1), NIL);
  }

  #[test]
  fn test_find_fit_scans_upward() {
    let (mut mem, bps) = arena_with_blocks(&[48, 64, 256]);
    let mut index = FreeListIndex::new();

    for &bp in &bps {
      index.insert(&mut mem, bp);
    }

    // 48 and 64 share class 1; first fit in insertion (LIFO) order.
    assert_eq!(index.find_fit(&mem, 48), Some(bps[1]));
    assert_eq!(index.find_fit(&mem, 64), Some(bps[1]));
    assert_eq!(index.find_fit(&mem, 80), Some(bps[2]));
    assert_eq!(index.find_fit(&mem, 512), None);

    index.remove(&mut mem, bps[1]);
    assert_eq!(index.find_fit(&mem, 48), Some(bps[0]));
    assert_eq!(index.find_fit(&mem, 64), Some(bps[2]));

    index.clear();
    assert_eq!(index.find_fit(&mem, 16), None);
  }
}
