//! Read-only heap consistency checker.

use std::collections::HashSet;

use crate::{
  allocator::Allocator,
  block::{self, NIL, Tag},
  config::{ALIGNMENT, DSIZE, LIST_COUNT, MIN_BLOCK_SIZE, WSIZE},
  free_list::class_of,
  provider::MemoryProvider,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Violation {
  #[error("bad prologue at {0}")]
  BadPrologue(usize),

  #[error("bad epilogue at {0}")]
  BadEpilogue(usize),

  #[error("payload {0} is misaligned")]
  Misaligned(usize),

  #[error("block {offset} has size {size}, below the minimum")]
  Undersized { offset: usize, size: usize },

  #[error("block {offset} has size {size}, not a multiple of the alignment")]
  UnalignedSize { offset: usize, size: usize },

  #[error("free block {offset}: header {header:?} and footer {footer:?} disagree")]
  TagMismatch { offset: usize, header: Tag, footer: Tag },

  #[error("block {offset} has a stale prev-allocated bit")]
  StalePrevAllocated { offset: usize },

  #[error("free blocks {first} and {second} are adjacent")]
  ConsecutiveFree { first: usize, second: usize },

  #[error("block {offset} lies outside the heap")]
  OutOfBounds { offset: usize },

  #[error("block {offset} in class {class} is not free")]
  ListedNotFree { class: usize, offset: usize },

  #[error("block {offset} of size {size} sits in class {class}")]
  WrongClass { class: usize, offset: usize, size: usize },

  #[error("block {offset} in class {class} has a broken back link")]
  BrokenBackLink { class: usize, offset: usize },

  #[error("class {class} revisits block {offset}")]
  ListCycle { class: usize, offset: usize },

  #[error("block {offset} is reachable from more than one class")]
  MultiplyListed { offset: usize },

  #[error("free block {offset} is missing from the free lists")]
  Unlisted { offset: usize },

  #[error("{in_heap} free blocks in the heap, {in_lists} in the free lists")]
  FreeCountMismatch { in_heap: usize, in_lists: usize },
}

impl<P: MemoryProvider> Allocator<P> {
  /// Walks the whole arena and every size class and reports what is
  /// inconsistent. Never modifies the heap. `context` tags the log output.
  pub fn validate(
    &self,
    context: &str,
  ) -> Vec<Violation> {
    let mut violations = Vec::new();
    let mut heap_free = HashSet::new();

    self.check_blocks(&mut violations, &mut heap_free);
    let listed = self.check_free_lists(&mut violations);

    for &offset in &heap_free {
      if !listed.contains(&offset) {
        violations.push(Violation::Unlisted { offset });
      }
    }

    if heap_free.len() != listed.len() {
      violations.push(Violation::FreeCountMismatch {
        in_heap: heap_free.len(),
        in_lists: listed.len(),
      });
    }

    for violation in &violations {
      tracing::warn!(context, %violation, "heap check");
    }

    violations
  }

  fn check_blocks(
    &self,
    violations: &mut Vec<Violation>,
    heap_free: &mut HashSet<usize>,
  ) {
    let mem = self.provider.memory();
    let low = self.provider.heap_low();
    let high = self.provider.heap_high();
    let heap_size = self.provider.heap_size();

    let prologue = block::read_header(mem, self.heap_start);
    let prologue_footer = Tag::unpack(block::read_word(mem, self.heap_start));
    if prologue.size != DSIZE || !prologue.allocated || prologue != prologue_footer {
      violations.push(Violation::BadPrologue(self.heap_start));
    }

    let mut bp = self.first_block();
    let mut prev_allocated = true;
    let mut prev_free_block = None;

    loop {
      if bp > heap_size {
        violations.push(Violation::OutOfBounds { offset: bp });
        return;
      }

      let tag = block::read_header(mem, bp);

      if tag.size == 0 {
        if !tag.allocated || block::header_address(bp) != heap_size - WSIZE {
          violations.push(Violation::BadEpilogue(bp));
        }
        if tag.prev_allocated != prev_allocated {
          violations.push(Violation::StalePrevAllocated { offset: bp });
        }
        return;
      }

      if low.saturating_add(bp).saturating_add(tag.size) - WSIZE - 1 > high {
        violations.push(Violation::OutOfBounds { offset: bp });
        return;
      }

      if (low + bp) % ALIGNMENT != 0 {
        violations.push(Violation::Misaligned(bp));
      }
      if tag.size < MIN_BLOCK_SIZE {
        violations.push(Violation::Undersized {
          offset: bp,
          size: tag.size,
        });
      }
      if tag.size % ALIGNMENT != 0 {
        violations.push(Violation::UnalignedSize {
          offset: bp,
          size: tag.size,
        });
      }
      if tag.prev_allocated != prev_allocated {
        violations.push(Violation::StalePrevAllocated { offset: bp });
      }

      if tag.allocated {
        prev_free_block = None;
      } else {
        if tag.size >= DSIZE {
          let footer = block::read_footer(mem, bp);
          if footer.size != tag.size || footer.allocated {
            violations.push(Violation::TagMismatch {
              offset: bp,
              header: tag,
              footer,
            });
          }
        }

        if let Some(first) = prev_free_block {
          violations.push(Violation::ConsecutiveFree { first, second: bp });
        }

        heap_free.insert(bp);
        prev_free_block = Some(bp);
      }

      prev_allocated = tag.allocated;
      bp += tag.size;
    }
  }

  /// Returns every block reachable from the size classes.
  fn check_free_lists(
    &self,
    violations: &mut Vec<Violation>,
  ) -> HashSet<usize> {
    let mem = self.provider.memory();
    let heap_size = self.provider.heap_size();
    let mut listed = HashSet::new();

    for class in 0..LIST_COUNT {
      let mut prev = NIL;
      let mut bp = self.free_lists.head(class);
      let mut chain = HashSet::new();

      while bp != NIL {
        if bp < self.first_block() || bp.saturating_add(DSIZE) > heap_size {
          violations.push(Violation::OutOfBounds { offset: bp });
          break;
        }

        if !chain.insert(bp) {
          violations.push(Violation::ListCycle { class, offset: bp });
          break;
        }
        if !listed.insert(bp) {
          violations.push(Violation::MultiplyListed { offset: bp });
        }

        let tag = block::read_header(mem, bp);
        if tag.allocated {
          violations.push(Violation::ListedNotFree { class, offset: bp });
        }
        if class_of(tag.size) != class {
          violations.push(Violation::WrongClass {
            class,
            offset: bp,
            size: tag.size,
          });
        }
        if block::prev_free(mem, bp) != prev {
          violations.push(Violation::BrokenBackLink { class, offset: bp });
        }

        prev = bp;
        bp = block::next_free(mem, bp);
      }
    }

    listed
  }
}
