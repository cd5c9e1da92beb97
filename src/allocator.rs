use std::ptr::NonNull;

use crate::{
  align::checked_align,
  block::{self, BlockInfo, Tag},
  config::{ALIGNMENT, Config, DSIZE, MIN_BLOCK_SIZE, PROLOGUE_SIZE, WSIZE},
  error::{Error, Result},
  free_list::FreeListIndex,
  provider::{MemLib, MemoryProvider},
  stats::AllocatorStats,
};

/// Segregated-fit allocator over a single growable arena.
///
/// Not thread-safe and not reentrant. Every piece of state lives in this
/// value, so independent allocators never interfere with each other.
pub struct Allocator<P: MemoryProvider = MemLib> {
  pub(crate) provider: P,
  pub(crate) config: Config,
  pub(crate) free_lists: FreeListIndex,
  /// Payload offset of the prologue block.
  pub(crate) heap_start: usize,
  pub(crate) stats: AllocatorStats,
}

impl Allocator<MemLib> {
  /// Allocator over a [`MemLib`] arena sized by the default [`Config`].
  pub fn new() -> Result<Self> {
    Self::with_config(Config::default())
  }

  pub fn with_config(config: Config) -> Result<Self> {
    config.validate()?;
    Self::with_provider(MemLib::new(config.get_max_heap())?, config)
  }
}

impl<P: MemoryProvider> Allocator<P> {
  /// Lays out the padding word, the prologue and the epilogue, then grows the
  /// arena by one chunk.
  pub fn with_provider(
    mut provider: P,
    config: Config,
  ) -> Result<Self> {
    config.validate()?;

    let used = provider.heap_size();
    let padding = used.next_multiple_of(ALIGNMENT) - used;
    if padding > 0 {
      provider.grow(padding)?;
    }

    let region = provider.grow(PROLOGUE_SIZE)?;
    let start = region.as_ptr() as usize - provider.heap_low();

    let mem = provider.memory_mut();
    block::write_word(mem, start, 0);
    block::write_word(mem, start + WSIZE, Tag::new(DSIZE, true, true).pack());
    block::write_word(mem, start + 2 * WSIZE, Tag::new(DSIZE, true, true).pack());
    block::write_word(mem, start + 3 * WSIZE, Tag::new(0, true, true).pack());

    let mut allocator = Self {
      provider,
      config,
      free_lists: FreeListIndex::new(),
      heap_start: start + 2 * WSIZE,
      stats: AllocatorStats::new(),
    };

    allocator.extend_heap(config.get_chunk_size())?;

    tracing::debug!(
      heap_low = allocator.provider.heap_low(),
      heap_size = allocator.provider.heap_size(),
      "allocator initialised"
    );

    Ok(allocator)
  }

  /// Returns a payload of at least `size` bytes, aligned to [`ALIGNMENT`].
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>> {
    if size == 0 {
      return Err(Error::ZeroSize);
    }

    let asize = adjust_size(size)?;

    let fit = self.free_lists.find_fit(self.provider.memory(), asize);
    let bp = match fit {
      Some(bp) => bp,
      None => self.extend_heap(asize.max(self.config.get_chunk_size()))?,
    };

    self.place(bp, asize);

    let placed = block::read_header(self.provider.memory(), bp).size;
    self.stats.allocs += 1;
    self.stats.live_bytes += placed;
    self.stats.update_peak();

    tracing::trace!(size, asize, placed, bp, "allocate");

    Ok(self.pointer(bp))
  }

  /// Like [`allocate`](Self::allocate) for `count * size` bytes, with the payload zeroed.
  pub fn allocate_zeroed(
    &mut self,
    count: usize,
    size: usize,
  ) -> Result<NonNull<u8>> {
    let total = count.checked_mul(size).ok_or(Error::SizeOverflow)?;
    let ptr = self.allocate(total)?;
    let bp = self.offset_of(ptr.as_ptr());

    self.provider.memory_mut()[bp..bp + total].fill(0);

    Ok(ptr)
  }

  /// Returns a block to the allocator. A null `address` is ignored.
  ///
  /// # Safety
  ///
  /// `address` must be null or a live pointer returned by this allocator.
  pub unsafe fn deallocate(
    &mut self,
    address: *mut u8,
  ) {
    if address.is_null() {
      return;
    }

    let bp = self.offset_of(address);
    self.free_block(bp);
  }

  /// Resizes the block at `address`, in place when possible.
  ///
  /// A null `address` behaves as [`allocate`](Self::allocate). A zero `size`
  /// frees the block and returns `Ok(None)`. On error the original block is
  /// left untouched.
  ///
  /// # Safety
  ///
  /// `address` must be null or a live pointer returned by this allocator.
  pub unsafe fn reallocate(
    &mut self,
    address: *mut u8,
    size: usize,
  ) -> Result<Option<NonNull<u8>>> {
    if address.is_null() {
      return self.allocate(size).map(Some);
    }

    if size == 0 {
      unsafe { self.deallocate(address) };
      return Ok(None);
    }

    let bp = self.offset_of(address);
    let asize = adjust_size(size)?;
    let old = block::read_header(self.provider.memory(), bp);

    self.stats.reallocs += 1;

    if asize <= old.size {
      self.shrink(bp, old, asize);
      self.stats.in_place_reallocs += 1;
      tracing::trace!(bp, old = old.size, asize, "reallocate shrink");
      return Ok(NonNull::new(address));
    }

    if self.grow_in_place(bp, old, asize)? {
      self.stats.in_place_reallocs += 1;
      tracing::trace!(bp, old = old.size, asize, "reallocate grow in place");
      return Ok(NonNull::new(address));
    }

    let new_ptr = self.allocate(size)?;
    let new_bp = self.offset_of(new_ptr.as_ptr());
    let copied = (old.size - WSIZE).min(size);

    self.provider.memory_mut().copy_within(bp..bp + copied, new_bp);
    self.free_block(bp);

    tracing::trace!(bp, new_bp, copied, "reallocate moved");

    Ok(Some(new_ptr))
  }

  /// Payload bytes available behind `address`, 0 for null.
  ///
  /// # Safety
  ///
  /// `address` must be null or a live pointer returned by this allocator.
  pub unsafe fn usable_size(
    &self,
    address: *const u8,
  ) -> usize {
    if address.is_null() {
      return 0;
    }

    let bp = self.offset_of(address);
    block::read_header(self.provider.memory(), bp).size - WSIZE
  }

  /// Walks every block between the prologue and the epilogue.
  pub fn blocks(&self) -> impl Iterator<Item = BlockInfo> + '_ {
    let mem = self.provider.memory();
    let mut bp = self.first_block();

    std::iter::from_fn(move || {
      let tag = block::read_header(mem, bp);
      if tag.size == 0 {
        return None;
      }

      let info = BlockInfo {
        offset: bp,
        size: tag.size,
        allocated: tag.allocated,
      };
      bp += tag.size;
      Some(info)
    })
  }

  /// Total size of all free blocks.
  pub fn free_bytes(&self) -> usize {
    self.blocks().filter(|b| !b.allocated).map(|b| b.size).sum()
  }

  pub fn heap_size(&self) -> usize {
    self.provider.heap_size()
  }

  pub fn stats(&self) -> &AllocatorStats {
    &self.stats
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn provider(&self) -> &P {
    &self.provider
  }

  pub(crate) fn first_block(&self) -> usize {
    self.heap_start + DSIZE
  }

  fn pointer(
    &self,
    bp: usize,
  ) -> NonNull<u8> {
    unsafe { self.provider.base().add(bp) }
  }

  fn offset_of(
    &self,
    address: *const u8,
  ) -> usize {
    let addr = address as usize;
    let low = self.provider.heap_low();

    assert!(
      addr >= low + self.first_block() && addr < low + self.provider.heap_size(),
      "pointer {address:?} does not belong to this arena"
    );

    addr - low
  }

  /// Grows the arena by at least `bytes` and returns the resulting free block,
  /// merged with a free block that ended the old arena.
  fn extend_heap(
    &mut self,
    bytes: usize,
  ) -> Result<usize> {
    let size = checked_align(bytes).ok_or(Error::SizeOverflow)?.max(MIN_BLOCK_SIZE);

    let region = self.provider.grow(size).inspect_err(|e| {
      tracing::debug!(size, error = %e, "heap extension failed");
    })?;

    let bp = region.as_ptr() as usize - self.provider.heap_low();
    self.stats.heap_extensions += 1;

    let mem = self.provider.memory_mut();
    // The old epilogue header becomes the header of the new block.
    let prev_allocated = block::read_header(mem, bp).prev_allocated;
    block::write_free(mem, bp, size, prev_allocated);
    block::write_header(mem, bp + size, Tag::new(0, true, false));

    let bp = self.coalesce(bp);
    self.free_lists.insert(self.provider.memory_mut(), bp);

    tracing::debug!(size, heap_size = self.provider.heap_size(), "heap extended");

    Ok(bp)
  }

  /// Merges the free, unlisted block at `bp` with its free neighbours and
  /// clears the `prev_allocated` bit of the block that follows. The result is
  /// not inserted into the free lists.
  fn coalesce(
    &mut self,
    bp: usize,
  ) -> usize {
    let mem = self.provider.memory_mut();
    let tag = block::read_header(mem, bp);
    let next = bp + tag.size;
    let next_tag = block::read_header(mem, next);

    let mut bp = bp;
    let mut size = tag.size;
    let mut prev_allocated = tag.prev_allocated;

    if !tag.prev_allocated {
      let prev = block::prev_block_address(mem, bp);
      let prev_tag = block::read_header(mem, prev);

      self.free_lists.remove(mem, prev);
      size += prev_tag.size;
      prev_allocated = prev_tag.prev_allocated;
      bp = prev;
    }

    if !next_tag.allocated {
      self.free_lists.remove(mem, next);
      size += next_tag.size;
    }

    block::write_free(mem, bp, size, prev_allocated);
    block::set_prev_allocated(mem, bp + size, false);

    tracing::trace!(
      bp,
      size,
      merged_prev = !tag.prev_allocated,
      merged_next = !next_tag.allocated,
      "coalesce"
    );

    bp
  }

  /// Allocates `asize` bytes at the start of the listed free block `bp`,
  /// splitting off the remainder when it can form a block of its own.
  fn place(
    &mut self,
    bp: usize,
    asize: usize,
  ) {
    let mem = self.provider.memory_mut();
    let tag = block::read_header(mem, bp);

    self.free_lists.remove(mem, bp);

    let remainder = tag.size - asize;
    if remainder >= MIN_BLOCK_SIZE {
      block::write_header(mem, bp, Tag::new(asize, true, tag.prev_allocated));

      let rest = bp + asize;
      block::write_free(mem, rest, remainder, true);
      self.free_lists.insert(mem, rest);
    } else {
      block::write_header(mem, bp, Tag::new(tag.size, true, tag.prev_allocated));
      block::set_prev_allocated(mem, bp + tag.size, true);
    }
  }

  fn free_block(
    &mut self,
    bp: usize,
  ) {
    let mem = self.provider.memory_mut();
    let tag = block::read_header(mem, bp);

    block::write_free(mem, bp, tag.size, tag.prev_allocated);

    let merged = self.coalesce(bp);
    self.free_lists.insert(self.provider.memory_mut(), merged);

    self.stats.frees += 1;
    self.stats.live_bytes -= tag.size;

    tracing::trace!(bp, size = tag.size, merged, "free");
  }

  /// Cuts the allocated block `bp` down to `asize`, releasing the tail.
  fn shrink(
    &mut self,
    bp: usize,
    old: Tag,
    asize: usize,
  ) {
    let remainder = old.size - asize;
    if remainder < MIN_BLOCK_SIZE {
      return;
    }

    let mem = self.provider.memory_mut();
    block::write_header(mem, bp, Tag::new(asize, true, old.prev_allocated));

    let rest = bp + asize;
    block::write_free(mem, rest, remainder, true);

    let merged = self.coalesce(rest);
    self.free_lists.insert(self.provider.memory_mut(), merged);

    self.stats.live_bytes -= remainder;
  }

  /// Extends the allocated block `bp` to `asize` by absorbing the free block
  /// after it, growing the arena first when `bp` ends the arena. A failed
  /// extension is returned as is, the caller must not grow the arena again.
  fn grow_in_place(
    &mut self,
    bp: usize,
    old: Tag,
    asize: usize,
  ) -> Result<bool> {
    let next = bp + old.size;
    let mut next_tag = block::read_header(self.provider.memory(), next);
    let mut available = old.size + if next_tag.allocated { 0 } else { next_tag.size };

    if available < asize {
      let after = if next_tag.allocated { next } else { next + next_tag.size };
      let is_last = block::read_header(self.provider.memory(), after).size == 0;

      if !is_last {
        return Ok(false);
      }

      let shortfall = asize - available;
      self.extend_heap(shortfall.max(self.config.get_chunk_size()))?;

      next_tag = block::read_header(self.provider.memory(), next);
      available = old.size + next_tag.size;
    }

    if next_tag.allocated || available < asize {
      return Ok(false);
    }

    let mem = self.provider.memory_mut();
    self.free_lists.remove(mem, next);

    let remainder = available - asize;
    if remainder >= MIN_BLOCK_SIZE {
      block::write_header(mem, bp, Tag::new(asize, true, old.prev_allocated));

      let rest = bp + asize;
      block::write_free(mem, rest, remainder, true);
      self.free_lists.insert(mem, rest);
    } else {
      block::write_header(mem, bp, Tag::new(available, true, old.prev_allocated));
      block::set_prev_allocated(mem, bp + available, true);
    }

    let grown = block::read_header(self.provider.memory(), bp).size;
    self.stats.live_bytes += grown - old.size;
    self.stats.update_peak();

    Ok(true)
  }
}

/// Block size needed for a `size`-byte payload: header plus payload, aligned,
/// never below [`MIN_BLOCK_SIZE`].
pub(crate) fn adjust_size(size: usize) -> Result<usize> {
  size
    .checked_add(WSIZE)
    .and_then(checked_align)
    .map(|asize| asize.max(MIN_BLOCK_SIZE))
    .ok_or(Error::SizeOverflow)
}
