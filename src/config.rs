//! Layout constants and runtime configuration.

use std::mem;

use crate::error::{Error, Result};

/// Word size: one header, footer or free-list link.
pub const WSIZE: usize = mem::size_of::<usize>();

/// Double word.
pub const DSIZE: usize = 2 * WSIZE;

/// Payload alignment. Every payload address and every block size is a multiple of it.
pub const ALIGNMENT: usize = DSIZE;

/// Smallest block that can hold a header, two free-list links and a footer.
pub const MIN_BLOCK_SIZE: usize = 2 * DSIZE;

/// Default amount the arena grows by when no free block fits.
pub const CHUNK_SIZE: usize = 1 << 12;

/// Number of segregated size classes.
pub const LIST_COUNT: usize = 16;

/// Upper bound of size class 0. Each following class doubles it.
pub const FIRST_CLASS_LIMIT: usize = 32;

/// Default capacity of the owned-buffer provider (20 MiB, same as memlib).
pub const DEFAULT_MAX_HEAP: usize = 20 * (1 << 20);

/// Padding word + prologue header + prologue footer + epilogue header.
pub const PROLOGUE_SIZE: usize = 4 * WSIZE;

const _: () = assert!(ALIGNMENT.is_power_of_two());
const _: () = assert!(MIN_BLOCK_SIZE % ALIGNMENT == 0);
const _: () = assert!(CHUNK_SIZE % ALIGNMENT == 0);

/// Runtime knobs of an [`Allocator`](crate::Allocator).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
  chunk_size: usize,
  max_heap: usize,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      chunk_size: CHUNK_SIZE,
      max_heap: DEFAULT_MAX_HEAP,
    }
  }
}

impl Config {
  pub fn new() -> Self {
    Self::default()
  }

  /// Minimum number of bytes requested from the provider per growth.
  pub fn chunk_size(
    mut self,
    size: usize,
  ) -> Self {
    self.chunk_size = size;
    self
  }

  /// Capacity handed to [`MemLib`](crate::MemLib) by [`Allocator::new`](crate::Allocator::new).
  pub fn max_heap(
    mut self,
    size: usize,
  ) -> Self {
    self.max_heap = size;
    self
  }

  pub fn get_chunk_size(&self) -> usize {
    self.chunk_size
  }

  pub fn get_max_heap(&self) -> usize {
    self.max_heap
  }

  pub fn validate(&self) -> Result<()> {
    if self.chunk_size < MIN_BLOCK_SIZE || self.chunk_size % ALIGNMENT != 0 {
      return Err(Error::InvalidConfig(format!(
        "chunk size {} must be a multiple of {} and at least {}",
        self.chunk_size, ALIGNMENT, MIN_BLOCK_SIZE
      )));
    }

    if self.max_heap < PROLOGUE_SIZE + self.chunk_size {
      return Err(Error::InvalidConfig(format!(
        "max heap {} cannot hold the prologue and one chunk of {}",
        self.max_heap, self.chunk_size
      )));
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_is_valid() {
    let config = Config::default();

    assert!(config.validate().is_ok());
    assert_eq!(config.get_chunk_size(), CHUNK_SIZE);
    assert_eq!(config.get_max_heap(), DEFAULT_MAX_HEAP);
  }

  #[test]
  fn test_rejects_bad_chunk_size() {
    assert!(matches!(
      Config::new().chunk_size(MIN_BLOCK_SIZE + 1).validate(),
      Err(Error::InvalidConfig(_))
    ));
    assert!(matches!(
      Config::new().chunk_size(ALIGNMENT).validate(),
      Err(Error::InvalidConfig(_))
    ));
  }

  #[test]
  fn test_rejects_tiny_heap() {
    let config = Config::new().chunk_size(256).max_heap(256);

    assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    assert!(config.max_heap(256 + PROLOGUE_SIZE).validate().is_ok());
  }
}
