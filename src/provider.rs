use std::{
  alloc::{self, Layout},
  io, ptr,
  ptr::NonNull,
  slice,
};

use libc::{c_void, intptr_t, sbrk};

use crate::{
  config::ALIGNMENT,
  error::{Error, Result},
};

/// Source of raw arena memory. The arena only ever grows at its high end.
///
/// # Safety
///
/// Implementors guarantee that `heap_size()` bytes starting at `base()` are
/// readable and writable, stay at the same address for the lifetime of the
/// provider, and that `base()` is aligned to [`ALIGNMENT`].
pub unsafe trait MemoryProvider {
  /// Extends the arena by exactly `bytes` and returns the start of the new region
  /// (the previous break).
  fn grow(
    &mut self,
    bytes: usize,
  ) -> Result<NonNull<u8>>;

  /// First byte of the arena.
  fn base(&self) -> NonNull<u8>;

  /// Current number of bytes in the arena.
  fn heap_size(&self) -> usize;

  fn heap_low(&self) -> usize {
    self.base().as_ptr() as usize
  }

  /// Address of the last byte in the arena.
  fn heap_high(&self) -> usize {
    (self.heap_low() + self.heap_size()).wrapping_sub(1)
  }

  fn memory(&self) -> &[u8] {
    unsafe { slice::from_raw_parts(self.base().as_ptr(), self.heap_size()) }
  }

  fn memory_mut(&mut self) -> &mut [u8] {
    unsafe { slice::from_raw_parts_mut(self.base().as_ptr(), self.heap_size()) }
  }
}

/// Fixed-capacity arena carved out of a single zeroed allocation. The break
/// moves inside the buffer and the buffer itself never moves.
pub struct MemLib {
  base: NonNull<u8>,
  layout: Layout,
  brk: usize,
}

impl MemLib {
  pub fn new(capacity: usize) -> Result<Self> {
    let layout = Layout::from_size_align(capacity.max(ALIGNMENT), ALIGNMENT)
      .map_err(|e| Error::InvalidConfig(e.to_string()))?;

    let base = NonNull::new(unsafe { alloc::alloc_zeroed(layout) }).ok_or(Error::OutOfMemory {
      requested: layout.size(),
      available: 0,
    })?;

    tracing::debug!(capacity = layout.size(), "memlib reserved");

    Ok(Self { base, layout, brk: 0 })
  }

  pub fn capacity(&self) -> usize {
    self.layout.size()
  }

  /// Rewinds the break to the start of the buffer.
  pub fn reset(&mut self) {
    self.brk = 0;
  }
}

unsafe impl MemoryProvider for MemLib {
  fn grow(
    &mut self,
    bytes: usize,
  ) -> Result<NonNull<u8>> {
    let available = self.capacity() - self.brk;

    if bytes > available {
      return Err(Error::OutOfMemory {
        requested: bytes,
        available,
      });
    }

    let old_brk = unsafe { self.base.add(self.brk) };
    self.brk += bytes;

    Ok(old_brk)
  }

  fn base(&self) -> NonNull<u8> {
    self.base
  }

  fn heap_size(&self) -> usize {
    self.brk
  }
}

impl Drop for MemLib {
  fn drop(&mut self) {
    unsafe { alloc::dealloc(self.base.as_ptr(), self.layout) };
  }
}

/// Arena on top of the process data segment, grown with `sbrk(2)`.
///
/// Growth fails with [`Error::NonContiguous`] if anything else in the process
/// moved the break since the last growth. Memory is never handed back.
pub struct SbrkProvider {
  base: NonNull<u8>,
  size: usize,
}

const SBRK_FAILED: *mut c_void = usize::MAX as *mut c_void;

impl SbrkProvider {
  pub fn new() -> Result<Self> {
    let current = unsafe { sbrk(0) };

    if current == SBRK_FAILED {
      return Err(io::Error::last_os_error().into());
    }

    let padding = (current as usize).next_multiple_of(ALIGNMENT) - current as usize;

    let base = if padding == 0 {
      current
    } else {
      let prev = unsafe { sbrk(padding as intptr_t) };

      if prev == SBRK_FAILED {
        return Err(io::Error::last_os_error().into());
      }

      unsafe { prev.cast::<u8>().add(padding).cast::<c_void>() }
    };

    let base = NonNull::new(base.cast::<u8>()).ok_or(Error::NonContiguous)?;

    tracing::debug!(base = ?base, padding, "sbrk provider initialised");

    Ok(Self { base, size: 0 })
  }
}

unsafe impl MemoryProvider for SbrkProvider {
  fn grow(
    &mut self,
    bytes: usize,
  ) -> Result<NonNull<u8>> {
    let increment = intptr_t::try_from(bytes).map_err(|_| Error::SizeOverflow)?;

    let expected = unsafe { self.base.as_ptr().add(self.size) };
    let prev = unsafe { sbrk(increment) };

    if prev == SBRK_FAILED {
      return Err(io::Error::last_os_error().into());
    }

    if !ptr::eq(prev.cast::<u8>(), expected) {
      return Err(Error::NonContiguous);
    }

    self.size += bytes;

    NonNull::new(prev.cast::<u8>()).ok_or(Error::NonContiguous)
  }

  fn base(&self) -> NonNull<u8> {
    self.base
  }

  fn heap_size(&self) -> usize {
    self.size
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_utils::sbrk_guard;

  #[test]
  fn test_memlib_grow() {
    let mut memlib = MemLib::new(1024).unwrap();

    assert_eq!(memlib.heap_size(), 0);
    assert_eq!(memlib.heap_low() % ALIGNMENT, 0);
    assert_eq!(memlib.heap_high(), memlib.heap_low() - 1);

    let first = memlib.grow(64).unwrap();
    let second = memlib.grow(128).unwrap();

    assert_eq!(first, memlib.base());
    assert_eq!(second.as_ptr() as usize, memlib.heap_low() + 64);
    assert_eq!(memlib.heap_size(), 192);
    assert_eq!(memlib.heap_high(), memlib.heap_low() + 191);
    assert!(memlib.memory().iter().all(|&b| b == 0));

    memlib.memory_mut()[191] = 7;
    assert_eq!(memlib.memory()[191], 7);
  }

  #[test]
  fn test_memlib_exhaustion() {
    let mut memlib = MemLib::new(256).unwrap();

    memlib.grow(200).unwrap();

    match memlib.grow(100) {
      Err(Error::OutOfMemory {
        requested,
        available,
      }) => {
        assert_eq!(requested, 100);
        assert_eq!(available, 56);
      }
      other => panic!("unexpected result {:?}", other.map(|_| ())),
    }

    // A failed growth leaves the break where it was.
    assert_eq!(memlib.heap_size(), 200);

    memlib.reset();
    assert_eq!(memlib.heap_size(), 0);
    assert!(memlib.grow(256).is_ok());
  }

  #[test]
  fn test_sbrk_provider() {
    let _guard = sbrk_guard();
    let mut provider = SbrkProvider::new().unwrap();

    assert_eq!(provider.heap_low() % ALIGNMENT, 0);

    // Other threads may move the break concurrently through malloc; a
    // non-contiguous growth is reported, never silently accepted.
    match provider.grow(4096) {
      Ok(region) => {
        assert_eq!(region, provider.base());
        assert_eq!(provider.heap_size(), 4096);

        provider.memory_mut()[4095] = 0xAB;
        assert_eq!(provider.memory()[4095], 0xAB);
      }
      Err(Error::NonContiguous) => assert_eq!(provider.heap_size(), 0),
      Err(e) => panic!("sbrk failed: {e}"),
    }
  }
}
