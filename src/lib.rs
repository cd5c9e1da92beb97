//! # segalloc - A Segregated-Fit Memory Allocator Library
//!
//! This crate provides a general purpose **segregated free list allocator**
//! with boundary-tag coalescing. It manages one contiguous arena that only
//! ever grows at its high end.
//!
//! ## Overview
//!
//! ```text
//!   Arena Layout:
//!
//!   ┌─────┬──────────┬─────────┬─────────┬───────────────┬─────────┬─────┐
//!   │ pad │ prologue │ block A │ block B │    block C    │ block D │ epi │
//!   │     │  (16|1)  │ (alloc) │ (free)  │    (alloc)    │ (free)  │(0|1)│
//!   └─────┴──────────┴─────────┴─────────┴───────────────┴─────────┴─────┘
//!                                   │                         │
//!   Free lists (one per size class) │                         │
//!   ┌─────────┐                     │                         │
//!   │ ≤ 32    │ ──► ∅               │                         │
//!   │ 33..64  │ ──► B ◄─────────────┘                         │
//!   │ 65..128 │ ──► ∅                                         │
//!   │ ...     │                                               │
//!   │ > 512K  │ ──► D ◄───────────────────────────────────────┘
//!   └─────────┘
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   segalloc
//!   ├── align      - Alignment macro (align!)
//!   ├── block      - Boundary tags: header/footer packing, neighbour lookup
//!   ├── config     - Layout constants and runtime Config
//!   ├── free_list  - Segregated free list index
//!   ├── allocator  - Allocate / deallocate / reallocate
//!   ├── check      - Heap validator
//!   ├── provider   - Memory providers (owned buffer, sbrk)
//!   └── stats      - Allocation counters
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use segalloc::Allocator;
//!
//! fn main() -> segalloc::Result<()> {
//!     let mut allocator = Allocator::new()?;
//!
//!     let ptr = allocator.allocate(64)?;
//!
//!     unsafe {
//!         ptr.as_ptr().write_bytes(0xAB, 64);
//!
//!         let ptr = allocator.reallocate(ptr.as_ptr(), 256)?.unwrap();
//!         assert_eq!(*ptr.as_ptr(), 0xAB);
//!
//!         allocator.deallocate(ptr.as_ptr());
//!     }
//!
//!     assert!(allocator.validate("quick start").is_empty());
//!     Ok(())
//! }
//! ```
//!
//! ## How It Works
//!
//! Each block starts with a one word header. The size is a multiple of the
//! alignment, so the two low bits are free to carry flags:
//!
//! ```text
//!   Header word:
//!   ┌──────────────────────────────────────────────┬───┬───┐
//!   │                  block size                  │ p │ a │
//!   └──────────────────────────────────────────────┴───┴───┘
//!                                                    │   └── this block is allocated
//!                                                    └────── previous block is allocated
//! ```
//!
//! Free blocks repeat the header in a footer, which is what lets a freed
//! block find its left neighbour. Allocated blocks skip the footer; the
//! `p` bit in the next header says all the right neighbour needs to know.
//!
//! - **Allocation**: the request plus one header word is rounded up to the
//!   alignment. The free lists are searched first-fit, starting at the
//!   request's own size class. Oversized blocks are split. When nothing fits
//!   the arena grows by at least one chunk.
//! - **Deallocation**: the block is merged right away with whichever
//!   neighbours are free, so no two free blocks are ever adjacent.
//! - **Reallocation**: shrinks in place, grows in place into a free right
//!   neighbour (or fresh arena space when the block is last), and only
//!   falls back to allocate-copy-free otherwise.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: No synchronization primitives
//! - **Grow only**: Memory is never handed back to the provider
//! - **Fixed alignment**: Payloads are aligned to two machine words, no more
//!
//! ## Safety
//!
//! Internally every address is an offset into the arena and every access is
//! bounds checked. The pointers handed out are raw, so `deallocate`,
//! `reallocate` and `usable_size` are `unsafe`: they trust the caller to pass
//! a pointer this allocator returned.

pub mod align;
mod allocator;
pub mod block;
mod check;
pub mod config;
mod error;
pub mod free_list;
mod provider;
mod stats;

#[cfg(test)]
mod test_utils;

pub use allocator::Allocator;
pub use block::BlockInfo;
pub use check::Violation;
pub use config::{ALIGNMENT, CHUNK_SIZE, Config, MIN_BLOCK_SIZE};
pub use error::{Error, Result};
pub use provider::{MemLib, MemoryProvider, SbrkProvider};
pub use stats::AllocatorStats;
