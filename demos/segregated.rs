use std::{io::Read, ptr::NonNull};

use segalloc::{Allocator, MemoryProvider};
use tracing_subscriber::EnvFilter;

/// Waits until the user presses ENTER when started with `--step`.
fn block_until_enter_pressed(step: bool) {
  if step {
    println!("\n>>> Press ENTER to continue...");
    let _ = std::io::stdin().bytes().next();
  }
}

/// Prints every block between the prologue and the epilogue.
fn print_heap(
  label: &str,
  allocator: &Allocator,
) {
  println!(
    "[{}] heap = {} bytes, free = {} bytes",
    label,
    allocator.heap_size(),
    allocator.free_bytes()
  );

  for block in allocator.blocks() {
    println!(
      "    @{:<6} {:>6} bytes  {}",
      block.offset,
      block.size,
      if block.allocated { "allocated" } else { "free" }
    );
  }
}

fn offset(
  allocator: &Allocator,
  ptr: NonNull<u8>,
) -> usize {
  ptr.as_ptr() as usize - allocator.provider().heap_low()
}

fn main() -> segalloc::Result<()> {
  tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

  let step = std::env::args().any(|arg| arg == "--step");
  let mut allocator = Allocator::new()?;

  print_heap("start", &allocator);
  block_until_enter_pressed(step);

  // --------------------------------------------------------------------
  // 1) Three small allocations carved from the initial chunk.
  // --------------------------------------------------------------------
  let a = allocator.allocate(24)?;
  let b = allocator.allocate(40)?;
  let c = allocator.allocate(200)?;
  println!(
    "\n[1] a @{}, b @{}, c @{}",
    offset(&allocator, a),
    offset(&allocator, b),
    offset(&allocator, c)
  );
  print_heap("1", &allocator);
  block_until_enter_pressed(step);

  // --------------------------------------------------------------------
  // 2) Free `a` and ask for 16 bytes: the freed block is reused.
  // --------------------------------------------------------------------
  unsafe { allocator.deallocate(a.as_ptr()) };
  let d = allocator.allocate(16)?;
  println!("\n[2] d == a? {}", d == a);
  block_until_enter_pressed(step);

  // --------------------------------------------------------------------
  // 3) Free `d` and `b`: the two neighbours merge into one free block.
  // --------------------------------------------------------------------
  unsafe {
    allocator.deallocate(d.as_ptr());
    allocator.deallocate(b.as_ptr());
  }
  print_heap("3", &allocator);
  block_until_enter_pressed(step);

  // --------------------------------------------------------------------
  // 4) Grow `c`: it absorbs the free space after it without moving.
  // --------------------------------------------------------------------
  unsafe { c.as_ptr().write_bytes(0xAB, 200) };
  let grown = unsafe { allocator.reallocate(c.as_ptr(), 1000)? };
  println!("\n[4] reallocated in place? {}", grown == Some(c));
  print_heap("4", &allocator);
  block_until_enter_pressed(step);

  // --------------------------------------------------------------------
  // 5) A large request grows the arena.
  // --------------------------------------------------------------------
  let big = allocator.allocate(64 * 1024)?;
  println!("\n[5] 64 KiB block @{}", offset(&allocator, big));
  print_heap("5", &allocator);

  let violations = allocator.validate("demo");
  println!("\n[6] heap check: {} violation(s)", violations.len());
  println!("{:#?}", allocator.stats());

  Ok(())
}
