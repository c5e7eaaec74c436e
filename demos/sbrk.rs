use std::{io::Read, ptr};

use libc::sbrk;
use segalloc::SegAllocator;

/// Waits until the user presses ENTER, when started with `--step`.
/// Useful to inspect the process with `pmap` or `gdb` between steps.
fn pause(step: bool) {
  if step {
    println!("\n>>> Press ENTER to continue...");
    let _ = std::io::stdin().bytes().next();
  }
}

/// Prints the current program break using `sbrk(0)`.
fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    unsafe { sbrk(0) },
  );
}

fn print_alloc(
  allocator: &SegAllocator<segalloc::Sbrk>,
  size: usize,
  addr: *mut u8,
) {
  println!(
    "Allocated {} bytes, address = {:?}, usable = {}, program break = {:?}",
    size,
    addr,
    unsafe { allocator.usable_size(addr) },
    unsafe { sbrk(0) }
  );
}

fn print_heap(allocator: &SegAllocator<segalloc::Sbrk>) {
  for block in allocator.blocks() {
    let state = if block.is_allocated() { "allocated" } else { "free" };
    println!("  {:#x} {:>8} {}", block.header, block.size, state);
  }
  println!("  {:?}", allocator.occupancy());
}

fn main() {
  let step = std::env::args().any(|arg| arg == "--step");
  let mut allocator = SegAllocator::new();

  print_program_break("start");
  pause(step);

  // --------------------------------------------------------------------
  // 1) A u32: the smallest requests land in 16 byte mini blocks.
  // --------------------------------------------------------------------
  let first = allocator.allocate(size_of::<u32>());
  println!("\n[1] Allocate u32");
  print_alloc(&allocator, size_of::<u32>(), first);

  unsafe {
    let first = first as *mut u32;
    first.write(0xDEADBEEF);
    println!("[1] Value written = 0x{:X}", first.read());
  }

  pause(step);

  // --------------------------------------------------------------------
  // 2) Two medium blocks, then free both: they merge into one.
  // --------------------------------------------------------------------
  let second = allocator.allocate(100);
  let third = allocator.allocate(100);
  println!("\n[2] Allocate 2 x 100 bytes");
  print_alloc(&allocator, 100, second);
  print_alloc(&allocator, 100, third);

  unsafe {
    ptr::write_bytes(second, 0xAB, 100);
    allocator.deallocate(third);
    allocator.deallocate(second);
  }

  println!("[2] Freed both, heap is now:");
  print_heap(&allocator);
  pause(step);

  // --------------------------------------------------------------------
  // 3) The merged block serves a larger request without growing.
  // --------------------------------------------------------------------
  let fourth = allocator.allocate(200);
  println!("\n[3] Allocate 200 bytes");
  print_alloc(&allocator, 200, fourth);
  println!("[3] fourth == second? {}", fourth == second);
  pause(step);

  // --------------------------------------------------------------------
  // 4) A large block grows the heap.
  // --------------------------------------------------------------------
  print_program_break("before large alloc");

  let big = allocator.allocate(64 * 1024);
  println!("\n[4] Allocate 64 KiB");
  print_alloc(&allocator, 64 * 1024, big);

  print_program_break("after large alloc");

  // --------------------------------------------------------------------
  // 5) Resize and zeroed allocation.
  // --------------------------------------------------------------------
  let grown = unsafe { allocator.reallocate(fourth, 1000) };
  println!("\n[5] Reallocate 200 -> 1000 bytes");
  print_alloc(&allocator, 1000, grown);

  let zeroed = allocator.allocate_zeroed(16, size_of::<u64>());
  println!("[5] allocate_zeroed(16, 8)");
  print_alloc(&allocator, 16 * size_of::<u64>(), zeroed);

  println!("\n[6] Final heap:");
  print_heap(&allocator);
  println!("{:?}", allocator.stats());
  println!("heap check: {:?}", allocator.check());
}
