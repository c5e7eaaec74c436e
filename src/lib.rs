//! # segalloc - A Segregated Free List Allocator
//!
//! This crate implements a general purpose `malloc`-style allocator on top of
//! a single contiguous heap that only ever grows at its end, by default
//! through `sbrk(2)`.
//!
//! ## Overview
//!
//! Every block starts with a one word header. Free blocks additionally carry
//! list links and, unless they are minimal, a footer mirroring the header, so
//! that a freed block can find and absorb a free predecessor in O(1):
//!
//! ```text
//!   Allocated block:                 Free block (> 16 bytes):
//!
//!   ┌──────────────────────┐         ┌──────────────────────┐
//!   │ header  size | A P M │ ◄ hdr   │ header  size | - P M │
//!   ├──────────────────────┤         ├──────────────────────┤
//!   │                      │ ◄ ptr   │ next free            │
//!   │     payload          │         │ prev free            │
//!   │  (size - 8 bytes)    │         │        ...           │
//!   │                      │         ├──────────────────────┤
//!   └──────────────────────┘         │ footer  size | - P M │
//!                                    └──────────────────────┘
//!
//!   A = allocated, P = predecessor allocated, M = predecessor is mini
//!
//!   Mini block (exactly 16 bytes, free):
//!
//!   ┌──────────────────────┬──────────────────────┐
//!   │ header  16 | - P M   │ next mini            │
//!   └──────────────────────┴──────────────────────┘
//! ```
//!
//! Headers sit 8 bytes before a 16-byte boundary, so every payload is 16-byte
//! aligned and every block size is a multiple of 16.
//!
//! ## Free Lists
//!
//! ```text
//!   minis       ──► [16] ──► [16] ──► null            (singly linked)
//!
//!   buckets[0]  (16, 32]    ──► [32] ◄──► [32]        (doubly linked)
//!   buckets[1]  (32, 64]    ──► [48] ◄──► [64] ◄──► [48]
//!   buckets[2]  (64, 128]   ──► null
//!      ...
//!   buckets[8]  (4096, 8192]
//!   buckets[9]  (8192, ∞)   ──► [12288]
//! ```
//!
//! Requests are served from the smallest class that can hold them, taking
//! the tightest block among the first fit and a bounded number of nodes
//! after it. Blocks larger than needed are split; freed blocks are merged
//! with free neighbours immediately, so two free blocks are never adjacent.
//!
//! ## Crate Structure
//!
//! ```text
//!   segalloc
//!   ├── align      - Alignment macros (align!, align_to!)
//!   ├── tag        - Header/footer word packing
//!   ├── block      - Block views and navigation (internal)
//!   ├── seglist    - Size classes and the segregated lists
//!   ├── mini       - Mini block list (internal)
//!   ├── fit        - Bounded best fit search (internal)
//!   ├── source     - Heap growth primitives (Sbrk, Arena)
//!   ├── heap       - SegAllocator: allocate, deallocate, reallocate
//!   ├── check      - Heap consistency checker (internal)
//!   ├── walk       - Read-only heap walk and statistics
//!   ├── config     - HeapConfig
//!   └── error      - GrowError, HeapCheckError
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use segalloc::{Arena, HeapConfig, SegAllocator};
//!
//! let mut heap = SegAllocator::with_source(Arena::new(1 << 16).unwrap(), HeapConfig::default());
//!
//! let ptr = heap.allocate(24) as *mut u64;
//! assert_eq!(ptr as usize % 16, 0);
//!
//! unsafe {
//!   ptr.write(42);
//!   assert_eq!(ptr.read(), 42);
//!   heap.deallocate(ptr.cast());
//! }
//!
//! assert_eq!(heap.check(), Ok(()));
//! ```
//!
//! ## Limitations
//!
//! - **Single-threaded only**: No synchronization primitives
//! - **Never shrinks**: Memory is not returned to the OS
//! - **64-bit only**: The block layout assumes 8 byte words
//! - **Unix-only**: The default source requires `libc` and `sbrk`
//!
//! ## Logging
//!
//! Operations are traced through the [`log`] facade: every request and merge
//! at `trace`, heap growth and [`SegAllocator::dump`] at `debug`, failed
//! requests at `warn`.

#[cfg(not(target_pointer_width = "64"))]
compile_error!("segalloc only supports 64-bit targets");

pub mod align;
mod block;
mod check;
pub mod config;
pub mod error;
mod fit;
mod heap;
mod mini;
pub mod seglist;
pub mod source;
pub mod tag;
pub mod walk;

pub use config::HeapConfig;
pub use error::{GrowError, HeapCheckError};
pub use fit::DEFAULT_FIT_LOOKAHEAD;
pub use heap::{SegAllocator, adjusted_size};
pub use source::{Arena, HeapSource, Sbrk};
pub use walk::{BlockInfo, Blocks, HeapStats, ListOccupancy};
