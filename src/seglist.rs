//! Segregated free lists for blocks larger than the minimum size.
//!
//! Free blocks are partitioned into size classes. Each class is a doubly
//! linked LIFO list threaded through the payloads of its free blocks:
//!
//! ```text
//!   heads[0]  (16, 32]      ──► ┌────┐ ◄──► ┌────┐
//!   heads[1]  (32, 64]      ──►    ∅        └────┘
//!   heads[2]  (64, 128]     ──► ┌────┐
//!     ...                       └────┘
//!   heads[9]  (8192, ∞)     ──► ┌────┐ ◄──► ┌────┐ ◄──► ┌────┐
//! ```
//!
//! Removing a block never scans: every node knows both neighbours.

use crate::block::{BlockPtr, FreeNode};

/// Number of size classes, the catch-all class included.
pub const BUCKET_COUNT: usize = 10;

/// Inclusive upper bound of every class except the last one, which takes
/// everything above `BUCKET_LIMITS[BUCKET_COUNT - 2]`.
pub const BUCKET_LIMITS: [usize; BUCKET_COUNT - 1] = [32, 64, 128, 256, 512, 1024, 2048, 4096, 8192];

/// Size class of a block (or request) of `size` bytes.
#[inline]
pub fn bucket_index(size: usize) -> usize {
  BUCKET_LIMITS
    .iter()
    .position(|&limit| size <= limit)
    .unwrap_or(BUCKET_COUNT - 1)
}

/// Table of list heads, one per size class.
pub(crate) struct SegregatedList {
  heads: [Option<FreeNode>; BUCKET_COUNT],
}

impl SegregatedList {
  pub const fn new() -> Self {
    Self {
      heads: [None; BUCKET_COUNT],
    }
  }

  /// Raw head of a class as a block, without going through [`FreeNode`].
  /// The consistency checker walks the lists this way.
  #[inline]
  pub fn head_block(
    &self,
    index: usize,
  ) -> Option<BlockPtr> {
    self.heads[index].map(FreeNode::block)
  }

  pub fn clear(&mut self) {
    self.heads = [None; BUCKET_COUNT];
  }

  /// Pushes `node` at the front of its class.
  pub unsafe fn insert(
    &mut self,
    node: FreeNode,
  ) {
    unsafe {
      let index = bucket_index(node.block().size());
      let head = self.heads[index];

      node.set_prev_free(None);
      node.set_next_free(head);

      if let Some(head) = head {
        debug_assert!(head != node, "block inserted twice");
        head.set_prev_free(Some(node));
      }

      self.heads[index] = Some(node);
    }
  }

  /// Unlinks `node` from its class using its own links.
  pub unsafe fn remove(
    &mut self,
    node: FreeNode,
  ) {
    unsafe {
      let next = node.next_free();
      let prev = node.prev_free();

      match prev {
        Some(prev) => prev.set_next_free(next),
        None => {
          let index = bucket_index(node.block().size());
          debug_assert_eq!(self.heads[index], Some(node), "block is not in its size class");
          self.heads[index] = next;
        }
      }

      if let Some(next) = next {
        next.set_prev_free(prev);
      }

      node.set_next_free(None);
      node.set_prev_free(None);
    }
  }

  /// Nodes of one class, head first.
  pub unsafe fn iter(
    &self,
    index: usize,
  ) -> Nodes {
    Nodes {
      current: self.heads[index],
    }
  }
}

/// Iterator over the nodes of a single size class.
pub(crate) struct Nodes {
  current: Option<FreeNode>,
}

impl Iterator for Nodes {
  type Item = FreeNode;

  fn next(&mut self) -> Option<Self::Item> {
    let node = self.current?;
    // SAFETY: `SegregatedList::iter` is unsafe, its caller vouches for the
    // list being well formed while the iterator lives.
    self.current = unsafe { node.next_free() };
    Some(node)
  }
}
