//! Free list of mini blocks.
//!
//! A free block of [`crate::tag::MIN_BLOCK_SIZE`] bytes has room for its
//! header and one more word, so it can only hold a forward link. Mini blocks
//! form a singly linked LIFO stack:
//!
//! ```text
//!   head ──► ┌──────┬──────┐   ┌──────┬──────┐   ┌──────┬──────┐
//!            │ hdr  │ next ├──►│ hdr  │ next ├──►│ hdr  │  ∅   │
//!            └──────┴──────┘   └──────┴──────┘   └──────┴──────┘
//! ```
//!
//! Pushing is O(1). Removing a specific block has to walk from the head to
//! find its predecessor in the stack.

use crate::block::{BlockPtr, MiniNode};

pub(crate) struct MiniList {
  head: Option<MiniNode>,
}

impl MiniList {
  pub const fn new() -> Self {
    Self { head: None }
  }

  #[inline]
  pub fn head(&self) -> Option<MiniNode> {
    self.head
  }

  #[inline]
  pub fn head_block(&self) -> Option<BlockPtr> {
    self.head.map(MiniNode::block)
  }

  pub fn clear(&mut self) {
    self.head = None;
  }

  pub unsafe fn insert(
    &mut self,
    node: MiniNode,
  ) {
    unsafe {
      debug_assert!(self.head != Some(node), "mini block inserted twice");
      node.set_next(self.head);
    }
    self.head = Some(node);
  }

  /// Unlinks `node`, returning whether it was found.
  pub unsafe fn remove(
    &mut self,
    node: MiniNode,
  ) -> bool {
    unsafe {
      let mut prev: Option<MiniNode> = None;
      let mut current = self.head;

      while let Some(candidate) = current {
        if candidate == node {
          let next = candidate.next();

          match prev {
            Some(prev) => prev.set_next(next),
            None => self.head = next,
          }

          candidate.set_next(None);
          return true;
        }

        prev = Some(candidate);
        current = candidate.next();
      }

      false
    }
  }

  pub unsafe fn iter(&self) -> Minis {
    Minis { current: self.head }
  }
}

pub(crate) struct Minis {
  current: Option<MiniNode>,
}

impl Iterator for Minis {
  type Item = MiniNode;

  fn next(&mut self) -> Option<Self::Item> {
    let node = self.current?;
    // SAFETY: guaranteed by the caller of `MiniList::iter`.
    self.current = unsafe { node.next() };
    Some(node)
  }
}
