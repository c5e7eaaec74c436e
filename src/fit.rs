//! Fit selection.
//!
//! Minimum sized requests are served from the mini list when it has
//! anything. Everything else starts at the request's size class and walks
//! up. In the first class that holds a block large enough, the search keeps
//! looking at a bounded number of following nodes for a tighter fit before
//! settling:
//!
//! ```text
//!   (64, 128]:  ┌────┐   ┌────┐   ┌────┐   ┌────┐
//!               │ 80 │──►│128 │──►│112 │──►│ 96 │ ...
//!               └────┘   └────┘   └────┘   └────┘
//!   asize = 96   small    ▲ first  ▲ better ▲ best, if still
//!                           fit               inside the window
//! ```
//!
//! Later classes are not consulted once a fit was found.

use crate::{
  block::{BlockPtr, FreeNode},
  mini::MiniList,
  seglist::{BUCKET_COUNT, SegregatedList, bucket_index},
  tag::MIN_BLOCK_SIZE,
};

/// Number of nodes examined after the first fit when no configuration says
/// otherwise.
pub const DEFAULT_FIT_LOOKAHEAD: usize = 20;

/// Finds a free block of at least `asize` bytes, or `None` when neither the
/// mini list nor any class from `bucket_index(asize)` upwards has one.
///
/// The block is returned still linked in its list.
pub(crate) unsafe fn find_fit(
  lists: &SegregatedList,
  minis: &MiniList,
  asize: usize,
  lookahead: usize,
) -> Option<BlockPtr> {
  unsafe {
    if asize == MIN_BLOCK_SIZE {
      if let Some(node) = minis.head() {
        return Some(node.block());
      }
    }

    for index in bucket_index(asize)..BUCKET_COUNT {
      let mut nodes = lists.iter(index);

      if let Some(first) = nodes.by_ref().find(|node| node.block().size() >= asize) {
        return Some(best_in_window(first, nodes, asize, lookahead).block());
      }
    }

    None
  }
}

/// Smallest satisfying node among `first` and up to `lookahead` nodes
/// after it. An exact fit ends the search right away.
unsafe fn best_in_window(
  first: FreeNode,
  rest: impl Iterator<Item = FreeNode>,
  asize: usize,
  lookahead: usize,
) -> FreeNode {
  unsafe {
    let mut best = first;
    let mut best_size = first.block().size();

    for node in rest.take(lookahead) {
      if best_size == asize {
        break;
      }

      let size = node.block().size();
      if size >= asize && size < best_size {
        best = node;
        best_size = size;
      }
    }

    best
  }
}
