//! Read-only walk over the heap in address order.

use std::{marker::PhantomData, ptr::NonNull};

use crate::{
  block::{BlockPtr, Body},
  seglist::BUCKET_COUNT,
};

/// One block as seen by a heap walk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockInfo {
  /// Address of the block header.
  pub header: usize,
  /// Total block size, header included.
  pub size: usize,
  /// Payload pointer for allocated blocks, `None` for free ones.
  pub payload: Option<NonNull<u8>>,
}

impl BlockInfo {
  #[inline]
  pub fn is_allocated(&self) -> bool {
    self.payload.is_some()
  }

  #[inline]
  pub fn is_free(&self) -> bool {
    self.payload.is_none()
  }
}

/// Aggregate numbers over a heap walk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeapStats {
  /// Real blocks, sentinels excluded.
  pub blocks: usize,
  pub free_blocks: usize,
  pub free_bytes: usize,
  pub allocated_bytes: usize,
  /// Bytes obtained from the heap source so far.
  pub heap_bytes: usize,
}

/// Length of every free list.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ListOccupancy {
  /// Nodes per size class, see [`crate::seglist::bucket_index`].
  pub buckets: [usize; BUCKET_COUNT],
  pub mini: usize,
}

impl ListOccupancy {
  pub fn total(&self) -> usize {
    self.buckets.iter().sum::<usize>() + self.mini
  }
}

/// Iterator returned by [`crate::SegAllocator::blocks`]. Stops at the
/// epilogue.
pub struct Blocks<'a> {
  current: Option<BlockPtr>,
  marker: PhantomData<&'a ()>,
}

impl<'a> Blocks<'a> {
  /// Walk starting at `start`, which must be the first block of a well
  /// formed heap that stays untouched for `'a`.
  pub(crate) unsafe fn new(start: Option<BlockPtr>) -> Self {
    Self {
      current: start,
      marker: PhantomData,
    }
  }
}

impl Iterator for Blocks<'_> {
  type Item = BlockInfo;

  fn next(&mut self) -> Option<Self::Item> {
    let block = self.current?;

    // SAFETY: the heap is well formed and borrowed for the whole walk, see
    // `Blocks::new`.
    unsafe {
      let size = block.size();

      if size == 0 {
        self.current = None;
        return None;
      }

      self.current = Some(block.next());

      let payload = match block.body() {
        Body::Allocated(payload) => Some(payload),
        Body::Free(_) | Body::Mini(_) => None,
      };

      Some(BlockInfo {
        header: block.addr(),
        size,
        payload,
      })
    }
  }
}

impl HeapStats {
  pub(crate) fn collect(
    blocks: Blocks<'_>,
    heap_bytes: usize,
  ) -> Self {
    blocks.fold(
      Self {
        heap_bytes,
        ..Self::default()
      },
      |mut stats, block| {
        stats.blocks += 1;

        if block.is_free() {
          stats.free_blocks += 1;
          stats.free_bytes += block.size;
        } else {
          stats.allocated_bytes += block.size;
        }

        stats
      },
    )
  }
}
