//! Heap consistency checker.
//!
//! Walks the heap and every free list without trusting either, so it can be
//! pointed at a corrupted heap. Checks run in a fixed order and the first
//! violation is reported:
//!
//! 1. prologue and epilogue in place, the walk ends exactly at the epilogue
//! 2. every payload aligned (sizes are multiples of 16 by construction)
//! 3. no two consecutive free blocks
//!    - predecessor bits and footers agree with the walk
//! 4. no free list links a node to itself or loops
//!    - every node lies inside the heap
//! 5. every back link is reciprocated
//! 6. every listed block is free and in the list its size selects
//! 7. the walk and the lists count the same free blocks

use std::iter;

use crate::{
  align::ALIGNMENT,
  block::BlockPtr,
  error::HeapCheckError,
  heap::SegAllocator,
  seglist::{BUCKET_COUNT, bucket_index},
  source::HeapSource,
  tag::{MIN_BLOCK_SIZE, Tag, WSIZE, Word},
};

impl<S: HeapSource> SegAllocator<S> {
  /// Verifies the heap and the free lists. Has no side effects.
  pub fn check(&self) -> Result<(), HeapCheckError> {
    let Some(start) = self.heap_start else {
      let lists = self.lists().filter(|(_, head)| head.is_some()).count();

      return match lists {
        0 => Ok(()),
        lists => Err(HeapCheckError::CountMismatch { heap: 0, lists }),
      };
    };

    unsafe {
      self.check_sentinels(start)?;
      check_block_shapes(start)?;

      let heap = check_neighbours(start)?;

      self.check_list_links(start)?;
      self.check_back_links()?;

      let lists = self.check_list_membership()?;

      if heap != lists {
        return Err(HeapCheckError::CountMismatch { heap, lists });
      }
    }

    Ok(())
  }

  /// Every free list with its head: size classes first, `None` for the
  /// mini list.
  fn lists(&self) -> impl Iterator<Item = (Option<usize>, Option<BlockPtr>)> + '_ {
    (0..BUCKET_COUNT)
      .map(|bucket| (Some(bucket), self.buckets.head_block(bucket)))
      .chain(iter::once((None, self.minis.head_block())))
  }

  fn epilogue_addr(&self) -> usize {
    self.source.hi() - WSIZE
  }

  unsafe fn check_sentinels(
    &self,
    start: BlockPtr,
  ) -> Result<(), HeapCheckError> {
    let prologue_addr = start.addr() - WSIZE;

    unsafe {
      let prologue = Tag::from_word(start.as_ptr().sub(WSIZE).cast::<Word>().read());

      if prologue_addr != self.source.lo() || prologue.size() != 0 || !prologue.is_allocated() {
        return Err(HeapCheckError::BadPrologue { addr: prologue_addr });
      }

      let epilogue = self.epilogue_addr();
      let mut block = start;

      loop {
        let addr = block.addr();
        let tag = block.tag();

        if tag.size() == 0 {
          if addr != epilogue {
            return Err(HeapCheckError::MisplacedEpilogue { addr, expected: epilogue });
          }

          if !tag.is_allocated() {
            return Err(HeapCheckError::MissingEpilogue { addr });
          }

          return Ok(());
        }

        if tag.size() > epilogue - addr {
          return Err(HeapCheckError::MissingEpilogue { addr });
        }

        block = block.next();
      }
    }
  }

  unsafe fn check_list_links(
    &self,
    start: BlockPtr,
  ) -> Result<(), HeapCheckError> {
    let epilogue = self.epilogue_addr();
    let limit = (epilogue - start.addr()) / MIN_BLOCK_SIZE;

    for (bucket, head) in self.lists() {
      let mut node = head;
      let mut count = 0;

      while let Some(block) = node {
        let addr = block.addr();

        if addr < start.addr() || addr + MIN_BLOCK_SIZE > epilogue || (addr - start.addr()) % ALIGNMENT != 0 {
          return Err(HeapCheckError::NodeOutOfBounds { addr });
        }

        let next = unsafe { block.raw_next_link() };

        if next == Some(block) {
          return Err(HeapCheckError::SelfLink { addr });
        }

        count += 1;

        if count > limit {
          return Err(HeapCheckError::ListCycle { bucket });
        }

        node = next;
      }
    }

    Ok(())
  }

  unsafe fn check_back_links(&self) -> Result<(), HeapCheckError> {
    for bucket in 0..BUCKET_COUNT {
      let mut linked_from = None;
      let mut node = self.buckets.head_block(bucket);

      while let Some(block) = node {
        unsafe {
          if block.raw_prev_link() != linked_from {
            return Err(HeapCheckError::BrokenBackLink { addr: block.addr() });
          }

          linked_from = Some(block);
          node = block.raw_next_link();
        }
      }
    }

    Ok(())
  }

  unsafe fn check_list_membership(&self) -> Result<usize, HeapCheckError> {
    let mut total = 0;

    for (bucket, head) in self.lists() {
      let mut node = head;

      while let Some(block) = node {
        let addr = block.addr();

        unsafe {
          let tag = block.tag();
          let size = tag.size();

          if tag.is_allocated() {
            return Err(HeapCheckError::AllocatedInList { addr });
          }

          let belongs = match bucket {
            Some(index) => size > MIN_BLOCK_SIZE && bucket_index(size) == index,
            None => size == MIN_BLOCK_SIZE,
          };

          if !belongs {
            return Err(HeapCheckError::WrongList { addr, size, bucket });
          }

          node = block.raw_next_link();
        }

        total += 1;
      }
    }

    Ok(total)
  }
}

/// Payload alignment of every block. Sizes need no check here: a tag only
/// holds multiples of 16 and a zero size is the epilogue, so every block the
/// walk reaches is at least [`MIN_BLOCK_SIZE`].
unsafe fn check_block_shapes(start: BlockPtr) -> Result<(), HeapCheckError> {
  let mut block = start;

  unsafe {
    while block.size() != 0 {
      if block.payload().as_ptr() as usize % ALIGNMENT != 0 {
        return Err(HeapCheckError::Misaligned { addr: block.addr() });
      }

      block = block.next();
    }
  }

  Ok(())
}

/// Adjacency first, then predecessor bits and footers. Returns the number
/// of free blocks.
unsafe fn check_neighbours(start: BlockPtr) -> Result<usize, HeapCheckError> {
  let mut free = 0;

  unsafe {
    let mut previous_free = false;
    let mut block = start;

    while block.size() != 0 {
      let is_free = !block.is_allocated();

      if is_free && previous_free {
        return Err(HeapCheckError::AdjacentFree { addr: block.addr() });
      }

      free += usize::from(is_free);
      previous_free = is_free;
      block = block.next();
    }

    let mut previous: Option<BlockPtr> = None;
    let mut block = start;

    // The epilogue is checked too, it describes the last block.
    loop {
      let addr = block.addr();
      let tag = block.tag();

      let (allocated, mini) = match previous {
        Some(previous) => (previous.is_allocated(), previous.size() == MIN_BLOCK_SIZE),
        None => (true, false),
      };

      if tag.prev_allocated() != allocated || tag.prev_mini() != mini {
        return Err(HeapCheckError::StalePrevBits { addr });
      }

      if !allocated && block.predecessor().map(|p| p.block()) != previous {
        return Err(HeapCheckError::StalePrevBits { addr });
      }

      if tag.size() == 0 {
        break;
      }

      if !tag.is_allocated() && tag.size() > MIN_BLOCK_SIZE && block.footer_tag() != tag {
        return Err(HeapCheckError::FooterMismatch { addr });
      }

      previous = Some(block);
      block = block.next();
    }
  }

  Ok(free)
}
