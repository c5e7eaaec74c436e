//! In-place block addressing.
//!
//! A [`BlockPtr`] points at a block header inside the heap. Allocated blocks
//! only carry the header, free blocks reuse their payload for free-list
//! links and, unless they are mini blocks, end with a footer:
//!
//! ```text
//!   Allocated:       Free (size > 16):      Free mini (size == 16):
//!   ┌────────────┐   ┌────────────────┐     ┌────────────────┐
//!   │  header    │   │  header        │     │  header        │
//!   ├────────────┤   ├────────────────┤     ├────────────────┤
//!   │            │   │  next free     │     │  next mini     │
//!   │  payload   │   ├────────────────┤     └────────────────┘
//!   │            │   │  prev free     │
//!   │            │   ├────────────────┤
//!   │            │   │  ...           │
//!   │            │   ├────────────────┤
//!   │            │   │  footer        │
//!   └────────────┘   └────────────────┘
//! ```
//!
//! Which of the three shapes a block has is decided by its header alone, see
//! [`BlockPtr::body`]. The link fields are only reachable through the
//! [`FreeNode`] and [`MiniNode`] views handed out for free blocks.

use std::ptr::{self, NonNull};

use crate::tag::{MIN_BLOCK_SIZE, Tag, WSIZE, Word};

/// Offset of the forward link inside a free block.
const NEXT_OFFSET: usize = WSIZE;

/// Offset of the backward link inside a non-mini free block.
const PREV_OFFSET: usize = 2 * WSIZE;

/// Address of a block header inside the heap.
///
/// All methods are unsafe for the same reason: the pointer must point at a
/// header written by the allocator, inside memory the allocator owns, and
/// the heap around it must satisfy the layout invariants each method
/// documents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub(crate) struct BlockPtr(NonNull<u8>);

/// How the physically preceding block was located. A free predecessor
/// either has a footer describing its size, or it is a mini block that
/// starts exactly [`MIN_BLOCK_SIZE`] bytes earlier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Predecessor {
  FooterDescribed(BlockPtr),
  FixedOffsetMini(BlockPtr),
}

impl Predecessor {
  #[inline]
  pub fn block(self) -> BlockPtr {
    match self {
      Self::FooterDescribed(block) | Self::FixedOffsetMini(block) => block,
    }
  }
}

/// What the bytes after a header currently mean.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Body {
  /// Client payload, starting at the given address.
  Allocated(NonNull<u8>),
  /// Doubly linked node of a segmented free list.
  Free(FreeNode),
  /// Singly linked node of the mini list.
  Mini(MiniNode),
}

/// A free block larger than [`MIN_BLOCK_SIZE`], seen as a list node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct FreeNode(BlockPtr);

/// A free block of exactly [`MIN_BLOCK_SIZE`] bytes, seen as a list node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct MiniNode(BlockPtr);

impl BlockPtr {
  #[inline]
  pub const fn new(header: NonNull<u8>) -> Self {
    Self(header)
  }

  /// Block whose header sits right before `payload`.
  #[inline]
  pub unsafe fn from_payload(payload: NonNull<u8>) -> Self {
    unsafe { Self(payload.sub(WSIZE)) }
  }

  #[inline]
  pub fn as_ptr(self) -> *mut u8 {
    self.0.as_ptr()
  }

  #[inline]
  pub fn addr(self) -> usize {
    self.0.as_ptr() as usize
  }

  #[inline]
  pub fn payload(self) -> NonNull<u8> {
    unsafe { self.0.add(WSIZE) }
  }

  #[inline]
  pub unsafe fn tag(self) -> Tag {
    unsafe { Tag::from_word(self.0.cast::<Word>().read()) }
  }

  #[inline]
  pub unsafe fn set_tag(
    self,
    tag: Tag,
  ) {
    unsafe { self.0.cast::<Word>().write(tag.to_word()) }
  }

  #[inline]
  pub unsafe fn size(self) -> usize {
    unsafe { self.tag().size() }
  }

  #[inline]
  pub unsafe fn is_allocated(self) -> bool {
    unsafe { self.tag().is_allocated() }
  }

  #[inline]
  pub unsafe fn prev_allocated(self) -> bool {
    unsafe { self.tag().prev_allocated() }
  }

  #[inline]
  pub unsafe fn prev_mini(self) -> bool {
    unsafe { self.tag().prev_mini() }
  }

  #[inline]
  pub unsafe fn is_mini(self) -> bool {
    unsafe { self.size() == MIN_BLOCK_SIZE }
  }

  /// Bytes the client may use when the block is allocated.
  #[inline]
  pub unsafe fn usable_size(self) -> usize {
    unsafe { self.size() - WSIZE }
  }

  /// Address of the last word of the block. Only meaningful as a footer
  /// while the block is free and not mini.
  #[inline]
  pub unsafe fn footer(self) -> NonNull<Word> {
    unsafe {
      debug_assert!(self.size() != 0, "footer of the epilogue");
      self.0.add(self.size() - WSIZE).cast()
    }
  }

  #[inline]
  pub unsafe fn footer_tag(self) -> Tag {
    unsafe { Tag::from_word(self.footer().read()) }
  }

  /// The physically following block.
  #[inline]
  pub unsafe fn next(self) -> Self {
    unsafe {
      debug_assert!(self.size() != 0, "next block of the epilogue");
      Self(self.0.add(self.size()))
    }
  }

  /// Reads the word right before this header as a footer and returns the
  /// block it describes. Only valid when the predecessor is free and not
  /// mini. A zero sized footer is the prologue, which is returned as is.
  #[inline]
  pub unsafe fn predecessor_via_footer(self) -> Self {
    unsafe {
      let footer = self.0.sub(WSIZE);
      let size = Tag::from_word(footer.cast::<Word>().read()).size();

      if size == 0 {
        return Self(footer);
      }

      Self(self.0.sub(size))
    }
  }

  /// Locates the previous block if, and only if, it is free. The
  /// `prev_mini` bit decides between the footer and the fixed offset.
  #[inline]
  pub unsafe fn predecessor(self) -> Option<Predecessor> {
    unsafe {
      let tag = self.tag();

      if tag.prev_allocated() {
        return None;
      }

      let predecessor = if tag.prev_mini() {
        Predecessor::FixedOffsetMini(Self(self.0.sub(MIN_BLOCK_SIZE)))
      } else {
        Predecessor::FooterDescribed(self.predecessor_via_footer())
      };

      Some(predecessor)
    }
  }

  /// Interprets the bytes after the header according to the header.
  #[inline]
  pub unsafe fn body(self) -> Body {
    unsafe {
      let tag = self.tag();

      if tag.is_allocated() {
        Body::Allocated(self.payload())
      } else if tag.size() == MIN_BLOCK_SIZE {
        Body::Mini(MiniNode::new(self))
      } else {
        Body::Free(FreeNode::new(self))
      }
    }
  }

  /// Writes a complete block: header, footer when free and larger than the
  /// minimum, and refreshes the successor's description of this block.
  ///
  /// The successor header (a real block or the epilogue) must already be
  /// in place.
  pub unsafe fn write(
    self,
    size: usize,
    allocated: bool,
    prev_allocated: bool,
    prev_mini: bool,
  ) {
    unsafe {
      debug_assert!(size >= MIN_BLOCK_SIZE);

      let tag = Tag::pack(size, allocated, prev_allocated, prev_mini);
      self.set_tag(tag);

      if !allocated && size != MIN_BLOCK_SIZE {
        self.footer().write(tag.to_word());
      }

      self.next().refresh_prev(allocated, size == MIN_BLOCK_SIZE);
    }
  }

  /// Rewrites the predecessor bits of this block, keeping a footer in sync
  /// when there is one.
  pub unsafe fn refresh_prev(
    self,
    prev_allocated: bool,
    prev_mini: bool,
  ) {
    unsafe {
      let tag = self.tag().with_prev(prev_allocated, prev_mini);
      self.set_tag(tag);

      if tag.size() > MIN_BLOCK_SIZE && !tag.is_allocated() {
        self.footer().write(tag.to_word());
      }
    }
  }

  /// Writes the zero sized epilogue header at this address.
  #[inline]
  pub unsafe fn write_epilogue(
    self,
    prev_allocated: bool,
    prev_mini: bool,
  ) {
    unsafe { self.set_tag(Tag::epilogue(prev_allocated, prev_mini)) }
  }

  /// Raw read of the forward link word, regardless of the block state.
  /// Used by the consistency checker, which cannot trust the header.
  #[inline]
  pub unsafe fn raw_next_link(self) -> Option<Self> {
    unsafe { self.read_link(NEXT_OFFSET) }
  }

  /// Raw read of the backward link word. See [`Self::raw_next_link`].
  #[inline]
  pub unsafe fn raw_prev_link(self) -> Option<Self> {
    unsafe { self.read_link(PREV_OFFSET) }
  }

  #[inline]
  unsafe fn read_link(
    self,
    offset: usize,
  ) -> Option<Self> {
    unsafe { NonNull::new(self.0.add(offset).cast::<*mut u8>().read()).map(Self) }
  }

  #[inline]
  unsafe fn write_link(
    self,
    offset: usize,
    link: Option<Self>,
  ) {
    unsafe {
      let raw = link.map_or(ptr::null_mut(), Self::as_ptr);
      self.0.add(offset).cast::<*mut u8>().write(raw);
    }
  }
}

impl FreeNode {
  /// View a block as a segmented list node. The block must be free and
  /// larger than the minimum size.
  #[inline]
  pub unsafe fn new(block: BlockPtr) -> Self {
    unsafe {
      debug_assert!(!block.is_allocated() && !block.is_mini());
    }
    Self(block)
  }

  #[inline]
  pub fn block(self) -> BlockPtr {
    self.0
  }

  #[inline]
  pub unsafe fn next_free(self) -> Option<Self> {
    unsafe { self.0.read_link(NEXT_OFFSET).map(Self) }
  }

  #[inline]
  pub unsafe fn prev_free(self) -> Option<Self> {
    unsafe { self.0.read_link(PREV_OFFSET).map(Self) }
  }

  #[inline]
  pub unsafe fn set_next_free(
    self,
    next: Option<Self>,
  ) {
    unsafe { self.0.write_link(NEXT_OFFSET, next.map(Self::block)) }
  }

  #[inline]
  pub unsafe fn set_prev_free(
    self,
    prev: Option<Self>,
  ) {
    unsafe { self.0.write_link(PREV_OFFSET, prev.map(Self::block)) }
  }
}

impl MiniNode {
  /// View a block as a mini list node. The block must be free and exactly
  /// [`MIN_BLOCK_SIZE`] bytes long.
  #[inline]
  pub unsafe fn new(block: BlockPtr) -> Self {
    unsafe {
      debug_assert!(!block.is_allocated() && block.is_mini());
    }
    Self(block)
  }

  #[inline]
  pub fn block(self) -> BlockPtr {
    self.0
  }

  #[inline]
  pub unsafe fn next(self) -> Option<Self> {
    unsafe { self.0.read_link(NEXT_OFFSET).map(Self) }
  }

  #[inline]
  pub unsafe fn set_next(
    self,
    next: Option<Self>,
  ) {
    unsafe { self.0.write_link(NEXT_OFFSET, next.map(Self::block)) }
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use std::alloc::{self, Layout};

  use super::*;
  use crate::tag::DSIZE;

  /// 16-aligned scratch memory to lay blocks out by hand. The first header
  /// goes one word in, like in the real heap.
  pub(crate) struct Scratch {
    base: NonNull<u8>,
    layout: Layout,
  }

  impl Scratch {
    pub(crate) fn new(size: usize) -> Self {
      let layout = Layout::from_size_align(size, DSIZE).unwrap();
      let base = NonNull::new(unsafe { alloc::alloc_zeroed(layout) }).unwrap();
      Self { base, layout }
    }

    pub(crate) fn block_at(
      &self,
      offset: usize,
    ) -> BlockPtr {
      assert!(offset < self.layout.size());
      BlockPtr::new(unsafe { self.base.add(offset) })
    }
  }

  impl Drop for Scratch {
    fn drop(&mut self) {
      unsafe { alloc::dealloc(self.base.as_ptr(), self.layout) }
    }
  }

  #[test]
  fn payload_round_trip_and_alignment() {
    let scratch = Scratch::new(64);
    let block = scratch.block_at(WSIZE);

    assert_eq!(block.payload().as_ptr() as usize % DSIZE, 0);
    assert_eq!(unsafe { BlockPtr::from_payload(block.payload()) }, block);
  }

  #[test]
  fn write_sets_footer_and_successor_bits() {
    let scratch = Scratch::new(128);
    let first = scratch.block_at(WSIZE);
    let epilogue = scratch.block_at(WSIZE + 48);

    unsafe {
      epilogue.write_epilogue(true, false);
      first.write(48, false, true, false);

      assert_eq!(first.size(), 48);
      assert!(!first.is_allocated());
      assert_eq!(first.footer_tag(), first.tag());
      assert_eq!(first.next(), epilogue);
      assert!(!epilogue.prev_allocated());
      assert!(!epilogue.prev_mini());
      assert!(matches!(first.body(), Body::Free(_)));

      first.write(48, true, true, false);
      assert!(epilogue.prev_allocated());
      assert!(matches!(first.body(), Body::Allocated(p) if p == first.payload()));
    }
  }

  #[test]
  fn predecessor_via_footer() {
    let scratch = Scratch::new(128);
    let first = scratch.block_at(WSIZE);
    let second = scratch.block_at(WSIZE + 64);
    let epilogue = scratch.block_at(WSIZE + 96);

    unsafe {
      epilogue.write_epilogue(true, false);
      second.write(32, true, true, false);
      first.write(64, false, true, false);

      assert_eq!(
        second.predecessor(),
        Some(Predecessor::FooterDescribed(first))
      );
      assert_eq!(second.predecessor_via_footer(), first);

      first.write(64, true, true, false);
      assert_eq!(second.predecessor(), None);
    }
  }

  #[test]
  fn predecessor_of_mini_uses_fixed_offset() {
    let scratch = Scratch::new(128);
    let mini = scratch.block_at(WSIZE + 16);
    let after = scratch.block_at(WSIZE + 32);
    let epilogue = scratch.block_at(WSIZE + 64);

    unsafe {
      epilogue.write_epilogue(true, false);
      after.write(32, true, true, false);
      mini.write(MIN_BLOCK_SIZE, false, true, false);

      assert!(after.prev_mini());
      assert!(!after.prev_allocated());
      assert_eq!(
        after.predecessor(),
        Some(Predecessor::FixedOffsetMini(mini))
      );
      assert!(matches!(mini.body(), Body::Mini(node) if node.block() == mini));
    }
  }

  #[test]
  fn links_round_trip() {
    let scratch = Scratch::new(256);
    let a = scratch.block_at(WSIZE);
    let b = scratch.block_at(WSIZE + 64);
    let epilogue = scratch.block_at(WSIZE + 128);

    unsafe {
      epilogue.write_epilogue(true, false);
      b.write(64, false, true, false);
      a.write(64, false, true, false);

      let (a, b) = (FreeNode::new(a), FreeNode::new(b));
      a.set_next_free(Some(b));
      a.set_prev_free(None);
      b.set_prev_free(Some(a));
      b.set_next_free(None);

      assert_eq!(a.next_free(), Some(b));
      assert_eq!(a.prev_free(), None);
      assert_eq!(b.prev_free(), Some(a));
      assert_eq!(b.block().raw_prev_link(), Some(a.block()));
    }
  }
}
