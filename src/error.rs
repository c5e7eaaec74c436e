use std::{fmt, io};

/// Failure of the primitive that grows the heap.
#[derive(Debug)]
pub enum GrowError {
  /// A fixed reservation has fewer bytes left than requested.
  Exhausted { requested: usize, available: usize },
  /// The request cannot be expressed to the primitive at all.
  TooLarge { requested: usize },
  /// The new memory does not start where the heap currently ends.
  Discontiguous { expected: usize, actual: usize },
  /// The operating system refused to move the program break.
  Os(io::Error),
  /// The backing reservation could not be obtained.
  Reserve { capacity: usize },
}

impl fmt::Display for GrowError {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self {
      GrowError::Exhausted { requested, available } => {
        write!(f, "heap exhausted: requested {requested} bytes, {available} available")
      }
      GrowError::TooLarge { requested } => write!(f, "heap growth of {requested} bytes is too large"),
      GrowError::Discontiguous { expected, actual } => write!(
        f,
        "heap growth is not contiguous: expected {expected:#x}, got {actual:#x}"
      ),
      GrowError::Os(e) => write!(f, "sbrk failed: {e}"),
      GrowError::Reserve { capacity } => write!(f, "could not reserve {capacity} bytes"),
    }
  }
}

impl std::error::Error for GrowError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      GrowError::Os(e) => Some(e),
      _ => None,
    }
  }
}

/// A violated heap invariant, as reported by
/// [`crate::SegAllocator::check`]. Addresses are block header addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeapCheckError {
  /// The word before the first block is not a zero sized allocated tag.
  BadPrologue { addr: usize },
  /// Walking forward left the heap before reaching an epilogue.
  MissingEpilogue { addr: usize },
  /// A zero sized header was found before the end of the heap.
  MisplacedEpilogue { addr: usize, expected: usize },
  /// The payload of a block is not 16-byte aligned.
  Misaligned { addr: usize },
  /// Two physically consecutive blocks are both free.
  AdjacentFree { addr: usize },
  /// A block's predecessor bits disagree with the actual predecessor.
  StalePrevBits { addr: usize },
  /// A free block's footer does not mirror its header.
  FooterMismatch { addr: usize },
  /// A free list node links to itself.
  SelfLink { addr: usize },
  /// A free list is longer than the heap could possibly hold.
  ListCycle { bucket: Option<usize> },
  /// A free list node lies outside the heap.
  NodeOutOfBounds { addr: usize },
  /// A node's back reference does not point at the node linking to it.
  BrokenBackLink { addr: usize },
  /// An allocated block is linked in a free list.
  AllocatedInList { addr: usize },
  /// A free block is linked in the wrong list.
  WrongList { addr: usize, size: usize, bucket: Option<usize> },
  /// Heap walk and free lists disagree on the number of free blocks.
  CountMismatch { heap: usize, lists: usize },
}

impl fmt::Display for HeapCheckError {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self {
      Self::BadPrologue { addr } => write!(f, "invalid prologue at {addr:#x}"),
      Self::MissingEpilogue { addr } => write!(f, "heap walk left the heap at {addr:#x}"),
      Self::MisplacedEpilogue { addr, expected } => {
        write!(f, "epilogue at {addr:#x}, expected at {expected:#x}")
      }
      Self::Misaligned { addr } => write!(f, "block {addr:#x} has a misaligned payload"),
      Self::AdjacentFree { addr } => write!(f, "block {addr:#x} and its predecessor are both free"),
      Self::StalePrevBits { addr } => write!(f, "block {addr:#x} misdescribes its predecessor"),
      Self::FooterMismatch { addr } => write!(f, "footer of block {addr:#x} does not match its header"),
      Self::SelfLink { addr } => write!(f, "free block {addr:#x} links to itself"),
      Self::ListCycle { bucket: Some(bucket) } => write!(f, "free list {bucket} has a cycle"),
      Self::ListCycle { bucket: None } => write!(f, "mini list has a cycle"),
      Self::NodeOutOfBounds { addr } => write!(f, "free list node {addr:#x} is outside the heap"),
      Self::BrokenBackLink { addr } => {
        write!(f, "back link of free block {addr:#x} is not reciprocated")
      }
      Self::AllocatedInList { addr } => write!(f, "allocated block {addr:#x} is in a free list"),
      Self::WrongList { addr, size, bucket } => write!(
        f,
        "free block {addr:#x} of size {size} is in the wrong list ({bucket:?})"
      ),
      Self::CountMismatch { heap, lists } => {
        write!(f, "{heap} free blocks in the heap but {lists} in the free lists")
      }
    }
  }
}

impl std::error::Error for HeapCheckError {}
