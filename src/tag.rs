//! Boundary tags.
//!
//! Every block starts with one machine word, the header. Free blocks larger
//! than [`MIN_BLOCK_SIZE`] also end with a copy of it, the footer. Sizes are
//! multiples of 16, which leaves the low four bits of the word for flags:
//!
//! ```text
//!   63                                              4   3   2   1   0
//!   ┌───────────────────────────────────────────────┬───┬───┬───┬───┐
//!   │                  block size                   │ 0 │ M │ P │ A │
//!   └───────────────────────────────────────────────┴───┴───┴───┴───┘
//!                                                         │   │   │
//!                      previous block is a mini block ────┘   │   │
//!                      previous block is allocated ───────────┘   │
//!                      this block is allocated ───────────────────┘
//! ```
//!
//! Nothing in here touches memory, these are pure functions over words.

use std::fmt;

use bitflags::bitflags;

/// One heap word. Headers, footers and free-list links are all this wide.
pub type Word = u64;

/// Size of a [`Word`] in bytes.
pub const WSIZE: usize = 8;

/// Double word. Payload alignment and the size granularity.
pub const DSIZE: usize = 2 * WSIZE;

/// Smallest block the heap can hold: a header plus a single payload word.
/// Free blocks of this size are "mini blocks", see [`crate::mini`].
pub const MIN_BLOCK_SIZE: usize = DSIZE;

const SIZE_MASK: Word = !0xF;

bitflags! {
  /// Low bits of a tag.
  #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
  pub struct TagFlags: Word {
    const ALLOCATED = 0x1;
    const PREV_ALLOCATED = 0x2;
    const PREV_MINI = 0x4;
  }
}

/// Decoded form of a [`Tag`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TagFields {
  pub size: usize,
  pub allocated: bool,
  pub prev_allocated: bool,
  pub prev_mini: bool,
}

/// A packed header or footer word.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Tag(Word);

impl Tag {
  /// Packs the size and the three flag bits into one word.
  ///
  /// `size` must be a multiple of 16, otherwise its low bits would bleed
  /// into the flags.
  #[inline]
  pub const fn pack(
    size: usize,
    allocated: bool,
    prev_allocated: bool,
    prev_mini: bool,
  ) -> Self {
    debug_assert!(size as Word & !SIZE_MASK == 0, "block size is not a multiple of 16");

    let mut word = size as Word;

    if allocated {
      word |= TagFlags::ALLOCATED.bits();
    }

    if prev_allocated {
      word |= TagFlags::PREV_ALLOCATED.bits();
    }

    if prev_mini {
      word |= TagFlags::PREV_MINI.bits();
    }

    Self(word)
  }

  /// Tag of the zero sized, permanently allocated sentinel that terminates
  /// the heap.
  #[inline]
  pub const fn epilogue(
    prev_allocated: bool,
    prev_mini: bool,
  ) -> Self {
    Self::pack(0, true, prev_allocated, prev_mini)
  }

  /// Tag of the zero sized sentinel word that precedes the first block.
  #[inline]
  pub const fn prologue() -> Self {
    Self::pack(0, true, false, false)
  }

  #[inline]
  pub const fn from_word(word: Word) -> Self {
    Self(word)
  }

  #[inline]
  pub const fn to_word(self) -> Word {
    self.0
  }

  #[inline]
  pub fn unpack(self) -> TagFields {
    TagFields {
      size: self.size(),
      allocated: self.is_allocated(),
      prev_allocated: self.prev_allocated(),
      prev_mini: self.prev_mini(),
    }
  }

  #[inline]
  pub const fn size(self) -> usize {
    (self.0 & SIZE_MASK) as usize
  }

  #[inline]
  pub fn flags(self) -> TagFlags {
    TagFlags::from_bits_truncate(self.0)
  }

  #[inline]
  pub fn is_allocated(self) -> bool {
    self.flags().contains(TagFlags::ALLOCATED)
  }

  #[inline]
  pub fn prev_allocated(self) -> bool {
    self.flags().contains(TagFlags::PREV_ALLOCATED)
  }

  #[inline]
  pub fn prev_mini(self) -> bool {
    self.flags().contains(TagFlags::PREV_MINI)
  }

  /// Same size and allocation bit, new description of the predecessor.
  #[inline]
  pub fn with_prev(
    self,
    prev_allocated: bool,
    prev_mini: bool,
  ) -> Self {
    Self::pack(self.size(), self.is_allocated(), prev_allocated, prev_mini)
  }
}

impl From<TagFields> for Tag {
  fn from(fields: TagFields) -> Self {
    Self::pack(fields.size, fields.allocated, fields.prev_allocated, fields.prev_mini)
  }
}

impl fmt::Debug for Tag {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("Tag")
      .field("size", &self.size())
      .field("flags", &self.flags())
      .finish()
  }
}
