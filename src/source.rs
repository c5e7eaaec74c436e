//! Where heap memory comes from.
//!
//! The allocator only ever asks for more bytes at the end of the region it
//! already has. Two sources are provided: the process data segment, moved
//! with `sbrk(2)` exactly like a classic `malloc`, and a fixed reservation
//! that gives every allocator its own private heap.

use std::{
  alloc::{self, Layout},
  io,
  ptr::NonNull,
};

use libc::{c_void, intptr_t, sbrk};

use crate::{
  align,
  align::{ALIGNMENT, checked_align},
  error::GrowError,
};

/// The heap growth primitive.
///
/// Implementations hand out one contiguous region: every successful
/// [`HeapSource::grow`] returns the previous value of [`HeapSource::hi`],
/// and the first one returns a 16-byte aligned address. A failed call
/// leaves the region untouched.
pub trait HeapSource {
  /// Extends the region by `bytes` and returns the start of the new bytes.
  fn grow(
    &mut self,
    bytes: usize,
  ) -> Result<NonNull<u8>, GrowError>;

  /// First byte of the region. Meaningless before the first grow.
  fn lo(&self) -> usize;

  /// One past the last byte of the region.
  fn hi(&self) -> usize;
}

/// Grows the heap by moving the program break.
///
/// The break is shared by the whole process. If anything else moves it
/// between two calls, the new memory would not follow the heap, so the
/// growth is rolled back and reported as [`GrowError::Discontiguous`].
#[derive(Debug, Default)]
pub struct Sbrk {
  lo: usize,
  brk: usize,
}

impl Sbrk {
  pub const fn new() -> Self {
    Self { lo: 0, brk: 0 }
  }

  /// Aligns the program break before the first growth.
  unsafe fn start(&mut self) -> Result<(), GrowError> {
    unsafe {
      let current = sbrk(0) as usize;
      let pad = align!(current) - current;

      if pad != 0 && sbrk(pad as intptr_t) == usize::MAX as *mut c_void {
        return Err(GrowError::Os(io::Error::last_os_error()));
      }

      self.lo = current + pad;
      self.brk = self.lo;

      Ok(())
    }
  }
}

impl HeapSource for Sbrk {
  fn grow(
    &mut self,
    bytes: usize,
  ) -> Result<NonNull<u8>, GrowError> {
    let increment = intptr_t::try_from(bytes).map_err(|_| GrowError::TooLarge { requested: bytes })?;

    unsafe {
      if self.brk == 0 {
        self.start()?;
      }

      let address = sbrk(increment);

      if address == usize::MAX as *mut c_void {
        return Err(GrowError::Os(io::Error::last_os_error()));
      }

      if address as usize != self.brk {
        sbrk(-increment);
        return Err(GrowError::Discontiguous {
          expected: self.brk,
          actual: address as usize,
        });
      }

      self.brk += bytes;

      NonNull::new(address.cast()).ok_or(GrowError::TooLarge { requested: bytes })
    }
  }

  fn lo(&self) -> usize {
    self.lo
  }

  fn hi(&self) -> usize {
    self.brk
  }
}

/// A fixed size reservation handed out front to back. Growth fails once
/// the reservation is used up, which is how tests run out of memory on
/// purpose.
#[derive(Debug)]
pub struct Arena {
  base: NonNull<u8>,
  capacity: usize,
  used: usize,
}

impl Arena {
  /// Reserves `capacity` bytes, rounded up to 16.
  pub fn new(capacity: usize) -> Result<Self, GrowError> {
    let reserve_error = GrowError::Reserve { capacity };

    let Some(capacity) = checked_align(capacity.max(ALIGNMENT)) else {
      return Err(reserve_error);
    };

    let layout = Layout::from_size_align(capacity, ALIGNMENT).map_err(|_| GrowError::Reserve { capacity })?;

    match NonNull::new(unsafe { alloc::alloc(layout) }) {
      Some(base) => Ok(Self {
        base,
        capacity,
        used: 0,
      }),
      None => Err(reserve_error),
    }
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Bytes handed out so far.
  pub fn used(&self) -> usize {
    self.used
  }
}

impl HeapSource for Arena {
  fn grow(
    &mut self,
    bytes: usize,
  ) -> Result<NonNull<u8>, GrowError> {
    let available = self.capacity - self.used;

    if bytes > available {
      return Err(GrowError::Exhausted {
        requested: bytes,
        available,
      });
    }

    let address = unsafe { self.base.add(self.used) };
    self.used += bytes;

    Ok(address)
  }

  fn lo(&self) -> usize {
    self.base.as_ptr() as usize
  }

  fn hi(&self) -> usize {
    self.lo() + self.used
  }
}

impl Drop for Arena {
  fn drop(&mut self) {
    // Same layout as in `Arena::new`, which already validated it.
    if let Ok(layout) = Layout::from_size_align(self.capacity, ALIGNMENT) {
      unsafe { alloc::dealloc(self.base.as_ptr(), layout) }
    }
  }
}
