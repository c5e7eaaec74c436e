/// Alignment every payload handed out by the allocator satisfies. Block
/// sizes are always multiples of this value as well.
pub const ALIGNMENT: usize = 16;

/// Rounds the given value up to the next multiple of [`ALIGNMENT`].
///
/// # Examples
///
/// ```rust
/// use segalloc::align;
///
/// assert_eq!(align!(1), 16);
/// assert_eq!(align!(16), 16);
/// assert_eq!(align!(24 + 8), 32);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    $crate::align_to!($value, $crate::align::ALIGNMENT)
  };
}

/// Rounds the given value up to the next multiple of `$align`, which must
/// be a power of two.
///
/// ```rust
/// use segalloc::align_to;
///
/// assert_eq!(align_to!(13, 8), 16);
/// assert_eq!(align_to!(4097, 4096), 8192);
/// ```
#[macro_export]
macro_rules! align_to {
  ($value:expr, $align:expr) => {
    ($value + $align - 1) & !($align - 1)
  };
}

/// Same as [`align!`] but returns `None` instead of wrapping around when the
/// rounded value does not fit in a `usize`.
#[inline]
pub const fn checked_align(value: usize) -> Option<usize> {
  match value.checked_add(ALIGNMENT - 1) {
    Some(bumped) => Some(bumped & !(ALIGNMENT - 1)),
    None => None,
  }
}
