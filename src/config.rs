use crate::{align::checked_align, fit::DEFAULT_FIT_LOOKAHEAD, tag::MIN_BLOCK_SIZE};

/// Default number of bytes requested from the heap source when a request
/// misses every free list.
pub const DEFAULT_CHUNK_SIZE: usize = 1 << 12;

/// Tuning knobs of a [`crate::SegAllocator`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeapConfig {
  /// Minimum heap growth in bytes. Rounded up to 16. Default: 4096.
  pub chunk_size: usize,

  /// Nodes examined after the first fit while looking for a tighter one.
  /// Zero turns the search into plain first fit. Default: 20.
  pub fit_lookahead: usize,

  /// Run the heap consistency checker before and after every mutating
  /// operation and panic on the first violation. Default: on in debug
  /// builds, off in release builds.
  pub check_heap: bool,
}

impl Default for HeapConfig {
  fn default() -> Self {
    Self {
      chunk_size: DEFAULT_CHUNK_SIZE,
      fit_lookahead: DEFAULT_FIT_LOOKAHEAD,
      check_heap: cfg!(debug_assertions),
    }
  }
}

impl HeapConfig {
  /// Returns the configuration with `chunk_size` made usable: at least one
  /// minimum block, and a multiple of 16.
  pub fn normalized(self) -> Self {
    let chunk_size = checked_align(self.chunk_size.max(MIN_BLOCK_SIZE)).unwrap_or(DEFAULT_CHUNK_SIZE);

    Self { chunk_size, ..self }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults() {
    let config = HeapConfig::default();
    assert_eq!(config.chunk_size, 4096);
    assert_eq!(config.fit_lookahead, 20);
    assert_eq!(config.check_heap, cfg!(debug_assertions));
  }

  #[test]
  fn normalized_chunk_size() {
    let normalize = |chunk_size| {
      HeapConfig {
        chunk_size,
        ..HeapConfig::default()
      }
      .normalized()
      .chunk_size
    };

    assert_eq!(normalize(0), 16);
    assert_eq!(normalize(1), 16);
    assert_eq!(normalize(100), 112);
    assert_eq!(normalize(4096), 4096);
    assert_eq!(normalize(usize::MAX), DEFAULT_CHUNK_SIZE);
  }
}
