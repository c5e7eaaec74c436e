use std::{
  cmp,
  ptr::{self, NonNull},
};

use log::{debug, error, trace, warn};

use crate::{
  align::checked_align,
  block::{BlockPtr, Body, Predecessor},
  config::HeapConfig,
  error::GrowError,
  fit::find_fit,
  mini::MiniList,
  seglist::{BUCKET_COUNT, SegregatedList},
  source::{HeapSource, Sbrk},
  tag::{MIN_BLOCK_SIZE, Tag, WSIZE},
  walk::{Blocks, HeapStats, ListOccupancy},
};

/// Runs the consistency checker when the configuration asks for it and
/// stops the world on the first violation.
macro_rules! check_heap {
  ($heap:expr, $when:literal) => {
    if $heap.config.check_heap {
      $heap.assert_consistent($when);
    }
  };
}

/// Block size that serves a request of `size` bytes: room for the header,
/// rounded up to 16. `None` when that does not fit in a `usize`.
///
/// ```rust
/// use segalloc::adjusted_size;
///
/// assert_eq!(adjusted_size(1), Some(16));
/// assert_eq!(adjusted_size(8), Some(16));
/// assert_eq!(adjusted_size(9), Some(32));
/// assert_eq!(adjusted_size(24), Some(32));
/// assert_eq!(adjusted_size(usize::MAX), None);
/// ```
pub fn adjusted_size(size: usize) -> Option<usize> {
  checked_align(size.checked_add(WSIZE)?).map(|asize| asize.max(MIN_BLOCK_SIZE))
}

/// Segregated free list allocator over one contiguous, growable heap.
///
/// Every piece of bookkeeping lives in this value, so independent heaps can
/// coexist as long as each has its own [`HeapSource`]. The allocator is
/// meant for a single thread of control and is neither `Send` nor `Sync`.
///
/// ```text
///   lo                                                                  hi
///   ┌──────────┬─────────┬──────────┬─────┬──────────┬────────┬──────────┐
///   │ prologue │ block   │ block    │ ... │ block    │ block  │ epilogue │
///   │ 0 / A    │ alloc   │ free     │     │ free     │ alloc  │ 0 / A    │
///   └──────────┴─────────┴────┬─────┴─────┴────┬─────┴────────┴──────────┘
///                  heap_start ┘                │
///                             ▲                ▲
///   buckets[k] ───────────────┘                │
///   minis ─────────────────────────────────────┘
/// ```
pub struct SegAllocator<S: HeapSource> {
  pub(crate) source: S,
  pub(crate) config: HeapConfig,
  /// First block header, right after the prologue. `None` until the
  /// sentinels have been written.
  pub(crate) heap_start: Option<BlockPtr>,
  pub(crate) buckets: SegregatedList,
  pub(crate) minis: MiniList,
}

impl SegAllocator<Sbrk> {
  /// Allocator growing the process data segment, default configuration.
  pub fn new() -> Self {
    Self::with_source(Sbrk::new(), HeapConfig::default())
  }
}

impl Default for SegAllocator<Sbrk> {
  fn default() -> Self {
    Self::new()
  }
}

impl<S: HeapSource> SegAllocator<S> {
  /// Creates an allocator on top of `source`. No memory is requested until
  /// the first allocation or an explicit [`Self::init`].
  pub fn with_source(
    source: S,
    config: HeapConfig,
  ) -> Self {
    Self {
      source,
      config: config.normalized(),
      heap_start: None,
      buckets: SegregatedList::new(),
      minis: MiniList::new(),
    }
  }

  pub fn config(&self) -> &HeapConfig {
    &self.config
  }

  pub fn source(&self) -> &S {
    &self.source
  }

  pub fn is_initialized(&self) -> bool {
    self.heap_start.is_some()
  }

  /// Writes the prologue and epilogue and grows the heap by one chunk.
  ///
  /// Does nothing once the sentinels exist. If the first chunk cannot be
  /// obtained the heap stays valid but empty, and later requests try to
  /// grow it again.
  pub fn init(&mut self) -> Result<(), GrowError> {
    if self.heap_start.is_some() {
      return Ok(());
    }

    check_heap!(self, "before init");

    let start = self.source.grow(2 * WSIZE)?;

    unsafe {
      BlockPtr::new(start).set_tag(Tag::prologue());

      let epilogue = BlockPtr::new(start.add(WSIZE));
      epilogue.write_epilogue(true, false);

      self.heap_start = Some(epilogue);
    }

    self.buckets.clear();
    self.minis.clear();

    debug!("heap initialized at {:#x}", self.source.lo());

    // The sentinels alone are a valid heap, failed growth included.
    let first_chunk = self.extend_heap(self.config.chunk_size);

    check_heap!(self, "after init");

    first_chunk.map(|_| ())
  }

  /// Returns a 16-byte aligned pointer to at least `size` usable bytes, or
  /// null when `size` is zero or the heap cannot grow any further.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> *mut u8 {
    if size == 0 {
      return ptr::null_mut();
    }

    if let Err(e) = self.init() {
      warn!("allocate({size}): heap initialization failed: {e}");
      return ptr::null_mut();
    }

    check_heap!(self, "before allocate");

    let Some(asize) = adjusted_size(size) else {
      warn!("allocate({size}): request too large");
      return ptr::null_mut();
    };

    let fit = unsafe { find_fit(&self.buckets, &self.minis, asize, self.config.fit_lookahead) };

    let block = match fit {
      Some(block) => block,
      None => match self.extend_heap(cmp::max(asize, self.config.chunk_size)) {
        Ok(block) => block,
        Err(e) => {
          warn!("allocate({size}): {e}");
          check_heap!(self, "after failed allocate");
          return ptr::null_mut();
        }
      },
    };

    unsafe {
      self.remove_free(block);
      block.write(block.size(), true, block.prev_allocated(), block.prev_mini());
      self.split(block, asize);
    }

    check_heap!(self, "after allocate");

    let payload = block.payload().as_ptr();
    trace!("allocate({size}) -> {payload:p} [block {asize}]");

    payload
  }

  /// Returns the block holding `ptr` to free space. Null is ignored.
  ///
  /// # Safety
  ///
  /// `ptr` must be null or a pointer returned by this allocator that has
  /// not been deallocated yet. Nothing may access the block afterwards.
  pub unsafe fn deallocate(
    &mut self,
    ptr: *mut u8,
  ) {
    let Some(payload) = NonNull::new(ptr) else {
      return;
    };

    check_heap!(self, "before deallocate");
    debug_assert!(self.owns(payload), "deallocate({ptr:p}): not a pointer of this heap");

    unsafe {
      let block = BlockPtr::from_payload(payload);
      debug_assert!(block.is_allocated(), "deallocate({ptr:p}): block is already free");

      let size = block.size();
      block.write(size, false, block.prev_allocated(), block.prev_mini());
      self.coalesce(block);

      trace!("deallocate({ptr:p}) [block {size}]");
    }

    check_heap!(self, "after deallocate");
  }

  /// Moves the allocation at `ptr` to a block of at least `size` bytes,
  /// keeping the first `min(old usable size, size)` bytes.
  ///
  /// A null `ptr` behaves like [`Self::allocate`]. A zero `size` frees
  /// `ptr` and returns null. When no new block can be obtained null is
  /// returned and `ptr` is left as it was.
  ///
  /// # Safety
  ///
  /// Same as [`Self::deallocate`] for `ptr`.
  pub unsafe fn reallocate(
    &mut self,
    ptr: *mut u8,
    size: usize,
  ) -> *mut u8 {
    if ptr.is_null() {
      return self.allocate(size);
    }

    if size == 0 {
      unsafe { self.deallocate(ptr) };
      return ptr::null_mut();
    }

    let new = self.allocate(size);

    if new.is_null() {
      return new;
    }

    unsafe {
      let count = cmp::min(self.usable_size(ptr), size);
      ptr::copy_nonoverlapping(ptr, new, count);
      self.deallocate(ptr);
    }

    trace!("reallocate({ptr:p}, {size}) -> {new:p}");

    new
  }

  /// Allocates room for `count` elements of `size` bytes, zero filled.
  /// Null when `count` is zero, the product overflows, or the heap cannot
  /// grow.
  pub fn allocate_zeroed(
    &mut self,
    count: usize,
    size: usize,
  ) -> *mut u8 {
    if count == 0 {
      return ptr::null_mut();
    }

    let Some(total) = count.checked_mul(size) else {
      warn!("allocate_zeroed({count}, {size}): size overflows");
      return ptr::null_mut();
    };

    let ptr = self.allocate(total);

    if !ptr.is_null() {
      unsafe { ptr::write_bytes(ptr, 0, total) };
    }

    ptr
  }

  /// Bytes the client may use behind `ptr`. Zero for null.
  ///
  /// # Safety
  ///
  /// `ptr` must be null or a live pointer returned by this allocator.
  pub unsafe fn usable_size(
    &self,
    ptr: *mut u8,
  ) -> usize {
    match NonNull::new(ptr) {
      Some(payload) => unsafe { BlockPtr::from_payload(payload).usable_size() },
      None => 0,
    }
  }

  /// Real blocks in address order.
  pub fn blocks(&self) -> Blocks<'_> {
    unsafe { Blocks::new(self.heap_start) }
  }

  pub fn stats(&self) -> HeapStats {
    HeapStats::collect(self.blocks(), self.source.hi() - self.source.lo())
  }

  /// Number of nodes in every free list.
  pub fn occupancy(&self) -> ListOccupancy {
    // A corrupted list could be circular, no list can be longer than this.
    let limit = (self.source.hi() - self.source.lo()) / MIN_BLOCK_SIZE + 1;
    let mut buckets = [0; BUCKET_COUNT];

    unsafe {
      for (index, count) in buckets.iter_mut().enumerate() {
        *count = self.buckets.iter(index).take(limit).count();
      }

      ListOccupancy {
        buckets,
        mini: self.minis.iter().take(limit).count(),
      }
    }
  }

  /// Logs every block and the free list occupancy at debug level.
  pub fn dump(&self) {
    if !log::log_enabled!(log::Level::Debug) {
      return;
    }

    debug!("heap [{:#x}, {:#x})", self.source.lo(), self.source.hi());

    for block in self.blocks() {
      let state = if block.is_allocated() { "allocated" } else { "free" };
      debug!("  {:#x} {:>8} {state}", block.header, block.size);
    }

    let occupancy = self.occupancy();
    debug!("  mini list: {}, buckets: {:?}", occupancy.mini, occupancy.buckets);
  }

  /// Panics with the first violated invariant, if any.
  pub(crate) fn assert_consistent(
    &self,
    when: &str,
  ) {
    if let Err(e) = self.check() {
      error!("heap check failed {when}: {e}");
      panic!("heap check failed {when}: {e}");
    }
  }

  fn owns(
    &self,
    payload: NonNull<u8>,
  ) -> bool {
    let addr = payload.as_ptr() as usize;

    self.heap_start.is_some()
      && addr >= self.source.lo() + 2 * WSIZE
      && addr < self.source.hi()
      && addr % MIN_BLOCK_SIZE == 0
  }

  /// Grows the heap by at least `bytes` and returns the resulting free
  /// block, already merged with a free predecessor and linked in its list.
  fn extend_heap(
    &mut self,
    bytes: usize,
  ) -> Result<BlockPtr, GrowError> {
    let size = checked_align(bytes).ok_or(GrowError::TooLarge { requested: bytes })?;
    let base = self.source.grow(size)?;

    unsafe {
      // The old epilogue header becomes the header of the new block.
      let block = BlockPtr::from_payload(base);
      let old = block.tag();
      debug_assert!(old.size() == 0 && old.is_allocated(), "heap grew away from the epilogue");

      block.set_tag(Tag::pack(size, false, old.prev_allocated(), old.prev_mini()));
      block.next().write_epilogue(false, size == MIN_BLOCK_SIZE);
      block.write(size, false, old.prev_allocated(), old.prev_mini());

      debug!("heap extended by {size} bytes, now ends at {:#x}", self.source.hi());

      Ok(self.coalesce(block))
    }
  }

  /// Merges a block that was just marked free with its free neighbours and
  /// links the result in the matching list. The block itself must not be
  /// in any list yet.
  unsafe fn coalesce(
    &mut self,
    block: BlockPtr,
  ) -> BlockPtr {
    unsafe {
      debug_assert!(!block.is_allocated());

      let next = block.next();
      let next_free = !next.is_allocated();
      let size = block.size();

      let merged = match (block.predecessor(), next_free) {
        (None, false) => block,

        (None, true) => {
          trace!("coalesce {:#x} with next {:#x}", block.addr(), next.addr());
          self.remove_free(next);
          block.write(size + next.size(), false, block.prev_allocated(), block.prev_mini());
          block
        }

        (Some(prev), false) => {
          let prev = self.detach_predecessor(prev);
          trace!("coalesce {:#x} with previous {:#x}", block.addr(), prev.addr());
          prev.write(prev.size() + size, false, prev.prev_allocated(), prev.prev_mini());
          prev
        }

        (Some(prev), true) => {
          let prev = self.detach_predecessor(prev);
          trace!(
            "coalesce {:#x} with previous {:#x} and next {:#x}",
            block.addr(),
            prev.addr(),
            next.addr()
          );
          self.remove_free(next);
          prev.write(
            prev.size() + size + next.size(),
            false,
            prev.prev_allocated(),
            prev.prev_mini(),
          );
          prev
        }
      };

      self.insert_free(merged);

      merged
    }
  }

  unsafe fn detach_predecessor(
    &mut self,
    predecessor: Predecessor,
  ) -> BlockPtr {
    unsafe {
      let block = predecessor.block();
      debug_assert_eq!(
        matches!(predecessor, Predecessor::FixedOffsetMini(_)),
        block.is_mini(),
        "predecessor addressing disagrees with its size"
      );
      self.remove_free(block);
      block
    }
  }

  /// Carves `asize` bytes off the front of an allocated block and returns
  /// the rest to free space, unless the rest would be smaller than a block.
  unsafe fn split(
    &mut self,
    block: BlockPtr,
    asize: usize,
  ) {
    unsafe {
      let size = block.size();
      debug_assert!(block.is_allocated() && size >= asize);

      if size - asize < MIN_BLOCK_SIZE {
        return;
      }

      let rest_size = size - asize;
      let is_mini = asize == MIN_BLOCK_SIZE;

      block.set_tag(Tag::pack(asize, true, block.prev_allocated(), block.prev_mini()));

      // The header has to exist before `write` reads it to find the footer
      // and the successor.
      let rest = block.next();
      rest.set_tag(Tag::pack(rest_size, false, true, is_mini));
      rest.write(rest_size, false, true, is_mini);

      self.insert_free(rest);
    }
  }

  unsafe fn insert_free(
    &mut self,
    block: BlockPtr,
  ) {
    unsafe {
      match block.body() {
        Body::Free(node) => self.buckets.insert(node),
        Body::Mini(node) => self.minis.insert(node),
        Body::Allocated(_) => unreachable!("allocated block {:#x} inserted in a free list", block.addr()),
      }
    }
  }

  unsafe fn remove_free(
    &mut self,
    block: BlockPtr,
  ) {
    unsafe {
      match block.body() {
        Body::Free(node) => self.buckets.remove(node),
        Body::Mini(node) => {
          let found = self.minis.remove(node);
          debug_assert!(found, "mini block {:#x} is not in the mini list", block.addr());
        }
        Body::Allocated(_) => unreachable!("allocated block {:#x} removed from a free list", block.addr()),
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    block::{MiniNode, tests::Scratch},
    seglist::bucket_index,
    source::Arena,
    walk::BlockInfo,
  };

  fn heap() -> SegAllocator<Arena> {
    heap_with_capacity(1 << 16)
  }

  fn heap_with_capacity(capacity: usize) -> SegAllocator<Arena> {
    SegAllocator::with_source(
      Arena::new(capacity).unwrap(),
      HeapConfig {
        check_heap: true,
        ..HeapConfig::default()
      },
    )
  }

  fn layout(heap: &SegAllocator<Arena>) -> Vec<(usize, bool)> {
    heap.blocks().map(|b| (b.size, b.is_allocated())).collect()
  }

  fn block_of(ptr: *mut u8) -> BlockPtr {
    unsafe { BlockPtr::from_payload(NonNull::new(ptr).unwrap()) }
  }

  /// Lists holding `block`, as `Some(class)` or `None` for the mini list.
  fn lists_holding(
    heap: &SegAllocator<Arena>,
    block: BlockPtr,
  ) -> Vec<Option<usize>> {
    let mut found = Vec::new();

    unsafe {
      for bucket in 0..BUCKET_COUNT {
        if heap.buckets.iter(bucket).any(|node| node.block() == block) {
          found.push(Some(bucket));
        }
      }

      if heap.minis.iter().any(|node| node.block() == block) {
        found.push(None);
      }
    }

    found
  }

  #[test]
  fn init_is_lazy_and_idempotent() {
    let mut heap = heap();
    assert!(!heap.is_initialized());
    assert_eq!(heap.stats(), HeapStats::default());

    heap.init().unwrap();
    heap.init().unwrap();

    assert!(heap.is_initialized());
    assert_eq!(heap.source().used(), 2 * WSIZE + 4096);
    assert_eq!(layout(&heap), [(4096, false)]);
    assert_eq!(heap.check(), Ok(()));
  }

  #[test]
  fn zero_sized_requests() {
    let mut heap = heap();
    assert!(heap.allocate(0).is_null());
    assert!(!heap.is_initialized());

    let p = heap.allocate(1);
    let before = layout(&heap);
    assert!(heap.allocate(0).is_null());
    assert_eq!(layout(&heap), before);

    unsafe {
      heap.deallocate(ptr::null_mut());
      assert_eq!(layout(&heap), before);

      assert!(heap.reallocate(p, 0).is_null());
      assert_eq!(layout(&heap), [(4096, false)]);
      assert!(heap.reallocate(ptr::null_mut(), 0).is_null());
    }
  }

  #[test]
  fn small_request_splits_the_first_chunk() {
    let mut heap = heap();
    let p = heap.allocate(24);

    assert!(!p.is_null());
    assert_eq!(p as usize % 16, 0);
    assert!(unsafe { heap.usable_size(p) } >= 24);
    assert_eq!(layout(&heap), [(32, true), (4064, false)]);

    let stats = heap.stats();
    assert_eq!(stats.free_blocks, 1);
    assert_eq!(stats.free_bytes, 4064);
    assert_eq!(stats.allocated_bytes, 32);
    assert_eq!(stats.heap_bytes, 2 * WSIZE + 4096);

    let rest = block_of(p);
    assert_eq!(lists_holding(&heap, unsafe { rest.next() }), [Some(bucket_index(4064))]);
  }

  #[test]
  fn mini_blocks_merge_into_a_bucket() {
    let mut heap = heap();
    let a = heap.allocate(8);
    let b = heap.allocate(8);
    let c = heap.allocate(8);

    for p in [a, b, c] {
      assert_eq!(unsafe { heap.usable_size(p) }, 8);
    }
    assert_eq!(b as usize - a as usize, 16);
    assert_eq!(c as usize - b as usize, 16);

    unsafe {
      heap.deallocate(a);
      assert_eq!(lists_holding(&heap, block_of(a)), [None]);
      assert_eq!(heap.occupancy().mini, 1);

      heap.deallocate(b);
    }

    assert_eq!(heap.occupancy().mini, 0);
    assert_eq!(lists_holding(&heap, block_of(a)), [Some(0)]);
    assert_eq!(&layout(&heap)[..3], [(32, false), (16, true), (4048, false)]);
  }

  #[test]
  fn mini_block_is_reused_first() {
    let mut heap = heap();
    let a = heap.allocate(8);
    heap.allocate(8);

    unsafe { heap.deallocate(a) };

    assert_eq!(heap.allocate(3), a);
    assert_eq!(heap.occupancy().mini, 0);
  }

  #[test]
  fn merged_block_serves_a_larger_request_in_place() {
    let mut heap = heap();
    let a = heap.allocate(100);
    let b = heap.allocate(100);
    heap.allocate(100);
    let hi = heap.source().hi();

    unsafe {
      heap.deallocate(b);
      heap.deallocate(a);
    }

    assert_eq!(layout(&heap)[0], (224, false));
    assert_eq!(lists_holding(&heap, block_of(a)), [Some(bucket_index(224))]);

    let p = heap.allocate(200);
    assert_eq!(p, a);
    assert_eq!(heap.source().hi(), hi);

    // 224 - 208 leaves exactly one mini block.
    assert_eq!(&layout(&heap)[..3], [(208, true), (16, false), (112, true)]);
    assert_eq!(heap.occupancy().mini, 1);
  }

  #[test]
  fn coalesces_in_all_four_cases() {
    let mut heap = heap();
    let x: Vec<_> = (0..4).map(|_| heap.allocate(40)).collect();

    unsafe {
      // Both neighbours allocated.
      heap.deallocate(x[0]);
      assert_eq!(
        layout(&heap),
        [(48, false), (48, true), (48, true), (48, true), (3904, false)]
      );

      // Successor free.
      heap.deallocate(x[3]);
      assert_eq!(layout(&heap), [(48, false), (48, true), (48, true), (3952, false)]);

      // Predecessor free.
      heap.deallocate(x[1]);
      assert_eq!(layout(&heap), [(96, false), (48, true), (3952, false)]);

      // Both free.
      heap.deallocate(x[2]);
    }

    assert_eq!(layout(&heap), [(4096, false)]);
    assert_eq!(heap.occupancy().total(), 1);
  }

  #[test]
  fn coalesces_through_mini_neighbours() {
    let mut heap = heap();

    // Mini predecessor, located by fixed offset.
    let m = heap.allocate(8);
    let y = heap.allocate(40);
    heap.allocate(40);

    unsafe {
      heap.deallocate(m);
      assert!(block_of(y).prev_mini());
      heap.deallocate(y);
    }

    assert_eq!(layout(&heap)[0], (64, false));
    assert_eq!(heap.occupancy().mini, 0);

    // Mini successor.
    let mut heap = self::heap();
    let a = heap.allocate(40);
    let m = heap.allocate(8);
    heap.allocate(40);

    unsafe {
      heap.deallocate(m);
      heap.deallocate(a);
    }

    assert_eq!(layout(&heap)[0], (64, false));
    assert_eq!(heap.occupancy().mini, 0);
  }

  #[test]
  fn growth_merges_with_the_free_tail() {
    let mut heap = heap();
    let p = heap.allocate(4000);
    assert_eq!(layout(&heap), [(4016, true), (80, false)]);

    let q = heap.allocate(200);
    assert_eq!(q as usize, p as usize + 4016);
    assert_eq!(layout(&heap), [(4016, true), (208, true), (3968, false)]);
    assert_eq!(heap.source().used(), 2 * WSIZE + 2 * 4096);
  }

  #[test]
  fn large_request_grows_by_the_request() {
    let mut heap = heap();
    let p = heap.allocate(10_000);

    assert!(!p.is_null());
    assert!(unsafe { heap.usable_size(p) } >= 10_000);
    assert_eq!(heap.check(), Ok(()));
  }

  #[test]
  fn exhaustion_returns_null_and_keeps_the_heap() {
    let mut heap = heap_with_capacity(2 * WSIZE + 4096);
    let p = heap.allocate(100);
    let before = layout(&heap);

    assert!(heap.allocate(5000).is_null());
    assert!(heap.allocate(usize::MAX).is_null());
    assert_eq!(layout(&heap), before);
    assert_eq!(heap.check(), Ok(()));

    unsafe {
      assert!(heap.reallocate(p, 8000).is_null());
      assert_eq!(layout(&heap), before);
      heap.deallocate(p);
    }

    assert!(!heap.allocate(4000).is_null());
  }

  #[test]
  fn init_failure_keeps_sentinels() {
    let mut heap = heap_with_capacity(2 * WSIZE);

    assert!(heap.init().is_err());
    assert!(heap.is_initialized());
    assert_eq!(heap.check(), Ok(()));
    assert!(heap.allocate(1).is_null());
  }

  #[test]
  #[should_panic(expected = "heap check failed before init")]
  fn init_checks_the_lists_it_clears() {
    let scratch = Scratch::new(64);
    let stray = scratch.block_at(WSIZE);
    let mut heap = heap();

    unsafe {
      scratch.block_at(WSIZE + MIN_BLOCK_SIZE).write_epilogue(true, false);
      stray.write(MIN_BLOCK_SIZE, false, true, false);
      heap.minis.insert(MiniNode::new(stray));
    }

    let _ = heap.init();
  }

  #[test]
  fn reallocate_preserves_contents() {
    let mut heap = heap();

    unsafe {
      let p = heap.reallocate(ptr::null_mut(), 40);
      assert!(!p.is_null());

      for i in 0..40 {
        p.add(i).write(i as u8);
      }

      let grown = heap.reallocate(p, 500);
      assert!(!grown.is_null());
      for i in 0..40 {
        assert_eq!(grown.add(i).read(), i as u8);
      }

      let shrunk = heap.reallocate(grown, 10);
      assert!(!shrunk.is_null());
      for i in 0..10 {
        assert_eq!(shrunk.add(i).read(), i as u8);
      }

      heap.deallocate(shrunk);
    }

    assert_eq!(layout(&heap), [(4096, false)]);
  }

  #[test]
  fn allocate_zeroed_clears_reused_memory() {
    let mut heap = heap();
    let p = heap.allocate(64);

    unsafe {
      ptr::write_bytes(p, 0xab, 64);
      heap.deallocate(p);
    }

    let q = heap.allocate_zeroed(8, 8);
    assert_eq!(q, p);
    assert!(unsafe { std::slice::from_raw_parts(q, 64) }.iter().all(|&b| b == 0));
  }

  #[test]
  fn allocate_zeroed_edge_cases() {
    let mut heap = heap();

    assert!(heap.allocate_zeroed(0, 16).is_null());
    assert!(heap.allocate_zeroed(4, 0).is_null());
    assert!(heap.allocate_zeroed(usize::MAX, 2).is_null());
    assert!(heap.allocate_zeroed(2, usize::MAX / 2 + 1).is_null());
    assert!(!heap.is_initialized());
  }

  #[test]
  fn blocks_report_payloads() {
    let mut heap = heap();
    let p = heap.allocate(24);

    let first: BlockInfo = heap.blocks().next().unwrap();
    assert_eq!(first.payload.map(NonNull::as_ptr), Some(p));
    assert_eq!(first.header, p as usize - WSIZE);
    assert!(heap.blocks().nth(1).unwrap().is_free());
  }

  #[test]
  #[should_panic(expected = "heap check failed")]
  fn corruption_is_fatal_when_checking() {
    let mut heap = heap();
    let p = heap.allocate(40);
    heap.allocate(40);

    unsafe {
      let block = block_of(p);
      let tag = block.tag();
      block.set_tag(Tag::pack(tag.size(), false, true, false));
    }

    heap.allocate(1);
  }
}
