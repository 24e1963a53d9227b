use log::{debug, error, trace, warn};

use crate::{
  align::{WORD_SIZE, align_checked, is_aligned},
  block::{ALLOCATED_OVERHEAD, BoundaryTag, MIN_BLOCK_SIZE, footer_of, read_header, write_tags, write_word},
  error::{FreeError, InitError},
  free_list::{HEAD_TABLE_SIZE, SIZE_CLASSES, classify},
  heap::{HeapExtend, VecHeap},
};

/// Handle to an allocation: the heap offset of its first payload byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Payload(usize);

impl Payload {
  pub(crate) fn of_block(block: usize) -> Self {
    Self(block + WORD_SIZE)
  }

  pub fn offset(self) -> usize {
    self.0
  }

  pub(crate) fn block(self) -> usize {
    self.0 - WORD_SIZE
  }
}

/// Block size serving a request of `requested` payload bytes.
///
/// Never below [`MIN_BLOCK_SIZE`], so any allocated block can turn into a
/// free block in place.
fn block_size_for(requested: usize) -> Option<usize> {
  align_checked(requested)?
    .checked_add(ALLOCATED_OVERHEAD)
    .map(|size| size.max(MIN_BLOCK_SIZE))
}

/// Explicit free-list allocator with boundary-tag coalescing.
///
/// Owns its heap. Every operation runs to completion on `&mut self`; sharing
/// an allocator between threads needs an outside lock.
pub struct ExplicitAllocator<H: HeapExtend = VecHeap> {
  pub(crate) heap: H,
  /// Largest free block size per size class, when known.
  pub(crate) max_free: [Option<usize>; SIZE_CLASSES],
}

impl<H: HeapExtend> ExplicitAllocator<H> {
  /// Reserves the free-list head table at the low end of an empty heap.
  pub fn init(mut heap: H) -> Result<Self, InitError> {
    if !heap.is_empty() {
      error!("unable to initialize: heap already holds {} bytes", heap.len());
      return Err(InitError::NotEmpty(heap.len()));
    }

    let table = heap
      .extend(HEAD_TABLE_SIZE)
      .inspect_err(|err| error!("unable to initialize: {err}"))?;
    heap.bytes_mut()[table..table + HEAD_TABLE_SIZE].fill(0);

    Ok(Self {
      heap,
      max_free: [None; SIZE_CLASSES],
    })
  }

  /// Gives the heap back. Outstanding payloads become meaningless.
  pub fn teardown(self) -> H {
    self.heap
  }

  pub fn heap(&self) -> &H {
    &self.heap
  }

  pub(crate) fn tag_at(
    &self,
    block: usize,
  ) -> BoundaryTag {
    read_header(self.heap.bytes(), block)
  }

  /// Returns a payload of at least `requested` bytes, or `None` when the
  /// heap cannot grow any further. Zero-byte requests also return `None`.
  pub fn allocate(
    &mut self,
    requested: usize,
  ) -> Option<Payload> {
    if requested == 0 {
      trace!("allocate(0) -> null");
      return None;
    }

    let needed = block_size_for(requested)?;
    let payload = self.place(needed).or_else(|| self.extend_block(needed));

    trace!("allocate({requested}) -> {payload:?}");
    payload
  }

  /// Releases the block behind `ptr`. Null, foreign and already-free
  /// payloads are reported through `log` and otherwise ignored.
  pub fn deallocate(
    &mut self,
    ptr: Option<Payload>,
  ) {
    if let Err(err) = self.try_deallocate(ptr) {
      warn!("ignoring free: {err}");
    }
  }

  /// Like [`deallocate`](Self::deallocate), but hands the reason for a
  /// rejected free back to the caller.
  pub fn try_deallocate(
    &mut self,
    ptr: Option<Payload>,
  ) -> Result<(), FreeError> {
    let block = self.live_block(ptr)?;
    self.release(block);

    trace!("deallocate({ptr:?})");
    Ok(())
  }

  /// Resizes the allocation behind `ptr` to `newsize` bytes, moving it if
  /// needed. The first `min(old, new)` payload bytes survive the move.
  ///
  /// A null `ptr` allocates, a zero `newsize` frees and returns `None`.
  pub fn reallocate(
    &mut self,
    ptr: Option<Payload>,
    newsize: usize,
  ) -> Option<Payload> {
    let Some(payload) = ptr else {
      return self.allocate(newsize);
    };

    if newsize == 0 {
      self.deallocate(ptr);
      return None;
    }

    let block = match self.live_block(ptr) {
      Ok(block) => block,
      Err(err) => {
        warn!("ignoring realloc: {err}");
        return None;
      }
    };

    let needed = block_size_for(newsize)?;
    let current = self.tag_at(block).size;

    if block + current == self.heap.len() {
      return self.resize_last(block, current, needed);
    }

    // Releasing the block overwrites its first payload words with list links.
    let keep = current.min(needed) - ALLOCATED_OVERHEAD;
    let saved = self.payload(payload)[..keep].to_vec();

    self.release(block);

    let moved = self.place(needed).or_else(|| self.extend_block(needed))?;
    self.payload_mut(moved)[..keep].copy_from_slice(&saved);

    trace!("reallocate({payload:?}, {newsize}) -> {moved:?}");
    Some(moved)
  }

  /// The payload bytes of a live allocation, including any slack left by
  /// rounding the request up.
  ///
  /// # Panics
  ///
  /// If `ptr` does not come from this allocator.
  pub fn payload(
    &self,
    ptr: Payload,
  ) -> &[u8] {
    let size = self.tag_at(ptr.block()).size;
    &self.heap.bytes()[ptr.offset()..ptr.block() + size - WORD_SIZE]
  }

  /// Mutable counterpart of [`payload`](Self::payload).
  pub fn payload_mut(
    &mut self,
    ptr: Payload,
  ) -> &mut [u8] {
    let size = self.tag_at(ptr.block()).size;
    &mut self.heap.bytes_mut()[ptr.offset()..ptr.block() + size - WORD_SIZE]
  }

  /// Search then split, over every class that can hold `needed` bytes.
  fn place(
    &mut self,
    needed: usize,
  ) -> Option<Payload> {
    (classify(needed)..SIZE_CLASSES).find_map(|class| {
      let block = self.search(class, needed)?;
      self.split(block, needed);
      Some(Payload::of_block(block))
    })
  }

  /// Appends a fresh allocated block of `needed` bytes at the top of the heap.
  fn extend_block(
    &mut self,
    needed: usize,
  ) -> Option<Payload> {
    let block = match self.heap.extend(needed) {
      Ok(block) => block,
      Err(err) => {
        debug!("out of memory: {err}");
        return None;
      }
    };

    write_tags(self.heap.bytes_mut(), block, BoundaryTag::allocated(needed));
    Some(Payload::of_block(block))
  }

  /// The last block in the heap grows by moving the break, never by copying.
  fn resize_last(
    &mut self,
    block: usize,
    current: usize,
    needed: usize,
  ) -> Option<Payload> {
    if needed > current {
      if let Err(err) = self.heap.extend(needed - current) {
        debug!("out of memory: {err}");
        return None;
      }

      write_tags(self.heap.bytes_mut(), block, BoundaryTag::allocated(needed));
    }

    Some(Payload::of_block(block))
  }

  /// Resolves `ptr` to the start of an allocated block.
  fn live_block(
    &self,
    ptr: Option<Payload>,
  ) -> Result<usize, FreeError> {
    let offset = ptr.ok_or(FreeError::Null)?.offset();

    if !is_aligned(offset) {
      return Err(FreeError::Misaligned { offset });
    }

    if offset < HEAD_TABLE_SIZE + WORD_SIZE || offset >= self.heap.len() {
      return Err(FreeError::OutOfBounds { offset });
    }

    let block = offset - WORD_SIZE;
    let tag = self.tag_at(block);

    if tag.is_free {
      return Err(FreeError::DoubleFree { offset });
    }

    let fits = tag.size >= MIN_BLOCK_SIZE && is_aligned(tag.size) && tag.size <= self.heap.len() - block;

    if !fits || read_header(self.heap.bytes(), block + tag.size - WORD_SIZE) != tag {
      return Err(FreeError::NotABlock { offset });
    }

    Ok(block)
  }

  /// Frees an allocated block and merges it with whichever neighbours are free.
  ///
  /// Tags that end up inside the merged block are cleared, so a stale
  /// payload pointer into it no longer resolves to a block.
  fn release(
    &mut self,
    block: usize,
  ) {
    let own = self.tag_at(block).size;
    let mut start = block;
    let mut size = own;

    let next = block + own;
    if next < self.heap.len() {
      let tag = self.tag_at(next);
      if tag.is_free {
        self.remove(next);
        size += tag.size;

        let bytes = self.heap.bytes_mut();
        write_word(bytes, footer_of(block, own), 0);
        write_word(bytes, next, 0);
      }
    }

    // The word before the first block is the zeroed separator, never free.
    if start > HEAD_TABLE_SIZE {
      let tag = self.tag_at(start - WORD_SIZE);
      if tag.is_free {
        start -= tag.size;
        self.remove(start);
        size += tag.size;

        let bytes = self.heap.bytes_mut();
        write_word(bytes, block - WORD_SIZE, 0);
        write_word(bytes, block, 0);
      }
    }

    self.insert(start, size);

    let max_free = &mut self.max_free[classify(size)];
    if matches!(*max_free, Some(max) if size > max) {
      *max_free = Some(size);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::HeapError;

  fn allocator() -> ExplicitAllocator {
    ExplicitAllocator::init(VecHeap::new()).unwrap()
  }

  fn fill(
    allocator: &mut ExplicitAllocator,
    ptr: Payload,
    len: usize,
  ) {
    for (i, byte) in allocator.payload_mut(ptr)[..len].iter_mut().enumerate() {
      *byte = i as u8 ^ 0x5A;
    }
  }

  fn assert_filled(
    allocator: &ExplicitAllocator,
    ptr: Payload,
    len: usize,
  ) {
    for (i, byte) in allocator.payload(ptr)[..len].iter().enumerate() {
      assert_eq!(*byte, i as u8 ^ 0x5A, "payload byte {i}");
    }
  }

  #[test]
  fn test_init_reserves_head_table() {
    let allocator = allocator();

    assert_eq!(allocator.heap().len(), HEAD_TABLE_SIZE);
    assert_eq!(allocator.head(0), None);
    assert_eq!(allocator.max_free, [None]);
  }

  #[test]
  fn test_init_rejects_used_heap() {
    let mut heap = VecHeap::new();
    heap.extend(8).unwrap();

    assert!(matches!(ExplicitAllocator::init(heap), Err(InitError::NotEmpty(8))));
  }

  #[test]
  fn test_init_reports_heap_failure() {
    let mut heap = VecHeap::new();
    heap.set_disabled(true);

    assert!(matches!(
      ExplicitAllocator::init(heap),
      Err(InitError::Reserve(HeapError::Disabled))
    ));
  }

  #[test]
  fn test_teardown_returns_heap() {
    let mut allocator = allocator();
    allocator.allocate(10);

    let heap = allocator.teardown();

    assert_eq!(heap.len(), HEAD_TABLE_SIZE + 32);
  }

  #[test]
  fn test_allocate_zero_is_null() {
    let mut allocator = allocator();

    assert_eq!(allocator.allocate(0), None);
    assert_eq!(allocator.heap().len(), HEAD_TABLE_SIZE);
  }

  #[test]
  fn test_allocate_rounds_and_adds_overhead() {
    let mut allocator = allocator();

    let small = allocator.allocate(1).unwrap();
    let large = allocator.allocate(100).unwrap();

    assert_eq!(allocator.payload(small).len(), MIN_BLOCK_SIZE - ALLOCATED_OVERHEAD);
    assert_eq!(allocator.payload(large).len(), 104);
    assert_eq!(small.offset(), HEAD_TABLE_SIZE + WORD_SIZE);
    assert_eq!(large.offset(), small.offset() + MIN_BLOCK_SIZE);
    assert_eq!(allocator.heap().len(), HEAD_TABLE_SIZE + 32 + 120);
  }

  #[test]
  fn test_allocate_huge_request_is_null() {
    let mut allocator = allocator();

    assert_eq!(allocator.allocate(usize::MAX), None);
    assert_eq!(allocator.allocate(usize::MAX - 8), None);
    assert_eq!(allocator.heap().len(), HEAD_TABLE_SIZE);
  }

  #[test]
  fn test_allocate_splits_freed_block() {
    let mut allocator = allocator();
    let a = allocator.allocate(200).unwrap();
    allocator.allocate(8);
    allocator.deallocate(Some(a));

    let b = allocator.allocate(40).unwrap();

    assert_eq!(b, a);
    let blocks: Vec<_> = allocator.blocks().map(|b| (b.size, b.is_free)).collect();
    assert_eq!(blocks, vec![(56, false), (160, true), (32, false)]);
    allocator.check().unwrap();
  }

  #[test]
  fn test_free_coalesces_both_neighbours() {
    let mut allocator = allocator();
    let a = allocator.allocate(40);
    let b = allocator.allocate(40);
    let c = allocator.allocate(40);
    allocator.allocate(40);

    allocator.deallocate(a);
    allocator.deallocate(c);
    allocator.deallocate(b);

    let blocks: Vec<_> = allocator.blocks().map(|b| (b.offset, b.size, b.is_free)).collect();
    assert_eq!(blocks, vec![(16, 168, true), (184, 56, false)]);
    assert_eq!(allocator.max_free, [Some(168)]);
    allocator.check().unwrap();
  }

  #[test]
  fn test_free_of_last_block_merges_left() {
    let mut allocator = allocator();
    allocator.allocate(8);
    let a = allocator.allocate(8);
    let b = allocator.allocate(8);

    allocator.deallocate(a);
    allocator.deallocate(b);

    let stats = allocator.check().unwrap();
    assert_eq!(stats.free_blocks, 1);
    assert_eq!(stats.largest_free, 64);
  }

  #[test]
  fn test_invalid_frees_are_reported() {
    let mut allocator = allocator();
    let a = allocator.allocate(64).unwrap();

    assert_eq!(allocator.try_deallocate(None), Err(FreeError::Null));
    assert_eq!(
      allocator.try_deallocate(Some(Payload(5))),
      Err(FreeError::Misaligned { offset: 5 })
    );
    assert_eq!(
      allocator.try_deallocate(Some(Payload(8))),
      Err(FreeError::OutOfBounds { offset: 8 })
    );
    assert_eq!(
      allocator.try_deallocate(Some(Payload(1 << 20))),
      Err(FreeError::OutOfBounds { offset: 1 << 20 })
    );
    assert_eq!(
      allocator.try_deallocate(Some(Payload(a.offset() + 16))),
      Err(FreeError::NotABlock { offset: a.offset() + 16 })
    );

    allocator.check().unwrap();
  }

  #[test]
  fn test_double_free_is_a_no_op() {
    let mut allocator = allocator();
    let a = allocator.allocate(24);
    allocator.allocate(24);

    allocator.deallocate(a);
    let before = allocator.heap().bytes().to_vec();

    assert_eq!(
      allocator.try_deallocate(a),
      Err(FreeError::DoubleFree { offset: a.unwrap().offset() })
    );
    allocator.deallocate(a);
    allocator.deallocate(None);

    assert_eq!(allocator.heap().bytes(), &before[..]);
  }

  #[test]
  fn test_reallocate_null_allocates() {
    let mut allocator = allocator();

    let a = allocator.reallocate(None, 24).unwrap();

    assert_eq!(allocator.payload(a).len(), 24);
  }

  #[test]
  fn test_reallocate_to_zero_frees() {
    let mut allocator = allocator();
    let a = allocator.allocate(24);
    allocator.allocate(24);

    assert_eq!(allocator.reallocate(a, 0), None);
    assert_eq!(allocator.check().unwrap().free_blocks, 1);
  }

  #[test]
  fn test_reallocate_last_block_grows_in_place() {
    let mut allocator = allocator();
    allocator.allocate(8);
    let a = allocator.allocate(16).unwrap();
    fill(&mut allocator, a, 16);

    let b = allocator.reallocate(Some(a), 100).unwrap();

    assert_eq!(b, a);
    assert_eq!(allocator.payload(b).len(), 104);
    assert_eq!(allocator.heap().len(), HEAD_TABLE_SIZE + 32 + 120);
    assert_filled(&allocator, b, 16);
    allocator.check().unwrap();
  }

  #[test]
  fn test_reallocate_last_block_shrinks_in_place() {
    let mut allocator = allocator();
    let a = allocator.allocate(100).unwrap();
    let len = allocator.heap().len();

    assert_eq!(allocator.reallocate(Some(a), 10), Some(a));
    assert_eq!(allocator.heap().len(), len);
    assert_eq!(allocator.payload(a).len(), 104);
  }

  #[test]
  fn test_reallocate_moves_and_preserves_payload() {
    let mut allocator = allocator();
    let a = allocator.allocate(40).unwrap();
    allocator.allocate(40);
    fill(&mut allocator, a, 40);

    let b = allocator.reallocate(Some(a), 200).unwrap();

    assert_ne!(b, a);
    assert_filled(&allocator, b, 40);
    assert!(allocator.blocks().next().unwrap().is_free);
    allocator.check().unwrap();
  }

  #[test]
  fn test_reallocate_grows_into_free_neighbour() {
    let mut allocator = allocator();
    let a = allocator.allocate(40).unwrap();
    let b = allocator.allocate(40);
    allocator.allocate(40);
    fill(&mut allocator, a, 40);
    allocator.deallocate(b);

    let c = allocator.reallocate(Some(a), 80).unwrap();

    assert_eq!(c, a);
    assert_eq!(allocator.payload(c).len(), 96);
    assert_filled(&allocator, c, 40);
    assert_eq!(allocator.check().unwrap().free_blocks, 0);
  }

  #[test]
  fn test_reallocate_shrink_keeps_prefix() {
    let mut allocator = allocator();
    let a = allocator.allocate(200).unwrap();
    allocator.allocate(8);
    fill(&mut allocator, a, 200);

    let b = allocator.reallocate(Some(a), 64).unwrap();

    assert_filled(&allocator, b, 64);
    allocator.check().unwrap();
  }

  #[test]
  fn test_reallocate_of_free_block_is_null() {
    let mut allocator = allocator();
    let a = allocator.allocate(24);
    allocator.allocate(24);
    allocator.deallocate(a);

    assert_eq!(allocator.reallocate(a, 48), None);
    allocator.check().unwrap();
  }

  #[test]
  fn test_out_of_memory_leaves_heap_untouched() {
    let mut allocator = ExplicitAllocator::init(VecHeap::with_limit(HEAD_TABLE_SIZE + 64)).unwrap();
    allocator.allocate(48).unwrap();
    let before = allocator.heap().bytes().to_vec();

    assert_eq!(allocator.allocate(8), None);
    assert_eq!(allocator.heap().bytes(), &before[..]);
  }

  #[test]
  fn test_failed_in_place_growth_keeps_block() {
    let mut allocator = ExplicitAllocator::init(VecHeap::with_limit(256)).unwrap();
    let a = allocator.allocate(16).unwrap();
    fill(&mut allocator, a, 16);

    assert_eq!(allocator.reallocate(Some(a), 1000), None);
    assert_eq!(allocator.payload(a).len(), 16);
    assert_filled(&allocator, a, 16);
    allocator.check().unwrap();
  }

  #[test]
  fn test_repeat_free_after_merge_is_rejected() {
    let mut allocator = allocator();
    let a = allocator.allocate(40);
    let b = allocator.allocate(40);
    let c = allocator.allocate(40);
    allocator.allocate(40);

    allocator.deallocate(a);
    allocator.deallocate(c);
    allocator.deallocate(b);

    assert_eq!(
      allocator.try_deallocate(a),
      Err(FreeError::DoubleFree { offset: a.unwrap().offset() })
    );
    assert_eq!(
      allocator.try_deallocate(c),
      Err(FreeError::NotABlock { offset: c.unwrap().offset() })
    );

    let big = allocator.allocate(150).unwrap();
    assert_eq!(Some(big), a);

    assert_eq!(
      allocator.try_deallocate(b),
      Err(FreeError::NotABlock { offset: b.unwrap().offset() })
    );
    assert_eq!(allocator.check().unwrap().free_blocks, 0);
    assert_ne!(allocator.allocate(8), Some(big));
    allocator.check().unwrap();
  }

  #[test]
  fn test_failed_move_releases_block() {
    let mut allocator = ExplicitAllocator::init(VecHeap::with_limit(HEAD_TABLE_SIZE + 112)).unwrap();
    let a = allocator.allocate(40).unwrap();
    allocator.allocate(40).unwrap();

    assert_eq!(allocator.reallocate(Some(a), 200), None);

    assert_eq!(allocator.heap().len(), HEAD_TABLE_SIZE + 112);
    let first = allocator.blocks().next().unwrap();
    assert_eq!((first.offset, first.size, first.is_free), (HEAD_TABLE_SIZE, 56, true));
    assert_eq!(allocator.check().unwrap().free_blocks, 1);
    assert_eq!(
      allocator.try_deallocate(Some(a)),
      Err(FreeError::DoubleFree { offset: a.offset() })
    );
  }
}
