//! Doubly-linked lists of free blocks, threaded through the blocks themselves.
//!
//! ```text
//!   offset 0                       HEAD_TABLE_SIZE
//!   ┌────────┬───────────┬─────────────────────────────────────────┐
//!   │ head 0 │ separator │ blocks ...                              │
//!   └───┬────┴───────────┴─────────────────────────────────────────┘
//!       │
//!       ▼
//!   ┌────────┬──────┬──────┬─────┬────────┐      ┌────────┬──────┬──────┬─────┬────────┐
//!   │ size|1 │ next │ prev │ ... │ size|1 │ ───▶ │ size|1 │ next │ prev │ ... │ size|1 │
//!   └────────┴──────┴──────┴─────┴────────┘ ◀─── └────────┴──────┴──────┴─────┴────────┘
//! ```
//!
//! Links are heap offsets. Offset 0 belongs to the head table, so a stored
//! 0 means "no block".

use crate::{
  align::WORD_SIZE,
  block::{BoundaryTag, read_word, write_tags, write_word},
  explicit::ExplicitAllocator,
  heap::HeapExtend,
};

/// Number of free lists. One class is the plain explicit free list.
pub const SIZE_CLASSES: usize = 1;

/// Bytes reserved at the low end of the heap: one head per class plus a
/// zero word separating the table from the first block.
pub const HEAD_TABLE_SIZE: usize = (SIZE_CLASSES + 1) * WORD_SIZE;

const NULL: usize = 0;
const NEXT: usize = WORD_SIZE;
const PREV: usize = 2 * WORD_SIZE;

/// Maps a block size to the list that holds blocks of that size.
///
/// Lists are searched from `classify(size)` upwards, so a segregated layout
/// only has to keep the classes ordered by size. The cached maximum used by
/// `search` is kept per class.
pub fn classify(_size: usize) -> usize {
  0
}

fn link(word: usize) -> Option<usize> {
  (word != NULL).then_some(word)
}

impl<H: HeapExtend> ExplicitAllocator<H> {
  pub(crate) fn head(
    &self,
    class: usize,
  ) -> Option<usize> {
    link(read_word(self.heap.bytes(), class * WORD_SIZE))
  }

  fn set_head(
    &mut self,
    class: usize,
    block: Option<usize>,
  ) {
    write_word(self.heap.bytes_mut(), class * WORD_SIZE, block.unwrap_or(NULL));
  }

  pub(crate) fn next_of(
    &self,
    block: usize,
  ) -> Option<usize> {
    link(read_word(self.heap.bytes(), block + NEXT))
  }

  pub(crate) fn prev_of(
    &self,
    block: usize,
  ) -> Option<usize> {
    link(read_word(self.heap.bytes(), block + PREV))
  }

  fn set_next(
    &mut self,
    block: usize,
    next: Option<usize>,
  ) {
    write_word(self.heap.bytes_mut(), block + NEXT, next.unwrap_or(NULL));
  }

  fn set_prev(
    &mut self,
    block: usize,
    prev: Option<usize>,
  ) {
    write_word(self.heap.bytes_mut(), block + PREV, prev.unwrap_or(NULL));
  }

  /// Tags `block` as a free block of `size` bytes and pushes it on the front
  /// of its list.
  pub(crate) fn insert(
    &mut self,
    block: usize,
    size: usize,
  ) {
    write_tags(self.heap.bytes_mut(), block, BoundaryTag::free(size));

    let class = classify(size);
    let old_head = self.head(class);

    self.set_prev(block, None);
    self.set_next(block, old_head);

    if let Some(old_head) = old_head {
      self.set_prev(old_head, Some(block));
    }

    self.set_head(class, Some(block));
  }

  /// Unlinks `block` from its list. The block's header must still describe
  /// it; header and footer are left as they are.
  pub(crate) fn remove(
    &mut self,
    block: usize,
  ) {
    let prev = self.prev_of(block);
    let next = self.next_of(block);

    match prev {
      Some(prev) => self.set_next(prev, next),
      None => {
        let class = classify(self.tag_at(block).size);
        self.set_head(class, next);
      }
    }

    if let Some(next) = next {
      self.set_prev(next, prev);
    }
  }
}
