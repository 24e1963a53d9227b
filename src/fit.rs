use log::debug;

use crate::{
  block::{BoundaryTag, MIN_BLOCK_SIZE, write_tags},
  explicit::ExplicitAllocator,
  heap::HeapExtend,
};

impl<H: HeapExtend> ExplicitAllocator<H> {
  /// Best fit over list `class`: the smallest free block of at least `size`
  /// bytes, the earliest in list order on ties.
  ///
  /// The scan records the largest free block of the class, so the next
  /// request that cannot fit in it returns without walking the list. Picking
  /// a block of exactly that size drops the record.
  pub(crate) fn search(
    &mut self,
    class: usize,
    size: usize,
  ) -> Option<usize> {
    if matches!(self.max_free[class], Some(max) if max < size) {
      return None;
    }

    let mut best: Option<Candidate> = None;
    let mut largest = 0;
    let mut cursor = self.head(class);

    while let Some(block) = cursor {
      let tag = self.tag_at(block);

      if tag.size >= size && best.is_none_or(|best| tag.size < best.tag.size) {
        best = Some(Candidate { block, tag });
      }

      largest = largest.max(tag.size);
      cursor = self.next_of(block);
    }

    self.max_free[class] = Some(largest);

    let best = best?;

    if best.tag.size == largest {
      debug!("largest free block ({largest} bytes) taken, dropping cached maximum");
      self.max_free[class] = None;
    }

    Some(best.block)
  }

  /// Takes `block` off its list and allocates its first `size` bytes. The
  /// rest goes back on a free list when it can hold a free block on its own
  /// and stays part of the allocation otherwise.
  pub(crate) fn split(
    &mut self,
    block: usize,
    size: usize,
  ) {
    self.remove(block);

    let total = self.tag_at(block).size;
    let remainder = total - size;

    if remainder >= MIN_BLOCK_SIZE {
      write_tags(self.heap.bytes_mut(), block, BoundaryTag::allocated(size));
      self.insert(block + size, remainder);
    } else {
      write_tags(self.heap.bytes_mut(), block, BoundaryTag::allocated(total));
    }
  }
}

#[derive(Clone, Copy)]
struct Candidate {
  block: usize,
  tag: BoundaryTag,
}
