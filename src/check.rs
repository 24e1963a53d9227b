//! Heap walking: a block-by-block dump and an invariant checker.

use std::fmt;

use crate::{
  align::{WORD_SIZE, is_aligned},
  block::{BoundaryTag, MIN_BLOCK_SIZE, footer_of, read_header},
  error::HeapCorruption,
  explicit::{ExplicitAllocator, Payload},
  free_list::{HEAD_TABLE_SIZE, SIZE_CLASSES, classify},
  heap::HeapExtend,
};

/// One block as seen while walking the heap from low to high.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  pub offset: usize,
  pub size: usize,
  pub is_free: bool,
}

impl BlockInfo {
  pub fn payload(&self) -> Payload {
    Payload::of_block(self.offset)
  }
}

/// Iterator over the blocks of a heap, in address order.
///
/// Stops early on a zero-sized or overrunning header instead of looping.
pub struct Blocks<'a> {
  bytes: &'a [u8],
  cursor: usize,
}

impl Iterator for Blocks<'_> {
  type Item = BlockInfo;

  fn next(&mut self) -> Option<BlockInfo> {
    if self.cursor + WORD_SIZE > self.bytes.len() {
      return None;
    }

    let BoundaryTag { size, is_free } = read_header(self.bytes, self.cursor);
    let info = BlockInfo {
      offset: self.cursor,
      size,
      is_free,
    };

    self.cursor = if size == 0 { self.bytes.len() } else { self.cursor.saturating_add(size) };
    Some(info)
  }
}

/// Totals gathered by a successful [`ExplicitAllocator::check`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
  pub blocks: usize,
  pub free_blocks: usize,
  pub free_bytes: usize,
  pub allocated_bytes: usize,
  pub largest_free: usize,
}

/// `Display` adapter printing one line per block.
pub struct HeapDump<'a, H: HeapExtend> {
  allocator: &'a ExplicitAllocator<H>,
}

impl<H: HeapExtend> fmt::Display for HeapDump<'_, H> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    let heap = self.allocator.heap();
    writeln!(f, "heap: {} bytes ({} reserved for list heads)", heap.len(), HEAD_TABLE_SIZE)?;

    for block in self.allocator.blocks() {
      let state = if block.is_free { "free" } else { "allocated" };
      writeln!(f, "  {:#08x}  {:>9}  {}", block.offset, state, block.size)?;
    }

    Ok(())
  }
}

impl<H: HeapExtend> ExplicitAllocator<H> {
  pub fn blocks(&self) -> Blocks<'_> {
    Blocks {
      bytes: self.heap.bytes(),
      cursor: HEAD_TABLE_SIZE,
    }
  }

  pub fn dump(&self) -> HeapDump<'_, H> {
    HeapDump { allocator: self }
  }

  /// Walks the heap and every free list, verifying block layout, tag
  /// mirroring, coalescing, list links and the cached maximum.
  pub fn check(&self) -> Result<HeapStats, HeapCorruption> {
    let bytes = self.heap.bytes();
    let mut stats = HeapStats::default();
    let mut free = Vec::new();
    let mut previous_free: Option<usize> = None;
    let mut cursor = HEAD_TABLE_SIZE;

    while cursor < bytes.len() {
      let tag = read_header(bytes, cursor);

      if tag.size < MIN_BLOCK_SIZE || !is_aligned(tag.size) || !is_aligned(cursor) {
        return Err(HeapCorruption::BadBlock {
          block: cursor,
          size: tag.size,
        });
      }

      if tag.size > bytes.len() - cursor {
        return Err(HeapCorruption::Overrun { block: cursor });
      }

      if read_header(bytes, footer_of(cursor, tag.size)) != tag {
        return Err(HeapCorruption::TagMismatch { block: cursor });
      }

      stats.blocks += 1;

      if tag.is_free {
        if let Some(left) = previous_free {
          return Err(HeapCorruption::Uncoalesced { left, right: cursor });
        }

        stats.free_blocks += 1;
        stats.free_bytes += tag.size;
        stats.largest_free = stats.largest_free.max(tag.size);
        free.push(cursor);
        previous_free = Some(cursor);
      } else {
        stats.allocated_bytes += tag.size;
        previous_free = None;
      }

      cursor += tag.size;
    }

    let mut listed = 0;

    for class in 0..SIZE_CLASSES {
      let mut expected_prev = None;
      let mut link_from = class * WORD_SIZE;
      let mut node = self.head(class);
      let mut largest = 0;

      while let Some(block) = node {
        if free.binary_search(&block).is_err() {
          return Err(HeapCorruption::BadLink {
            block: link_from,
            target: block,
          });
        }

        let size = self.tag_at(block).size;
        largest = largest.max(size);

        let expected = classify(size);
        if expected != class {
          return Err(HeapCorruption::WrongClass {
            block,
            found: class,
            expected,
          });
        }

        if self.prev_of(block) != expected_prev {
          return Err(HeapCorruption::BrokenBackLink {
            block,
            expected: expected_prev.unwrap_or(0),
          });
        }

        listed += 1;
        if listed > free.len() {
          break;
        }

        expected_prev = Some(block);
        link_from = block;
        node = self.next_of(block);
      }

      if let Some(cached) = self.max_free[class] {
        if cached > largest {
          return Err(HeapCorruption::StaleMaximum {
            cached,
            actual: largest,
          });
        }
      }
    }

    if listed != free.len() {
      return Err(HeapCorruption::ListMismatch {
        listed,
        free: free.len(),
      });
    }

    Ok(stats)
  }
}
