//! The region an allocator carves blocks out of.
//!
//! A heap only ever grows at its high end, the way `sbrk(2)` moves the
//! program break. Positions inside it are byte offsets from the low end.

use log::debug;

use crate::error::HeapError;

/// Size of the heap reserved by [`VecHeap::new`] and [`MmapHeap::new`](crate::MmapHeap::new).
pub const DEFAULT_MAX_HEAP: usize = 20 * (1 << 20);

/// Heap extension primitive consumed by the allocator.
pub trait HeapExtend {
  /// Grows the committed region by `bytes` and returns the offset where the
  /// new bytes start. A failed extension leaves the region unchanged.
  fn extend(
    &mut self,
    bytes: usize,
  ) -> Result<usize, HeapError>;

  /// Number of committed bytes.
  fn len(&self) -> usize;

  fn bytes(&self) -> &[u8];

  fn bytes_mut(&mut self) -> &mut [u8];

  fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// First offset of the region. Fixed for the heap's lifetime.
  fn low(&self) -> usize {
    0
  }

  /// Last committed offset (inclusive), `None` while nothing is committed.
  fn high(&self) -> Option<usize> {
    self.len().checked_sub(1)
  }
}

/// Simulated heap backed by a `Vec<u8>` with a hard upper bound.
///
/// Extension can also be switched off entirely, which is how out-of-memory
/// paths are exercised in tests.
#[derive(Debug)]
pub struct VecHeap {
  memory: Vec<u8>,
  limit: usize,
  disabled: bool,
}

impl VecHeap {
  pub fn new() -> Self {
    Self::with_limit(DEFAULT_MAX_HEAP)
  }

  pub fn with_limit(limit: usize) -> Self {
    Self {
      memory: Vec::new(),
      limit,
      disabled: false,
    }
  }

  pub fn limit(&self) -> usize {
    self.limit
  }

  /// Makes every following [`extend`](HeapExtend::extend) fail (or succeed again).
  pub fn set_disabled(
    &mut self,
    disabled: bool,
  ) {
    self.disabled = disabled;
  }
}

impl Default for VecHeap {
  fn default() -> Self {
    Self::new()
  }
}

impl HeapExtend for VecHeap {
  fn extend(
    &mut self,
    bytes: usize,
  ) -> Result<usize, HeapError> {
    if self.disabled {
      return Err(HeapError::Disabled);
    }

    let old_len = self.memory.len();
    let available = self.limit - old_len;

    if bytes > available {
      return Err(HeapError::Exhausted {
        requested: bytes,
        available,
      });
    }

    self.memory.resize(old_len + bytes, 0);
    debug!("heap extended by {bytes} bytes to {}", self.memory.len());

    Ok(old_len)
  }

  fn len(&self) -> usize {
    self.memory.len()
  }

  fn bytes(&self) -> &[u8] {
    &self.memory
  }

  fn bytes_mut(&mut self) -> &mut [u8] {
    &mut self.memory
  }
}
