/// Failure reported by a [`HeapExtend`](crate::heap::HeapExtend) implementation.
#[derive(Debug, thiserror::Error)]
pub enum HeapError {
  #[error("heap exhausted: requested {requested} bytes, {available} available")]
  Exhausted { requested: usize, available: usize },
  #[error("heap extension disabled")]
  Disabled,
  #[error("failed to map heap region")]
  Map(#[source] std::io::Error),
}

/// An allocator could not be set up on the given heap.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
  #[error("heap already holds {0} bytes")]
  NotEmpty(usize),
  #[error("unable to reserve the free-list head table")]
  Reserve(#[from] HeapError),
}

/// Why a payload could not be released.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FreeError {
  #[error("null payload")]
  Null,
  #[error("payload {offset:#x} is outside the heap")]
  OutOfBounds { offset: usize },
  #[error("payload {offset:#x} is not aligned")]
  Misaligned { offset: usize },
  #[error("block at payload {offset:#x} is already free")]
  DoubleFree { offset: usize },
  #[error("payload {offset:#x} does not start an allocated block")]
  NotABlock { offset: usize },
}

/// A broken heap invariant found by [`ExplicitAllocator::check`](crate::ExplicitAllocator::check).
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HeapCorruption {
  #[error("block {block:#x} is not aligned or has size {size}")]
  BadBlock { block: usize, size: usize },
  #[error("block {block:#x} runs past the end of the heap")]
  Overrun { block: usize },
  #[error("block {block:#x} header and footer disagree")]
  TagMismatch { block: usize },
  #[error("free blocks {left:#x} and {right:#x} are adjacent")]
  Uncoalesced { left: usize, right: usize },
  #[error("free list link at {block:#x} points to {target:#x}, which is not a free block")]
  BadLink { block: usize, target: usize },
  #[error("prev link of {block:#x} does not point back to {expected:#x}")]
  BrokenBackLink { block: usize, expected: usize },
  #[error("free block {block:#x} is listed in class {found}, expected class {expected}")]
  WrongClass { block: usize, found: usize, expected: usize },
  #[error("free list has {listed} entries but the heap has {free} free blocks")]
  ListMismatch { listed: usize, free: usize },
  #[error("cached maximum {cached} exceeds the largest free block {actual}")]
  StaleMaximum { cached: usize, actual: usize },
}
