//! # tagalloc - An Explicit Free-List Allocator
//!
//! This crate provides an **explicit free-list allocator** with boundary-tag
//! coalescing and best-fit placement, running over a heap that only grows,
//! the way `sbrk(2)` grows a program's data segment.
//!
//! ## Overview
//!
//! Every block records its size and state twice, in a header and a footer.
//! Free blocks additionally carry two links that chain them into a
//! doubly-linked free list stored inside the free memory itself:
//!
//! ```text
//!   Allocated block:
//!   ┌──────────┬────────────────────────────────┬──────────┐
//!   │ size | 0 │           payload              │ size | 0 │
//!   └──────────┴────────────────────────────────┴──────────┘
//!              ▲
//!              └── Payload returned to the caller
//!
//!   Free block:
//!   ┌──────────┬──────┬──────┬──────────────────┬──────────┐
//!   │ size | 1 │ next │ prev │     unused       │ size | 1 │
//!   └──────────┴──────┴──────┴──────────────────┴──────────┘
//! ```
//!
//! The footer lets a block that is being freed look at its left neighbour
//! without walking anything, so freeing merges with free neighbours in O(1)
//! and the heap never holds two free blocks side by side.
//!
//! ## Crate Structure
//!
//! ```text
//!   tagalloc
//!   ├── align      - Alignment constants and the align! macro
//!   ├── block      - Boundary tag codec and word access
//!   ├── heap       - HeapExtend trait and the Vec-backed VecHeap
//!   ├── mmap       - MmapHeap, an mmap(2)-reserved heap
//!   ├── free_list  - Size classes, insert and remove
//!   ├── fit        - Best-fit search and block splitting
//!   ├── explicit   - ExplicitAllocator: allocate, deallocate, reallocate
//!   ├── check      - Heap dump and invariant checker
//!   └── error      - Error types
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use tagalloc::{ExplicitAllocator, VecHeap};
//!
//! let mut allocator = ExplicitAllocator::init(VecHeap::new()).unwrap();
//!
//! let ptr = allocator.allocate(11).unwrap();
//! allocator.payload_mut(ptr)[..11].copy_from_slice(b"hello world");
//!
//! let ptr = allocator.reallocate(Some(ptr), 64).unwrap();
//! assert_eq!(&allocator.payload(ptr)[..11], b"hello world");
//!
//! allocator.deallocate(Some(ptr));
//! assert!(allocator.check().is_ok());
//! ```
//!
//! ## How It Works
//!
//! ```text
//!   Heap Layout:
//!
//!   low                                                            high
//!   ┌────────────┬────────┬──────────┬────────┬──────────┬─────────┐
//!   │ list heads │ alloc  │   free   │ alloc  │   free   │  alloc  │
//!   └────────────┴────────┴──────────┴────────┴──────────┴─────────┘
//!         │                   ▲                   ▲
//!         └───────────────────┴───────────────────┘
//!                     free list (unordered)
//! ```
//!
//! - **allocate** scans the free list for the smallest block that fits,
//!   splits off what it does not need, and grows the heap when nothing fits.
//! - **deallocate** merges the block with free neighbours and pushes the
//!   result on the front of the list.
//! - **reallocate** grows or shrinks the topmost block in place by moving
//!   the break; any other block is freed, re-placed and its payload copied.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: No synchronization primitives
//! - **Never shrinks**: Freed memory is reused but not returned to the OS
//! - **8-byte alignment**: Payloads are aligned to 8 bytes, not to arbitrary layouts
//! - **One size class**: `classify` is the hook for segregated lists

pub mod align;
mod block;
mod check;
mod error;
mod explicit;
mod fit;
mod free_list;
mod heap;
mod mmap;

pub use align::{ALIGNMENT, WORD_SIZE};
pub use block::{ALLOCATED_OVERHEAD, BoundaryTag, MIN_BLOCK_SIZE};
pub use check::{BlockInfo, Blocks, HeapDump, HeapStats};
pub use error::{FreeError, HeapCorruption, HeapError, InitError};
pub use explicit::{ExplicitAllocator, Payload};
pub use free_list::{HEAD_TABLE_SIZE, SIZE_CLASSES, classify};
pub use heap::{DEFAULT_MAX_HEAP, HeapExtend, VecHeap};
pub use mmap::MmapHeap;
