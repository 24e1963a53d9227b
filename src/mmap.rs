use std::{io, ptr, slice};

use libc::{MAP_ANONYMOUS, MAP_FAILED, MAP_PRIVATE, PROT_READ, PROT_WRITE, c_void, mmap, munmap};
use log::debug;

use crate::{
  error::HeapError,
  heap::{DEFAULT_MAX_HEAP, HeapExtend},
};

/// Heap backed by a private anonymous mapping.
///
/// The whole capacity is reserved up front with `mmap(2)` and then handed
/// out `sbrk`-style, so the region stays contiguous no matter what the rest
/// of the process does with the real program break.
///
/// ```text
///   base                     base + brk              base + capacity
///   ├────────── committed ───────┼──────── reserved ────────┤
/// ```
///
/// The mapping is page aligned, so any offset that is a multiple of
/// [`ALIGNMENT`](crate::align::ALIGNMENT) is an aligned address as well.
pub struct MmapHeap {
  base: *mut u8,
  capacity: usize,
  brk: usize,
}

impl MmapHeap {
  pub fn new() -> Result<Self, HeapError> {
    Self::with_capacity(DEFAULT_MAX_HEAP)
  }

  pub fn with_capacity(capacity: usize) -> Result<Self, HeapError> {
    // SAFETY: anonymous mapping at a kernel-chosen address; nothing aliases it.
    let base = unsafe {
      mmap(
        ptr::null_mut(),
        capacity.max(1),
        PROT_READ | PROT_WRITE,
        MAP_PRIVATE | MAP_ANONYMOUS,
        -1,
        0,
      )
    };

    if base == MAP_FAILED {
      return Err(HeapError::Map(io::Error::last_os_error()));
    }

    debug!("reserved {capacity} bytes at {base:?}");

    Ok(Self {
      base: base as *mut u8,
      capacity,
      brk: 0,
    })
  }

  /// Address of the first byte of the region.
  pub fn base(&self) -> *const u8 {
    self.base
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }
}

impl HeapExtend for MmapHeap {
  fn extend(
    &mut self,
    bytes: usize,
  ) -> Result<usize, HeapError> {
    let available = self.capacity - self.brk;

    if bytes > available {
      return Err(HeapError::Exhausted {
        requested: bytes,
        available,
      });
    }

    let old_brk = self.brk;
    self.brk += bytes;
    debug!("program break moved to {:?}", self.base.wrapping_add(self.brk));

    Ok(old_brk)
  }

  fn len(&self) -> usize {
    self.brk
  }

  fn bytes(&self) -> &[u8] {
    // SAFETY: `[base, base + brk)` lies inside the live mapping.
    unsafe { slice::from_raw_parts(self.base, self.brk) }
  }

  fn bytes_mut(&mut self) -> &mut [u8] {
    // SAFETY: as above, and `&mut self` guarantees exclusive access.
    unsafe { slice::from_raw_parts_mut(self.base, self.brk) }
  }
}

impl Drop for MmapHeap {
  fn drop(&mut self) {
    // SAFETY: `base` and `capacity` are exactly what `mmap` returned and took.
    unsafe {
      munmap(self.base as *mut c_void, self.capacity.max(1));
    }
  }
}
