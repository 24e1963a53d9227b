/// Size of a boundary tag or free-list link, in bytes.
pub const WORD_SIZE: usize = 8;

/// Every block size, and therefore every payload offset, is a multiple of this.
pub const ALIGNMENT: usize = 8;

/// Rounds `value` up to the next multiple of [`ALIGNMENT`].
///
/// # Examples
///
/// ```rust
/// use tagalloc::align;
///
/// assert_eq!(align!(0), 0);
/// assert_eq!(align!(13), 16);
/// assert_eq!(align!(16), 16);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    ($value + $crate::align::ALIGNMENT - 1) & !($crate::align::ALIGNMENT - 1)
  };
}

/// Checked variant of [`align!`] for sizes coming straight from a caller.
///
/// Returns `None` if rounding up would overflow `usize`.
pub fn align_checked(value: usize) -> Option<usize> {
  value
    .checked_add(ALIGNMENT - 1)
    .map(|v| v & !(ALIGNMENT - 1))
}

pub fn is_aligned(value: usize) -> bool {
  value & (ALIGNMENT - 1) == 0
}
