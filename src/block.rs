use crate::align::WORD_SIZE;

/// Header plus footer carried by every allocated block.
pub const ALLOCATED_OVERHEAD: usize = 2 * WORD_SIZE;

/// Header, `next`, `prev` and footer: the smallest block that can sit on a free list.
pub const MIN_BLOCK_SIZE: usize = 4 * WORD_SIZE;

const FREE_BIT: usize = 1;

/// Size and state of a block, as stored in its header and footer words.
///
/// The size always includes the block's own overhead and is a multiple of
/// the alignment unit, which leaves the low bit free for the state flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundaryTag {
  pub size: usize,
  pub is_free: bool,
}

impl BoundaryTag {
  pub fn new(
    size: usize,
    is_free: bool,
  ) -> Self {
    Self { size, is_free }
  }

  pub fn allocated(size: usize) -> Self {
    Self::new(size, false)
  }

  pub fn free(size: usize) -> Self {
    Self::new(size, true)
  }

  pub fn encode(self) -> usize {
    debug_assert_eq!(self.size & FREE_BIT, 0, "block size must be aligned");
    if self.is_free { self.size | FREE_BIT } else { self.size }
  }

  pub fn decode(word: usize) -> Self {
    Self {
      size: word & !FREE_BIT,
      is_free: word & FREE_BIT != 0,
    }
  }
}

/// Reads the native-endian word stored at `offset`.
pub fn read_word(
  bytes: &[u8],
  offset: usize,
) -> usize {
  let mut word = [0u8; WORD_SIZE];
  word.copy_from_slice(&bytes[offset..offset + WORD_SIZE]);
  u64::from_ne_bytes(word) as usize
}

pub fn write_word(
  bytes: &mut [u8],
  offset: usize,
  value: usize,
) {
  bytes[offset..offset + WORD_SIZE].copy_from_slice(&(value as u64).to_ne_bytes());
}

/// Offset of the footer word of a block starting at `block` with `size` bytes.
pub fn footer_of(
  block: usize,
  size: usize,
) -> usize {
  block + size - WORD_SIZE
}

/// Writes the same tag into the header and footer of the block at `block`.
pub fn write_tags(
  bytes: &mut [u8],
  block: usize,
  tag: BoundaryTag,
) {
  let word = tag.encode();
  write_word(bytes, block, word);
  write_word(bytes, footer_of(block, tag.size), word);
}

pub fn read_header(
  bytes: &[u8],
  block: usize,
) -> BoundaryTag {
  BoundaryTag::decode(read_word(bytes, block))
}
