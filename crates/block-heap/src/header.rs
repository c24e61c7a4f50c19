//! In-place block headers.
//!
//! Every block in an arena, free or used, starts with a 4-byte
//! [`BlockHeader`]. The header packs the block state into the top bit and the
//! payload size into the remaining 31 bits:
//!
//! ```text
//!  31  30                                                      0
//! ┌───┬─────────────────────────────────────────────────────────┐
//! │ U │ size (bytes following the header, multiple of 4)        │
//! └───┴─────────────────────────────────────────────────────────┘
//! ```
//!
//! The word is stored big-endian, which is the byte order of the SH-2 CPUs
//! the arenas live next to, so a raw memory dump shows each header as a plain
//! 32-bit value.

use core::fmt;

use dataview::Pod;

/// Size of a block header in bytes.
pub const HEADER_SIZE: usize = size_of::<BlockHeader>();

/// Alignment of every block header and every block size.
pub const BLOCK_ALIGN: usize = 4;

/// Largest payload size a single header can describe.
pub const MAX_BLOCK_SIZE: usize = BlockHeader::SIZE_MASK as usize & !(BLOCK_ALIGN - 1);

const _: () = {
    assert!(HEADER_SIZE == 4);
    assert!(HEADER_SIZE.is_multiple_of(BLOCK_ALIGN));
    assert!(align_of::<BlockHeader>() == 1);
};

/// Allocation state of a block.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display, derive_more::IsVariant,
)]
pub enum BlockState {
    /// The block is available for allocation.
    #[display("free")]
    Free,
    /// The block has been handed out to a caller.
    #[display("used")]
    Used,
}

/// A packed `{state, size}` header stored at the start of every block.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Pod)]
pub struct BlockHeader {
    word: [u8; 4],
}

impl BlockHeader {
    const STATE_SHIFT: u32 = 31;
    const STATE_MASK: u32 = 1 << Self::STATE_SHIFT;
    const SIZE_MASK: u32 = !Self::STATE_MASK;

    /// Creates a header for a block of `size` payload bytes.
    ///
    /// # Panics
    ///
    /// Panics if `size` is not a multiple of [`BLOCK_ALIGN`] or exceeds
    /// [`MAX_BLOCK_SIZE`].
    #[must_use]
    pub fn new(state: BlockState, size: usize) -> Self {
        assert!(
            size.is_multiple_of(BLOCK_ALIGN),
            "block size must be a multiple of {BLOCK_ALIGN}: size={size}"
        );
        assert!(
            size <= MAX_BLOCK_SIZE,
            "block size exceeds the header range: size={size}"
        );
        let state_bit = match state {
            BlockState::Free => 0,
            BlockState::Used => Self::STATE_MASK,
        };
        #[expect(clippy::cast_possible_truncation)]
        let size = size as u32;
        Self::from_bits(state_bit | size)
    }

    /// Creates a header for a free block.
    #[must_use]
    pub fn free(size: usize) -> Self {
        Self::new(BlockState::Free, size)
    }

    /// Creates a header for a used block.
    #[must_use]
    pub fn used(size: usize) -> Self {
        Self::new(BlockState::Used, size)
    }

    /// Returns the state of the block.
    #[must_use]
    pub fn state(self) -> BlockState {
        if self.bits() & Self::STATE_MASK == 0 {
            BlockState::Free
        } else {
            BlockState::Used
        }
    }

    /// Returns the number of payload bytes following the header.
    #[must_use]
    pub fn size(self) -> usize {
        (self.bits() & Self::SIZE_MASK) as usize
    }

    /// Returns a copy of this header with the state replaced.
    #[must_use]
    pub fn with_state(self, state: BlockState) -> Self {
        Self::new(state, self.size())
    }

    /// Returns the raw 32-bit header word.
    #[must_use]
    pub fn bits(self) -> u32 {
        u32::from_be_bytes(self.word)
    }

    fn from_bits(bits: u32) -> Self {
        Self {
            word: bits.to_be_bytes(),
        }
    }
}

impl fmt::Debug for BlockHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockHeader")
            .field("state", &self.state())
            .field("size", &self.size())
            .finish()
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use dataview::PodMethods as _;

    use super::*;

    #[test]
    fn test_pack_free() {
        let header = BlockHeader::free(128);
        assert_eq!(header.state(), BlockState::Free);
        assert_eq!(header.size(), 128);
        assert_eq!(header.bits(), 128);
    }

    #[test]
    fn test_pack_used() {
        let header = BlockHeader::used(0x40);
        assert_eq!(header.state(), BlockState::Used);
        assert_eq!(header.size(), 0x40);
        assert_eq!(header.bits(), 0x8000_0040);
    }

    #[test]
    fn test_big_endian_layout() {
        let header = BlockHeader::used(0x0001_0204);
        assert_eq!(header.as_bytes(), &[0x80, 0x01, 0x02, 0x04]);
    }

    #[test]
    fn test_max_size() {
        let header = BlockHeader::used(MAX_BLOCK_SIZE);
        assert_eq!(header.size(), MAX_BLOCK_SIZE);
        assert!(header.state().is_used());
        assert_eq!(MAX_BLOCK_SIZE, 0x7FFF_FFFC);
    }

    #[test]
    fn test_zero_size() {
        let header = BlockHeader::free(0);
        assert!(header.state().is_free());
        assert_eq!(header.size(), 0);
    }

    #[test]
    fn test_with_state() {
        let header = BlockHeader::used(64).with_state(BlockState::Free);
        assert_eq!(header, BlockHeader::free(64));
    }

    #[test]
    #[should_panic(expected = "multiple of 4")]
    fn test_unaligned_size() {
        let _ = BlockHeader::free(6);
    }

    #[test]
    #[should_panic(expected = "exceeds the header range")]
    fn test_oversized() {
        let _ = BlockHeader::free(MAX_BLOCK_SIZE + BLOCK_ALIGN);
    }
}
