//! Single-window arena with an embedded header chain.
//!
//! An [`Arena`] manages one contiguous memory window. The window is always
//! completely tiled by blocks: the first header lives at offset 0, each
//! following header lives right after the previous block's payload, and the
//! last block ends exactly at the end of the window.
//!
//! ```text
//! offset 0                                                     capacity
//! ┌──────┬──────────┬──────┬────────────────────┬──────┬───────────┐
//! │ USED │ payload  │ FREE │ payload            │ USED │ payload   │
//! │ 0x10 │ 16 bytes │ 0x20 │ 32 bytes           │ 0x8  │ 8 bytes   │
//! └──────┴──────────┴──────┴────────────────────┴──────┴───────────┘
//! ```
//!
//! # Algorithm
//!
//! - **Allocation** scans the chain from offset 0 and takes the first free
//!   block that fits (first-fit). Adjacent free blocks are folded into the
//!   block under the cursor before the fit test, and the chosen block is
//!   split when the leftover can hold another header.
//! - **Deallocation** marks the block free and folds any free blocks that
//!   follow it. A free block *preceding* the freed block is not merged here;
//!   the next allocation scan that passes over it folds it in.
//!
//! Nothing is cached outside the chain: every statistic is a fresh scan.

use core::fmt;

use dataview::DataView;

use crate::header::{BLOCK_ALIGN, BlockHeader, BlockState, HEADER_SIZE, MAX_BLOCK_SIZE};

/// Largest window an arena can manage.
pub const MAX_ARENA_SIZE: usize = HEADER_SIZE + MAX_BLOCK_SIZE;

/// A block in an arena's header chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    /// Offset of the block header from the start of the window.
    pub offset: usize,
    /// Address of the first payload byte.
    pub address: usize,
    /// Allocation state of the block.
    pub state: BlockState,
    /// Number of payload bytes.
    pub size: usize,
}

/// Aggregate figures of an arena, computed by one scan of its chain.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ArenaStats {
    /// Size of the whole window in bytes.
    pub capacity: usize,
    /// Bytes not available to callers: used payloads plus every header.
    pub used_bytes: usize,
    /// Payload bytes of all free blocks.
    pub free_bytes: usize,
    /// Number of blocks in the chain.
    pub block_count: usize,
    /// Number of free blocks in the chain.
    pub free_block_count: usize,
    /// Payload size of the largest single free block.
    pub largest_free_block: usize,
}

/// The header chain of an arena does not tile its window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display, derive_more::Error)]
#[display("corrupt block chain at offset {offset:#x}: {kind}")]
pub struct CorruptChain {
    /// Offset of the offending header.
    pub offset: usize,
    /// What is wrong with it.
    pub kind: CorruptChainKind,
}

/// The ways a header chain can be broken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum CorruptChainKind {
    /// The block extends past the end of the window.
    #[display("block of {size} bytes runs past the end of the window")]
    Overrun {
        /// Payload size recorded in the header.
        size: usize,
    },
    /// The recorded size is not a multiple of the block alignment.
    #[display("block size {size} is not a multiple of {BLOCK_ALIGN}")]
    Unaligned {
        /// Payload size recorded in the header.
        size: usize,
    },
}

/// A fixed-size memory window partitioned into a chain of header-prefixed
/// blocks.
///
/// `S` is the backing storage: a `&'static mut [u8]` over a physical window on
/// hardware, or any owned byte buffer elsewhere. `base` is the address the
/// storage occupies in the console's address map; every address accepted or
/// returned by the arena is expressed in that map.
pub struct Arena<S> {
    base: usize,
    storage: S,
}

impl<S> fmt::Debug for Arena<S>
where
    S: AsRef<[u8]>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("base", &format_args!("{:#010x}", self.base))
            .field("capacity", &self.storage.as_ref().len())
            .finish_non_exhaustive()
    }
}

impl<S> Arena<S>
where
    S: AsRef<[u8]> + AsMut<[u8]>,
{
    /// Creates an arena over `storage`, located at `base`, and initializes it
    /// with a single free block spanning the whole window.
    ///
    /// # Panics
    ///
    /// Panics if:
    ///
    /// - `base` or the storage length is not a multiple of [`BLOCK_ALIGN`]
    /// - the storage cannot hold a single header
    /// - the storage is larger than [`MAX_ARENA_SIZE`]
    /// - `base + storage length` overflows the address space
    #[must_use]
    pub fn new(base: usize, storage: S) -> Self {
        let capacity = storage.as_ref().len();
        assert!(
            base.is_multiple_of(BLOCK_ALIGN),
            "arena base must be aligned to {BLOCK_ALIGN}: base={base:#x}"
        );
        assert!(
            capacity.is_multiple_of(BLOCK_ALIGN),
            "arena size must be a multiple of {BLOCK_ALIGN}: size={capacity}"
        );
        assert!(
            (HEADER_SIZE..=MAX_ARENA_SIZE).contains(&capacity),
            "arena size out of range: size={capacity}"
        );
        assert!(
            base.checked_add(capacity).is_some(),
            "arena window overflows the address space: base={base:#x}, size={capacity}"
        );

        let mut arena = Self { base, storage };
        arena.initialize();
        arena
    }

    /// Resets the arena to a single free block spanning the whole window.
    ///
    /// Every outstanding allocation is forgotten.
    pub fn initialize(&mut self) {
        let size = self.capacity() - HEADER_SIZE;
        self.write_header(0, BlockHeader::free(size));
    }

    /// Returns the address of the first byte of the window.
    #[must_use]
    pub fn base(&self) -> usize {
        self.base
    }

    /// Returns the size of the window in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.storage.as_ref().len()
    }

    /// Returns `true` if `addr` lies inside the window.
    ///
    /// This is a pure address test; it says nothing about whether the address
    /// belongs to a live allocation.
    #[must_use]
    pub fn contains(&self, addr: usize) -> bool {
        addr.checked_sub(self.base)
            .is_some_and(|offset| offset < self.capacity())
    }

    /// Returns the offset of the header that follows the block at `offset`.
    ///
    /// `offset` must be the offset of a block header in the chain, as found
    /// by walking from 0 or through [`blocks`](Self::blocks). For any other
    /// offset inside the window the result is meaningless.
    ///
    /// # Panics
    ///
    /// Panics if a header at `offset` would not fit in the window.
    #[must_use]
    pub fn next_block_offset(&self, offset: usize) -> usize {
        assert!(
            offset
                .checked_add(HEADER_SIZE)
                .is_some_and(|end| end <= self.capacity()),
            "block offset out of the window: offset={offset:#x}, capacity={:#x}",
            self.capacity()
        );
        offset + HEADER_SIZE + self.read_header(offset).size()
    }

    /// Allocates `size` bytes and returns the address of the payload.
    ///
    /// The size is rounded up to a multiple of [`BLOCK_ALIGN`]. Zero-sized
    /// requests succeed and occupy one header. The payload address always
    /// lies inside the window. Returns `None` if no free block is large
    /// enough; the logical content of the arena is unchanged in that case.
    pub fn malloc(&mut self, size: usize) -> Option<usize> {
        let size = round_size(size)?;
        let offset = self.first_fit(size)?;
        let allocated = self.set_block_allocation(offset, size);
        debug_assert!(allocated, "first fit must hold the request");
        Some(self.payload_address(offset))
    }

    /// Releases the block whose payload starts at `addr`.
    ///
    /// Addresses outside the window, misaligned addresses and addresses that
    /// do not start a block payload are ignored.
    pub fn free(&mut self, addr: usize) {
        if let Some(offset) = self.block_offset(addr) {
            self.free_block(offset);
        }
    }

    /// Resizes the block whose payload starts at `addr` to `size` bytes.
    ///
    /// With `addr == None` this is [`malloc`](Self::malloc). Otherwise the
    /// block is first released and merged with the free blocks that follow
    /// it; if the merged region can hold `size` bytes the block stays where it
    /// is and the same address is returned. If not, the chain is scanned like
    /// [`malloc`](Self::malloc) does, which may fold a free predecessor into
    /// the released block. The old payload is moved into the chosen block
    /// (the two may overlap) before the block is split.
    ///
    /// Returns `None` if `addr` is not a live block of this arena or if no
    /// block can hold `size` bytes. The original block is then left allocated
    /// at the same address with its content intact.
    pub fn realloc(&mut self, addr: Option<usize>, size: usize) -> Option<usize> {
        let Some(addr) = addr else {
            return self.malloc(size);
        };
        let size = round_size(size)?;
        let offset = self.block_offset(addr)?;
        let old_header = self.read_header(offset);
        if old_header.state().is_free() {
            return None;
        }

        self.free_block(offset);
        if self.set_block_allocation(offset, size) {
            return Some(addr);
        }

        let Some(new_offset) = self.first_fit(size) else {
            let restored = self.reserve_at(offset, old_header.size());
            debug_assert!(restored.is_some(), "released block must be restorable");
            return None;
        };

        // Headers written so far sit outside the old payload. Move it before
        // the split header can land inside it.
        let src = offset + HEADER_SIZE;
        let dst = new_offset + HEADER_SIZE;
        self.bytes_mut()
            .copy_within(src..src + old_header.size(), dst);
        let allocated = self.set_block_allocation(new_offset, size);
        debug_assert!(allocated, "first fit must hold the request");
        Some(self.payload_address(new_offset))
    }

    /// Allocates `size` bytes in a block whose header is placed at `addr`.
    ///
    /// `addr` must lie inside a free region of the window, aligned to
    /// [`BLOCK_ALIGN`], and the payload (`addr + HEADER_SIZE`) must also lie
    /// inside the window. If `addr` falls in the middle of a free block, the
    /// part in front of it is split off as a separate free block. Returns the
    /// payload address, or `None` if the address is outside the window,
    /// misaligned, inside a used block, or if the free region starting there
    /// is too small.
    pub fn malloc_at(&mut self, addr: usize, size: usize) -> Option<usize> {
        let size = round_size(size)?;
        if !self.contains(addr) {
            return None;
        }
        let target = addr - self.base;
        if !target.is_multiple_of(BLOCK_ALIGN) {
            return None;
        }
        self.reserve_at(target, size)
    }

    /// Returns the total payload size of all free blocks.
    #[must_use]
    pub fn free_space(&self) -> usize {
        self.blocks()
            .filter(|block| block.state.is_free())
            .map(|block| block.size)
            .sum()
    }

    /// Returns the number of bytes not available to callers: used payloads
    /// plus every header in the chain.
    #[must_use]
    pub fn used_space(&self) -> usize {
        self.blocks()
            .map(|block| match block.state {
                BlockState::Free => HEADER_SIZE,
                BlockState::Used => HEADER_SIZE + block.size,
            })
            .sum()
    }

    /// Returns the number of blocks in the chain.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks().count()
    }

    /// Returns the number of free blocks in the chain.
    #[must_use]
    pub fn free_block_count(&self) -> usize {
        self.blocks().filter(|block| block.state.is_free()).count()
    }

    /// Computes every statistic in a single scan.
    #[must_use]
    pub fn stats(&self) -> ArenaStats {
        let mut stats = ArenaStats {
            capacity: self.capacity(),
            ..ArenaStats::default()
        };
        for block in self.blocks() {
            stats.block_count += 1;
            stats.used_bytes += HEADER_SIZE;
            match block.state {
                BlockState::Free => {
                    stats.free_block_count += 1;
                    stats.free_bytes += block.size;
                    stats.largest_free_block = stats.largest_free_block.max(block.size);
                }
                BlockState::Used => stats.used_bytes += block.size,
            }
        }
        stats
    }

    /// Returns an iterator over the blocks of the chain in address order.
    pub fn blocks(&self) -> Blocks<'_> {
        Blocks {
            bytes: self.bytes(),
            base: self.base,
            offset: 0,
        }
    }

    /// Walks the chain and checks that it tiles the window exactly.
    pub fn verify(&self) -> Result<(), CorruptChain> {
        let capacity = self.capacity();
        let mut offset = 0;
        while offset < capacity {
            let header = self.read_header(offset);
            let size = header.size();
            if !size.is_multiple_of(BLOCK_ALIGN) {
                return Err(CorruptChain {
                    offset,
                    kind: CorruptChainKind::Unaligned { size },
                });
            }
            let Some(next) = (offset + HEADER_SIZE)
                .checked_add(size)
                .filter(|next| *next <= capacity)
            else {
                return Err(CorruptChain {
                    offset,
                    kind: CorruptChainKind::Overrun { size },
                });
            };
            offset = next;
        }
        Ok(())
    }

    /// Returns the payload of the live block starting at `addr`.
    #[must_use]
    pub fn payload(&self, addr: usize) -> Option<&[u8]> {
        let range = self.payload_range(addr)?;
        Some(&self.bytes()[range])
    }

    /// Returns the mutable payload of the live block starting at `addr`.
    pub fn payload_mut(&mut self, addr: usize) -> Option<&mut [u8]> {
        let range = self.payload_range(addr)?;
        Some(&mut self.bytes_mut()[range])
    }

    fn payload_range(&self, addr: usize) -> Option<core::ops::Range<usize>> {
        let offset = self.block_offset(addr)?;
        let header = self.read_header(offset);
        if header.state().is_free() {
            return None;
        }
        let start = offset + HEADER_SIZE;
        Some(start..start + header.size())
    }

    /// Folds every free block directly following the free block at `offset`
    /// into it.
    ///
    /// Does nothing if the block at `offset` is used.
    pub(crate) fn merge_free_blocks(&mut self, offset: usize) {
        let header = self.read_header(offset);
        if header.state().is_used() {
            return;
        }

        let mut size = header.size();
        let mut next = offset + HEADER_SIZE + size;
        while next < self.capacity() {
            let next_header = self.read_header(next);
            if next_header.state().is_used() {
                break;
            }
            size += HEADER_SIZE + next_header.size();
            next += HEADER_SIZE + next_header.size();
        }

        if size != header.size() {
            self.write_header(offset, BlockHeader::free(size));
        }
    }

    /// Tries to allocate `size` bytes (already rounded) in the free block at
    /// `offset`, splitting off the leftover as a new free block.
    ///
    /// A leftover too small to hold another header is absorbed into the
    /// allocation. Returns `false` without touching the chain if the block is
    /// used or too small.
    pub(crate) fn set_block_allocation(&mut self, offset: usize, size: usize) -> bool {
        let header = self.read_header(offset);
        if header.state().is_used() || header.size() < size {
            return false;
        }

        let size = if header.size() - size <= HEADER_SIZE {
            header.size()
        } else {
            size
        };

        self.write_header(offset, BlockHeader::used(size));
        if size < header.size() {
            let rest = offset + HEADER_SIZE + size;
            self.write_header(rest, BlockHeader::free(header.size() - size - HEADER_SIZE));
        }
        true
    }

    /// Returns the offset of the first free block, after merging, that can
    /// hold `size` bytes with its payload inside the window.
    fn first_fit(&mut self, size: usize) -> Option<usize> {
        let mut offset = 0;
        while offset < self.capacity() {
            if self.read_header(offset).state().is_free() {
                self.merge_free_blocks(offset);
                if self.read_header(offset).size() >= size && self.payload_in_window(offset) {
                    return Some(offset);
                }
            }
            offset = self.next_block_offset(offset);
        }
        None
    }

    /// Allocates `size` bytes (already rounded) with the header at `target`,
    /// which must lie in a free block.
    fn reserve_at(&mut self, target: usize, size: usize) -> Option<usize> {
        if !self.payload_in_window(target) {
            return None;
        }

        let mut offset = 0;
        while offset <= target {
            if self.read_header(offset).state().is_free() {
                self.merge_free_blocks(offset);
            }
            let header = self.read_header(offset);
            let next = self.next_block_offset(offset);
            if target < next {
                if header.state().is_used() {
                    return None;
                }
                return self.place_in_free_block(offset, target, size);
            }
            offset = next;
        }
        None
    }

    fn place_in_free_block(&mut self, offset: usize, target: usize, size: usize) -> Option<usize> {
        let header = self.read_header(offset);
        let end = offset + HEADER_SIZE + header.size();
        let available = end - target - HEADER_SIZE;
        if available < size {
            return None;
        }

        if target > offset {
            self.write_header(offset, BlockHeader::free(target - offset - HEADER_SIZE));
            self.write_header(target, BlockHeader::free(available));
        }
        let placed = self.set_block_allocation(target, size);
        debug_assert!(placed, "placement target must fit after the size check");
        Some(self.payload_address(target))
    }

    fn free_block(&mut self, offset: usize) {
        let header = self.read_header(offset);
        self.write_header(offset, header.with_state(BlockState::Free));
        self.merge_free_blocks(offset);
    }

    /// Maps a payload address back to the offset of its header.
    ///
    /// The address must lie in the window, be aligned, and start the payload
    /// of a block in the chain.
    fn block_offset(&self, addr: usize) -> Option<usize> {
        let offset = addr.checked_sub(self.base)?.checked_sub(HEADER_SIZE)?;
        if offset >= self.capacity() || !offset.is_multiple_of(BLOCK_ALIGN) {
            return None;
        }
        self.blocks()
            .map(|block| block.offset)
            .find(|block_offset| *block_offset >= offset)
            .filter(|block_offset| *block_offset == offset)
    }

    fn payload_in_window(&self, offset: usize) -> bool {
        offset + HEADER_SIZE < self.capacity()
    }

    fn payload_address(&self, offset: usize) -> usize {
        self.base + offset + HEADER_SIZE
    }

    fn read_header(&self, offset: usize) -> BlockHeader {
        *DataView::from(self.bytes()).get::<BlockHeader>(offset)
    }

    fn write_header(&mut self, offset: usize, header: BlockHeader) {
        DataView::from_mut(self.bytes_mut()).write(offset, &header);
    }

    fn bytes(&self) -> &[u8] {
        self.storage.as_ref()
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        self.storage.as_mut()
    }
}

/// Iterator over the blocks of an [`Arena`].
///
/// Stops early at the first header that would run past the end of the
/// window; [`Arena::verify`] reports such chains.
#[derive(Debug, Clone)]
pub struct Blocks<'a> {
    bytes: &'a [u8],
    base: usize,
    offset: usize,
}

impl Iterator for Blocks<'_> {
    type Item = Block;

    fn next(&mut self) -> Option<Self::Item> {
        let header = *DataView::from(self.bytes).try_get::<BlockHeader>(self.offset)?;
        let next = (self.offset + HEADER_SIZE)
            .checked_add(header.size())
            .filter(|next| *next <= self.bytes.len())?;
        let block = Block {
            offset: self.offset,
            address: self.base + self.offset + HEADER_SIZE,
            state: header.state(),
            size: header.size(),
        };
        self.offset = next;
        Some(block)
    }
}

fn round_size(size: usize) -> Option<usize> {
    size.checked_next_multiple_of(BLOCK_ALIGN)
        .filter(|size| *size <= MAX_BLOCK_SIZE)
}
