//! Header-chain block allocator for fixed memory windows.
//!
//! This crate manages a single contiguous memory window (an [`Arena`]) by
//! carving it into blocks, each prefixed by a 4-byte in-place
//! [`BlockHeader`]. There is no side table: the window itself holds every
//! piece of allocator state, so a window can be reset or inspected from a
//! raw memory dump.
//!
//! The crate is `no_std` and allocation-free. It is the engine behind the
//! zone manager in the `workram` crate, but works on any byte storage.
//!
//! # Properties
//!
//! - First-fit allocation in address order, 4-byte granularity.
//! - Leftovers too small to hold another header are absorbed into the
//!   allocated block.
//! - Free blocks are coalesced forward on release and lazily during the next
//!   allocation scan.
//! - Failures are reported as `None`; releasing an address that is not a
//!   live block does nothing.
//!
//! # Example
//!
//! ```rust
//! use block_heap::Arena;
//!
//! let mut arena = Arena::new(0x0600_0000, [0u8; 256]);
//!
//! let a = arena.malloc(10).unwrap();
//! assert_eq!(a, 0x0600_0004);
//! assert_eq!(arena.payload(a).unwrap().len(), 12);
//!
//! let b = arena.realloc(Some(a), 64).unwrap();
//! arena.free(b);
//! assert_eq!(arena.free_space(), 252);
//! ```

#![cfg_attr(not(test), no_std)]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub use self::{
    arena::{Arena, ArenaStats, Block, Blocks, CorruptChain, CorruptChainKind, MAX_ARENA_SIZE},
    header::{BLOCK_ALIGN, BlockHeader, BlockState, HEADER_SIZE, MAX_BLOCK_SIZE},
};

pub mod arena;
pub mod header;
