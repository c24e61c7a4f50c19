//! Zone-based dynamic memory manager for console work RAM.
//!
//! The console exposes several physically separate RAM regions at fixed
//! addresses. Each one is a [`Zone`] managed by its own
//! [`block_heap::Arena`]: a first-fit allocator whose bookkeeping lives in
//! 4-byte headers inside the zone itself. Callers allocate by zone tag (or
//! from the default zone, High Work RAM) and release by address alone; the
//! zone is found from the address window.
//!
//! Addresses, not references, are handed out. Buffers are consumed by other
//! hardware units (VDP, SCSP, CD block) that only understand raw addresses.
//!
//! # Modules
//!
//! - [`zone`]: zone tags, [`Address`] and the physical layout.
//! - [`map`]: the [`MemoryMap`] configuring which window each zone manages.
//! - [`memory`]: the [`Memory`] registry and dispatcher.
//! - [`report`]: per-zone [`Report`] snapshots.
//! - [`global`]: the process-wide manager and its per-zone facades.
//! - `hardware` (feature `linker-heap`): startup over the physical windows.
//!
//! # Example
//!
//! ```rust
//! use workram::{Memory, MemoryMap, Window, Zone, zone::layout};
//!
//! let map = MemoryMap::empty()
//!     .with_zone(Zone::HighWorkRam, Window::new(layout::high_work_ram::BASE, 0x1000))
//!     .with_zone(Zone::LowWorkRam, Window::new(layout::low_work_ram::BASE, 0x1000));
//! let mut memory = Memory::new(&map, |_, window| vec![0u8; window.size]).unwrap();
//!
//! let buffer = memory.malloc_in(256, Zone::LowWorkRam).unwrap();
//! assert!(memory.in_range(Zone::LowWorkRam, buffer));
//! assert!(!memory.in_range(Zone::HighWorkRam, buffer));
//!
//! memory.free(Some(buffer));
//! assert_eq!(memory.free_space(Zone::LowWorkRam), 0x1000 - 4);
//! ```

#![cfg_attr(not(test), no_std)]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub use self::{
    map::{MemoryMap, MemoryMapError},
    memory::Memory,
    report::Report,
    zone::{Address, Window, Zone},
};

pub mod global;
#[cfg(feature = "linker-heap")]
pub mod hardware;
pub mod map;
pub mod memory;
pub mod report;
pub mod zone;
