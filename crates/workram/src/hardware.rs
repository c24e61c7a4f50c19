//! Startup on real hardware.
//!
//! The High Work RAM heap is whatever the linker script leaves between
//! `_heap_start` and `_heap_end`; program code and static data occupy the
//! rest of that RAM. The other zones use their full physical windows.

use core::slice;

use snafu::{Location, ResultExt as _, Snafu};

use crate::{
    global,
    map::{MemoryMap, MemoryMapError},
    memory::Memory,
    zone::{Window, Zone},
};

unsafe extern "C" {
    #[link_name = "_heap_start"]
    static mut HEAP_START: u8;
    #[link_name = "_heap_end"]
    static mut HEAP_END: u8;
}

#[derive(Debug, Snafu)]
pub enum InitError {
    #[snafu(display("invalid memory map"))]
    Map {
        #[snafu(implicit)]
        location: Location,
        source: MemoryMapError,
    },
    #[snafu(display("memory manager is busy"))]
    Busy {
        #[snafu(implicit)]
        location: Location,
    },
}

/// Returns the High Work RAM heap window defined by the linker script,
/// shrunk inwards to block alignment.
#[must_use]
pub fn heap_window() -> Window {
    let start = (&raw mut HEAP_START).expose_provenance();
    let end = (&raw mut HEAP_END).expose_provenance();
    Window::aligned_within(start, end)
}

/// Returns the console memory map with the linker-defined heap as High Work
/// RAM.
#[must_use]
pub fn memory_map() -> MemoryMap {
    MemoryMap::saturn().with_zone(Zone::HighWorkRam, heap_window())
}

/// Builds the memory manager over the physical work RAM and installs it as
/// the process-wide manager.
///
/// # Errors
///
/// Fails if the memory map is invalid, or if the process-wide manager is in
/// use.
///
/// # Safety
///
/// Must be called once, before any allocation. Nothing else may access the
/// memory windows of [`memory_map`] while the manager is installed.
pub unsafe fn initialize() -> Result<(), InitError> {
    let memory = Memory::new(&memory_map(), |_, window| {
        let base = window.base.as_mut_ptr::<u8>();
        unsafe { slice::from_raw_parts_mut(base, window.size) }
    })
    .context(MapSnafu)?;
    if global::install(memory).is_err() {
        return BusySnafu.fail();
    }
    Ok(())
}
