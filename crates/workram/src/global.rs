//! Process-wide memory manager.
//!
//! The program installs one [`Memory`] at startup; the free functions of this
//! module and the per-zone modules ([`high_work_ram`], [`low_work_ram`],
//! [`cart_ram`]) then operate on it.
//!
//! The manager is not reentrant. Every call takes the lock with `try_lock`,
//! so a call made while another one is in progress (an interrupt handler
//! allocating while the main loop is in the middle of a `free`) is rejected
//! instead of corrupting a block chain or spinning forever: it fails exactly
//! as an exhausted zone would, and a warning is logged. [`install`],
//! [`uninstall`] and [`is_initialized`] follow the same rule.

use spin::Mutex;

use crate::{
    memory::Memory,
    report::Report,
    zone::{Address, Zone},
};

/// Backing storage of the process-wide manager.
pub type Storage = &'static mut [u8];

static MEMORY: Mutex<Option<Memory<Storage>>> = Mutex::new(None);

/// Installs `memory` as the process-wide manager.
///
/// Returns the previously installed manager, if any.
///
/// # Errors
///
/// Hands `memory` back if the manager is busy.
pub fn install(memory: Memory<Storage>) -> Result<Option<Memory<Storage>>, Memory<Storage>> {
    let Some(mut slot) = MEMORY.try_lock() else {
        log::warn!("memory manager is busy; install rejected");
        return Err(memory);
    };
    let zones = memory.zones().count();
    let previous = slot.replace(memory);
    log::info!("memory manager installed with {zones} zone(s)");
    Ok(previous)
}

/// Removes the process-wide manager and returns it.
///
/// Returns `None` if nothing is installed or the manager is busy.
pub fn uninstall() -> Option<Memory<Storage>> {
    let Some(mut slot) = MEMORY.try_lock() else {
        log::warn!("memory manager is busy; uninstall rejected");
        return None;
    };
    slot.take()
}

/// Returns `true` if a manager is installed and not busy.
#[must_use]
pub fn is_initialized() -> bool {
    let Some(slot) = MEMORY.try_lock() else {
        log::warn!("memory manager is busy");
        return false;
    };
    slot.is_some()
}

fn with_memory<T, F>(f: F) -> Option<T>
where
    F: FnOnce(&mut Memory<Storage>) -> T,
{
    let Some(mut memory) = MEMORY.try_lock() else {
        log::warn!("memory manager is busy; request rejected");
        return None;
    };
    memory.as_mut().map(f)
}

/// Resets every zone of the installed manager.
pub fn initialize() {
    with_memory(Memory::initialize);
}

/// Allocates `size` bytes in High Work RAM.
#[must_use]
pub fn malloc(size: usize) -> Option<Address> {
    with_memory(|memory| memory.malloc(size)).flatten()
}

/// Allocates `size` bytes in `zone`.
#[must_use]
pub fn malloc_in(size: usize, zone: Zone) -> Option<Address> {
    with_memory(|memory| memory.malloc_in(size, zone)).flatten()
}

/// Allocates `size` bytes in the first zone that can hold them.
#[must_use]
pub fn malloc_any(size: usize) -> Option<Address> {
    with_memory(|memory| memory.malloc_any(size)).flatten()
}

/// Releases the allocation at `addr`, whichever zone it belongs to.
pub fn free(addr: Option<Address>) {
    with_memory(|memory| memory.free(addr));
}

/// Resizes the allocation at `addr` within its own zone.
#[must_use]
pub fn realloc(addr: Option<Address>, size: usize) -> Option<Address> {
    with_memory(|memory| memory.realloc(addr, size)).flatten()
}

/// Resizes the allocation at `addr`, which must belong to `zone`.
#[must_use]
pub fn realloc_in(zone: Zone, addr: Option<Address>, size: usize) -> Option<Address> {
    with_memory(|memory| memory.realloc_in(zone, addr, size)).flatten()
}

/// Allocates `size` bytes with the block header placed at `fixed`.
#[must_use]
pub fn placement_malloc(size: usize, fixed: Address) -> Option<Address> {
    with_memory(|memory| memory.placement_malloc(size, fixed)).flatten()
}

/// Returns the free payload bytes of `zone`, or of every zone with `None`.
#[must_use]
pub fn free_space(zone: Option<Zone>) -> usize {
    with_memory(|memory| match zone {
        Some(zone) => memory.free_space(zone),
        None => memory.total_free_space(),
    })
    .unwrap_or(0)
}

/// Returns the bytes of `zone` not available to callers, or 0 if it is
/// absent.
#[must_use]
pub fn used_space(zone: Zone) -> usize {
    with_memory(|memory| memory.used_space(zone)).unwrap_or(0)
}

/// Returns the size of the window of `zone`, or 0 if it is absent.
#[must_use]
pub fn size(zone: Zone) -> usize {
    with_memory(|memory| memory.size(zone)).unwrap_or(0)
}

/// Returns `true` if `addr` lies in the window of `zone`.
#[must_use]
pub fn in_range(zone: Zone, addr: Address) -> bool {
    with_memory(|memory| memory.in_range(zone, addr)).unwrap_or(false)
}

/// Takes a snapshot of the allocation state of `zone`.
#[must_use]
pub fn report(zone: Zone) -> Option<Report> {
    with_memory(|memory| memory.report(zone)).flatten()
}

/// Writes the report of every zone to the log.
pub fn log_reports() {
    with_memory(|memory| memory.log_reports());
}

/// Allocates room for `value` in `zone` and copies it there.
#[must_use]
pub fn new_in<T>(zone: Zone, value: &T) -> Option<Address>
where
    T: dataview::Pod,
{
    with_memory(|memory| memory.new_in(zone, value)).flatten()
}

/// Allocates `len` bytes in `zone`, each set to `fill`.
#[must_use]
pub fn new_array_in(zone: Zone, len: usize, fill: u8) -> Option<Address> {
    with_memory(|memory| memory.new_array_in(zone, len, fill)).flatten()
}

/// Reads a `T` from the start of the allocation at `addr`.
#[must_use]
pub fn read<T>(addr: Address) -> Option<T>
where
    T: dataview::Pod,
{
    with_memory(|memory| memory.read(addr)).flatten()
}

/// Calls `f` with the payload of the live allocation at `addr`.
///
/// The manager stays locked while `f` runs, so allocation calls made from
/// `f` are rejected.
pub fn with_bytes_mut<R, F>(addr: Address, f: F) -> Option<R>
where
    F: FnOnce(&mut [u8]) -> R,
{
    with_memory(|memory| memory.bytes_mut(addr).map(f)).flatten()
}

macro_rules! zone_facade {
    ($(#[$attr:meta])* $name:ident => $zone:expr) => {
        $(#[$attr])*
        pub mod $name {
            use crate::{
                report::Report,
                zone::{Address, Zone},
            };

            const ZONE: Zone = $zone;

            /// Allocates `size` bytes in this zone.
            #[must_use]
            pub fn malloc(size: usize) -> Option<Address> {
                super::malloc_in(size, ZONE)
            }

            /// Releases the allocation at `addr` if it belongs to this zone.
            pub fn free(addr: Option<Address>) {
                if let Some(addr) = addr
                    && in_range(addr)
                {
                    super::free(Some(addr));
                }
            }

            /// Resizes the allocation at `addr`, which must belong to this
            /// zone.
            #[must_use]
            pub fn realloc(addr: Option<Address>, size: usize) -> Option<Address> {
                super::realloc_in(ZONE, addr, size)
            }

            /// Returns the free payload bytes of this zone.
            #[must_use]
            pub fn free_space() -> usize {
                super::free_space(Some(ZONE))
            }

            /// Returns the bytes of this zone not available to callers.
            #[must_use]
            pub fn used_space() -> usize {
                super::used_space(ZONE)
            }

            /// Returns the size of this zone's window.
            #[must_use]
            pub fn size() -> usize {
                super::size(ZONE)
            }

            /// Returns `true` if `addr` lies in this zone's window.
            #[must_use]
            pub fn in_range(addr: Address) -> bool {
                super::in_range(ZONE, addr)
            }

            /// Takes a snapshot of this zone.
            #[must_use]
            pub fn report() -> Option<Report> {
                super::report(ZONE)
            }
        }
    };
}

zone_facade! {
    /// High Work RAM of the process-wide manager.
    high_work_ram => Zone::HighWorkRam
}

zone_facade! {
    /// Low Work RAM of the process-wide manager.
    low_work_ram => Zone::LowWorkRam
}

zone_facade! {
    /// Cartridge RAM of the process-wide manager.
    cart_ram => Zone::CartRam
}
