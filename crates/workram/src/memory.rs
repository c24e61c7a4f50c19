//! Zone registry and dispatcher.
//!
//! [`Memory`] owns one [`Arena`] per present zone and routes every request to
//! the right one: allocations by explicit zone tag (or the default zone),
//! releases and reallocations by the address they are given.

use core::fmt;

use arrayvec::ArrayVec;
use block_heap::{Arena, CorruptChain};
use dataview::{DataView, Pod, PodMethods as _};
use snafu::ensure;

use crate::{
    map::{MemoryMap, MemoryMapError, StorageSizeSnafu},
    report::Report,
    zone::{Address, Window, Zone},
};

/// Multi-zone memory manager.
///
/// `S` is the backing storage type of every arena. On hardware this is a
/// `&'static mut [u8]` over the physical window; host-side tests use owned
/// buffers placed at the console's addresses.
pub struct Memory<S> {
    arenas: [Option<Arena<S>>; Zone::COUNT],
}

impl<S> fmt::Debug for Memory<S>
where
    S: AsRef<[u8]>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memory")
            .field("arenas", &self.arenas)
            .finish()
    }
}

impl<S> Memory<S>
where
    S: AsRef<[u8]> + AsMut<[u8]>,
{
    /// Creates a manager for every zone present in `map`.
    ///
    /// `storage` is called once per present zone and must return a buffer
    /// exactly as long as the zone's window. Every zone starts out as a single
    /// free block.
    pub fn new<F>(map: &MemoryMap, mut storage: F) -> Result<Self, MemoryMapError>
    where
        F: FnMut(Zone, Window) -> S,
    {
        map.validate()?;

        let mut arenas = [const { None }; Zone::COUNT];
        for (zone, window) in map.iter() {
            let bytes = storage(zone, window);
            let actual = bytes.as_ref().len();
            ensure!(
                actual == window.size,
                StorageSizeSnafu {
                    zone,
                    expected: window.size,
                    actual,
                }
            );
            arenas[zone.index()] = Some(Arena::new(window.base.value(), bytes));
            log::info!("{zone}: {window}, {} KiB", window.size / 1024);
        }
        Ok(Self { arenas })
    }

    /// Resets every zone to a single free block.
    ///
    /// All outstanding allocations are forgotten.
    pub fn initialize(&mut self) {
        for zone in Zone::ALL {
            self.initialize_zone(zone);
        }
    }

    /// Resets one zone to a single free block.
    pub fn initialize_zone(&mut self, zone: Zone) {
        if let Some(arena) = self.arena_mut(zone) {
            arena.initialize();
            log::debug!("{zone}: reset");
        }
    }

    /// Returns `true` if `zone` is present.
    #[must_use]
    pub fn has_zone(&self, zone: Zone) -> bool {
        self.arena(zone).is_some()
    }

    /// Returns an iterator over the present zones.
    pub fn zones(&self) -> impl Iterator<Item = Zone> + '_ {
        Zone::ALL.into_iter().filter(|zone| self.has_zone(*zone))
    }

    /// Returns the window of `zone`, if present.
    #[must_use]
    pub fn window(&self, zone: Zone) -> Option<Window> {
        self.arena(zone)
            .map(|arena| Window::new(arena.base(), arena.capacity()))
    }

    /// Returns the zone whose window contains `addr`.
    #[must_use]
    pub fn zone_for_address(&self, addr: Address) -> Option<Zone> {
        self.zones().find(|zone| self.in_range(*zone, addr))
    }

    /// Returns `true` if `addr` lies in the window of `zone`.
    ///
    /// This is an address test only; the address may or may not denote a
    /// live allocation.
    #[must_use]
    pub fn in_range(&self, zone: Zone, addr: Address) -> bool {
        self.arena(zone)
            .is_some_and(|arena| arena.contains(addr.value()))
    }

    /// Allocates `size` bytes in High Work RAM.
    pub fn malloc(&mut self, size: usize) -> Option<Address> {
        self.malloc_in(size, Zone::HighWorkRam)
    }

    /// Allocates `size` bytes in `zone`.
    ///
    /// Returns `None` if the zone is absent or has no free block large enough.
    pub fn malloc_in(&mut self, size: usize, zone: Zone) -> Option<Address> {
        self.arena_mut(zone)?.malloc(size).map(Address::new)
    }

    /// Allocates `size` bytes in the first zone of [`Zone::ALL`] that can
    /// hold them.
    pub fn malloc_any(&mut self, size: usize) -> Option<Address> {
        Zone::ALL
            .into_iter()
            .find_map(|zone| self.malloc_in(size, zone))
    }

    /// Releases the allocation at `addr`, whichever zone it belongs to.
    ///
    /// `None`, addresses outside every zone and addresses that are not a live
    /// allocation are ignored.
    pub fn free(&mut self, addr: Option<Address>) {
        let Some(addr) = addr else {
            return;
        };
        if let Some(arena) = self.arena_for_address_mut(addr) {
            arena.free(addr.value());
        }
    }

    /// Resizes the allocation at `addr` within its own zone.
    ///
    /// With `addr == None` this allocates in High Work RAM. The content is
    /// preserved up to the smaller of the old and new sizes. On failure
    /// `None` is returned and the original allocation is left intact.
    pub fn realloc(&mut self, addr: Option<Address>, size: usize) -> Option<Address> {
        let Some(addr) = addr else {
            return self.malloc(size);
        };
        self.arena_for_address_mut(addr)?
            .realloc(Some(addr.value()), size)
            .map(Address::new)
    }

    /// Resizes the allocation at `addr`, which must belong to `zone`.
    ///
    /// With `addr == None` this allocates in `zone`.
    pub fn realloc_in(&mut self, zone: Zone, addr: Option<Address>, size: usize) -> Option<Address> {
        let arena = self.arena_mut(zone)?;
        if let Some(addr) = addr
            && !arena.contains(addr.value())
        {
            return None;
        }
        arena
            .realloc(addr.map(Address::value), size)
            .map(Address::new)
    }

    /// Allocates `size` bytes with the block header placed at `fixed`.
    ///
    /// Used for buffers whose physical location is dictated by another
    /// hardware unit. Returns the payload address (`fixed` plus one header),
    /// or `None` if `fixed` is outside every zone, misaligned, in the last
    /// word of its zone, or not the start of a free region of at least
    /// `size` bytes. The payload therefore always lies in the same zone as
    /// `fixed`.
    pub fn placement_malloc(&mut self, size: usize, fixed: Address) -> Option<Address> {
        self.arena_for_address_mut(fixed)?
            .malloc_at(fixed.value(), size)
            .map(Address::new)
    }

    /// Returns the free payload bytes of `zone`, or 0 if it is absent.
    #[must_use]
    pub fn free_space(&self, zone: Zone) -> usize {
        self.arena(zone).map_or(0, Arena::free_space)
    }

    /// Returns the free payload bytes of every present zone together.
    #[must_use]
    pub fn total_free_space(&self) -> usize {
        self.arenas.iter().flatten().map(Arena::free_space).sum()
    }

    /// Returns the bytes of `zone` not available to callers, or 0 if it is
    /// absent.
    #[must_use]
    pub fn used_space(&self, zone: Zone) -> usize {
        self.arena(zone).map_or(0, Arena::used_space)
    }

    /// Returns the size of the window of `zone`, or 0 if it is absent.
    #[must_use]
    pub fn size(&self, zone: Zone) -> usize {
        self.arena(zone).map_or(0, Arena::capacity)
    }

    /// Returns the number of blocks, free and used, in `zone`, or 0 if it is
    /// absent.
    #[must_use]
    pub fn block_count(&self, zone: Zone) -> usize {
        self.arena(zone).map_or(0, Arena::block_count)
    }

    /// Returns the number of free blocks in `zone`, or 0 if it is absent.
    #[must_use]
    pub fn free_block_count(&self, zone: Zone) -> usize {
        self.arena(zone).map_or(0, Arena::free_block_count)
    }

    /// Takes a snapshot of the allocation state of `zone`.
    #[must_use]
    pub fn report(&self, zone: Zone) -> Option<Report> {
        let arena = self.arena(zone)?;
        Some(Report::new(zone, Address::new(arena.base()), &arena.stats()))
    }

    /// Takes a snapshot of every present zone.
    #[must_use]
    pub fn reports(&self) -> ArrayVec<Report, { Zone::COUNT }> {
        Zone::ALL
            .into_iter()
            .filter_map(|zone| self.report(zone))
            .collect()
    }

    /// Writes the report of every present zone to the log.
    pub fn log_reports(&self) {
        for report in self.reports() {
            log::info!("{report}");
        }
    }

    /// Allocates room for `value` in `zone` and copies it there.
    pub fn new_in<T>(&mut self, zone: Zone, value: &T) -> Option<Address>
    where
        T: Pod,
    {
        let bytes = value.as_bytes();
        let addr = self.malloc_in(bytes.len(), zone)?;
        self.bytes_mut(addr)?[..bytes.len()].copy_from_slice(bytes);
        Some(addr)
    }

    /// Allocates `len` bytes in `zone`, each set to `fill`.
    pub fn new_array_in(&mut self, zone: Zone, len: usize, fill: u8) -> Option<Address> {
        let addr = self.malloc_in(len, zone)?;
        self.bytes_mut(addr)?[..len].fill(fill);
        Some(addr)
    }

    /// Reads a `T` from the start of the allocation at `addr`.
    ///
    /// Returns `None` if `addr` is not a live allocation or the allocation is
    /// shorter than `T`.
    #[must_use]
    pub fn read<T>(&self, addr: Address) -> Option<T>
    where
        T: Pod,
    {
        DataView::from(self.bytes(addr)?).try_read::<T>(0)
    }

    /// Returns the payload of the live allocation at `addr`.
    ///
    /// The slice covers the whole block, which may be a few bytes longer than
    /// requested.
    #[must_use]
    pub fn bytes(&self, addr: Address) -> Option<&[u8]> {
        let zone = self.zone_for_address(addr)?;
        self.arena(zone)?.payload(addr.value())
    }

    /// Returns the mutable payload of the live allocation at `addr`.
    pub fn bytes_mut(&mut self, addr: Address) -> Option<&mut [u8]> {
        self.arena_for_address_mut(addr)?.payload_mut(addr.value())
    }

    /// Checks the block chain of every present zone.
    pub fn verify(&self) -> Result<(), (Zone, CorruptChain)> {
        for zone in self.zones() {
            if let Some(arena) = self.arena(zone) {
                arena.verify().map_err(|err| (zone, err))?;
            }
        }
        Ok(())
    }

    fn arena(&self, zone: Zone) -> Option<&Arena<S>> {
        self.arenas[zone.index()].as_ref()
    }

    fn arena_mut(&mut self, zone: Zone) -> Option<&mut Arena<S>> {
        self.arenas[zone.index()].as_mut()
    }

    fn arena_for_address_mut(&mut self, addr: Address) -> Option<&mut Arena<S>> {
        let zone = self.zone_for_address(addr)?;
        self.arena_mut(zone)
    }
}
