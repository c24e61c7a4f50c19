//! Memory map: which address window each zone manages.

use block_heap::{BLOCK_ALIGN, HEADER_SIZE, MAX_ARENA_SIZE};
use snafu::{Location, Snafu, ensure};

use crate::zone::{Window, Zone, layout};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum MemoryMapError {
    #[snafu(display("{zone} window base is not aligned to {BLOCK_ALIGN} bytes: {window}"))]
    UnalignedBase {
        zone: Zone,
        window: Window,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("{zone} window size is not a multiple of {BLOCK_ALIGN} bytes: {window}"))]
    UnalignedSize {
        zone: Zone,
        window: Window,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("{zone} window cannot hold a block header: {window}"))]
    TooSmall {
        zone: Zone,
        window: Window,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("{zone} window exceeds {MAX_ARENA_SIZE:#x} bytes: {window}"))]
    TooLarge {
        zone: Zone,
        window: Window,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("{zone} window wraps around the address space: {window}"))]
    AddressOverflow {
        zone: Zone,
        window: Window,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("{zone} window {window} overlaps {other} window {other_window}"))]
    Overlap {
        zone: Zone,
        window: Window,
        other: Zone,
        other_window: Window,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("{zone} storage is {actual} bytes but its window is {expected} bytes"))]
    StorageSize {
        zone: Zone,
        expected: usize,
        actual: usize,
        #[snafu(implicit)]
        location: Location,
    },
}

/// The address window assigned to each zone.
///
/// A zone without a window is absent: allocations from it fail and its
/// statistics read zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryMap {
    windows: [Option<Window>; Zone::COUNT],
}

impl Default for MemoryMap {
    fn default() -> Self {
        Self::saturn()
    }
}

impl MemoryMap {
    /// Creates a map without any zone.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            windows: [None; Zone::COUNT],
        }
    }

    /// Creates the map of the console's physical work RAM.
    ///
    /// The cartridge window is included only with the `cart-ram` feature.
    #[must_use]
    pub const fn saturn() -> Self {
        let map = Self::empty()
            .with_zone(Zone::HighWorkRam, layout::HIGH_WORK_RAM)
            .with_zone(Zone::LowWorkRam, layout::LOW_WORK_RAM);
        #[cfg(feature = "cart-ram")]
        let map = map.with_zone(Zone::CartRam, layout::CART_RAM);
        map
    }

    /// Returns this map with `zone` assigned to `window`.
    #[must_use]
    pub const fn with_zone(mut self, zone: Zone, window: Window) -> Self {
        self.windows[zone.index()] = Some(window);
        self
    }

    /// Returns this map with `zone` removed.
    #[must_use]
    pub const fn without_zone(mut self, zone: Zone) -> Self {
        self.windows[zone.index()] = None;
        self
    }

    /// Returns the window of `zone`, if present.
    #[must_use]
    pub fn window(&self, zone: Zone) -> Option<Window> {
        self.windows[zone.index()]
    }

    /// Returns an iterator over the present zones and their windows.
    pub fn iter(&self) -> impl Iterator<Item = (Zone, Window)> + '_ {
        Zone::ALL
            .into_iter()
            .filter_map(|zone| self.window(zone).map(|window| (zone, window)))
    }

    /// Checks that every window can back an arena and that no two windows
    /// overlap.
    pub fn validate(&self) -> Result<(), MemoryMapError> {
        for (zone, window) in self.iter() {
            ensure!(
                window.base.value().is_multiple_of(BLOCK_ALIGN),
                UnalignedBaseSnafu { zone, window }
            );
            ensure!(
                window.size.is_multiple_of(BLOCK_ALIGN),
                UnalignedSizeSnafu { zone, window }
            );
            ensure!(window.size >= HEADER_SIZE, TooSmallSnafu { zone, window });
            ensure!(window.size <= MAX_ARENA_SIZE, TooLargeSnafu { zone, window });
            ensure!(window.end().is_some(), AddressOverflowSnafu { zone, window });
        }

        for (zone, window) in self.iter() {
            for (other, other_window) in self.iter().filter(|(other, _)| *other > zone) {
                ensure!(
                    !window.overlaps(&other_window),
                    OverlapSnafu {
                        zone,
                        window,
                        other,
                        other_window,
                    }
                );
            }
        }
        Ok(())
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saturn_map() {
        let map = MemoryMap::saturn();
        assert_eq!(map.window(Zone::HighWorkRam), Some(layout::HIGH_WORK_RAM));
        assert_eq!(map.window(Zone::LowWorkRam), Some(layout::LOW_WORK_RAM));
        #[cfg(feature = "cart-ram")]
        assert_eq!(map.window(Zone::CartRam), Some(layout::CART_RAM));
        #[cfg(not(feature = "cart-ram"))]
        assert_eq!(map.window(Zone::CartRam), None);
        map.validate().unwrap();
    }

    #[test]
    fn test_iter_skips_absent_zones() {
        let map = MemoryMap::saturn().without_zone(Zone::LowWorkRam);
        let zones: Vec<_> = map.iter().map(|(zone, _)| zone).collect();
        assert!(!zones.contains(&Zone::LowWorkRam));
        assert_eq!(zones[0], Zone::HighWorkRam);
        assert!(MemoryMap::empty().iter().next().is_none());
    }

    #[test]
    fn test_validate_alignment() {
        let map = MemoryMap::empty().with_zone(Zone::HighWorkRam, Window::new(0x0600_0002, 64));
        assert!(matches!(map.validate(), Err(MemoryMapError::UnalignedBase { .. })));

        let map = MemoryMap::empty().with_zone(Zone::HighWorkRam, Window::new(0x0600_0000, 66));
        assert!(matches!(map.validate(), Err(MemoryMapError::UnalignedSize { .. })));
    }

    #[test]
    fn test_validate_size_bounds() {
        let map = MemoryMap::empty().with_zone(Zone::LowWorkRam, Window::new(0x0020_0000, 0));
        assert!(matches!(map.validate(), Err(MemoryMapError::TooSmall { .. })));

        let map = MemoryMap::empty().with_zone(Zone::LowWorkRam, Window::new(0, MAX_ARENA_SIZE + 4));
        assert!(matches!(map.validate(), Err(MemoryMapError::TooLarge { .. })));

        let map = MemoryMap::empty().with_zone(Zone::LowWorkRam, Window::new(0x0020_0000, 4));
        map.validate().unwrap();
    }

    #[test]
    fn test_validate_overflow() {
        let map = MemoryMap::empty().with_zone(Zone::CartRam, Window::new(usize::MAX - 3, 8));
        assert!(matches!(map.validate(), Err(MemoryMapError::AddressOverflow { .. })));
    }

    #[test]
    fn test_validate_overlap() {
        let map = MemoryMap::empty()
            .with_zone(Zone::HighWorkRam, Window::new(0x1000, 0x100))
            .with_zone(Zone::CartRam, Window::new(0x10F0, 0x100));
        let err = map.validate().unwrap_err();
        assert!(matches!(
            err,
            MemoryMapError::Overlap {
                zone: Zone::HighWorkRam,
                other: Zone::CartRam,
                ..
            }
        ));
        assert!(err.to_string().contains("overlaps"));
    }
}
