use core::fmt;

use block_heap::ArenaStats;

use crate::zone::{Address, Zone};

/// Snapshot of one zone's allocation state.
///
/// `used_size` counts every byte callers cannot get: the payloads of live
/// blocks and all block headers, free ones included. Hence
/// `used_size + free_size == total_size` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Report {
    /// Zone the snapshot was taken of.
    pub zone: Zone,
    /// First address of the zone window.
    pub base: Address,
    /// Size of the zone window in bytes.
    pub total_size: usize,
    /// Live payload bytes plus every header.
    pub used_size: usize,
    /// Payload bytes of all free blocks.
    pub free_size: usize,
    /// Number of blocks, free and used.
    pub block_count: usize,
    /// Number of free blocks.
    pub free_block_count: usize,
    /// Payload size of the largest free block, the biggest request that can
    /// currently succeed.
    pub largest_free_block: usize,
}

impl Report {
    pub(crate) fn new(zone: Zone, base: Address, stats: &ArenaStats) -> Self {
        Self {
            zone,
            base,
            total_size: stats.capacity,
            used_size: stats.used_bytes,
            free_size: stats.free_bytes,
            block_count: stats.block_count,
            free_block_count: stats.free_block_count,
            largest_free_block: stats.largest_free_block,
        }
    }

    /// Returns the share of the zone in use, in percent (0 to 100).
    #[must_use]
    pub fn usage_percent(&self) -> usize {
        if self.total_size == 0 {
            return 0;
        }
        self.used_size.saturating_mul(100) / self.total_size
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{zone} @ {base}: {used}/{total} bytes used ({percent}%), {free} free, \
             {blocks} blocks ({free_blocks} free), largest free {largest}",
            zone = self.zone,
            base = self.base,
            used = self.used_size,
            total = self.total_size,
            percent = self.usage_percent(),
            free = self.free_size,
            blocks = self.block_count,
            free_blocks = self.free_block_count,
            largest = self.largest_free_block,
        )
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Report {
        Report::new(
            Zone::LowWorkRam,
            Address::new(0x0020_0000),
            &ArenaStats {
                capacity: 1024,
                used_bytes: 256,
                free_bytes: 768,
                block_count: 3,
                free_block_count: 1,
                largest_free_block: 768,
            },
        )
    }

    #[test]
    fn test_from_stats() {
        let report = sample();
        assert_eq!(report.total_size, 1024);
        assert_eq!(report.used_size + report.free_size, report.total_size);
        assert_eq!(report.usage_percent(), 25);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            sample().to_string(),
            "LWRAM @ 0x00200000: 256/1024 bytes used (25%), 768 free, 3 blocks (1 free), \
             largest free 768"
        );
    }
}
