#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(coverage_nightly, coverage(off))]
#![cfg(test)]

use workram::{
    Address, Memory, MemoryMap, Window, Zone,
    global::{self, cart_ram, high_work_ram, low_work_ram},
    zone::layout,
};

const ZONE_SIZE: usize = 0x2000;

fn leaked_memory() -> Memory<global::Storage> {
    let map = MemoryMap::empty()
        .with_zone(
            Zone::HighWorkRam,
            Window::new(layout::high_work_ram::BASE, ZONE_SIZE),
        )
        .with_zone(
            Zone::LowWorkRam,
            Window::new(layout::low_work_ram::BASE, ZONE_SIZE),
        )
        .with_zone(Zone::CartRam, Window::new(layout::cart_ram::BASE, ZONE_SIZE));
    Memory::new(&map, |_, window| vec![0x55; window.size].leak()).unwrap()
}

// The manager is a process-wide singleton, so the whole lifecycle runs as one
// sequential test.
#[test]
fn global_lifecycle() {
    // Nothing installed: every request fails quietly.
    assert!(!global::is_initialized());
    assert!(global::malloc(16).is_none());
    assert_eq!(global::free_space(None), 0);
    global::free(Some(Address::new(layout::high_work_ram::BASE + 4)));

    assert!(global::install(leaked_memory()).unwrap().is_none());
    assert!(global::is_initialized());
    assert_eq!(global::free_space(None), 3 * (ZONE_SIZE - 4));

    // Default zone.
    let a = global::malloc(100).unwrap();
    assert!(high_work_ram::in_range(a));
    assert!(!low_work_ram::in_range(a));
    assert!(!cart_ram::in_range(a));

    // Zone facades.
    let b = low_work_ram::malloc(64).unwrap();
    let c = cart_ram::malloc(0).unwrap();
    assert!(global::in_range(Zone::LowWorkRam, b));
    assert!(global::in_range(Zone::CartRam, c));
    assert_eq!(low_work_ram::size(), ZONE_SIZE);
    assert_eq!(low_work_ram::free_space(), ZONE_SIZE - 2 * 4 - 64);

    // A zone facade ignores addresses of other zones.
    cart_ram::free(Some(b));
    assert_eq!(low_work_ram::report().unwrap().block_count, 2);
    low_work_ram::free(Some(b));
    assert_eq!(low_work_ram::report().unwrap().block_count, 1);

    // Realloc keeps content.
    global::with_bytes_mut(a, |bytes| bytes[..100].fill(0x7E)).unwrap();
    let a = global::realloc(Some(a), 400).unwrap();
    assert!(
        global::with_bytes_mut(a, |bytes| bytes[..100].iter().all(|b| *b == 0x7E)).unwrap()
    );
    assert!(high_work_ram::realloc(Some(c), 8).is_none());

    // Placement at the start of a zone.
    let placed = global::placement_malloc(32, Address::new(layout::low_work_ram::BASE)).unwrap();
    assert_eq!(placed.value(), layout::low_work_ram::BASE + 4);
    assert!(global::placement_malloc(32, Address::new(0xFFFF_FFFF)).is_none());

    // Typed construction.
    let value = global::new_in(Zone::CartRam, &0x1234_5678_u32).unwrap();
    assert_eq!(global::read::<u32>(value), Some(0x1234_5678));
    let array = global::new_array_in(Zone::CartRam, 3, 0xAA).unwrap();
    assert_eq!(global::read::<[u8; 3]>(array), Some([0xAA; 3]));

    // Re-entering the manager while it is busy fails instead of deadlocking.
    let nested = global::with_bytes_mut(a, |_| global::malloc(4)).unwrap();
    assert!(nested.is_none());
    let (initialized, uninstalled, reinstalled) = global::with_bytes_mut(a, |_| {
        (
            global::is_initialized(),
            global::uninstall().is_some(),
            global::install(leaked_memory()).is_ok(),
        )
    })
    .unwrap();
    assert!(!initialized);
    assert!(!uninstalled);
    assert!(!reinstalled);
    assert!(global::is_initialized());
    assert!(global::read::<[u8; 4]>(a).is_some());

    for zone in Zone::ALL {
        let report = global::report(zone).unwrap();
        assert_eq!(report.used_size + report.free_size, report.total_size);
        assert_eq!(global::used_space(zone), report.used_size);
    }
    global::log_reports();

    global::initialize();
    assert_eq!(global::free_space(None), 3 * (ZONE_SIZE - 4));

    let memory = global::uninstall().unwrap();
    memory.verify().unwrap();
    assert!(!global::is_initialized());
    assert!(global::malloc_any(4).is_none());
}
