//! Memory zones and console addresses.

use core::{fmt, ops::Range, ptr};

use block_heap::BLOCK_ALIGN;

/// A named physical memory region managed by its own arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display)]
pub enum Zone {
    /// High Work RAM: the main program heap.
    #[display("HWRAM")]
    HighWorkRam,
    /// Low Work RAM: secondary work memory.
    #[display("LWRAM")]
    LowWorkRam,
    /// Cartridge expansion RAM.
    #[display("CartRAM")]
    CartRam,
}

impl Zone {
    /// Number of zones.
    pub const COUNT: usize = 3;

    /// Every zone, in the order [`Memory::malloc_any`] tries them.
    ///
    /// [`Memory::malloc_any`]: crate::Memory::malloc_any
    pub const ALL: [Self; Self::COUNT] = [Self::HighWorkRam, Self::LowWorkRam, Self::CartRam];

    pub(crate) const fn index(self) -> usize {
        match self {
            Self::HighWorkRam => 0,
            Self::LowWorkRam => 1,
            Self::CartRam => 2,
        }
    }
}

/// An address in the console's physical address map.
///
/// `Option<Address>` stands for a nullable pointer: `None` is the null
/// address handed back by failed allocations and accepted by
/// [`Memory::free`](crate::Memory::free).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Address(usize);

impl Address {
    /// Creates an address from its numeric value.
    #[must_use]
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    /// Creates an address from a raw pointer, exposing its provenance.
    #[must_use]
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self(ptr.expose_provenance())
    }

    /// Returns the numeric value of the address.
    #[must_use]
    pub const fn value(self) -> usize {
        self.0
    }

    /// Returns a raw pointer to this address.
    ///
    /// The pointer carries provenance previously exposed for the window it
    /// points into.
    #[must_use]
    pub fn as_mut_ptr<T>(self) -> *mut T {
        ptr::with_exposed_provenance_mut(self.0)
    }

    /// Returns the address `offset` bytes past this one, if representable.
    #[must_use]
    pub const fn checked_add(self, offset: usize) -> Option<Self> {
        match self.0.checked_add(offset) {
            Some(addr) => Some(Self(addr)),
            None => None,
        }
    }
}

impl From<usize> for Address {
    fn from(addr: usize) -> Self {
        Self(addr)
    }
}

impl From<Address> for usize {
    fn from(addr: Address) -> Self {
        addr.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

impl fmt::LowerHex for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl fmt::UpperHex for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::UpperHex::fmt(&self.0, f)
    }
}

impl fmt::Pointer for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ptr = &ptr::without_provenance::<u8>(self.0);
        fmt::Pointer::fmt(ptr, f)
    }
}

/// A `[base, base + size)` window of the address map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Window {
    /// First address of the window.
    pub base: Address,
    /// Length of the window in bytes.
    pub size: usize,
}

impl Window {
    /// Creates a window of `size` bytes starting at `base`.
    #[must_use]
    pub const fn new(base: usize, size: usize) -> Self {
        Self {
            base: Address::new(base),
            size,
        }
    }

    /// Returns the largest block-aligned window inside `[start, end)`.
    ///
    /// The window is empty if no aligned word fits, including when
    /// `end < start`.
    #[must_use]
    pub const fn aligned_within(start: usize, end: usize) -> Self {
        let end = end / BLOCK_ALIGN * BLOCK_ALIGN;
        let base = match start.checked_next_multiple_of(BLOCK_ALIGN) {
            Some(base) => base,
            None => end,
        };
        Self::new(base, end.saturating_sub(base))
    }

    /// Returns the address one past the end, or `None` if the window wraps
    /// around the address space.
    #[must_use]
    pub fn end(&self) -> Option<Address> {
        self.base.checked_add(self.size)
    }

    /// Returns `true` if `addr` lies inside the window.
    #[must_use]
    pub fn contains(&self, addr: Address) -> bool {
        addr.value()
            .checked_sub(self.base.value())
            .is_some_and(|offset| offset < self.size)
    }

    /// Returns the window as a numeric range, saturating at the top of the
    /// address space.
    #[must_use]
    pub fn range(&self) -> Range<usize> {
        self.base.value()..self.base.value().saturating_add(self.size)
    }

    /// Returns `true` if the two windows share at least one address.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        let (a, b) = (self.range(), other.range());
        a.start < b.end && b.start < a.end
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, +{:#x})", self.base, self.size)
    }
}

/// Physical windows of the console's work RAM.
pub mod layout {
    use super::Window;

    /// High Work RAM.
    pub mod high_work_ram {
        /// First address.
        pub const BASE: usize = 0x0600_0000;
        /// Size in bytes.
        pub const SIZE: usize = 0x0010_0000;
    }

    /// Low Work RAM.
    pub mod low_work_ram {
        /// First address.
        pub const BASE: usize = 0x0020_0000;
        /// Size in bytes.
        pub const SIZE: usize = 0x0010_0000;
    }

    /// 4 MiB cartridge expansion RAM.
    pub mod cart_ram {
        /// First address.
        pub const BASE: usize = 0x0240_0000;
        /// Size in bytes.
        pub const SIZE: usize = 0x0040_0000;
    }

    /// Full High Work RAM window.
    pub const HIGH_WORK_RAM: Window = Window::new(high_work_ram::BASE, high_work_ram::SIZE);
    /// Full Low Work RAM window.
    pub const LOW_WORK_RAM: Window = Window::new(low_work_ram::BASE, low_work_ram::SIZE);
    /// Full cartridge RAM window.
    pub const CART_RAM: Window = Window::new(cart_ram::BASE, cart_ram::SIZE);
}
