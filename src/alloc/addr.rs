//! Typed byte counts and in-arena addresses.
//!
//! Everything the allocator hands around is either a [`Size`] or an
//! [`Address`]; raw pointers only appear at the arena boundary, where
//! [`AddrSpace`] bounds-checks them.

use core::fmt;
use core::ops::{Add, Sub};

/// Alignment of every block size and block start, in bytes.
pub const ALIGNMENT: usize = 8;

/// Round `n` up to a multiple of `alignment` (a power of two).
pub const fn align(n: usize, alignment: usize) -> usize {
    assert!(alignment.is_power_of_two(), "alignment must be a power of two");
    (n + alignment - 1) & !(alignment - 1)
}

/// A non-negative byte count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Size(usize);

impl Size {
    pub const ZERO: Self = Self(0);
    pub const MAX: Self = Self(usize::MAX);

    pub const fn new(bytes: usize) -> Self {
        Self(bytes)
    }

    pub const fn bytes(self) -> usize {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Round up to the arena alignment.
    #[must_use]
    pub const fn align(self) -> Self {
        self.align_to(ALIGNMENT)
    }

    #[must_use]
    pub const fn align_to(self, alignment: usize) -> Self {
        Self(align(self.0, alignment))
    }
}

impl Add for Size {
    type Output = Size;

    fn add(self, rhs: Size) -> Size {
        Size(self.0 + rhs.0)
    }
}

impl Sub for Size {
    type Output = Size;

    /// Subtracting a larger size is a contract violation.
    fn sub(self, rhs: Size) -> Size {
        assert!(
            self.0 >= rhs.0,
            "size subtraction underflow: {self} - {rhs}"
        );
        Size(self.0 - rhs.0)
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bytes", self.0)
    }
}

/// A location inside (or just past) the arena.
///
/// Addresses are plain values: copying one carries no ownership, and the
/// null address is a valid "nowhere" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Address(*const u8);

impl Address {
    pub const NULL: Self = Self(core::ptr::null());

    pub(crate) const fn from_ptr(ptr: *const u8) -> Self {
        Self(ptr)
    }

    pub fn is_null(self) -> bool {
        self.0.is_null()
    }

    pub(crate) fn as_ptr(self) -> *const u8 {
        self.0
    }
}

impl Add<Size> for Address {
    type Output = Address;

    /// Offsetting the null address yields the null address.
    fn add(self, rhs: Size) -> Address {
        if self.is_null() {
            self
        } else {
            Address(self.0.wrapping_add(rhs.bytes()))
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:p}", self.0)
    }
}

/// The immutable `[lowest, highest]` bounds of one arena.
#[derive(Debug, Clone, Copy)]
pub struct AddrSpace {
    lowest: Address,
    highest: Address,
}

impl AddrSpace {
    pub fn new(lowest: *const u8, highest: *const u8) -> Self {
        assert!(!lowest.is_null(), "address space starts at null");
        assert!(lowest < highest, "address space is empty or inverted");
        Self {
            lowest: Address(lowest),
            highest: Address(highest),
        }
    }

    pub fn lowest(&self) -> Address {
        self.lowest
    }

    pub fn highest(&self) -> Address {
        self.highest
    }

    /// Produce a checked in-arena address; out of range is fatal.
    pub fn address(&self, ptr: *const u8) -> Address {
        assert!(
            self.contains(ptr),
            "address {ptr:p} outside the arena range [{}, {}]",
            self.lowest,
            self.highest
        );
        Address(ptr)
    }

    /// Non-fatal range test used by the conservative scan.
    pub fn contains(&self, ptr: *const u8) -> bool {
        !ptr.is_null() && Address(ptr) >= self.lowest && Address(ptr) <= self.highest
    }

    pub fn distance(lower: Address, upper: Address) -> Size {
        assert!(
            !lower.is_null() && !upper.is_null(),
            "distance between null addresses"
        );
        assert!(lower <= upper, "distance with inverted operands");
        Size::new(upper.0 as usize - lower.0 as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::{ALIGNMENT, AddrSpace, Address, Size, align};

    #[test]
    fn align_rounds_up_to_the_next_multiple() {
        assert_eq!(align(0, 8), 0);
        assert_eq!(align(1, 8), 8);
        assert_eq!(align(8, 8), 8);
        assert_eq!(align(9, 8), 16);
        assert_eq!(align(17, 16), 32);
        assert_eq!(Size::new(41).align(), Size::new(48));
    }

    #[test]
    #[should_panic(expected = "power of two")]
    fn align_rejects_non_power_of_two() {
        align(16, 12);
    }

    #[test]
    fn size_arithmetic() {
        let a = Size::new(48);
        let b = Size::new(16);
        assert_eq!(a + b, Size::new(64));
        assert_eq!(a - b, Size::new(32));
        assert!(a > b);
        assert!(Size::ZERO.is_zero());
        assert!(Size::MAX > a);
    }

    #[test]
    #[should_panic(expected = "underflow")]
    fn size_subtraction_underflow_is_fatal() {
        let _ = Size::new(8) - Size::new(16);
    }

    #[test]
    fn null_address_absorbs_offsets() {
        assert!(Address::NULL.is_null());
        assert!((Address::NULL + Size::new(64)).is_null());
    }

    #[test]
    fn address_ordering_follows_the_buffer() {
        let buf = [0u8; 32];
        let base = Address::from_ptr(buf.as_ptr());
        let above = base + Size::new(8);
        assert!(base < above);
        assert_eq!(above, base + Size::new(8));
    }

    #[test]
    fn addr_space_bounds_are_inclusive() {
        let buf = [0u64; 8];
        let lowest = buf.as_ptr().cast::<u8>();
        let highest = lowest.wrapping_add(64);
        let aspace = AddrSpace::new(lowest, highest);

        assert!(aspace.contains(lowest));
        assert!(aspace.contains(highest));
        assert!(!aspace.contains(highest.wrapping_add(ALIGNMENT)));
        assert!(!aspace.contains(core::ptr::null()));
        assert_eq!(
            AddrSpace::distance(aspace.lowest(), aspace.highest()),
            Size::new(64)
        );
    }

    #[test]
    #[should_panic(expected = "outside the arena range")]
    fn out_of_range_address_is_fatal() {
        let buf = [0u64; 8];
        let lowest = buf.as_ptr().cast::<u8>();
        let aspace = AddrSpace::new(lowest, lowest.wrapping_add(64));
        aspace.address(lowest.wrapping_add(128));
    }
}
