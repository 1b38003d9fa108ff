//! The header written in place at the start of every block.

use core::cell::Cell;
use core::fmt;
use core::ptr::{self, NonNull};

use super::addr::{ALIGNMENT, Address, Size, align};

const OCCUPIED: u8 = 0b0001;
const ROOT: u8 = 0b0010;
const MARKED: u8 = 0b0100;
const TO_BE_CHECKED: u8 = 0b1000;

/// Occupancy plus the three collection flags, packed into one byte.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BlockFlags(u8);

impl BlockFlags {
    pub(crate) const fn cleared() -> Self {
        Self(0)
    }

    const fn has(self, bit: u8) -> bool {
        self.0 & bit != 0
    }

    const fn with(self, bit: u8, on: bool) -> Self {
        if on { Self(self.0 | bit) } else { Self(self.0 & !bit) }
    }
}

/// Block metadata, living at the block's own address.
///
/// A block is identified by where it lives: headers are constructed in
/// place with [`Block::make_at`], never copied or moved, and the chain
/// links in here are what [`Arena`](super::Arena) traverses. The payload
/// starts [`Block::HEADER_SIZE`] bytes in.
#[repr(C)]
pub struct Block {
    pub(crate) prev: Cell<*const Block>,
    pub(crate) next: Cell<*const Block>,
    size: usize,
    flags: Cell<BlockFlags>,
}

impl Block {
    /// Space the header itself takes at the front of each block.
    pub const HEADER_SIZE: Size = Size::new(align(size_of::<Block>(), ALIGNMENT));

    /// Construct a free, unlinked, unflagged header at `addr`.
    ///
    /// `size` is the total block length, header included, and is stored
    /// aligned.
    ///
    /// # Safety
    ///
    /// `addr` must be writable for `size` bytes and aligned to
    /// [`ALIGNMENT`], and no live reference into that range may exist.
    pub unsafe fn make_at(addr: Address, size: Size) -> NonNull<Block> {
        assert!(!addr.is_null(), "block construction at null");
        assert!(
            size > Self::HEADER_SIZE,
            "block of {size} does not fit a header"
        );
        let raw = addr.as_ptr() as *mut Block;
        // SAFETY: the caller hands us exclusive, writable, aligned memory
        unsafe {
            raw.write(Block {
                prev: Cell::new(ptr::null()),
                next: Cell::new(ptr::null()),
                size: size.align().bytes(),
                flags: Cell::new(BlockFlags::cleared()),
            });
            NonNull::new_unchecked(raw)
        }
    }

    /// Reinterpret `addr` as a header previously built by [`Block::make_at`].
    ///
    /// # Safety
    ///
    /// A header must have been constructed at `addr` and not overwritten
    /// since.
    pub unsafe fn at(addr: Address) -> NonNull<Block> {
        assert!(!addr.is_null(), "block lookup at null");
        // SAFETY: non-null by the assert, valid by the caller's contract
        unsafe { NonNull::new_unchecked(addr.as_ptr() as *mut Block) }
    }

    /// Recover the header from a payload pointer.
    ///
    /// Pure address arithmetic; the result only names a live header when
    /// `ptr` is the payload start of one.
    ///
    /// # Safety
    ///
    /// `ptr` must point at least a header's length past the start of the
    /// address space, and the result must not be dereferenced unless `ptr`
    /// was a payload start.
    pub unsafe fn from_user_data(ptr: NonNull<u8>) -> NonNull<Block> {
        let raw = ptr.as_ptr().wrapping_sub(Self::HEADER_SIZE.bytes());
        // SAFETY: stepping back over the header of a live block stays
        // inside the arena
        unsafe { NonNull::new_unchecked(raw as *mut Block) }
    }

    pub fn address(&self) -> Address {
        Address::from_ptr(core::ptr::from_ref(self).cast::<u8>())
    }

    /// Total length of the block, header included.
    pub fn size(&self) -> Size {
        Size::new(self.size)
    }

    /// One past the end of this block; where the successor starts.
    pub fn next_block_address(&self) -> Address {
        self.address() + self.size()
    }

    pub fn in_block(&self, addr: Address) -> bool {
        addr >= self.address() && addr < self.next_block_address()
    }

    /// Whether both halves of a split would still fit a header.
    pub fn splittable(&self) -> bool {
        self.size() > Self::HEADER_SIZE + Self::HEADER_SIZE
    }

    pub fn to_user_data(&self) -> NonNull<u8> {
        let raw = (self.address() + Self::HEADER_SIZE).as_ptr();
        // SAFETY: the payload start of a live block is never null
        unsafe { NonNull::new_unchecked(raw.cast_mut()) }
    }

    pub fn user_data_size(&self) -> Size {
        self.size() - Self::HEADER_SIZE
    }

    pub fn is_free(&self) -> bool {
        !self.flags.get().has(OCCUPIED)
    }

    pub(crate) fn set_occupied(&self, occupied: bool) {
        self.flags.set(self.flags.get().with(OCCUPIED, occupied));
    }

    pub fn is_root(&self) -> bool {
        self.flags.get().has(ROOT)
    }

    pub(crate) fn set_root(&self, root: bool) {
        self.flags.set(self.flags.get().with(ROOT, root));
    }

    pub fn is_marked(&self) -> bool {
        self.flags.get().has(MARKED)
    }

    pub(crate) fn set_marked(&self, marked: bool) {
        self.flags.set(self.flags.get().with(MARKED, marked));
    }

    pub fn is_to_be_checked(&self) -> bool {
        self.flags.get().has(TO_BE_CHECKED)
    }

    pub(crate) fn set_to_be_checked(&self, pending: bool) {
        self.flags.set(self.flags.get().with(TO_BE_CHECKED, pending));
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "addr: {}, size: {}, {}",
            self.address(),
            self.size(),
            if self.is_free() { "free" } else { "occupied" }
        )
    }
}

#[cfg(test)]
mod tests {
    use std::vec;

    use super::super::addr::{Address, Size};
    use super::Block;

    fn pool_address(pool: &mut std::vec::Vec<u64>) -> Address {
        Address::from_ptr(pool.as_mut_ptr().cast::<u8>())
    }

    #[test]
    fn header_size_is_aligned_and_non_zero() {
        assert!(Block::HEADER_SIZE > Size::ZERO);
        assert_eq!(Block::HEADER_SIZE, Block::HEADER_SIZE.align());
    }

    #[test]
    fn construction_round_trips_through_user_data() {
        let mut pool = vec![0u64; 64];
        let addr = pool_address(&mut pool);
        let block = unsafe { Block::make_at(addr, Size::new(128)) };
        let block = unsafe { block.as_ref() };

        assert!(block.is_free());
        assert!(!block.is_root());
        assert!(!block.is_marked());
        assert!(!block.is_to_be_checked());
        assert_eq!(block.address(), addr);
        assert_eq!(block.size(), Size::new(128));
        assert_eq!(block.next_block_address(), addr + Size::new(128));
        assert_eq!(block.user_data_size(), Size::new(128) - Block::HEADER_SIZE);

        let user = block.to_user_data();
        let back = unsafe { Block::from_user_data(user) };
        assert_eq!(unsafe { back.as_ref() }.address(), block.address());
    }

    #[test]
    fn in_block_covers_exactly_the_block_range() {
        let mut pool = vec![0u64; 64];
        let addr = pool_address(&mut pool);
        let block = unsafe { Block::make_at(addr, Size::new(64)) };
        let block = unsafe { block.as_ref() };

        assert!(block.in_block(addr));
        assert!(block.in_block(addr + Size::new(63)));
        assert!(!block.in_block(addr + Size::new(64)));
    }

    #[test]
    fn splittable_needs_room_for_two_headers() {
        let mut pool = vec![0u64; 64];
        let addr = pool_address(&mut pool);
        let header = Block::HEADER_SIZE;

        let tight = unsafe { Block::make_at(addr, header + header) };
        assert!(!unsafe { tight.as_ref() }.splittable());

        let roomy = unsafe { Block::make_at(addr, header + header + Size::new(8)) };
        assert!(unsafe { roomy.as_ref() }.splittable());
    }

    #[test]
    #[should_panic(expected = "does not fit a header")]
    fn undersized_block_is_fatal() {
        let mut pool = vec![0u64; 8];
        let addr = pool_address(&mut pool);
        unsafe { Block::make_at(addr, Block::HEADER_SIZE) };
    }
}
