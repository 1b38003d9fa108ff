//! The arena: a caller-supplied byte range managed as a chain of blocks.
//!
//! Placement is best-fit by size, split when the leftover still fits a
//! header, coalesce on free. Between any two public operations the chain
//! is address-ordered, gap-free, bounded by the arena range, and its
//! block sizes sum to the arena length; no two adjacent blocks are both
//! free after a `free` returns.

use core::cell::Cell;
use core::fmt;
use core::ptr::NonNull;

use super::adapter::ArenaAllocator;
use super::addr::{ALIGNMENT, AddrSpace, Address, Size};
use super::block::Block;


pub struct Arena {
    aspace: AddrSpace,
    total_size: Size,
    free_size: Cell<Size>,
    occupied_size: Cell<Size>,
}

impl Arena {
    /// Take over the region `[lowest, highest)` as one free block.
    ///
    /// The caller keeps ownership of the backing storage; dropping the
    /// arena releases nothing.
    ///
    /// # Safety
    ///
    /// The region must be writable and unaliased for the arena's
    /// lifetime, `lowest` aligned to [`ALIGNMENT`], and the length a
    /// multiple of it.
    pub unsafe fn new(lowest: *mut u8, highest: *mut u8) -> Self {
        let aspace = AddrSpace::new(lowest, highest);
        let total_size = AddrSpace::distance(aspace.lowest(), aspace.highest());
        assert!(
            lowest as usize % ALIGNMENT == 0,
            "arena start {lowest:p} is not word aligned"
        );
        assert_eq!(
            total_size,
            total_size.align(),
            "arena length is not a multiple of the alignment"
        );

        // SAFETY: the caller guarantees the range is ours to write
        unsafe { Block::make_at(aspace.lowest(), total_size) };

        Self {
            aspace,
            total_size,
            free_size: Cell::new(total_size),
            occupied_size: Cell::new(Size::ZERO),
        }
    }

    pub fn total_size(&self) -> Size {
        self.total_size
    }

    pub fn free_size(&self) -> Size {
        self.free_size.get()
    }

    pub fn occupied_size(&self) -> Size {
        self.occupied_size.get()
    }

    /// Range test for arbitrary pointers; used by the conservative scan.
    pub fn contains(&self, ptr: *const u8) -> bool {
        self.aspace.contains(ptr)
    }

    pub(crate) fn address(&self, ptr: *const u8) -> Address {
        self.aspace.address(ptr)
    }

    /// An [`allocator_api2`] handle for plugging containers into this arena.
    pub fn allocator(&self) -> ArenaAllocator<'_> {
        ArenaAllocator::new(self)
    }

    fn first_block(&self) -> &Block {
        // the chain always starts at `lowest` (boundedness invariant)
        unsafe { &*Block::at(self.aspace.lowest()).as_ptr() }
    }

    /// Visit every block front to back while `f` returns true.
    pub fn for_each_block<F: FnMut(&Block) -> bool>(&self, f: F) {
        self.first_block().for_each(f);
    }

    /// The block whose range contains `user_data`; fatal if none does.
    pub fn block_of(&self, user_data: NonNull<u8>) -> &Block {
        let addr = self.address(user_data.as_ptr());
        let mut found: Option<NonNull<Block>> = None;
        self.for_each_block(|b| {
            if b.in_block(addr) {
                found = Some(NonNull::from(b));
                false
            } else {
                true
            }
        });
        let found = found.expect("pointer not contained in any block");
        // SAFETY: found during a live chain traversal of this arena
        unsafe { &*found.as_ptr() }
    }

    /// Hand out `n_bytes` of payload; fatal when no free block fits.
    ///
    /// A zero-byte request is served with a minimal block so the returned
    /// pointer is still a unique, freeable payload.
    pub fn alloc(&self, n_bytes: usize) -> NonNull<u8> {
        // at least one payload byte, so a split head always fits a header
        let need = (Block::HEADER_SIZE + Size::new(n_bytes.max(1))).align();
        let chosen = self.find_suitable(need);
        let chosen = unsafe { &*chosen.as_ptr() };
        debug_assert!(chosen.is_free());

        // split only when the leftover can still carry a header
        let block = if chosen.size() > need + Block::HEADER_SIZE {
            let head = self.split(NonNull::from(chosen), need);
            unsafe { &*head.as_ptr() }
        } else {
            chosen
        };

        block.set_occupied(true);
        self.free_size.set(self.free_size.get() - block.size());
        self.occupied_size.set(self.occupied_size.get() + block.size());

        log::trace!(
            "alloc {n_bytes} bytes: {} block at {}",
            block.size(),
            block.address()
        );
        block.to_user_data()
    }

    /// Return a payload to the arena and coalesce with free neighbours.
    ///
    /// # Safety
    ///
    /// `ptr` must have come from [`Arena::alloc`] on this arena, with no
    /// outstanding reference into the payload.
    pub unsafe fn free(&self, ptr: NonNull<u8>) {
        let addr = self.address(ptr.as_ptr());
        let mut owner: Option<NonNull<Block>> = None;
        self.for_each_block(|b| {
            if b.in_block(addr) {
                owner = Some(NonNull::from(b));
                false
            } else {
                true
            }
        });
        let owner = owner.expect("free of an address outside every block");

        // the pointer must name the payload start of that same block
        let direct = unsafe { Block::from_user_data(ptr) };
        assert!(
            core::ptr::eq(direct.as_ptr(), owner.as_ptr()),
            "free of a pointer that is not a block payload start"
        );

        let block = unsafe { &*owner.as_ptr() };
        assert!(!block.is_free(), "double free of block at {}", block.address());
        block.set_occupied(false);

        self.free_size.set(self.free_size.get() + block.size());
        self.occupied_size.set(self.occupied_size.get() - block.size());
        log::trace!("free {} block at {}", block.size(), block.address());

        // coalesce with the successor, then with the predecessor
        let mut merged = owner;
        let has_free_next = unsafe { &*merged.as_ptr() }
            .next_block()
            .is_some_and(Block::is_free);
        if has_free_next {
            merged = self.join(merged);
        }
        let free_prev = unsafe { &*merged.as_ptr() }
            .prev_block()
            .filter(|p| p.is_free())
            .map(NonNull::from);
        if let Some(prev) = free_prev {
            self.join(prev);
        }
    }

    /// Best-fit by size; on ties the first occurrence wins.
    fn find_suitable(&self, need: Size) -> NonNull<Block> {
        let mut best: Option<NonNull<Block>> = None;
        self.for_each_block(|b| {
            if b.is_free() && b.size() >= need {
                let improves = match best {
                    Some(cur) => unsafe { &*cur.as_ptr() }.size() > b.size(),
                    None => true,
                };
                if improves {
                    best = Some(NonNull::from(b));
                }
            }
            true
        });
        match best {
            Some(b) => b,
            None => panic!("arena out of memory: no free block holds {need}"),
        }
    }

    /// Split `block` into a `head_size` head and a tail with the rest.
    /// Both halves come back free and unflagged; returns the head.
    pub(crate) fn split(&self, block: NonNull<Block>, head_size: Size) -> NonNull<Block> {
        debug_assert!(self.structure_valid());
        let b = unsafe { &*block.as_ptr() };
        assert!(
            b.splittable(),
            "split of a non-splittable block at {}",
            b.address()
        );
        assert!(
            head_size > Block::HEADER_SIZE,
            "split head of {head_size} does not fit a header"
        );

        let old_size = b.size();
        let old_addr = b.address();

        // SAFETY: both halves are rebuilt inside the replaced block's own
        // range, and the old header reference dies before the factory runs
        let head = unsafe {
            Block::replace_range(block, block, || unsafe {
                let head = Block::make_at(old_addr, head_size);
                let tail =
                    Block::make_at(head.as_ref().next_block_address(), old_size - head_size);
                tail.as_ref().insert_above(head.as_ref());
                (head, tail)
            })
        };

        debug_assert!(self.structure_valid());
        head
    }

    /// Merge `block` with its successor into one free block.
    pub(crate) fn join(&self, block: NonNull<Block>) -> NonNull<Block> {
        debug_assert!(self.structure_valid());
        let b = unsafe { &*block.as_ptr() };
        let next = b
            .next_block()
            .map(NonNull::from)
            .expect("join of the last block");
        let merged_size = b.size() + unsafe { &*next.as_ptr() }.size();
        let addr = b.address();

        // SAFETY: the merged header covers exactly the two replaced blocks
        let merged = unsafe {
            Block::replace_range(block, next, || unsafe {
                let merged = Block::make_at(addr, merged_size);
                (merged, merged)
            })
        };

        debug_assert!(self.structure_valid());
        merged
    }

    // -----------------------------------------------------------------------
    // Structural self-checks; read-only restatements of the chain invariants
    // -----------------------------------------------------------------------

    /// Every block starts exactly where its predecessor ends.
    pub fn no_overlapping_and_no_holes(&self) -> bool {
        let mut ok = true;
        let mut expected: Option<Address> = None;
        self.for_each_block(|b| {
            ok = match expected {
                None => !b.has_prev() && b.address() == self.aspace.lowest(),
                Some(addr) => b.address() == addr,
            };
            expected = Some(b.next_block_address());
            ok
        });
        ok
    }

    /// No block extends past the arena's upper bound.
    pub fn no_overruns(&self) -> bool {
        let mut ok = true;
        self.for_each_block(|b| {
            ok = b.next_block_address() <= self.aspace.highest();
            ok
        });
        ok
    }

    /// Block sizes sum to the arena length, which also equals
    /// `free_size + occupied_size`.
    pub fn sum_of_block_sizes_is_constant(&self) -> bool {
        let mut sum = Size::ZERO;
        self.for_each_block(|b| {
            sum = sum + b.size();
            true
        });
        sum == self.total_size
            && self.total_size == self.free_size.get() + self.occupied_size.get()
    }

    pub fn structure_valid(&self) -> bool {
        self.no_overlapping_and_no_holes()
            && self.no_overruns()
            && self.sum_of_block_sizes_is_constant()
    }
}

impl fmt::Display for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=========== arena dump ===========")?;
        writeln!(f, "total size: {}", self.total_size)?;
        writeln!(f, "free size: {}", self.free_size.get())?;
        writeln!(f, "occupied size: {}", self.occupied_size.get())?;
        writeln!(f, "blocks:")?;
        let mut result = Ok(());
        let mut idx = 0usize;
        self.for_each_block(|b| {
            result = writeln!(f, "  {idx:4}: {b}");
            idx += 1;
            result.is_ok()
        });
        result?;
        write!(f, "----------------------------------")
    }
}
