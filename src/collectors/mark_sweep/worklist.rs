//! The worklist variant: pending blocks queue in a vector that itself
//! lives inside the arena it collects.

use core::ptr::NonNull;

use allocator_api2::vec::Vec;

use crate::alloc::{Arena, ArenaAllocator, Block};
use crate::collectors::collector::Collector;

use super::scan_referenced;

/// Upper bound on simultaneously pending blocks.
///
/// The buffer is reserved once at construction; letting it relocate
/// mid-cycle would invalidate the self-mark taken in `init`, so pushing
/// past this capacity is fatal.
const WORKLIST_CAPACITY: usize = 16;

/// Mark-sweep with an explicit pending worklist.
///
/// A mark step pops instead of rescanning the chain, making a full cycle
/// roughly linear in live references times chain length. The worklist's
/// own storage is allocated from the arena through the adapter, so it
/// appears on the chain like any other occupied block and marks itself
/// live each cycle.
pub struct WorklistCollector<'arena> {
    arena: &'arena Arena,
    worklist: Vec<NonNull<Block>, ArenaAllocator<'arena>>,
}

impl<'arena> WorklistCollector<'arena> {
    pub fn new(arena: &'arena Arena) -> Self {
        let mut worklist = Vec::new_in(arena.allocator());
        worklist.reserve_exact(WORKLIST_CAPACITY);
        Self { arena, worklist }
    }
}

fn push_pending<'arena>(
    worklist: &mut Vec<NonNull<Block>, ArenaAllocator<'arena>>,
    block: NonNull<Block>,
) {
    assert!(
        worklist.len() < worklist.capacity(),
        "garbage collector worklist overflow"
    );
    worklist.push(block);
}

impl Collector for WorklistCollector<'_> {
    fn arena(&self) -> &Arena {
        self.arena
    }

    fn init(&mut self) {
        self.worklist.clear();

        // the worklist's backing block must survive its own sweep
        let storage = NonNull::new(self.worklist.as_ptr().cast_mut().cast::<u8>())
            .expect("worklist storage lives in the arena");
        let backing = self.arena.block_of(storage);

        let worklist = &mut self.worklist;
        let mut roots = 0usize;
        self.arena.for_each_block(|b| {
            b.set_marked(false);
            if b.is_root() {
                b.set_to_be_checked(true);
                push_pending(worklist, NonNull::from(b));
                roots += 1;
            }
            true
        });
        backing.set_marked(true);
        log::debug!("worklist init seeded {roots} roots");
    }

    fn mark_step(&mut self) -> bool {
        let Some(block) = self.worklist.pop() else {
            return false;
        };
        // SAFETY: entries come from chain traversals and the chain does
        // not change during the mark phase
        let block = unsafe { &*block.as_ptr() };
        block.set_marked(true);
        block.set_to_be_checked(false);

        let worklist = &mut self.worklist;
        scan_referenced(self.arena, block, |referenced| {
            if !referenced.is_marked() && !referenced.is_to_be_checked() {
                referenced.set_to_be_checked(true);
                push_pending(worklist, NonNull::from(referenced));
            }
        });
        true
    }

    fn collect(&mut self) {
        self.worklist.clear();

        // one chain walk captures every victim and resets the marks;
        // every capture is still an occupied header while the frees
        // below only coalesce the free gaps between them
        let worklist = &mut self.worklist;
        self.arena.for_each_block(|b| {
            if !b.is_free() && !b.is_marked() {
                push_pending(worklist, NonNull::from(b));
            }
            b.set_marked(false);
            true
        });

        let victims = self.worklist.len();
        for block in self.worklist.drain(..) {
            // SAFETY: captured above as an occupied block and not freed
            // since
            unsafe { self.arena.free(block.as_ref().to_user_data()) };
        }
        log::debug!("worklist collect freed {victims} blocks");
    }
}
