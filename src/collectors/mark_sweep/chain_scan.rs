//! The rescanning variant: no collector state beyond the block flags.

use crate::alloc::Arena;
use crate::collectors::collector::Collector;

use super::scan_referenced;

/// Mark-sweep that finds its next pending block by walking the chain
/// from the start.
///
/// Every `mark_step` rescans the chain, so a full cycle is quadratic in
/// the block count; [`WorklistCollector`](super::WorklistCollector)
/// trades an in-arena vector for those rescans.
pub struct ChainScanCollector<'arena> {
    arena: &'arena Arena,
}

impl<'arena> ChainScanCollector<'arena> {
    pub fn new(arena: &'arena Arena) -> Self {
        Self { arena }
    }
}

impl Collector for ChainScanCollector<'_> {
    fn arena(&self) -> &Arena {
        self.arena
    }

    fn init(&mut self) {
        self.arena.for_each_block(|b| {
            b.set_marked(false);
            b.set_to_be_checked(b.is_root());
            true
        });
    }

    fn mark_step(&mut self) -> bool {
        let arena = self.arena;
        let mut did_work = false;
        arena.for_each_block(|b| {
            if !b.is_to_be_checked() {
                return true;
            }
            did_work = true;
            b.set_marked(true);
            b.set_to_be_checked(false);
            scan_referenced(arena, b, |referenced| {
                if !referenced.is_marked() {
                    referenced.set_to_be_checked(true);
                }
            });
            false
        });
        did_work
    }

    fn collect(&mut self) {
        let mut freed = 0usize;
        loop {
            // find the next victim without touching any marks: clearing
            // them mid-search would let a later pass mistake a live block
            // for garbage; freeing restructures the chain, so start over
            let mut victim = None;
            self.arena.for_each_block(|b| {
                if !b.is_free() && !b.is_marked() {
                    victim = Some(b.to_user_data());
                    return false;
                }
                true
            });
            match victim {
                // SAFETY: the payload of an occupied block this collector
                // just found on the chain
                Some(ptr) => unsafe {
                    self.arena.free(ptr);
                    freed += 1;
                },
                None => break,
            }
        }
        // marks reset only once nothing is left to free
        self.arena.for_each_block(|b| {
            b.set_marked(false);
            true
        });
        log::debug!("chain-scan collect freed {freed} blocks");
    }
}
