//! Conservative mark-sweep collection over the arena's block chain.
//!
//! Two variants share one flag protocol in the block headers: `init`
//! clears marks and seeds the pending set from the roots, `mark_step`
//! retires one pending block at a time, `collect` frees whatever stayed
//! unmarked. References are found by scanning payloads for words that
//! land inside the arena, so anything that merely looks like an in-arena
//! address keeps its target alive; nothing reachable through word-aligned
//! pointers is ever freed.

use crate::alloc::{Arena, Block};

mod chain_scan;
mod worklist;


pub use chain_scan::ChainScanCollector;
pub use worklist::WorklistCollector;

/// Walk `block`'s payload as word-sized slots and hand every block
/// referenced by an in-arena word to `handler`.
pub(crate) fn scan_referenced(arena: &Arena, block: &Block, mut handler: impl FnMut(&Block)) {
    let base = block.to_user_data().as_ptr().cast::<usize>().cast_const();
    let words = block.user_data_size().bytes() / size_of::<usize>();
    for idx in 0..words {
        // SAFETY: the slot is in-bounds payload of a live block and
        // word-aligned; the value is only range-tested
        let word = unsafe { base.add(idx).read() };
        let candidate = word as *const u8;
        if arena.contains(candidate) {
            let addr = arena.address(candidate);
            arena.for_each_block(|b| {
                if b.in_block(addr) {
                    handler(b);
                }
                true
            });
        }
    }
}
