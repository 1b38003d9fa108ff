// the collector-facing contract shared by the mark-sweep variants
//
// key design decisions:
// - roots and the write barrier only touch block flags, so they take
//   `&self`; the phase methods own collector state and take `&mut self`
// - `register_root`/`unregister_root`/`link`/`full_gc` are provided here
//   so both variants expose identical mutator hooks

use core::ptr::NonNull;

use crate::alloc::Arena;

pub trait Collector {
    /// The arena this collector sweeps.
    fn arena(&self) -> &Arena;

    /// Reset mark state and seed the pending set from the registered roots.
    fn init(&mut self);

    /// Mark one pending block and schedule everything it references.
    /// Returns false once nothing is pending.
    fn mark_step(&mut self) -> bool;

    /// Free every occupied block the mark phase did not reach.
    fn collect(&mut self);

    /// Flag the block containing `obj` as a root.
    ///
    /// Registering the same root twice is the same as registering once.
    fn register_root(&self, obj: NonNull<u8>) {
        self.arena().block_of(obj).set_root(true);
    }

    fn unregister_root(&self, obj: NonNull<u8>) {
        self.arena().block_of(obj).set_root(false);
    }

    /// Write barrier for storing a managed pointer inside a managed object.
    ///
    /// When the source block is already marked, the target's pending flag
    /// is raised; a store into an already-scanned object is otherwise
    /// invisible to the running cycle. The flag is only a hint: the
    /// chain-scan variant picks it up on its next [`mark_step`], the
    /// worklist variant only processes what reaches its queue. The
    /// barrier is therefore no substitute for the supported discipline —
    /// quiesce the mutator, drain [`mark_step`], then [`collect`], as
    /// [`full_gc`] does; stores made outside a mark phase are found by
    /// the next cycle's scan regardless.
    ///
    /// Returns `to` unchanged so the call can wrap the store expression.
    ///
    /// [`mark_step`]: Self::mark_step
    /// [`collect`]: Self::collect
    /// [`full_gc`]: Self::full_gc
    fn link(&self, from: NonNull<u8>, to: NonNull<u8>) -> NonNull<u8> {
        let arena = self.arena();
        if arena.block_of(from).is_marked() {
            arena.block_of(to).set_to_be_checked(true);
        }
        to
    }

    /// One complete cycle: init, drain the mark loop, sweep.
    fn full_gc(&mut self) {
        self.init();
        while self.mark_step() {}
        self.collect();
    }
}
