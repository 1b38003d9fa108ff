//! Block allocation and conservative garbage collection over a
//! caller-supplied memory region.
//!
//! The [`alloc`] module carves an externally owned byte range (the "arena")
//! into a chain of headered blocks with best-fit placement, splitting and
//! coalescing. The [`collectors`] module layers mark-sweep collection on top
//! of the same block metadata, finding references by conservatively scanning
//! block payloads for in-arena addresses.
//!
//! Everything is single-threaded and synchronous; contract violations
//! (double free, out-of-memory, structural corruption) abort via panic
//! rather than surfacing as recoverable errors.

#![no_std]

#[cfg(test)]
extern crate std;

pub mod alloc;
pub mod collectors;
