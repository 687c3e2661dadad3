//! Beacon synchronization mechanisms.
//!
//! ## Why not `std::sync::Mutex`?
//!
//! Listeners run while their target's lock is held, and a listener is free to
//! call back into that same target. A plain mutex would deadlock the thread
//! against itself, so the target is guarded by a lock that recognizes its
//! owner and lets it back in, counting how deep it went.
pub mod reentrant;
mod spinlock;
