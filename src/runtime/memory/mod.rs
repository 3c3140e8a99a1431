//! Memory management for the VM runtime
//!
//! All VM-owned storage (static dataspace, clump table, array storage) is
//! drawn from a [`MemoryPool`]. Ownership is scope-based: dropping the owner
//! returns the bytes, so teardown and failed loads release everything by
//! construction.

mod allocator;

pub use allocator::{AllocError, Block, MemoryPool, Reservation};

/// Default pool capacity, matching the RAM the NXT brick leaves for the VM
pub const DEFAULT_POOL_CAPACITY: usize = 32 * 1024;

#[cfg(test)]
mod tests;
