//! Memory pool for the VM runtime
//!
//! Embedded targets have a fixed RAM budget, so every byte the VM owns is
//! drawn from a capacity-bounded [`MemoryPool`]. Allocations are RAII values:
//! a [`Block`] or [`Reservation`] returns its bytes to the pool when dropped.
//!
//! # Design Principles
//! - Simple surface: reserve / alloc_zeroed / release-on-drop
//! - No manual free, so no leak on early-return paths
//! - Send + Sync accounting via atomics

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;

/// Memory allocation error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocError {
    /// Not enough memory to satisfy the allocation
    #[error("out of memory: requested {requested} bytes, {available} available")]
    OutOfMemory { requested: usize, available: usize },
}

#[derive(Debug)]
struct PoolState {
    capacity: usize,
    used: AtomicUsize,
    peak: AtomicUsize,
}

impl PoolState {
    fn release(
        &self,
        bytes: usize,
    ) {
        self.used.fetch_sub(bytes, Ordering::SeqCst);
    }

    fn update_peak(
        &self,
        current: usize,
    ) {
        loop {
            let peak = self.peak.load(Ordering::SeqCst);
            if current <= peak {
                break;
            }
            if self
                .peak
                .compare_exchange(peak, current, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                break;
            }
        }
    }
}

/// Capacity-bounded memory pool
///
/// Cloning yields another handle onto the same accounting.
#[derive(Debug, Clone)]
pub struct MemoryPool {
    state: Arc<PoolState>,
}

impl MemoryPool {
    /// Create a pool with a fixed byte capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Arc::new(PoolState {
                capacity,
                used: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }),
        }
    }

    /// Create a pool limited only by the host allocator
    pub fn unbounded() -> Self {
        Self::new(usize::MAX)
    }

    /// Total capacity
    pub fn capacity(&self) -> usize {
        self.state.capacity
    }

    /// Bytes currently held by live allocations
    pub fn used(&self) -> usize {
        self.state.used.load(Ordering::SeqCst)
    }

    /// Remaining capacity
    pub fn available(&self) -> usize {
        self.state.capacity.saturating_sub(self.used())
    }

    /// High-water mark of `used()` over the pool's lifetime
    pub fn peak(&self) -> usize {
        self.state.peak.load(Ordering::SeqCst)
    }

    /// Account for `bytes` without handing out storage
    ///
    /// Used for typed tables whose storage is a `Vec<T>` held next to the
    /// reservation.
    pub fn reserve(
        &self,
        bytes: usize,
    ) -> Result<Reservation, AllocError> {
        let mut current = self.state.used.load(Ordering::SeqCst);
        loop {
            let next = match current.checked_add(bytes) {
                Some(next) if next <= self.state.capacity => next,
                _ => {
                    return Err(AllocError::OutOfMemory {
                        requested: bytes,
                        available: self.state.capacity.saturating_sub(current),
                    })
                }
            };
            match self.state.used.compare_exchange(
                current,
                next,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => {
                    self.state.update_peak(next);
                    return Ok(Reservation {
                        state: self.state.clone(),
                        bytes,
                    });
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Allocate a zero-initialized byte block
    pub fn alloc_zeroed(
        &self,
        len: usize,
    ) -> Result<Block, AllocError> {
        let reservation = self.reserve(len)?;
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|_| AllocError::OutOfMemory {
                requested: len,
                available: self.available(),
            })?;
        data.resize(len, 0);
        Ok(Block {
            data,
            _reservation: reservation,
        })
    }
}

impl Default for MemoryPool {
    fn default() -> Self {
        Self::unbounded()
    }
}

/// Bytes accounted against a pool, released on drop
pub struct Reservation {
    state: Arc<PoolState>,
    bytes: usize,
}

impl Reservation {
    /// Number of bytes held
    pub fn bytes(&self) -> usize {
        self.bytes
    }
}

impl fmt::Debug for Reservation {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Reservation")
            .field("bytes", &self.bytes)
            .finish()
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.state.release(self.bytes);
    }
}

/// Zero-initialized byte storage drawn from a [`MemoryPool`]
#[derive(Debug)]
pub struct Block {
    data: Vec<u8>,
    _reservation: Reservation,
}

impl Block {
    /// Length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the block holds no bytes
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Deref for Block {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

impl DerefMut for Block {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.data
    }
}
