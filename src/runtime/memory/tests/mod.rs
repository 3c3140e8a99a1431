//! Memory pool unit tests
//!
//! Accounting behavior across clones and mixed allocation kinds

use crate::runtime::memory::{MemoryPool, DEFAULT_POOL_CAPACITY};

#[cfg(test)]
mod pool_tests {
    use super::*;

    #[test]
    fn test_pool_new() {
        let pool = MemoryPool::new(DEFAULT_POOL_CAPACITY);
        assert_eq!(pool.capacity(), 32 * 1024);
        assert_eq!(pool.used(), 0);
        assert_eq!(pool.available(), 32 * 1024);
    }

    #[test]
    fn test_pool_default_is_unbounded() {
        let pool = MemoryPool::default();
        assert_eq!(pool.capacity(), usize::MAX);
    }

    #[test]
    fn test_clones_share_accounting() {
        let pool = MemoryPool::new(100);
        let other = pool.clone();
        let block = other.alloc_zeroed(40).unwrap();
        assert_eq!(pool.used(), 40);
        drop(block);
        assert_eq!(pool.used(), 0);
    }

    #[test]
    fn test_exact_fit() {
        let pool = MemoryPool::new(32);
        let a = pool.alloc_zeroed(16).unwrap();
        let b = pool.alloc_zeroed(16).unwrap();
        assert_eq!(pool.available(), 0);
        assert!(pool.reserve(1).is_err());
        drop(a);
        assert!(pool.reserve(1).is_ok());
        drop(b);
    }

    #[test]
    fn test_zero_length_block() {
        let pool = MemoryPool::new(0);
        let block = pool.alloc_zeroed(0).unwrap();
        assert!(block.is_empty());
        assert_eq!(pool.used(), 0);
    }

    #[test]
    fn test_block_is_writable() {
        let pool = MemoryPool::new(8);
        let mut block = pool.alloc_zeroed(4).unwrap();
        block[2] = 0xAB;
        assert_eq!(&block[..], &[0, 0, 0xAB, 0]);
    }
}
