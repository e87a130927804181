//! # Receive Buffer Pool
//!
//! Fixed-capacity pool of fixed-size blocks handed to connections for each
//! socket read. The free list is a bounded lock-free channel, so neither
//! allocation nor release ever blocks the I/O thread.
//!
//! Running out of blocks is a capacity problem, not something a single
//! read can recover from: [`BufferPool::allocate`] fails instead of
//! waiting or growing the pool.
//!
//! ```rust
//! use server::pool::BufferPool;
//!
//! let pool = BufferPool::new(4, 2048);
//! let block = pool.allocate().unwrap();
//! assert_eq!(pool.available(), 3);
//! drop(block); // returned to the pool
//! assert_eq!(pool.available(), 4);
//! ```

use crate::error::{Result, ServerError};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::ops::{Deref, DerefMut};

/// A block borrowed from a [`BufferPool`]
///
/// Returned to the pool exactly once, when dropped.
pub struct PooledBlock {
    block: Box<[u8]>,
    free: Sender<Box<[u8]>>,
}

impl Deref for PooledBlock {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.block
    }
}

impl DerefMut for PooledBlock {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.block
    }
}

impl Drop for PooledBlock {
    fn drop(&mut self) {
        let block = std::mem::take(&mut self.block);
        // The channel is sized to the pool, so this only fails once the
        // pool itself is gone.
        let _ = self.free.try_send(block);
    }
}

/// Shared pool of receive blocks
#[derive(Clone)]
pub struct BufferPool {
    free_tx: Sender<Box<[u8]>>,
    free_rx: Receiver<Box<[u8]>>,
    capacity: usize,
    block_size: usize,
}

impl BufferPool {
    /// Pre-allocates `capacity` blocks of `block_size` bytes
    pub fn new(capacity: usize, block_size: usize) -> Self {
        let (free_tx, free_rx) = bounded(capacity);
        for _ in 0..capacity {
            // Cannot fail: the channel has room for exactly `capacity` blocks
            let _ = free_tx.try_send(vec![0u8; block_size].into_boxed_slice());
        }

        Self {
            free_tx,
            free_rx,
            capacity,
            block_size,
        }
    }

    /// Takes a block without blocking
    pub fn allocate(&self) -> Result<PooledBlock> {
        let block = self
            .free_rx
            .try_recv()
            .map_err(|_| ServerError::ReceivePoolExhausted {
                capacity: self.capacity,
            })?;

        Ok(PooledBlock {
            block,
            free: self.free_tx.clone(),
        })
    }

    /// Blocks currently free
    pub fn available(&self) -> usize {
        self.free_rx.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_basic() {
        let pool = BufferPool::new(10, 128);
        assert_eq!(pool.available(), 10);

        let mut block = pool.allocate().unwrap();
        assert_eq!(pool.available(), 9);
        assert_eq!(block.len(), 128);

        block[0] = 42;
        assert_eq!(block[0], 42);

        drop(block);
        assert_eq!(pool.available(), 10);
    }

    #[test]
    fn test_pool_exhaustion() {
        let pool = BufferPool::new(2, 64);
        let _a = pool.allocate().unwrap();
        let _b = pool.allocate().unwrap();

        assert!(matches!(
            pool.allocate(),
            Err(ServerError::ReceivePoolExhausted { capacity: 2 })
        ));
    }

    #[test]
    fn test_block_returned_once() {
        let pool = BufferPool::new(1, 64);
        {
            let _block = pool.allocate().unwrap();
            assert_eq!(pool.available(), 0);
        }
        assert_eq!(pool.available(), 1);

        // Reallocation after release works and the pool never grows
        let block = pool.allocate().unwrap();
        drop(block);
        assert_eq!(pool.available(), 1);
        assert_eq!(pool.capacity(), 1);
    }

    #[test]
    fn test_clones_share_blocks() {
        let pool = BufferPool::new(3, 64);
        let other = pool.clone();

        let block = other.allocate().unwrap();
        assert_eq!(pool.available(), 2);
        drop(block);
        assert_eq!(pool.available(), 3);
    }
}
