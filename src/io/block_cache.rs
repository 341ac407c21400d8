use std::num::NonZeroUsize;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use lru::LruCache;
use tokio::sync::Mutex;

use super::RangeReader;
use crate::error::IoError;

/// Default block size: 64KB.
///
/// IFD tables and tag arrays are small and clustered; whole tiles are
/// usually larger than a block and skip the cache entirely.
pub const DEFAULT_BLOCK_SIZE: usize = 64 * 1024;

/// Default cache capacity in number of blocks (4MB with default blocks).
const DEFAULT_CACHE_CAPACITY: usize = 64;

/// Block-based caching layer that wraps any RangeReader.
///
/// Parsing a slide walks a linked list of IFDs and then reads the offset and
/// byte-count arrays of every level: many small reads at scattered offsets.
/// This layer turns them into a few aligned block reads.
///
/// - Fixed-size blocks with LRU eviction
/// - Reads spanning several blocks are stitched together
/// - Reads of at least one block length go straight to the inner reader
#[derive(Debug)]
pub struct BlockCache<R> {
    inner: R,
    block_size: usize,
    cache: Mutex<LruCache<u64, Bytes>>,
}

impl<R: RangeReader> BlockCache<R> {
    /// Wrap `inner` with the default block size and capacity.
    pub fn new(inner: R) -> Self {
        Self::with_capacity(inner, DEFAULT_BLOCK_SIZE, DEFAULT_CACHE_CAPACITY)
    }

    /// Wrap `inner` with a custom block size and capacity (in blocks).
    ///
    /// Zero values are raised to one.
    pub fn with_capacity(inner: R, block_size: usize, capacity: usize) -> Self {
        Self {
            inner,
            block_size: block_size.max(1),
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
        }
    }

    /// The wrapped reader.
    pub fn inner(&self) -> &R {
        &self.inner
    }

    /// Number of blocks currently cached.
    pub async fn cached_blocks(&self) -> usize {
        self.cache.lock().await.len()
    }

    async fn get_block(&self, block_idx: u64) -> Result<Bytes, IoError> {
        if let Some(block) = self.cache.lock().await.get(&block_idx) {
            return Ok(block.clone());
        }

        let offset = block_idx * self.block_size as u64;
        let remaining = self.inner.size().saturating_sub(offset);
        let len = std::cmp::min(self.block_size as u64, remaining) as usize;
        let block = self.inner.read_exact_at(offset, len).await?;

        self.cache.lock().await.put(block_idx, block.clone());
        Ok(block)
    }
}

#[async_trait]
impl<R: RangeReader> RangeReader for BlockCache<R> {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        let size = self.inner.size();
        if offset.saturating_add(len as u64) > size {
            return Err(IoError::RangeOutOfBounds {
                offset,
                requested: len as u64,
                size,
            });
        }
        if len == 0 {
            return Ok(Bytes::new());
        }
        if len >= self.block_size {
            return self.inner.read_exact_at(offset, len).await;
        }

        let block_size = self.block_size as u64;
        let first = offset / block_size;
        let last = (offset + len as u64 - 1) / block_size;
        let start_in_block = (offset % block_size) as usize;

        if first == last {
            let block = self.get_block(first).await?;
            return Ok(block.slice(start_in_block..start_in_block + len));
        }

        let mut out = BytesMut::with_capacity(len);
        let mut cursor = offset;
        for block_idx in first..=last {
            let block = self.get_block(block_idx).await?;
            let from = (cursor % block_size) as usize;
            let take = std::cmp::min(block.len() - from, len - out.len());
            out.extend_from_slice(&block[from..from + take]);
            cursor += take as u64;
        }
        Ok(out.freeze())
    }

    fn size(&self) -> u64 {
        self.inner.size()
    }

    fn identifier(&self) -> &str {
        self.inner.identifier()
    }
}
