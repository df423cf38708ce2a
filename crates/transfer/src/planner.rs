use crate::TransferError;

/// One contiguous byte range of a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkDescriptor {
    pub index: u64,
    pub offset: u64,
    pub length: u64,
    pub is_last: bool,
}

/// Returns the number of chunks needed for `total_size` bytes.
pub fn plan(total_size: u64, chunk_size: u64) -> Result<u64, TransferError> {
    Ok(ChunkPlan::new(total_size, chunk_size)?.total_chunks())
}

/// Partition of a payload into fixed-size chunks.
///
/// Descriptors are computed on demand and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    total_size: u64,
    chunk_size: u64,
    total_chunks: u64,
}

impl ChunkPlan {
    /// Plans `total_size` bytes in chunks of `chunk_size`.
    pub fn new(total_size: u64, chunk_size: u64) -> Result<Self, TransferError> {
        if chunk_size == 0 {
            return Err(TransferError::ZeroChunkSize);
        }
        Ok(Self {
            total_size,
            chunk_size,
            total_chunks: total_size.div_ceil(chunk_size),
        })
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn total_chunks(&self) -> u64 {
        self.total_chunks
    }

    /// Returns the descriptor for `index`, or `None` past the last chunk.
    pub fn descriptor(&self, index: u64) -> Option<ChunkDescriptor> {
        if index >= self.total_chunks {
            return None;
        }
        let offset = index * self.chunk_size;
        let length = self.chunk_size.min(self.total_size - offset);
        Some(ChunkDescriptor {
            index,
            offset,
            length,
            is_last: index + 1 == self.total_chunks,
        })
    }

    /// Iterates descriptors in ascending index order.
    pub fn iter(&self) -> ChunkIter {
        ChunkIter {
            plan: *self,
            next: 0,
        }
    }
}

impl IntoIterator for &ChunkPlan {
    type Item = ChunkDescriptor;
    type IntoIter = ChunkIter;

    fn into_iter(self) -> ChunkIter {
        self.iter()
    }
}

/// Lazy iterator over a [`ChunkPlan`].
#[derive(Debug, Clone)]
pub struct ChunkIter {
    plan: ChunkPlan,
    next: u64,
}

impl Iterator for ChunkIter {
    type Item = ChunkDescriptor;

    fn next(&mut self) -> Option<ChunkDescriptor> {
        let descriptor = self.plan.descriptor(self.next)?;
        self.next += 1;
        Some(descriptor)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.plan.total_chunks.saturating_sub(self.next);
        let remaining = usize::try_from(remaining).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}
