//! Chunk planning
//!
//! Splits a byte length into an ordered, contiguous sequence of chunk
//! descriptors without touching the file itself.

use crate::config::DEFAULT_CHUNK_SIZE;

/// One contiguous byte range of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkDescriptor {
    /// Zero-based position; wire payloads use `index + 1`
    pub index: u64,
    pub offset: u64,
    pub length: u64,
    pub is_last: bool,
}

impl ChunkDescriptor {
    /// One-based chunk number as sent to the server
    pub fn number(&self) -> u64 {
        self.index + 1
    }

    /// Exclusive end offset
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// Lazy iterator over the chunks of a file
///
/// An empty file still yields one zero-length chunk so the register/finish
/// handshake always carries at least one chunk event.
#[derive(Debug, Clone)]
pub struct ChunkPlanner {
    file_size: u64,
    chunk_size: u64,
    total: u64,
    next: u64,
}

impl ChunkPlanner {
    /// Plan chunks for `file_size` bytes.
    ///
    /// If `chunk_size` is 0, [`DEFAULT_CHUNK_SIZE`] (1 MiB) is used.
    pub fn new(file_size: u64, chunk_size: u64) -> Self {
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        let total = file_size.div_ceil(chunk_size).max(1);
        Self {
            file_size,
            chunk_size,
            total,
            next: 0,
        }
    }

    /// Total number of chunks, including already yielded ones
    pub fn total_chunks(&self) -> u64 {
        self.total
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Descriptor at `index`, if it exists
    pub fn descriptor(&self, index: u64) -> Option<ChunkDescriptor> {
        if index >= self.total {
            return None;
        }
        let offset = index * self.chunk_size;
        let length = self.chunk_size.min(self.file_size - offset);
        Some(ChunkDescriptor {
            index,
            offset,
            length,
            is_last: index + 1 == self.total,
        })
    }
}

impl Iterator for ChunkPlanner {
    type Item = ChunkDescriptor;

    fn next(&mut self) -> Option<Self::Item> {
        let descriptor = self.descriptor(self.next)?;
        self.next += 1;
        Some(descriptor)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.total - self.next).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ChunkPlanner {}

/// Plan all chunks of `file_size` bytes
pub fn plan(file_size: u64, chunk_size: u64) -> ChunkPlanner {
    ChunkPlanner::new(file_size, chunk_size)
}
