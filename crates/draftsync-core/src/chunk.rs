//! Chunk Splitter / Joiner
//!
//! Hosting platforms cap request bodies (4.5 MiB on the reference deployment). A
//! compressed course that does not fit under the chunk size is split into fixed-size
//! chunks on the client and stitched back together on the server:
//!
//! ```text
//! client:  [ 7.5 MiB payload ] ─split(3 MiB)→ [3 MiB] [3 MiB] [1.5 MiB]
//!                                               │ 0      │ 1      │ 2
//! server:  ChunkAssembler(total=3) ◄────────────┴────────┴────────┘
//!          assemble() → chunks concatenated in index order
//! ```
//!
//! Chunks are sent one at a time and awaited, so index order on the wire is reliable.
//! The assembler still keys chunks by index rather than arrival order.

use crate::error::{Error, Result};
use bytes::{Bytes, BytesMut};

/// Largest chunk sent in one request (3 MiB)
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 3 * 1024 * 1024;

/// Platform request-body ceiling (4.5 MiB); chunks leave headroom for framing
pub const REQUEST_SIZE_CEILING: usize = 4 * 1024 * 1024 + 512 * 1024;

/// Whether a payload of `len` bytes has to go through the chunked protocol.
pub fn needs_chunking(len: usize, max_chunk_size: usize) -> bool {
    len >= max_chunk_size
}

/// Number of chunks `len` bytes split into.
pub fn chunk_count(len: usize, max_chunk_size: usize) -> usize {
    if max_chunk_size == 0 {
        return 0;
    }
    len.div_ceil(max_chunk_size)
}

/// Split `data` into in-order chunks of at most `max_chunk_size` bytes.
///
/// Chunks are zero-copy slices of `data`.
pub fn split_chunks(data: &Bytes, max_chunk_size: usize) -> Result<Vec<Bytes>> {
    if max_chunk_size == 0 {
        return Err(Error::InvalidChunkSize(max_chunk_size));
    }

    let mut chunks = Vec::with_capacity(chunk_count(data.len(), max_chunk_size));
    let mut start = 0;
    while start < data.len() {
        let end = (start + max_chunk_size).min(data.len());
        chunks.push(data.slice(start..end));
        start = end;
    }

    Ok(chunks)
}

/// Collects the chunks of one upload and reassembles them in index order.
#[derive(Debug, Clone)]
pub struct ChunkAssembler {
    parts: Vec<Option<Bytes>>,
    received_bytes: usize,
}

impl ChunkAssembler {
    pub fn new(total_chunks: usize) -> Self {
        Self {
            parts: vec![None; total_chunks],
            received_bytes: 0,
        }
    }

    pub fn total(&self) -> usize {
        self.parts.len()
    }

    /// Number of distinct chunk indexes received
    pub fn received(&self) -> usize {
        self.parts.iter().filter(|p| p.is_some()).count()
    }

    pub fn received_bytes(&self) -> usize {
        self.received_bytes
    }

    pub fn is_complete(&self) -> bool {
        self.parts.iter().all(Option::is_some)
    }

    /// Store chunk `index`. A repeated index replaces the earlier bytes.
    pub fn insert(&mut self, index: usize, data: Bytes) -> Result<()> {
        let total = self.parts.len();
        let slot = self
            .parts
            .get_mut(index)
            .ok_or(Error::ChunkOutOfRange { index, total })?;

        if let Some(previous) = slot.take() {
            self.received_bytes -= previous.len();
        }
        self.received_bytes += data.len();
        *slot = Some(data);
        Ok(())
    }

    /// Concatenate all chunks in index order.
    pub fn assemble(&self) -> Result<Bytes> {
        let total = self.parts.len();
        let mut out = BytesMut::with_capacity(self.received_bytes);

        for (index, part) in self.parts.iter().enumerate() {
            match part {
                Some(bytes) => out.extend_from_slice(bytes),
                None => return Err(Error::ChunkMissing { index, total }),
            }
        }

        Ok(out.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: usize = 1024;

    fn patterned(len: usize) -> Bytes {
        Bytes::from((0..len).map(|i| (i % 251) as u8).collect::<Vec<u8>>())
    }

    #[test]
    fn test_split_three_max_plus_remainder() {
        let data = patterned(3 * MAX + 100);
        let chunks = split_chunks(&data, MAX).unwrap();

        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].len(), MAX);
        assert_eq!(chunks[3].len(), 100);

        let joined: Vec<u8> = chunks.iter().flat_map(|c| c.iter().copied()).collect();
        assert_eq!(&joined[..], &data[..]);
    }

    #[test]
    fn test_out_of_order_join_differs() {
        let data = patterned(3 * MAX + 100);
        let chunks = split_chunks(&data, MAX).unwrap();

        let shuffled: Vec<u8> = [1, 0, 3, 2]
            .iter()
            .flat_map(|&i| chunks[i].iter().copied())
            .collect();
        assert_eq!(shuffled.len(), data.len());
        assert_ne!(&shuffled[..], &data[..]);
    }

    #[test]
    fn test_assembler_orders_by_index() {
        let data = patterned(3 * MAX + 100);
        let chunks = split_chunks(&data, MAX).unwrap();

        let mut assembler = ChunkAssembler::new(chunks.len());
        for i in [2, 0, 3, 1] {
            assembler.insert(i, chunks[i].clone()).unwrap();
        }

        assert!(assembler.is_complete());
        assert_eq!(assembler.assemble().unwrap(), data);
    }

    #[test]
    fn test_assembler_reports_missing_chunk() {
        let mut assembler = ChunkAssembler::new(3);
        assembler.insert(0, Bytes::from_static(b"a")).unwrap();
        assembler.insert(2, Bytes::from_static(b"c")).unwrap();

        assert_eq!(assembler.received(), 2);
        let err = assembler.assemble().unwrap_err();
        assert!(matches!(err, Error::ChunkMissing { index: 1, total: 3 }));
    }

    #[test]
    fn test_assembler_rejects_out_of_range() {
        let mut assembler = ChunkAssembler::new(2);
        let err = assembler.insert(2, Bytes::from_static(b"x")).unwrap_err();
        assert!(matches!(err, Error::ChunkOutOfRange { index: 2, total: 2 }));
    }

    #[test]
    fn test_assembler_duplicate_replaces() {
        let mut assembler = ChunkAssembler::new(1);
        assembler.insert(0, Bytes::from_static(b"first")).unwrap();
        assembler.insert(0, Bytes::from_static(b"2nd")).unwrap();

        assert_eq!(assembler.received_bytes(), 3);
        assert_eq!(&assembler.assemble().unwrap()[..], b"2nd");
    }

    #[test]
    fn test_large_payload_chunk_sizes() {
        let mib = 1024 * 1024;
        let data = Bytes::from(vec![7u8; 7 * mib + mib / 2]);
        let chunks = split_chunks(&data, DEFAULT_MAX_CHUNK_SIZE).unwrap();

        let sizes: Vec<usize> = chunks.iter().map(Bytes::len).collect();
        assert_eq!(sizes, vec![3 * mib, 3 * mib, mib + mib / 2]);
    }

    #[test]
    fn test_needs_chunking_boundary() {
        assert!(!needs_chunking(MAX - 1, MAX));
        assert!(needs_chunking(MAX, MAX));
        assert!(DEFAULT_MAX_CHUNK_SIZE < REQUEST_SIZE_CEILING);
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let err = split_chunks(&patterned(10), 0).unwrap_err();
        assert!(matches!(err, Error::InvalidChunkSize(0)));
    }
}
