//! Chunked "flow" upload protocol and streamed download support.
//!
//! Uploads slice the local file into fixed-size chunks sent strictly in
//! order, one request in flight at a time. The transfer identifier is
//! recomputed from size + file name, so an aborted upload can simply be
//! restarted from scratch and the server will key it identically.

use std::path::Path;

use tokio::io::AsyncReadExt;

use crate::error::Result;

/// Fixed chunk size of the flow protocol.
pub const CHUNK_SIZE: usize = 1_048_576;

/// One upload chunk: its 1-based sequence number and payload. Ephemeral,
/// never persisted beyond the request that carries it.
#[derive(Debug)]
pub struct Chunk {
    pub number: u32,
    pub data: Vec<u8>,
}

/// Sequential chunk reader over a local file. Every chunk except the last is
/// exactly [`CHUNK_SIZE`] bytes; an empty file yields no chunks at all.
pub struct ChunkReader {
    file: tokio::fs::File,
    next_number: u32,
}

impl ChunkReader {
    pub async fn open(path: &Path) -> Result<Self> {
        let file = tokio::fs::File::open(path).await?;
        Ok(Self { file, next_number: 1 })
    }

    pub async fn next_chunk(&mut self) -> Result<Option<Chunk>> {
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut filled = 0;
        while filled < CHUNK_SIZE {
            let n = self.file.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled == 0 {
            return Ok(None);
        }
        buf.truncate(filled);
        let number = self.next_number;
        self.next_number += 1;
        Ok(Some(Chunk { number, data: buf }))
    }
}

/// Base form parameters identifying one flow transfer.
#[derive(Debug, Clone)]
pub struct FlowParams {
    file_name: String,
    total_size: u64,
}

impl FlowParams {
    pub fn new(file_name: impl Into<String>, total_size: u64) -> Self {
        Self {
            file_name: file_name.into(),
            total_size,
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn total_chunks(&self) -> u64 {
        self.total_size.div_ceil(CHUNK_SIZE as u64)
    }

    /// Synthetic transfer identifier, `"{size}_{filename}"`.
    pub fn identifier(&self) -> String {
        format!("{}_{}", self.total_size, self.file_name)
    }

    /// Full form field set for one chunk. The relative path is the bare file
    /// name: uploads always land flat in a single target directory.
    pub fn form_fields(&self, chunk: &Chunk) -> Vec<(&'static str, String)> {
        vec![
            ("templateId", "-1".to_string()),
            ("flowChunkSize", CHUNK_SIZE.to_string()),
            ("flowTotalSize", self.total_size.to_string()),
            ("flowIdentifier", self.identifier()),
            ("flowFilename", self.file_name.clone()),
            ("flowRelativePath", self.file_name.clone()),
            ("flowTotalChunks", self.total_chunks().to_string()),
            ("flowCurrentChunkSize", chunk.data.len().to_string()),
            ("flowChunkNumber", chunk.number.to_string()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn chunks_of(content: &[u8]) -> Vec<Chunk> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifact.bin");
        tokio::fs::write(&path, content).await.unwrap();
        let mut reader = ChunkReader::open(&path).await.unwrap();
        let mut out = Vec::new();
        while let Some(chunk) = reader.next_chunk().await.unwrap() {
            out.push(chunk);
        }
        out
    }

    #[tokio::test]
    async fn chunk_numbers_increase_and_sizes_sum() {
        let size = 2 * CHUNK_SIZE + 123;
        let chunks = chunks_of(&vec![7u8; size]).await;
        assert_eq!(chunks.len(), 3);
        let numbers: Vec<u32> = chunks.iter().map(|c| c.number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        let total: usize = chunks.iter().map(|c| c.data.len()).sum();
        assert_eq!(total, size);
        assert_eq!(chunks[0].data.len(), CHUNK_SIZE);
        assert_eq!(chunks[2].data.len(), 123);
    }

    #[tokio::test]
    async fn empty_file_yields_no_chunks() {
        let chunks = chunks_of(&[]).await;
        assert!(chunks.is_empty());
        assert_eq!(FlowParams::new("empty.bin", 0).total_chunks(), 0);
    }

    #[tokio::test]
    async fn exact_multiple_has_no_trailer() {
        let chunks = chunks_of(&vec![0u8; CHUNK_SIZE]).await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].data.len(), CHUNK_SIZE);
    }

    #[test]
    fn flow_fields_match_protocol() {
        let params = FlowParams::new("model.zip", 3 * CHUNK_SIZE as u64 + 1);
        assert_eq!(params.total_chunks(), 4);
        assert_eq!(params.identifier(), format!("{}_model.zip", 3 * CHUNK_SIZE + 1));

        let chunk = Chunk { number: 4, data: vec![1] };
        let fields = params.form_fields(&chunk);
        let get = |k: &str| {
            fields
                .iter()
                .find(|(name, _)| *name == k)
                .map(|(_, v)| v.clone())
                .unwrap()
        };
        assert_eq!(get("flowChunkNumber"), "4");
        assert_eq!(get("flowCurrentChunkSize"), "1");
        assert_eq!(get("flowRelativePath"), "model.zip");
        assert_eq!(get("flowTotalChunks"), "4");
        assert_eq!(get("templateId"), "-1");
    }
}
