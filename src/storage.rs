//! Chunk and vector sources for index builds
//!
//! The retrieval core owns no on-disk format of its own. Index builds read
//! whatever a [`ChunkSource`] returns; two sources ship here: an in-memory
//! store and a JSON-lines directory (`chunks.jsonl`, `vectors.jsonl`).

use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::types::{Chunk, VectorRecord};

pub const CHUNKS_FILE: &str = "chunks.jsonl";
pub const VECTORS_FILE: &str = "vectors.jsonl";

/// Read side of the chunk and embedding store
pub trait ChunkSource: Send + Sync {
    fn list_chunks(&self) -> Result<Vec<Chunk>>;

    fn list_vectors(&self) -> Result<Vec<VectorRecord>>;
}

/// In-memory store; contents are replaced wholesale
#[derive(Default)]
pub struct MemoryStore {
    chunks: RwLock<Vec<Chunk>>,
    vectors: RwLock<Vec<VectorRecord>>,
}

impl MemoryStore {
    pub fn new(chunks: Vec<Chunk>, vectors: Vec<VectorRecord>) -> Self {
        Self {
            chunks: RwLock::new(chunks),
            vectors: RwLock::new(vectors),
        }
    }

    pub fn replace(&self, chunks: Vec<Chunk>, vectors: Vec<VectorRecord>) {
        *self.chunks.write() = chunks;
        *self.vectors.write() = vectors;
    }
}

impl ChunkSource for MemoryStore {
    fn list_chunks(&self) -> Result<Vec<Chunk>> {
        Ok(self.chunks.read().clone())
    }

    fn list_vectors(&self) -> Result<Vec<VectorRecord>> {
        Ok(self.vectors.read().clone())
    }
}

/// Directory of JSON-lines files, one record per line.
///
/// `chunks.jsonl` is required. A missing `vectors.jsonl` means no vectors,
/// which leaves the corpus searchable lexically only.
#[derive(Debug, Clone)]
pub struct JsonlStore {
    dir: PathBuf,
}

impl JsonlStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        anyhow::ensure!(
            dir.is_dir(),
            "Data directory '{}' does not exist",
            dir.display()
        );
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    /// Write a corpus to `dir`, creating it if needed
    pub fn create(
        dir: impl AsRef<Path>,
        chunks: &[Chunk],
        vectors: &[VectorRecord],
    ) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create data directory '{}'", dir.display()))?;
        write_jsonl(&dir.join(CHUNKS_FILE), chunks)?;
        write_jsonl(&dir.join(VECTORS_FILE), vectors)?;
        info!(
            "Wrote {} chunks and {} vectors to {}",
            chunks.len(),
            vectors.len(),
            dir.display()
        );
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ChunkSource for JsonlStore {
    fn list_chunks(&self) -> Result<Vec<Chunk>> {
        read_jsonl(&self.dir.join(CHUNKS_FILE))
    }

    fn list_vectors(&self) -> Result<Vec<VectorRecord>> {
        let path = self.dir.join(VECTORS_FILE);
        if !path.exists() {
            debug!("No {} in {}, corpus has no vectors", VECTORS_FILE, self.dir.display());
            return Ok(Vec::new());
        }
        read_jsonl(&path)
    }
}

fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open '{}'", path.display()))?;
    let mut records = Vec::new();
    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read '{}'", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line)
            .with_context(|| format!("Invalid record at {}:{}", path.display(), lineno + 1))?;
        records.push(record);
    }
    debug!("Read {} records from {}", records.len(), path.display());
    Ok(records)
}

fn write_jsonl<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create '{}'", path.display()))?;
    let mut writer = BufWriter::new(file);
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> (Vec<Chunk>, Vec<VectorRecord>) {
        (
            vec![
                Chunk::new("A", "d1", "refund policy").with_section("Returns"),
                Chunk::new("B", "d1", "shipping").with_ord(1),
            ],
            vec![VectorRecord::new("A", vec![1.0, 0.0])],
        )
    }

    #[test]
    fn test_memory_store() {
        let (chunks, vectors) = sample();
        let store = MemoryStore::new(chunks.clone(), vectors);
        assert_eq!(store.list_chunks().unwrap(), chunks);
        assert_eq!(store.list_vectors().unwrap().len(), 1);

        store.replace(Vec::new(), Vec::new());
        assert!(store.list_chunks().unwrap().is_empty());
    }

    #[test]
    fn test_jsonl_store_create_and_read() {
        let tmp = TempDir::new().unwrap();
        let (chunks, vectors) = sample();
        JsonlStore::create(tmp.path(), &chunks, &vectors).unwrap();

        let store = JsonlStore::open(tmp.path()).unwrap();
        assert_eq!(store.list_chunks().unwrap(), chunks);
        assert_eq!(store.list_vectors().unwrap(), vectors);
    }

    #[test]
    fn test_jsonl_missing_vectors_file() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join(CHUNKS_FILE),
            "{\"id\":\"A\",\"text\":\"t\",\"doc_id\":\"d\"}\n\n",
        )
        .unwrap();

        let store = JsonlStore::open(tmp.path()).unwrap();
        assert_eq!(store.list_chunks().unwrap().len(), 1);
        assert!(store.list_vectors().unwrap().is_empty());
    }

    #[test]
    fn test_jsonl_reports_bad_line() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join(CHUNKS_FILE),
            "{\"id\":\"A\",\"text\":\"t\",\"doc_id\":\"d\"}\nnot json\n",
        )
        .unwrap();

        let err = JsonlStore::open(tmp.path()).unwrap().list_chunks().unwrap_err();
        assert!(err.to_string().contains(":2"), "unexpected error: {}", err);
    }

    #[test]
    fn test_jsonl_open_missing_dir() {
        assert!(JsonlStore::open("/nonexistent/hybrid-rag-data").is_err());
    }
}
