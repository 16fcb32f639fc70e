//! Binary storage for the persisted vector index.
//!
//! File format: feed_index.bin
//!
//! Header (55 bytes):
//! - version: u8 (1)
//! - model_id: [u8; 32] (SHA256 hash of model name)
//! - dimensions: u16 (little-endian)
//! - entry_count: u64 (little-endian)
//! - created_at: i64 unix seconds (little-endian)
//! - checksum: u32 (CRC32 of header fields before checksum)
//!
//! Entries (repeated):
//! - id_len: u16 (little-endian)
//! - post_id: [u8; id_len] (utf-8)
//! - embedding: [f32; dimensions] (little-endian)

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};

use crate::eid::Eid;
use crate::index::flat::FlatL2Index;

/// Current file format version
const FORMAT_VERSION: u8 = 1;

/// Header size in bytes: version(1) + model_id(32) + dimensions(2) + entry_count(8) + created_at(8) + checksum(4)
const HEADER_SIZE: usize = 55;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexStorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Version mismatch: file version {0}, supported version {1}")]
    VersionMismatch(u8, u8),

    #[error("Model mismatch: file was built with a different embedding model")]
    ModelMismatch,

    #[error("Checksum mismatch: file may be corrupted")]
    ChecksumMismatch,
}

/// A loaded index together with the persisted build timestamp that
/// drives the staleness policy.
#[derive(Debug)]
pub struct PersistedIndex {
    pub index: FlatL2Index,
    pub created_at: DateTime<Utc>,
}

/// Storage manager for the vector index file.
pub struct IndexStorage {
    path: PathBuf,
}

impl IndexStorage {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the persisted index, rejecting files written by another
    /// model or a newer format version.
    pub fn load(&self, expected_model_id: &[u8; 32]) -> Result<PersistedIndex, IndexStorageError> {
        let file = File::open(&self.path)?;
        let mut reader = BufReader::new(file);

        let header = read_header(&mut reader)?;

        if header.model_id != *expected_model_id {
            return Err(IndexStorageError::ModelMismatch);
        }

        let dimensions = header.dimensions as usize;
        let mut index = FlatL2Index::with_capacity(dimensions, header.entry_count as usize);

        for _ in 0..header.entry_count {
            let (post_id, embedding) = read_entry(&mut reader, dimensions)?;
            index.push(post_id, &embedding).map_err(|e| {
                IndexStorageError::InvalidFormat(format!("inconsistent entry: {e}"))
            })?;
        }

        let created_at = Utc
            .timestamp_opt(header.created_at, 0)
            .single()
            .ok_or_else(|| {
                IndexStorageError::InvalidFormat(format!(
                    "created_at out of range: {}",
                    header.created_at
                ))
            })?;

        Ok(PersistedIndex { index, created_at })
    }

    /// Save the index atomically: temp file -> fsync -> rename.
    pub fn save(
        &self,
        index: &FlatL2Index,
        model_id: &[u8; 32],
        created_at: DateTime<Utc>,
    ) -> Result<(), IndexStorageError> {
        let temp_path = self.path.with_extension("tmp");

        let result = write_to_file(&temp_path, index, model_id, created_at);

        if result.is_err() {
            let _ = std::fs::remove_file(&temp_path);
            return result;
        }

        std::fs::rename(&temp_path, &self.path)?;

        Ok(())
    }

    pub fn delete(&self) -> Result<(), IndexStorageError> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

/// File header structure.
#[derive(Debug)]
struct Header {
    model_id: [u8; 32],
    dimensions: u16,
    entry_count: u64,
    created_at: i64,
}

fn read_header(reader: &mut BufReader<File>) -> Result<Header, IndexStorageError> {
    let mut header_bytes = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header_bytes)?;

    let version = header_bytes[0];

    // Version check first
    if version > FORMAT_VERSION {
        return Err(IndexStorageError::VersionMismatch(version, FORMAT_VERSION));
    }

    let mut model_id = [0u8; 32];
    model_id.copy_from_slice(&header_bytes[1..33]);

    let dimensions = u16::from_le_bytes(header_bytes[33..35].try_into().unwrap());
    let entry_count = u64::from_le_bytes(header_bytes[35..43].try_into().unwrap());
    let created_at = i64::from_le_bytes(header_bytes[43..51].try_into().unwrap());
    let stored_checksum = u32::from_le_bytes(header_bytes[51..55].try_into().unwrap());

    // Verify checksum (computed over header without checksum field)
    let computed_checksum = crc32fast::hash(&header_bytes[0..51]);
    if stored_checksum != computed_checksum {
        return Err(IndexStorageError::ChecksumMismatch);
    }

    Ok(Header {
        model_id,
        dimensions,
        entry_count,
        created_at,
    })
}

fn write_to_file(
    path: &Path,
    index: &FlatL2Index,
    model_id: &[u8; 32],
    created_at: DateTime<Utc>,
) -> Result<(), IndexStorageError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    let mut header_bytes = [0u8; HEADER_SIZE];
    header_bytes[0] = FORMAT_VERSION;
    header_bytes[1..33].copy_from_slice(model_id);
    header_bytes[33..35].copy_from_slice(&(index.dimensions() as u16).to_le_bytes());
    header_bytes[35..43].copy_from_slice(&(index.len() as u64).to_le_bytes());
    header_bytes[43..51].copy_from_slice(&created_at.timestamp().to_le_bytes());

    let checksum = crc32fast::hash(&header_bytes[0..51]);
    header_bytes[51..55].copy_from_slice(&checksum.to_le_bytes());

    writer.write_all(&header_bytes)?;

    for (post_id, embedding) in index.iter() {
        write_entry(&mut writer, post_id, embedding)?;
    }

    writer.flush()?;
    let file = writer
        .into_inner()
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    file.sync_all()?;

    Ok(())
}

fn read_entry(
    reader: &mut BufReader<File>,
    dimensions: usize,
) -> Result<(Eid, Vec<f32>), IndexStorageError> {
    let mut len_bytes = [0u8; 2];
    reader.read_exact(&mut len_bytes)?;
    let id_len = u16::from_le_bytes(len_bytes) as usize;

    let mut id_bytes = vec![0u8; id_len];
    reader.read_exact(&mut id_bytes)?;
    let post_id = String::from_utf8(id_bytes)
        .map_err(|_| IndexStorageError::InvalidFormat("post id is not valid utf-8".to_string()))?;

    let mut embedding = Vec::with_capacity(dimensions);
    for _ in 0..dimensions {
        let mut float_bytes = [0u8; 4];
        reader.read_exact(&mut float_bytes)?;
        embedding.push(f32::from_le_bytes(float_bytes));
    }

    Ok((Eid::from(post_id), embedding))
}

fn write_entry(
    writer: &mut BufWriter<File>,
    post_id: &Eid,
    embedding: &[f32],
) -> Result<(), IndexStorageError> {
    writer.write_all(&(post_id.len() as u16).to_le_bytes())?;
    writer.write_all(post_id.as_bytes())?;

    for &value in embedding {
        writer.write_all(&value.to_le_bytes())?;
    }

    Ok(())
}
