//! Region files and chunk NBT decoding.
//!
//! This is the chunk reader the rest of the crate consumes: it turns a stored
//! chunk payload into a [`Chunk`] that answers per-voxel block, biome and
//! format-version queries plus a completeness status.

mod biome;
mod chunk;
mod region;

pub use biome::legacy_biome_name;
pub use chunk::{Chunk, MIN_DATA_VERSION};
pub use region::{RegionFile, SECTOR_SIZE};

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::codec::CodecError;
use crate::coord::ChunkPos;
use crate::squashed::ArchiveError;

#[derive(Error, Debug)]
pub enum ChunkError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("{0}")]
    Codec(#[from] CodecError),
    #[error("NBT error: {0}")]
    Nbt(#[from] fastnbt::error::Error),
    #[error("{0}")]
    Archive(#[from] ArchiveError),
    #[error("Region file {} is truncated ({} bytes)", .path.display(), .len)]
    TruncatedRegion { path: PathBuf, len: u64 },
    #[error("Chunk {} points outside region file {}", .chunk, .path.display())]
    BadSector { chunk: ChunkPos, path: PathBuf },
    #[error("Unsupported chunk data version {0} (pre-1.13 chunks are not readable)")]
    UnsupportedVersion(i32),
    #[error("Corrupt chunk section {y}: {reason}")]
    CorruptSection { y: i32, reason: String },
    #[error("Corrupt biome data: {0}")]
    CorruptBiomes(String),
}
