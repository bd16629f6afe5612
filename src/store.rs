//! Interchangeable chunk stores.
//!
//! The same chunk grid can be read from loose per-chunk files, from squashed
//! archives or from the original region files.  All three implement
//! [`ChunkSource`]; [`open_store`] picks the first one present in a world.
//!
//! Region-backed stores keep at most one region open and switch when a chunk
//! from another region is requested.  Decoded chunks are handed to the caller
//! and never cached.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use crate::anvil::{Chunk, ChunkError, RegionFile};
use crate::codec::{Codec, ZlibCodec};
use crate::coord::{ChunkPos, RegionPos};
use crate::squashed::SquashedReader;
use crate::world::{chunk_file_name, region_file_name, squashed_file_name, World};

pub trait ChunkSource {
    /// Short store name for diagnostics.
    fn kind(&self) -> &'static str;

    /// Decode `pos`, or `None` when the store holds no such chunk.
    fn load_chunk(&mut self, pos: ChunkPos) -> Result<Option<Chunk>, ChunkError>;
}

fn read_optional(path: &Path) -> io::Result<Option<Vec<u8>>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

// ── Loose chunk files ────────────────────────────────────────────────────────

/// `chunk/c.X.Z.nbt.z`: one zlib-compressed NBT file per chunk.
pub struct LooseChunkStore {
    dir: PathBuf,
}

impl LooseChunkStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }
}

impl ChunkSource for LooseChunkStore {
    fn kind(&self) -> &'static str { "chunk" }

    fn load_chunk(&mut self, pos: ChunkPos) -> Result<Option<Chunk>, ChunkError> {
        let compressed = match read_optional(&self.dir.join(chunk_file_name(pos)))? {
            Some(c) => c,
            None    => return Ok(None),
        };
        let nbt = ZlibCodec.decompress(&compressed)?;
        Ok(Some(Chunk::from_nbt(pos, &nbt)?))
    }
}

// ── Squashed archives ────────────────────────────────────────────────────────

/// `squashed_region/s.X.Z.smca`: zlib chunk payloads sliced by slot.
pub struct SquashedStore {
    dir:  PathBuf,
    /// Currently open region; `None` reader means the archive does not exist.
    open: Option<(RegionPos, Option<SquashedReader<BufReader<File>>>)>,
}

impl SquashedStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into(), open: None }
    }

    fn reader(&mut self, region: RegionPos) -> Result<Option<&mut SquashedReader<BufReader<File>>>, ChunkError> {
        if !matches!(self.open, Some((pos, _)) if pos == region) {
            let path = self.dir.join(squashed_file_name(region));
            let reader = match File::open(&path) {
                Ok(f) => Some(SquashedReader::new(BufReader::new(f))?),
                Err(e) if e.kind() == io::ErrorKind::NotFound => None,
                Err(e) => return Err(e.into()),
            };
            log::debug!("opened squashed archive {}", path.display());
            self.open = Some((region, reader));
        }
        Ok(self.open.as_mut().and_then(|(_, r)| r.as_mut()))
    }
}

impl ChunkSource for SquashedStore {
    fn kind(&self) -> &'static str { "squashed_region" }

    fn load_chunk(&mut self, pos: ChunkPos) -> Result<Option<Chunk>, ChunkError> {
        let reader = match self.reader(pos.region())? {
            Some(r) => r,
            None    => return Ok(None),
        };
        let compressed = match reader.read_chunk(pos)? {
            Some(c) => c,
            None    => return Ok(None),
        };
        let nbt = ZlibCodec.decompress(&compressed)?;
        Ok(Some(Chunk::from_nbt(pos, &nbt)?))
    }
}

// ── Region files ─────────────────────────────────────────────────────────────

/// `region/r.X.Z.mca`: the original store.
pub struct RegionStore {
    dir:  PathBuf,
    open: Option<(RegionPos, Option<RegionFile>)>,
}

impl RegionStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into(), open: None }
    }

    fn region(&mut self, region: RegionPos) -> Result<Option<&mut RegionFile>, ChunkError> {
        if !matches!(self.open, Some((pos, _)) if pos == region) {
            let path = self.dir.join(region_file_name(region));
            let file = match RegionFile::open(&path, region) {
                Ok(f) => Some(f),
                Err(ChunkError::Io(e)) if e.kind() == io::ErrorKind::NotFound => None,
                Err(e) => return Err(e),
            };
            self.open = Some((region, file));
        }
        Ok(self.open.as_mut().and_then(|(_, f)| f.as_mut()))
    }
}

impl ChunkSource for RegionStore {
    fn kind(&self) -> &'static str { "region" }

    fn load_chunk(&mut self, pos: ChunkPos) -> Result<Option<Chunk>, ChunkError> {
        match self.region(pos.region())? {
            Some(region) => region.load_chunk(pos),
            None         => Ok(None),
        }
    }
}

/// First existing store of `world`, checked in the order loose chunks,
/// squashed archives, region files.
pub fn open_store(world: &World) -> Option<Box<dyn ChunkSource>> {
    let chunk_dir = world.chunk_dir();
    if chunk_dir.is_dir() {
        return Some(Box::new(LooseChunkStore::new(chunk_dir)));
    }
    let squashed_dir = world.squashed_dir();
    if squashed_dir.is_dir() {
        return Some(Box::new(SquashedStore::new(squashed_dir)));
    }
    let region_dir = world.region_dir();
    if region_dir.is_dir() {
        return Some(Box::new(RegionStore::new(region_dir)));
    }
    None
}
