use byteorder::{BigEndian, ReadBytesExt};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::codec::{self, CompressionScheme};
use crate::coord::{ChunkPos, RegionPos, SLOTS_PER_REGION};
use super::{Chunk, ChunkError};

/// Region files are addressed in 4 KiB sectors.
pub const SECTOR_SIZE: u64 = 4096;
/// Location table plus timestamp table.
const HEADER_SIZE: u64 = 2 * SECTOR_SIZE;

/// A legacy region file (`r.X.Z.mca`).
///
/// Only the location table is kept in memory; chunk payloads are read on
/// demand.  A zero-length file is a valid region with no chunks.
pub struct RegionFile {
    path:      PathBuf,
    pos:       RegionPos,
    file:      Option<BufReader<File>>,
    len:       u64,
    locations: Vec<u32>,
}

impl RegionFile {
    pub fn open<P: AsRef<Path>>(path: P, pos: RegionPos) -> Result<Self, ChunkError> {
        let path = path.as_ref().to_owned();
        let file = File::open(&path)?;
        let len  = file.metadata()?.len();
        let mut locations = vec![0u32; SLOTS_PER_REGION];

        if len == 0 {
            return Ok(Self { path, pos, file: None, len, locations });
        }
        if len < HEADER_SIZE {
            return Err(ChunkError::TruncatedRegion { path, len });
        }
        let mut file = BufReader::new(file);
        file.read_u32_into::<BigEndian>(&mut locations)?;
        Ok(Self { path, pos, file: Some(file), len, locations })
    }

    pub fn pos(&self) -> RegionPos { self.pos }
    pub fn path(&self) -> &Path { &self.path }

    /// Whether the location table lists `chunk`.
    pub fn has_chunk(&self, chunk: ChunkPos) -> bool {
        chunk.region() == self.pos && self.locations[chunk.slot()] != 0
    }

    /// Chunks listed in the location table, in slot order.
    pub fn chunks(&self) -> impl Iterator<Item = ChunkPos> + '_ {
        self.pos.chunks().filter(move |c| self.locations[c.slot()] != 0)
    }

    /// The stored payload of `chunk` with its compression scheme.
    pub fn read_stored(&mut self, chunk: ChunkPos) -> Result<Option<(CompressionScheme, Vec<u8>)>, ChunkError> {
        if !self.has_chunk(chunk) {
            return Ok(None);
        }
        let location = self.locations[chunk.slot()];
        let sector   = (location >> 8) as u64;
        let sectors  = (location & 0xFF) as u64;
        let start    = sector * SECTOR_SIZE;
        if sector < 2 || sectors == 0 || start + 5 > self.len {
            return Err(ChunkError::BadSector { chunk, path: self.path.clone() });
        }

        let file = match self.file.as_mut() {
            Some(f) => f,
            None    => return Ok(None),
        };
        file.seek(SeekFrom::Start(start))?;
        let length = file.read_u32::<BigEndian>()? as u64;
        if length == 0 {
            return Ok(None);
        }
        let (scheme_byte, external) = codec::split_external_flag(file.read_u8()?);
        let scheme = CompressionScheme::from_byte(scheme_byte)?;

        let payload = if external {
            let name = format!("c.{}.{}.mcc", chunk.x, chunk.z);
            std::fs::read(self.path.with_file_name(name))?
        } else {
            if start + 4 + length > self.len {
                return Err(ChunkError::BadSector { chunk, path: self.path.clone() });
            }
            let mut buf = vec![0u8; (length - 1) as usize];
            file.read_exact(&mut buf)?;
            buf
        };
        Ok(Some((scheme, payload)))
    }

    /// Uncompressed NBT of `chunk`.
    pub fn read_nbt(&mut self, chunk: ChunkPos) -> Result<Option<Vec<u8>>, ChunkError> {
        match self.read_stored(chunk)? {
            Some((scheme, payload)) => Ok(Some(codec::get_codec(scheme).decompress(&payload)?)),
            None => Ok(None),
        }
    }

    /// Payload of `chunk` re-encoded as zlib, the form used by loose chunk
    /// files and squashed archives.
    pub fn export_compressed(&mut self, chunk: ChunkPos) -> Result<Option<Vec<u8>>, ChunkError> {
        match self.read_stored(chunk)? {
            Some((scheme, payload)) => Ok(Some(codec::to_zlib(scheme, payload)?)),
            None => Ok(None),
        }
    }

    pub fn load_chunk(&mut self, chunk: ChunkPos) -> Result<Option<Chunk>, ChunkError> {
        match self.read_nbt(chunk)? {
            Some(nbt) => Ok(Some(Chunk::from_nbt(chunk, &nbt)?)),
            None => Ok(None),
        }
    }
}
