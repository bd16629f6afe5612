//! Bounding-box extraction.
//!
//! [`extract`] walks every chunk a [`BlockBox`] touches, region by region,
//! and fills three dense streams (block id, biome id, chunk data version)
//! laid out x-fastest, then z, then y.  Each stream is then palette-encoded
//! into an [`ExtractResponse`].
//!
//! A chunk that is missing, or present but not fully generated, fails the
//! whole query.  There is no partial output.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

use crate::anvil::ChunkError;
use crate::coord::{BlockBox, BoxError, ChunkPos, RegionPos};
use crate::palette::{normalize_id, PaletteError, PaletteTable, VoxelStream};
use crate::store::{open_store, ChunkSource};
use crate::world::World;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("{0}")]
    Bounds(#[from] BoxError),
    #[error("invalid world")]
    NoStore(PathBuf),
    #[error("chunk {0} not saved yet")]
    ChunkNotSaved(ChunkPos),
    #[error("chunk {0} not fully generated yet")]
    ChunkIncomplete(ChunkPos),
    #[error("no biome at [{x}, {y}, {z}] in chunk {chunk}")]
    MissingBiome { chunk: ChunkPos, x: i32, y: i32, z: i32 },
    #[error("chunk {chunk}: {source}")]
    Chunk { chunk: ChunkPos, source: ChunkError },
    #[error("{0}")]
    Stream(#[from] PaletteError),
}

/// The three attribute streams of one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub bounds:   BlockBox,
    pub blocks:   Vec<String>,
    pub biomes:   Vec<String>,
    pub versions: Vec<i32>,
}

/// Fill the streams for `bounds` from `source`.
pub fn extract(source: &mut dyn ChunkSource, bounds: &BlockBox) -> Result<Extraction, ExtractError> {
    let volume = bounds.volume();
    let mut blocks   = VoxelStream::new(volume);
    let mut biomes   = VoxelStream::new(volume);
    let mut versions = VoxelStream::new(volume);

    for rz in bounds.regions_z() {
        for rx in bounds.regions_x() {
            for pos in bounds.chunks_in(RegionPos::new(rx, rz)) {
                let chunk = source
                    .load_chunk(pos)
                    .map_err(|source| ExtractError::Chunk { chunk: pos, source })?
                    .ok_or(ExtractError::ChunkNotSaved(pos))?;
                if !chunk.is_complete() {
                    return Err(ExtractError::ChunkIncomplete(pos));
                }
                let clip = match bounds.clip_to(pos) {
                    Some(c) => c,
                    None    => continue,
                };
                let version = chunk.data_version();
                for y in clip.min_y..=clip.max_y {
                    for z in clip.min_z..=clip.max_z {
                        for x in clip.min_x..=clip.max_x {
                            let idx = bounds.index_of(x, y, z);
                            let biome = chunk
                                .biome_at(x, y, z)
                                .ok_or(ExtractError::MissingBiome { chunk: pos, x, y, z })?;
                            blocks.set(idx, normalize_id(chunk.block_at(x, y, z)))?;
                            biomes.set(idx, normalize_id(Some(biome)))?;
                            versions.set(idx, version)?;
                        }
                    }
                }
            }
        }
    }
    log::debug!("extracted {} voxel(s) from {} store", volume, source.kind());

    Ok(Extraction {
        bounds:   *bounds,
        blocks:   blocks.finish()?,
        biomes:   biomes.finish()?,
        versions: versions.finish()?,
    })
}

/// Resolve the store of `world` and extract `bounds` from it.
pub fn extract_world(world: &World, bounds: &BlockBox) -> Result<Extraction, ExtractError> {
    let mut source = open_store(world).ok_or_else(|| ExtractError::NoStore(world.root().to_owned()))?;
    log::info!("reading {} store under {}", source.kind(), world.root().display());
    extract(source.as_mut(), bounds)
}

// ── Response ─────────────────────────────────────────────────────────────────

/// JSON body printed by the `extract` command.  Errors carry only `status`.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block: Option<PaletteTable<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub biome: Option<PaletteTable<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<PaletteTable<i32>>,
}

impl ExtractResponse {
    pub fn error(message: impl Into<String>) -> Self {
        Self { status: message.into(), block: None, biome: None, version: None }
    }

    pub fn to_json(&self, pretty: bool) -> serde_json::Result<String> {
        if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        }
    }
}

impl From<&Extraction> for ExtractResponse {
    fn from(e: &Extraction) -> Self {
        Self {
            status:  "ok".into(),
            block:   Some(PaletteTable::encode(&e.blocks)),
            biome:   Some(PaletteTable::encode(&e.biomes)),
            version: Some(PaletteTable::encode(&e.versions)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anvil::Chunk;
    use std::collections::HashMap;

    /// In-memory store serving synthetic 1.18 chunks.
    struct FakeStore {
        chunks: HashMap<ChunkPos, Vec<u8>>,
        loads:  usize,
    }

    impl ChunkSource for FakeStore {
        fn kind(&self) -> &'static str { "fake" }

        fn load_chunk(&mut self, pos: ChunkPos) -> Result<Option<Chunk>, ChunkError> {
            self.loads += 1;
            match self.chunks.get(&pos) {
                Some(nbt) => Ok(Some(Chunk::from_nbt(pos, nbt)?)),
                None      => Ok(None),
            }
        }
    }

    #[derive(Serialize)]
    struct Palette<T> {
        palette: Vec<T>,
    }

    #[derive(Serialize)]
    struct Block {
        #[serde(rename = "Name")]
        name: &'static str,
    }

    #[derive(Serialize)]
    struct Section {
        #[serde(rename = "Y")]
        y: i8,
        block_states: Palette<Block>,
        biomes: Palette<&'static str>,
    }

    #[derive(Serialize)]
    struct Raw {
        #[serde(rename = "DataVersion")]
        data_version: i32,
        #[serde(rename = "Status")]
        status: String,
        sections: Vec<Section>,
    }

    /// Stone in section 0, air in section 1, plains throughout.
    fn nbt(status: &str) -> Vec<u8> {
        let section = |y, name| Section {
            y,
            block_states: Palette { palette: vec![Block { name }] },
            biomes: Palette { palette: vec!["minecraft:plains"] },
        };
        fastnbt::to_bytes(&Raw {
            data_version: 3465,
            status: status.into(),
            sections: vec![section(0, "minecraft:stone"), section(1, "minecraft:air")],
        })
        .unwrap()
    }

    fn store(positions: &[(i32, i32)], status: &str) -> FakeStore {
        let chunks = positions.iter().map(|&(x, z)| (ChunkPos::new(x, z), nbt(status))).collect();
        FakeStore { chunks, loads: 0 }
    }

    #[test]
    fn streams_cover_the_box() {
        let mut source = store(&[(0, 0), (1, 0)], "minecraft:full");
        // Spans both chunks and both sections.
        let bounds = BlockBox::new((14, 17), (15, 16), (3, 3)).unwrap();
        let out = extract(&mut source, &bounds).unwrap();
        assert_eq!(out.blocks.len(), 8);
        assert_eq!(&out.blocks[..4], &["stone"; 4]);
        assert_eq!(&out.blocks[4..], &["air"; 4]);
        assert_eq!(out.biomes[0], "plains");
        assert_eq!(out.versions, vec![3465; 8]);
        assert_eq!(source.loads, 2);

        let json = ExtractResponse::from(&out).to_json(false).unwrap();
        assert!(json.starts_with(r#"{"status":"ok","block":{"palette":["stone","air"],"indices":[0,0,0,0,1,1,1,1]}"#));
        assert!(json.contains(r#""version":{"palette":[3465],"indices":[0,0,0,0,0,0,0,0]}"#));
    }

    #[test]
    fn missing_chunk_names_its_coordinates() {
        let mut source = store(&[(0, 0)], "full");
        let bounds = BlockBox::new((0, 16), (0, 0), (0, 0)).unwrap();
        let err = extract(&mut source, &bounds).unwrap_err();
        assert_eq!(err.to_string(), "chunk [1, 0] not saved yet");
    }

    #[test]
    fn incomplete_chunk_fails() {
        let mut source = store(&[(0, 0)], "minecraft:features");
        let bounds = BlockBox::new((0, 0), (0, 0), (0, 0)).unwrap();
        let err = extract(&mut source, &bounds).unwrap_err();
        assert_eq!(err.to_string(), "chunk [0, 0] not fully generated yet");
    }

    #[test]
    fn error_response_has_status_only() {
        let json = ExtractResponse::error("invalid block range").to_json(false).unwrap();
        assert_eq!(json, r#"{"status":"invalid block range"}"#);
    }
}
