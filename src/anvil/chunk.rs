//! Chunk NBT decoding.
//!
//! Two layouts are understood:
//! - 1.18+: top-level `sections`, each with paletted `block_states` (16³
//!   cells) and `biomes` (4³ cells).
//! - 1.13–1.17: everything under `Level`; sections carry `Palette` +
//!   `BlockStates`, biomes are a numeric `Biomes` int array (2D before 19w36a,
//!   3D in 4×4×4 cells after).
//!
//! Bit-packed arrays never span two longs from 20w17a on; before that they do.

use fastnbt::{IntArray, LongArray};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

use crate::coord::ChunkPos;
use super::biome::legacy_biome_name;
use super::ChunkError;

/// First data version with flattened block states (17w47a).
pub const MIN_DATA_VERSION: i32 = 1451;
/// First data version whose packed arrays are padded per long (20w17a).
const PADDED_PACKING_SINCE: i32 = 2529;

const BLOCKS_PER_SECTION: usize = 4096;
const BIOMES_PER_SECTION: usize = 64;
const LEGACY_2D_BIOMES:   usize = 256;

// ── Raw NBT shapes ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct VersionProbe {
    #[serde(rename = "DataVersion", default)]
    data_version: i32,
}

#[derive(Deserialize)]
struct RawChunk {
    #[serde(rename = "Status")]
    status: Option<String>,
    #[serde(default)]
    sections: Vec<RawSection>,
    #[serde(rename = "Level")]
    level: Option<RawLevel>,
}

#[derive(Deserialize)]
struct RawSection {
    #[serde(rename = "Y")]
    y: i8,
    block_states: Option<RawPaletted<RawBlockState>>,
    biomes: Option<RawPaletted<String>>,
}

#[derive(Deserialize)]
struct RawPaletted<T> {
    palette: Vec<T>,
    data: Option<LongArray>,
}

#[derive(Deserialize)]
struct RawBlockState {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Properties", default)]
    properties: BTreeMap<String, String>,
}

impl RawBlockState {
    /// `name` or `name[key=value,...]` with keys in sorted order.
    fn into_id(self) -> String {
        if self.properties.is_empty() {
            return self.name;
        }
        let props: Vec<String> = self.properties.into_iter().map(|(k, v)| format!("{k}={v}")).collect();
        format!("{}[{}]", self.name, props.join(","))
    }
}

#[derive(Deserialize)]
struct RawLevel {
    #[serde(rename = "Status")]
    status: Option<String>,
    #[serde(rename = "Sections", default)]
    sections: Vec<RawLegacySection>,
    #[serde(rename = "Biomes")]
    biomes: Option<IntArray>,
}

#[derive(Deserialize)]
struct RawLegacySection {
    #[serde(rename = "Y")]
    y: i8,
    #[serde(rename = "Palette")]
    palette: Option<Vec<RawBlockState>>,
    #[serde(rename = "BlockStates")]
    block_states: Option<LongArray>,
}

// ── Paletted storage ─────────────────────────────────────────────────────────

/// A palette plus one index per cell; an empty index list means every cell
/// holds `palette[0]`.
#[derive(Debug, Clone)]
struct Paletted {
    palette: Vec<String>,
    indices: Vec<u16>,
}

impl Paletted {
    fn decode(
        y:        i32,
        palette:  Vec<String>,
        data:     Option<&[i64]>,
        cells:    usize,
        min_bits: u32,
        padded:   bool,
    ) -> Result<Self, ChunkError> {
        let corrupt = |reason: String| ChunkError::CorruptSection { y, reason };
        if palette.is_empty() {
            return Err(corrupt("empty palette".into()));
        }
        if palette.len() == 1 {
            return Ok(Self { palette, indices: Vec::new() });
        }
        let data = data.ok_or_else(|| corrupt(format!("missing data for {}-entry palette", palette.len())))?;
        let bits = ceil_log2(palette.len()).max(min_bits);
        let indices = unpack(data, bits, cells, padded).ok_or_else(|| {
            corrupt(format!("{} longs too short for {cells} cells of {bits} bits", data.len()))
        })?;
        if let Some(bad) = indices.iter().find(|&&i| i as usize >= palette.len()) {
            return Err(corrupt(format!("index {bad} outside {}-entry palette", palette.len())));
        }
        Ok(Self { palette, indices })
    }

    fn at(&self, cell: usize) -> Option<&str> {
        if self.indices.is_empty() {
            return self.palette.first().map(String::as_str);
        }
        let i = *self.indices.get(cell)? as usize;
        self.palette.get(i).map(String::as_str)
    }
}

fn ceil_log2(n: usize) -> u32 {
    if n <= 1 { 0 } else { usize::BITS - (n - 1).leading_zeros() }
}

/// Unpack `cells` values of `bits` width.  Returns `None` when `data` is too
/// short.
fn unpack(data: &[i64], bits: u32, cells: usize, padded: bool) -> Option<Vec<u16>> {
    let bits = bits as usize;
    let mask = (1u64 << bits) - 1;
    let mut out = Vec::with_capacity(cells);

    if padded {
        let per_long = 64 / bits;
        if data.len() < cells.div_ceil(per_long) {
            return None;
        }
        for i in 0..cells {
            let word  = data[i / per_long] as u64;
            let shift = (i % per_long) * bits;
            out.push(((word >> shift) & mask) as u16);
        }
    } else {
        if data.len() < (cells * bits).div_ceil(64) {
            return None;
        }
        for i in 0..cells {
            let bit   = i * bits;
            let word  = bit / 64;
            let shift = bit % 64;
            let mut v = (data[word] as u64) >> shift;
            if shift + bits > 64 {
                v |= (data[word + 1] as u64) << (64 - shift);
            }
            out.push((v & mask) as u16);
        }
    }
    Some(out)
}

// ── Chunk ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Biomes {
    /// 1.18+: one 4×4×4 palette per section, keyed by section y.
    Sections(BTreeMap<i32, Paletted>),
    /// 19w36a–1.17: 4×4×4 cells, 16 per vertical layer.
    Legacy3d(Vec<i32>),
    /// 1.13–19w35a: one id per column.
    Legacy2d(Vec<i32>),
    Missing,
}

/// A decoded chunk.  Owned by whoever loaded it; nothing is cached.
#[derive(Debug, Clone)]
pub struct Chunk {
    pos:          ChunkPos,
    data_version: i32,
    status:       Option<String>,
    sections:     HashMap<i32, Paletted>,
    biomes:       Biomes,
}

impl Chunk {
    /// Decode uncompressed chunk NBT.
    pub fn from_nbt(pos: ChunkPos, nbt: &[u8]) -> Result<Self, ChunkError> {
        let probe: VersionProbe = fastnbt::from_bytes(nbt)?;
        if probe.data_version < MIN_DATA_VERSION {
            return Err(ChunkError::UnsupportedVersion(probe.data_version));
        }
        let data_version = probe.data_version;
        let raw: RawChunk = fastnbt::from_bytes(nbt)?;

        match raw.level {
            Some(level) => Self::from_legacy(pos, data_version, level),
            None        => Self::from_sections(pos, data_version, raw.status, raw.sections),
        }
    }

    fn from_sections(
        pos:          ChunkPos,
        data_version: i32,
        status:       Option<String>,
        raw_sections: Vec<RawSection>,
    ) -> Result<Self, ChunkError> {
        let mut sections = HashMap::new();
        let mut biomes   = BTreeMap::new();
        for section in raw_sections {
            let y = section.y as i32;
            if let Some(states) = section.block_states {
                let palette = states.palette.into_iter().map(RawBlockState::into_id).collect();
                let data = states.data.as_deref();
                sections.insert(y, Paletted::decode(y, palette, data, BLOCKS_PER_SECTION, 4, true)?);
            }
            if let Some(b) = section.biomes {
                let data = b.data.as_deref();
                biomes.insert(y, Paletted::decode(y, b.palette, data, BIOMES_PER_SECTION, 0, true)?);
            }
        }
        let biomes = if biomes.is_empty() { Biomes::Missing } else { Biomes::Sections(biomes) };
        Ok(Self { pos, data_version, status, sections, biomes })
    }

    fn from_legacy(pos: ChunkPos, data_version: i32, level: RawLevel) -> Result<Self, ChunkError> {
        let padded = data_version >= PADDED_PACKING_SINCE;
        let mut sections = HashMap::new();
        for section in level.sections {
            let y = section.y as i32;
            let (palette, states) = match (section.palette, section.block_states) {
                (Some(p), s) => (p, s),
                (None, _)    => continue,
            };
            let palette = palette.into_iter().map(RawBlockState::into_id).collect();
            sections.insert(y, Paletted::decode(y, palette, states.as_deref(), BLOCKS_PER_SECTION, 4, padded)?);
        }

        let biomes = match level.biomes {
            None => Biomes::Missing,
            Some(ids) => {
                let ids: Vec<i32> = ids.to_vec();
                match ids.len() {
                    0 => Biomes::Missing,
                    LEGACY_2D_BIOMES if data_version < 2203 => Biomes::Legacy2d(ids),
                    n if n % 16 == 0 => Biomes::Legacy3d(ids),
                    n => return Err(ChunkError::CorruptBiomes(format!("{n} biome entries"))),
                }
            }
        };
        Ok(Self { pos, data_version, status: level.status, sections, biomes })
    }

    pub fn pos(&self) -> ChunkPos { self.pos }
    pub fn data_version(&self) -> i32 { self.data_version }
    pub fn status(&self) -> Option<&str> { self.status.as_deref() }

    /// A chunk is complete once world generation has finished with it.
    pub fn is_complete(&self) -> bool {
        let status = match self.status.as_deref() {
            Some(s) => s.strip_prefix("minecraft:").unwrap_or(s),
            None    => return false,
        };
        matches!(status, "full" | "postprocessed" | "fullchunk")
    }

    /// Namespaced block state at world coordinates, or `None` where nothing
    /// is stored (absent sections read as air).
    pub fn block_at(&self, x: i32, y: i32, z: i32) -> Option<&str> {
        let section = self.sections.get(&(y >> 4))?;
        let cell = ((y & 15) * 256 + (z & 15) * 16 + (x & 15)) as usize;
        section.at(cell)
    }

    /// Namespaced biome at world coordinates, resolved against this chunk's
    /// data version.
    pub fn biome_at(&self, x: i32, y: i32, z: i32) -> Option<&str> {
        let (qx, qz) = (((x & 15) >> 2) as usize, ((z & 15) >> 2) as usize);
        match &self.biomes {
            Biomes::Sections(map) => {
                let qy = ((y & 15) >> 2) as usize;
                map.get(&(y >> 4))?.at(qy * 16 + qz * 4 + qx)
            }
            Biomes::Legacy3d(ids) => {
                let layers = (ids.len() / 16) as i32;
                let qy = (y >> 2).clamp(0, layers - 1) as usize;
                legacy_biome_name(ids[qy * 16 + qz * 4 + qx], self.data_version)
            }
            Biomes::Legacy2d(ids) => {
                let cell = ((z & 15) * 16 + (x & 15)) as usize;
                legacy_biome_name(ids[cell], self.data_version)
            }
            Biomes::Missing => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Block {
        #[serde(rename = "Name")]
        name: String,
        #[serde(rename = "Properties", skip_serializing_if = "BTreeMap::is_empty")]
        properties: BTreeMap<String, String>,
    }

    #[derive(Serialize)]
    struct States<T> {
        palette: Vec<T>,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<LongArray>,
    }

    #[derive(Serialize)]
    struct Section {
        #[serde(rename = "Y")]
        y: i8,
        block_states: States<Block>,
        biomes: States<String>,
    }

    #[derive(Serialize)]
    struct Modern {
        #[serde(rename = "DataVersion")]
        data_version: i32,
        #[serde(rename = "Status")]
        status: String,
        sections: Vec<Section>,
    }

    #[derive(Serialize)]
    struct LegacySection {
        #[serde(rename = "Y")]
        y: i8,
        #[serde(rename = "Palette")]
        palette: Vec<Block>,
        #[serde(rename = "BlockStates")]
        block_states: LongArray,
    }

    #[derive(Serialize)]
    struct Level {
        #[serde(rename = "Status")]
        status: String,
        #[serde(rename = "Sections")]
        sections: Vec<LegacySection>,
        #[serde(rename = "Biomes")]
        biomes: IntArray,
    }

    #[derive(Serialize)]
    struct Legacy {
        #[serde(rename = "DataVersion")]
        data_version: i32,
        #[serde(rename = "Level")]
        level: Level,
    }

    fn block(name: &str) -> Block {
        Block { name: name.into(), properties: BTreeMap::new() }
    }

    fn pack_padded(indices: &[u16], bits: usize) -> Vec<i64> {
        let per_long = 64 / bits;
        let mut out = vec![0u64; indices.len().div_ceil(per_long)];
        for (i, &v) in indices.iter().enumerate() {
            out[i / per_long] |= (v as u64) << ((i % per_long) * bits);
        }
        out.into_iter().map(|v| v as i64).collect()
    }

    fn pack_spanning(indices: &[u16], bits: usize) -> Vec<i64> {
        let mut out = vec![0u64; (indices.len() * bits).div_ceil(64)];
        for (i, &v) in indices.iter().enumerate() {
            let bit = i * bits;
            out[bit / 64] |= (v as u64) << (bit % 64);
            if bit % 64 + bits > 64 {
                out[bit / 64 + 1] |= (v as u64) >> (64 - bit % 64);
            }
        }
        out.into_iter().map(|v| v as i64).collect()
    }

    #[test]
    fn modern_chunk_blocks_and_biomes() {
        // Section 0: stone everywhere except (x=1, y=2, z=3) which is a stair.
        let mut cells = vec![0u16; BLOCKS_PER_SECTION];
        cells[2 * 256 + 3 * 16 + 1] = 1;
        let mut stair = block("minecraft:oak_stairs");
        stair.properties.insert("half".into(), "top".into());
        stair.properties.insert("facing".into(), "east".into());

        let mut biome_cells = vec![0u16; BIOMES_PER_SECTION];
        biome_cells[3 * 16 + 2 * 4 + 1] = 1; // qx=1, qy=3, qz=2

        let nbt = fastnbt::to_bytes(&Modern {
            data_version: 3465,
            status: "minecraft:full".into(),
            sections: vec![Section {
                y: 0,
                block_states: States {
                    palette: vec![block("minecraft:stone"), stair],
                    data: Some(LongArray::new(pack_padded(&cells, 4))),
                },
                biomes: States {
                    palette: vec!["minecraft:plains".into(), "minecraft:river".into()],
                    data: Some(LongArray::new(pack_padded(&biome_cells, 1))),
                },
            }],
        })
        .unwrap();

        let chunk = Chunk::from_nbt(ChunkPos::new(2, -1), &nbt).unwrap();
        assert!(chunk.is_complete());
        assert_eq!(chunk.data_version(), 3465);
        assert_eq!(chunk.block_at(32, 0, -16), Some("minecraft:stone"));
        assert_eq!(chunk.block_at(33, 2, -13), Some("minecraft:oak_stairs[facing=east,half=top]"));
        assert_eq!(chunk.block_at(33, 16, -13), None);
        assert_eq!(chunk.biome_at(32, 0, -16), Some("minecraft:plains"));
        assert_eq!(chunk.biome_at(32 + 5, 13, -16 + 9), Some("minecraft:river"));
        assert_eq!(chunk.biome_at(32, 16, -16), None);
    }

    fn legacy_chunk(data_version: i32, status: &str, biomes: Vec<i32>, spanning: bool) -> Vec<u8> {
        // 17 entries → 5 bits, where spanning and padded layouts differ.
        let palette: Vec<Block> = (0..17).map(|i| block(&format!("minecraft:b{i}"))).collect();
        let cells: Vec<u16> = (0..BLOCKS_PER_SECTION).map(|i| (i % 17) as u16).collect();
        let data = if spanning { pack_spanning(&cells, 5) } else { pack_padded(&cells, 5) };
        fastnbt::to_bytes(&Legacy {
            data_version,
            level: Level {
                status: status.into(),
                sections: vec![LegacySection { y: 1, palette, block_states: LongArray::new(data) }],
                biomes: IntArray::new(biomes),
            },
        })
        .unwrap()
    }

    #[test]
    fn legacy_spanning_and_padded_packing() {
        for (version, spanning) in [(2230, true), (2586, false)] {
            let nbt = legacy_chunk(version, "full", vec![1; 1024], spanning);
            let chunk = Chunk::from_nbt(ChunkPos::new(0, 0), &nbt).unwrap();
            for cell in [0usize, 12, 13, 100, 4095] {
                let (x, z, y) = ((cell & 15) as i32, ((cell >> 4) & 15) as i32, 16 + (cell >> 8) as i32);
                let expected = format!("minecraft:b{}", cell % 17);
                assert_eq!(chunk.block_at(x, y, z), Some(expected.as_str()), "version {version} cell {cell}");
            }
        }
    }

    #[test]
    fn legacy_biomes_resolve_by_version() {
        let mut ids = vec![1; LEGACY_2D_BIOMES];
        ids[3 * 16 + 2] = 8;
        let chunk = Chunk::from_nbt(ChunkPos::new(0, 0), &legacy_chunk(1976, "postprocessed", ids, true)).unwrap();
        assert!(chunk.is_complete());
        assert_eq!(chunk.biome_at(2, 70, 3), Some("minecraft:nether"));
        assert_eq!(chunk.biome_at(0, 70, 0), Some("minecraft:plains"));

        let mut ids = vec![1; 1024];
        ids[5 * 16] = 8; // qy = 5 → y in 20..24
        let chunk = Chunk::from_nbt(ChunkPos::new(0, 0), &legacy_chunk(2586, "carved", ids, false)).unwrap();
        assert!(!chunk.is_complete());
        assert_eq!(chunk.biome_at(0, 21, 0), Some("minecraft:nether_wastes"));
        assert_eq!(chunk.biome_at(0, 300, 0), Some("minecraft:plains"));
    }

    #[test]
    fn rejects_pre_flattening_chunks() {
        #[derive(Serialize)]
        struct Old {
            #[serde(rename = "DataVersion")]
            data_version: i32,
        }
        let nbt = fastnbt::to_bytes(&Old { data_version: 1343 }).unwrap();
        assert!(matches!(Chunk::from_nbt(ChunkPos::new(0, 0), &nbt), Err(ChunkError::UnsupportedVersion(1343))));
    }

    #[test]
    fn short_data_is_corrupt() {
        let nbt = fastnbt::to_bytes(&Modern {
            data_version: 3465,
            status: "full".into(),
            sections: vec![Section {
                y: 0,
                block_states: States {
                    palette: vec![block("minecraft:stone"), block("minecraft:dirt")],
                    data: Some(LongArray::new(vec![0; 10])),
                },
                biomes: States { palette: vec!["minecraft:plains".into()], data: None },
            }],
        })
        .unwrap();
        assert!(matches!(
            Chunk::from_nbt(ChunkPos::new(0, 0), &nbt),
            Err(ChunkError::CorruptSection { y: 0, .. })
        ));
    }

    #[test]
    fn ceil_log2_widths() {
        assert_eq!(ceil_log2(1), 0);
        assert_eq!(ceil_log2(2), 1);
        assert_eq!(ceil_log2(5), 3);
        assert_eq!(ceil_log2(16), 4);
        assert_eq!(ceil_log2(17), 5);
    }
}
