//! Synthetic worlds for integration tests.

#![allow(dead_code)]

use fastnbt::LongArray;
use flate2::{write::ZlibEncoder, Compression};
use mcsquash::coord::ChunkPos;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::{Duration, SystemTime};

pub const DATA_VERSION: i32 = 3465;

#[derive(Serialize)]
struct Block {
    #[serde(rename = "Name")]
    name: String,
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
struct RawChunk {
    #[serde(rename = "DataVersion")]
    data_version: i32,
    #[serde(rename = "xPos")]
    x_pos: i32,
    #[serde(rename = "zPos")]
    z_pos: i32,
    #[serde(rename = "Status")]
    status: String,
    sections: Vec<Section>,
}

/// A 1.18-style chunk: `block` fills section 0, air fills section 1,
/// plains everywhere.
pub fn chunk_nbt(pos: ChunkPos, status: &str, block: &str) -> Vec<u8> {
    let section = |y: i8, name: &str| Section {
        y,
        block_states: States { palette: vec![Block { name: name.into() }], data: None },
        biomes: States { palette: vec!["minecraft:plains".into()], data: None },
    };
    fastnbt::to_bytes(&RawChunk {
        data_version: DATA_VERSION,
        x_pos: pos.x,
        z_pos: pos.z,
        status: status.into(),
        sections: vec![section(0, block), section(1, "minecraft:air")],
    })
    .unwrap()
}

pub fn zlib(bytes: &[u8]) -> Vec<u8> {
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(bytes).unwrap();
    enc.finish().unwrap()
}

/// Write an anvil region file holding `chunks` (uncompressed NBT), zlib-compressed.
pub fn write_region(path: &Path, chunks: &[(ChunkPos, Vec<u8>)]) {
    let mut header = vec![0u8; 8192];
    let mut body = Vec::new();
    let mut sector = 2u32;
    for (pos, nbt) in chunks {
        let payload = zlib(nbt);
        let mut data = Vec::new();
        data.extend_from_slice(&(payload.len() as u32 + 1).to_be_bytes());
        data.push(2);
        data.extend_from_slice(&payload);
        let sectors = data.len().div_ceil(4096) as u32;
        data.resize(sectors as usize * 4096, 0);
        let slot = pos.slot();
        header[slot * 4..slot * 4 + 4].copy_from_slice(&((sector << 8) | sectors).to_be_bytes());
        body.extend(data);
        sector += sectors;
    }
    header.extend(body);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, header).unwrap();
}

/// Write `chunks` as loose `chunk/c.X.Z.nbt.z` files under `world`.
pub fn write_loose(world: &Path, chunks: &[(ChunkPos, Vec<u8>)]) {
    let dir = world.join("chunk");
    fs::create_dir_all(&dir).unwrap();
    for (pos, nbt) in chunks {
        fs::write(dir.join(format!("c.{}.{}.nbt.z", pos.x, pos.z)), zlib(nbt)).unwrap();
    }
}

/// Push the modification time of `path` an hour ahead.
pub fn touch_ahead(path: &Path) {
    let later = SystemTime::now() + Duration::from_secs(3600);
    fs::File::options().write(true).open(path).unwrap().set_modified(later).unwrap();
}
