//! Block, chunk and region coordinate math.
//!
//! A chunk covers 16×16 blocks horizontally and the full world height; a region
//! is a 32×32 grid of chunks.  All conversions use arithmetic shifts so that
//! negative coordinates floor toward negative infinity.
//!
//! # Slot order
//! Inside a region, chunk slots are numbered row-major over (local z, local x):
//! `slot = local_z * 32 + local_x`.  Every on-disk index in this crate (region
//! sector tables and squashed archives alike) uses this order.

use std::ops::RangeInclusive;
use thiserror::Error;

/// Blocks per chunk edge.
pub const CHUNK_SIZE: i32 = 16;
/// Chunks per region edge.
pub const REGION_SIZE: i32 = 32;
/// Chunk slots per region.
pub const SLOTS_PER_REGION: usize = (REGION_SIZE * REGION_SIZE) as usize;

// ── ChunkPos ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

impl ChunkPos {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Chunk containing block column (`bx`, `bz`).
    pub const fn from_block(bx: i32, bz: i32) -> Self {
        Self { x: bx >> 4, z: bz >> 4 }
    }

    pub const fn region(self) -> RegionPos {
        RegionPos { x: self.x >> 5, z: self.z >> 5 }
    }

    pub const fn local_x(self) -> i32 { self.x & (REGION_SIZE - 1) }
    pub const fn local_z(self) -> i32 { self.z & (REGION_SIZE - 1) }

    /// Index of this chunk inside its region's 32×32 grid.
    pub const fn slot(self) -> usize {
        (self.local_z() * REGION_SIZE + self.local_x()) as usize
    }

    pub const fn min_block_x(self) -> i32 { self.x * CHUNK_SIZE }
    pub const fn max_block_x(self) -> i32 { self.x * CHUNK_SIZE + CHUNK_SIZE - 1 }
    pub const fn min_block_z(self) -> i32 { self.z * CHUNK_SIZE }
    pub const fn max_block_z(self) -> i32 { self.z * CHUNK_SIZE + CHUNK_SIZE - 1 }
}

impl std::fmt::Display for ChunkPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.x, self.z)
    }
}

// ── RegionPos ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionPos {
    pub x: i32,
    pub z: i32,
}

impl RegionPos {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    pub const fn from_block(bx: i32, bz: i32) -> Self {
        Self { x: bx >> 9, z: bz >> 9 }
    }

    pub const fn min_chunk_x(self) -> i32 { self.x * REGION_SIZE }
    pub const fn max_chunk_x(self) -> i32 { self.x * REGION_SIZE + REGION_SIZE - 1 }
    pub const fn min_chunk_z(self) -> i32 { self.z * REGION_SIZE }
    pub const fn max_chunk_z(self) -> i32 { self.z * REGION_SIZE + REGION_SIZE - 1 }

    /// The chunk occupying `slot`, or `None` when the slot is out of range.
    pub fn chunk_at_slot(self, slot: usize) -> Option<ChunkPos> {
        if slot >= SLOTS_PER_REGION {
            return None;
        }
        let slot = slot as i32;
        Some(ChunkPos::new(
            self.min_chunk_x() + slot % REGION_SIZE,
            self.min_chunk_z() + slot / REGION_SIZE,
        ))
    }

    /// All 1024 chunks of the region in slot order.
    pub fn chunks(self) -> impl Iterator<Item = ChunkPos> {
        (0..SLOTS_PER_REGION).filter_map(move |slot| self.chunk_at_slot(slot))
    }

    /// Parse `<prefix>.<x>.<z>.<extension>` file names such as `r.1.-2.mca`.
    pub fn from_file_name(name: &str, prefix: &str, extension: &str) -> Option<Self> {
        let mut parts = name.split('.');
        if parts.next()? != prefix {
            return None;
        }
        let x = parts.next()?.parse().ok()?;
        let z = parts.next()?.parse().ok()?;
        if parts.next()? != extension || parts.next().is_some() {
            return None;
        }
        Some(Self { x, z })
    }
}

impl std::fmt::Display for RegionPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "r.{}.{}", self.x, self.z)
    }
}

// ── BlockBox ──────────────────────────────────────────────────────────────────

/// Largest query volume in voxels (a 256³ cube).
pub const MAX_VOLUME: usize = 1 << 24;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BoxError {
    #[error("invalid block range")]
    Inverted,
    #[error("block range too large: {dx} x {dy} x {dz}")]
    TooLarge { dx: i64, dy: i64, dz: i64 },
}

/// Inclusive axis-aligned block volume used as an extraction query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockBox {
    pub min_x: i32,
    pub max_x: i32,
    pub min_y: i32,
    pub max_y: i32,
    pub min_z: i32,
    pub max_z: i32,
}

impl BlockBox {
    /// Validates the bounds; the volume must be non-empty and at most
    /// [`MAX_VOLUME`] voxels.
    pub fn new(
        (min_x, max_x): (i32, i32),
        (min_y, max_y): (i32, i32),
        (min_z, max_z): (i32, i32),
    ) -> Result<Self, BoxError> {
        if min_x > max_x || min_y > max_y || min_z > max_z {
            return Err(BoxError::Inverted);
        }
        let bounds = Self { min_x, max_x, min_y, max_y, min_z, max_z };
        let (dx, dy, dz) = (bounds.dx() as i64, bounds.dy() as i64, bounds.dz() as i64);
        let volume = dx.checked_mul(dy).and_then(|v| v.checked_mul(dz));
        match volume {
            Some(v) if v <= MAX_VOLUME as i64 => Ok(bounds),
            _ => Err(BoxError::TooLarge { dx, dy, dz }),
        }
    }

    pub fn dx(&self) -> usize { (self.max_x as i64 - self.min_x as i64 + 1) as usize }
    pub fn dy(&self) -> usize { (self.max_y as i64 - self.min_y as i64 + 1) as usize }
    pub fn dz(&self) -> usize { (self.max_z as i64 - self.min_z as i64 + 1) as usize }

    pub fn volume(&self) -> usize {
        self.dx() * self.dy() * self.dz()
    }

    pub fn contains(&self, x: i32, y: i32, z: i32) -> bool {
        (self.min_x..=self.max_x).contains(&x)
            && (self.min_y..=self.max_y).contains(&y)
            && (self.min_z..=self.max_z).contains(&z)
    }

    /// Row-major stream index: x fastest, then z, then y.
    pub fn index_of(&self, x: i32, y: i32, z: i32) -> usize {
        let (dx, dz) = (self.dx(), self.dz());
        (x - self.min_x) as usize
            + (z - self.min_z) as usize * dx
            + (y - self.min_y) as usize * dx * dz
    }

    pub fn regions_x(&self) -> RangeInclusive<i32> { (self.min_x >> 9)..=(self.max_x >> 9) }
    pub fn regions_z(&self) -> RangeInclusive<i32> { (self.min_z >> 9)..=(self.max_z >> 9) }

    /// Chunks of `region` that intersect this box, in x-major order.
    pub fn chunks_in(&self, region: RegionPos) -> impl Iterator<Item = ChunkPos> {
        let min_cx = region.min_chunk_x().max(self.min_x >> 4);
        let max_cx = region.max_chunk_x().min(self.max_x >> 4);
        let min_cz = region.min_chunk_z().max(self.min_z >> 4);
        let max_cz = region.max_chunk_z().min(self.max_z >> 4);
        (min_cx..=max_cx).flat_map(move |cx| (min_cz..=max_cz).map(move |cz| ChunkPos::new(cx, cz)))
    }

    /// This box clipped to the column of `chunk`.
    pub fn clip_to(&self, chunk: ChunkPos) -> Option<BlockBox> {
        let clipped = BlockBox {
            min_x: self.min_x.max(chunk.min_block_x()),
            max_x: self.max_x.min(chunk.max_block_x()),
            min_y: self.min_y,
            max_y: self.max_y,
            min_z: self.min_z.max(chunk.min_block_z()),
            max_z: self.max_z.min(chunk.max_block_z()),
        };
        (clipped.min_x <= clipped.max_x && clipped.min_z <= clipped.max_z).then_some(clipped)
    }
}
