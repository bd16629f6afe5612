//! World directory layout.
//!
//! ```text
//! <server>/world/                      overworld  (dimension  0)
//! <server>/world_nether/DIM-1/         nether     (dimension -1)
//! <server>/world_the_end/DIM1/         end        (dimension  1)
//!
//! <world>/region/r.X.Z.mca             legacy region files
//! <world>/squashed_region/s.X.Z.smca   squashed archives
//! <world>/chunk/c.X.Z.nbt.z            loose zlib chunk NBT
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::coord::{ChunkPos, RegionPos};

pub const REGION_DIR:   &str = "region";
pub const SQUASHED_DIR: &str = "squashed_region";
pub const CHUNK_DIR:    &str = "chunk";

pub fn region_file_name(pos: RegionPos) -> String {
    format!("r.{}.{}.mca", pos.x, pos.z)
}

pub fn squashed_file_name(pos: RegionPos) -> String {
    format!("s.{}.{}.smca", pos.x, pos.z)
}

pub fn chunk_file_name(pos: ChunkPos) -> String {
    format!("c.{}.{}.nbt.z", pos.x, pos.z)
}

// ── Dimension ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Dimension {
    #[default]
    Overworld,
    Nether,
    End,
}

impl Dimension {
    pub const ALL: [Dimension; 3] = [Dimension::Overworld, Dimension::Nether, Dimension::End];

    pub fn id(self) -> i32 {
        match self {
            Dimension::Overworld => 0,
            Dimension::Nether    => -1,
            Dimension::End       => 1,
        }
    }

    pub fn from_id(id: i32) -> Option<Self> {
        match id {
            0  => Some(Dimension::Overworld),
            -1 => Some(Dimension::Nether),
            1  => Some(Dimension::End),
            _  => None,
        }
    }

    /// World directory of this dimension relative to a server root.
    pub fn world_path(self) -> &'static Path {
        Path::new(match self {
            Dimension::Overworld => "world",
            Dimension::Nether    => "world_nether/DIM-1",
            Dimension::End       => "world_the_end/DIM1",
        })
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

impl FromStr for Dimension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i32>()
            .ok()
            .and_then(Dimension::from_id)
            .ok_or_else(|| format!("invalid dimension '{s}' (expected 0, -1 or 1)"))
    }
}

// ── World ────────────────────────────────────────────────────────────────────

/// A world directory.  Holds only its path; every listing re-reads the disk.
#[derive(Debug, Clone)]
pub struct World {
    root: PathBuf,
}

impl World {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path { &self.root }
    pub fn region_dir(&self) -> PathBuf { self.root.join(REGION_DIR) }
    pub fn squashed_dir(&self) -> PathBuf { self.root.join(SQUASHED_DIR) }
    pub fn chunk_dir(&self) -> PathBuf { self.root.join(CHUNK_DIR) }

    pub fn region_path(&self, pos: RegionPos) -> PathBuf {
        self.region_dir().join(region_file_name(pos))
    }

    pub fn squashed_path(&self, pos: RegionPos) -> PathBuf {
        self.squashed_dir().join(squashed_file_name(pos))
    }

    /// Lazily enumerate `region/r.X.Z.mca`.  Each call starts a fresh listing;
    /// names that do not parse are skipped.
    pub fn regions(&self) -> io::Result<Regions> {
        Ok(Regions { entries: fs::read_dir(self.region_dir())? })
    }

    /// Region positions sorted by (x, z).  Listing errors surface here.
    pub fn region_list(&self) -> io::Result<Vec<(RegionPos, PathBuf)>> {
        let mut out = self.regions()?.collect::<io::Result<Vec<_>>>()?;
        out.sort_by_key(|(pos, _)| *pos);
        Ok(out)
    }
}

pub struct Regions {
    entries: fs::ReadDir,
}

impl Iterator for Regions {
    type Item = io::Result<(RegionPos, PathBuf)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.entries.next()? {
                Ok(e)  => e,
                Err(e) => return Some(Err(e)),
            };
            let name = entry.file_name();
            let pos = name.to_str().and_then(|n| RegionPos::from_file_name(n, "r", "mca"));
            if let Some(pos) = pos {
                return Some(Ok((pos, entry.path())));
            }
        }
    }
}
