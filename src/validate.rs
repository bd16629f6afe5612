//! Completeness validator.
//!
//! Visits every stored chunk of a world on the [`RegionScanner`] pool and
//! records the fully generated ones in a persistent index:
//!
//! ```text
//! <db>/<version>/<dimension>/index.txt
//!     -12\t7
//!     -12\t8
//!     ...
//! ```
//!
//! The index only grows.  Chunks already listed are not decoded again; the
//! rewritten file keeps the existing lines in their original order and
//! appends new coordinates sorted.

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::anvil::{ChunkError, RegionFile};
use crate::coord::ChunkPos;
use crate::scanner::{Accumulator, RegionScanner, ScanError};
use crate::world::{Dimension, World};

pub const INDEX_FILE_NAME: &str = "index.txt";

#[derive(Error, Debug)]
pub enum ValidateError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("{0}")]
    Chunk(#[from] ChunkError),
    #[error("{0}")]
    Scan(#[from] ScanError),
    #[error("{}:{}: malformed index line {:?}", .path.display(), .line, .text)]
    MalformedLine { path: PathBuf, line: usize, text: String },
    #[error("{} is not a directory", .0.display())]
    NotADirectory(PathBuf),
}

#[derive(Debug, Clone, Default)]
pub struct ValidateOptions {
    pub db_dir:    PathBuf,
    pub world_dir: PathBuf,
    pub dimension: Dimension,
    /// Game version tag; only namespaces the index location.
    pub version:   String,
    /// Worker count; 0 uses the available hardware parallelism.
    pub threads:   usize,
}

impl ValidateOptions {
    pub fn index_dir(&self) -> PathBuf {
        self.db_dir.join(&self.version).join(self.dimension.to_string())
    }

    pub fn index_path(&self) -> PathBuf {
        self.index_dir().join(INDEX_FILE_NAME)
    }
}

// ── Index file ───────────────────────────────────────────────────────────────

/// Ordered, duplicate-free set of complete chunk coordinates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletenessIndex {
    entries: Vec<ChunkPos>,
    members: HashSet<ChunkPos>,
}

impl CompletenessIndex {
    /// Read `path`; a missing file is an empty index.
    pub fn load(path: &Path) -> Result<Self, ValidateError> {
        let file = match fs::File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        let mut index = Self::default();
        for (n, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let pos = parse_line(&line).ok_or_else(|| ValidateError::MalformedLine {
                path: path.to_owned(),
                line: n + 1,
                text: line.clone(),
            })?;
            index.insert(pos);
        }
        Ok(index)
    }

    /// Append `pos` unless already present.
    pub fn insert(&mut self, pos: ChunkPos) -> bool {
        let fresh = self.members.insert(pos);
        if fresh {
            self.entries.push(pos);
        }
        fresh
    }

    pub fn contains(&self, pos: ChunkPos) -> bool {
        self.members.contains(&pos)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ChunkPos> + '_ {
        self.entries.iter().copied()
    }

    /// Write via `index.txt.part` and rename over `path`.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        let mut part = path.as_os_str().to_owned();
        part.push(".part");
        let part = PathBuf::from(part);
        {
            let mut out = BufWriter::new(fs::File::create(&part)?);
            for pos in &self.entries {
                writeln!(out, "{}\t{}", pos.x, pos.z)?;
            }
            out.flush()?;
        }
        fs::rename(&part, path)
    }
}

fn parse_line(line: &str) -> Option<ChunkPos> {
    let mut fields = line.trim_end_matches('\r').split('\t');
    let x = fields.next()?.trim().parse().ok()?;
    let z = fields.next()?.trim().parse().ok()?;
    Some(ChunkPos::new(x, z))
}

// ── Run ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ValidateReport {
    pub existing:       usize,
    pub added:          usize,
    pub failed_regions: usize,
}

/// Complete chunks of one region that `known` does not list yet.
fn scan_region(region: &mut RegionFile, known: &CompletenessIndex) -> Result<BTreeSet<ChunkPos>, ValidateError> {
    let mut found = BTreeSet::new();
    let chunks: Vec<_> = region.chunks().filter(|c| !known.contains(*c)).collect();
    for pos in chunks {
        match region.load_chunk(pos) {
            Ok(Some(chunk)) if chunk.is_complete() => {
                found.insert(pos);
            }
            Ok(_) => {}
            Err(ChunkError::Io(e)) => return Err(e.into()),
            Err(e) => log::warn!("{}: chunk {} unreadable: {}", region.path().display(), pos, e),
        }
    }
    Ok(found)
}

/// Scan the world and extend its completeness index.
pub fn validate(opts: &ValidateOptions) -> Result<ValidateReport, ValidateError> {
    let index_dir = opts.index_dir();
    fs::create_dir_all(&index_dir)?;
    if !index_dir.is_dir() {
        return Err(ValidateError::NotADirectory(index_dir));
    }
    let index_path = opts.index_path();
    log::info!("reading {}", index_path.display());
    let mut index = CompletenessIndex::load(&index_path)?;
    let existing = index.len();

    let world = World::new(&opts.world_dir);
    let regions = world.region_list()?;
    let found: Accumulator<BTreeSet<ChunkPos>> = Accumulator::default();

    let scanner = RegionScanner::new(opts.threads).with_label("validate");
    let results = scanner.run(regions, |pos, path: PathBuf| -> Result<usize, ValidateError> {
        let mut region = RegionFile::open(&path, pos)?;
        let partial = scan_region(&mut region, &index)?;
        let n = partial.len();
        found.merge(|set| set.extend(partial));
        Ok(n)
    })?;

    let mut failed_regions = 0;
    for (pos, result) in &results {
        if let Err(e) = result {
            log::error!("region {}: {}", pos, e);
            failed_regions += 1;
        }
    }

    let mut added = 0;
    for pos in found.into_inner() {
        if index.insert(pos) {
            added += 1;
        }
    }
    index.save(&index_path)?;
    log::info!("{} chunk(s) validated, {} total", added, index.len());
    Ok(ValidateReport { existing, added, failed_regions })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn index_path_layout() {
        let opts = ValidateOptions {
            db_dir: PathBuf::from("db"),
            dimension: Dimension::Nether,
            version: "1.20.1".into(),
            ..Default::default()
        };
        assert_eq!(opts.index_path(), Path::new("db/1.20.1/-1/index.txt"));
    }

    #[test]
    fn load_keeps_order_and_skips_blank_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(INDEX_FILE_NAME);
        fs::write(&path, "5\t-3\n\n-1\t2\n5\t-3\n").unwrap();
        let index = CompletenessIndex::load(&path).unwrap();
        assert_eq!(index.iter().collect::<Vec<_>>(), vec![ChunkPos::new(5, -3), ChunkPos::new(-1, 2)]);
        assert!(CompletenessIndex::load(&dir.path().join("missing.txt")).unwrap().is_empty());
    }

    #[test]
    fn malformed_line_names_line_number() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(INDEX_FILE_NAME);
        fs::write(&path, "1\t2\nthree\t4\n").unwrap();
        let err = CompletenessIndex::load(&path).unwrap_err();
        assert!(matches!(err, ValidateError::MalformedLine { line: 2, .. }));
    }

    #[test]
    fn save_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(INDEX_FILE_NAME);
        let mut index = CompletenessIndex::default();
        assert!(index.insert(ChunkPos::new(3, 4)));
        assert!(index.insert(ChunkPos::new(-7, 0)));
        assert!(!index.insert(ChunkPos::new(3, 4)));
        index.save(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "3\t4\n-7\t0\n");
        assert_eq!(CompletenessIndex::load(&path).unwrap(), index);
    }
}
