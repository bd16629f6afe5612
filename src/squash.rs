//! Archive builder: region files → squashed archives.
//!
//! For every `region/r.X.Z.mca` of a world, each stored chunk is re-exported
//! as a zlib blob and packed into `squashed_region/s.X.Z.smca`.  Regions are
//! processed on the [`RegionScanner`] pool, each inside its own scratch
//! directory, so temporary names never collide across workers.
//!
//! # Install
//! The archive is built entirely in scratch space, copied next to its target
//! as `s.X.Z.smca.part` and renamed over the target.  A reader never sees a
//! partial archive under the final name, and a failed region leaves the
//! previously installed archive untouched.
//!
//! # Freshness
//! A region whose archive is at least as new as the region file is skipped,
//! so re-running over an already squashed world rewrites nothing.  The
//! region file itself is never modified or removed.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;

use crate::anvil::{ChunkError, RegionFile};
use crate::coord::RegionPos;
use crate::scanner::{RegionScanner, ScanError, ScanOutcome};
use crate::squashed::{ArchiveError, SquashedWriter};
use crate::world::{chunk_file_name, region_file_name, squashed_file_name, Dimension, World};

#[derive(Error, Debug)]
pub enum SquashError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("{0}")]
    Chunk(#[from] ChunkError),
    #[error("{0}")]
    Archive(#[from] ArchiveError),
    #[error("{0}")]
    Scan(#[from] ScanError),
    #[error("Cannot create temporary directory: {0}")]
    TempDir(io::Error),
    #[error("{} is not a directory", .0.display())]
    NotADirectory(PathBuf),
}

#[derive(Debug, Clone, Default)]
pub struct SquashOptions {
    /// Parent of the scratch directory; the system temp dir when `None`.
    pub temp_root: Option<PathBuf>,
    /// Worker count; 0 uses the available hardware parallelism.
    pub threads:   usize,
}

// ── Outcome ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SquashOutcome {
    /// A new archive was installed.
    Squashed { before: u64, after: u64 },
    /// The installed archive is already current.
    Skipped { before: u64, after: u64 },
    /// The region file is empty; nothing to do.
    Empty,
}

/// One line of squash output, e.g. `s.0.0.smca:\t80.0 KiB -> 52.3 KiB (-34.6%)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionReport {
    pub pos:     RegionPos,
    pub outcome: SquashOutcome,
}

impl fmt::Display for RegionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = squashed_file_name(self.pos);
        let (before, after, note) = match self.outcome {
            SquashOutcome::Squashed { before, after } => (before, after, ""),
            SquashOutcome::Skipped { before, after }  => (before, after, ", newer than original, skip"),
            SquashOutcome::Empty => return write!(f, "{name}:\tempty region, skip"),
        };
        let diff = after as f64 - before as f64;
        let pct  = diff * 100.0 / before as f64;
        let sign = if diff < 0.0 { "" } else { "+" };
        write!(
            f,
            "{name}:\t{:.1} KiB -> {:.1} KiB ({sign}{pct:.1}%{note})",
            before as f64 / 1024.0,
            after as f64 / 1024.0,
        )
    }
}

/// Per-region results of one world.
#[derive(Debug)]
pub struct SquashSummary {
    pub results: ScanOutcome<SquashOutcome, SquashError>,
}

impl SquashSummary {
    pub fn reports(&self) -> impl Iterator<Item = RegionReport> + '_ {
        self.results
            .iter()
            .filter_map(|(pos, r)| r.as_ref().ok().map(|outcome| RegionReport { pos: *pos, outcome: *outcome }))
    }

    pub fn squashed(&self) -> usize {
        self.count(|o| matches!(o, SquashOutcome::Squashed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| !matches!(o, SquashOutcome::Squashed { .. }))
    }

    pub fn failed(&self) -> usize {
        self.results.values().filter(|r| r.is_err()).count()
    }

    fn count(&self, pred: impl Fn(&SquashOutcome) -> bool) -> usize {
        self.results.values().filter(|r| matches!(r, Ok(o) if pred(o))).count()
    }
}

// ── Per region ───────────────────────────────────────────────────────────────

fn modified(path: &Path) -> io::Result<SystemTime> {
    fs::metadata(path)?.modified()
}

/// Squash one region file into `target_dir`, using `scratch` for temporaries.
pub fn squash_region(
    pos:        RegionPos,
    source:     &Path,
    target_dir: &Path,
    scratch:    &Path,
) -> Result<SquashOutcome, SquashError> {
    let before = fs::metadata(source)?.len();
    if before == 0 {
        return Ok(SquashOutcome::Empty);
    }

    let name   = squashed_file_name(pos);
    let target = target_dir.join(&name);
    if target.is_file() && modified(source)? <= modified(&target)? {
        let after = fs::metadata(&target)?.len();
        return Ok(SquashOutcome::Skipped { before, after });
    }

    // Work from a private copy of the region file.
    let snapshot = scratch.join(region_file_name(pos));
    fs::copy(source, &snapshot)?;
    let mut region = RegionFile::open(&snapshot, pos)?;

    let staging = scratch.join(&name);
    let mut writer = SquashedWriter::new(BufWriter::new(File::create(&staging)?))?;
    let chunks: Vec<_> = region.chunks().collect();
    let mut skipped = 0usize;
    for chunk in chunks {
        let blob = match region.export_compressed(chunk) {
            Ok(Some(b)) => b,
            Ok(None)    => continue,
            Err(ChunkError::Io(e)) => return Err(e.into()),
            Err(e) => {
                log::warn!("{}: chunk {} not exportable: {}", name, chunk, e);
                skipped += 1;
                continue;
            }
        };
        let blob_path = scratch.join(chunk_file_name(chunk));
        fs::write(&blob_path, &blob)?;
        writer.copy_slot(chunk.slot(), &mut File::open(&blob_path)?)?;
        fs::remove_file(&blob_path)?;
    }
    let payload = writer.bytes_written;
    drop(writer.finish()?);
    fs::remove_file(&snapshot)?;

    let after = fs::metadata(&staging)?.len();
    install(&staging, &target)?;
    log::debug!("{}: {} payload byte(s), {} chunk(s) skipped", name, payload, skipped);
    Ok(SquashOutcome::Squashed { before, after })
}

/// Copy `staging` beside `target` and rename it into place.
fn install(staging: &Path, target: &Path) -> io::Result<()> {
    let mut part = target.as_os_str().to_owned();
    part.push(".part");
    let part = PathBuf::from(part);
    let result = fs::copy(staging, &part).and_then(|_| fs::rename(&part, target));
    if result.is_err() {
        let _ = fs::remove_file(&part);
    }
    result
}

// ── Per world / server ───────────────────────────────────────────────────────

/// Squash every region of `world` into its `squashed_region/` directory.
/// Per-region failures are returned in the summary, not as an error.
pub fn squash_world(world: &World, opts: &SquashOptions) -> Result<SquashSummary, SquashError> {
    if !world.root().is_dir() {
        return Err(SquashError::NotADirectory(world.root().to_owned()));
    }
    let target_dir = world.squashed_dir();
    fs::create_dir_all(&target_dir)?;

    let builder = {
        let mut b = tempfile::Builder::new();
        b.prefix("mcsquash-");
        b
    };
    let scratch_root = match &opts.temp_root {
        Some(dir) => builder.tempdir_in(dir),
        None      => builder.tempdir(),
    }
    .map_err(SquashError::TempDir)?;

    let regions = world.region_list()?;
    log::info!("squashing {} region(s) under {}", regions.len(), world.root().display());

    let scanner = RegionScanner::new(opts.threads).with_label(world.root().display().to_string());
    let results = scanner.run(regions, |pos, source: PathBuf| -> Result<SquashOutcome, SquashError> {
        // Unique per region; removed when dropped, success or not.
        let scratch = tempfile::Builder::new()
            .prefix(&format!("{pos}."))
            .tempdir_in(scratch_root.path())?;
        squash_region(pos, &source, &target_dir, scratch.path())
    })?;

    for (pos, result) in &results {
        if let Err(e) = result {
            log::error!("{}: {}", region_file_name(*pos), e);
        }
    }
    Ok(SquashSummary { results })
}

/// Squash the overworld, nether and end of a server directory in turn.
/// Dimensions whose world directory is absent are skipped.
pub fn squash_server(root: &Path, opts: &SquashOptions) -> Result<Vec<(Dimension, SquashSummary)>, SquashError> {
    if !root.is_dir() {
        return Err(SquashError::NotADirectory(root.to_owned()));
    }
    let mut out = Vec::new();
    for dim in Dimension::ALL {
        let world = World::new(root.join(dim.world_path()));
        if !world.region_dir().is_dir() {
            log::warn!("no region directory under {}, skipping", world.root().display());
            continue;
        }
        out.push((dim, squash_world(&world, opts)?));
    }
    Ok(out)
}
