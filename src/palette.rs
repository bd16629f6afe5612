//! Palette + index encoding of dense voxel attribute streams.
//!
//! A stream of `n` values becomes a palette of its distinct values, ordered by
//! descending occurrence count, and `n` indices into that palette.  The order
//! among values with equal counts is unspecified.
//!
//! The same encoder serves block ids, biome ids and data versions.

use serde::Serialize;
use std::collections::HashMap;
use std::hash::Hash;
use thiserror::Error;

/// Emitted wherever a voxel holds no block.
pub const AIR: &str = "air";

const VANILLA_PREFIX: &str = "minecraft:";

/// Shorten a namespaced identifier for output: vanilla ids lose their
/// namespace, modded ids keep it behind a leading `:`, and a missing block
/// becomes [`AIR`].
pub fn normalize_id(id: Option<&str>) -> String {
    match id {
        None => AIR.to_string(),
        Some(id) => match id.strip_prefix(VANILLA_PREFIX) {
            Some(rest) => rest.to_string(),
            None       => format!(":{id}"),
        },
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PaletteError {
    #[error("Voxel {index} outside stream of {len}")]
    OutOfBounds { index: usize, len: usize },
    #[error("Voxel {0} written twice")]
    Rewritten(usize),
    #[error("Voxel {0} never written")]
    Unwritten(usize),
    #[error("Index {index} outside palette of {len}")]
    BadIndex { index: usize, len: usize },
}

// ── VoxelStream ──────────────────────────────────────────────────────────────

/// Fixed-length attribute stream in which every slot is written exactly once.
#[derive(Debug, Clone)]
pub struct VoxelStream<T> {
    slots:   Vec<Option<T>>,
    written: usize,
}

impl<T> VoxelStream<T> {
    pub fn new(len: usize) -> Self {
        let mut slots = Vec::with_capacity(len);
        slots.resize_with(len, || None);
        Self { slots, written: 0 }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn set(&mut self, index: usize, value: T) -> Result<(), PaletteError> {
        let len = self.slots.len();
        let slot = self.slots.get_mut(index).ok_or(PaletteError::OutOfBounds { index, len })?;
        if slot.is_some() {
            return Err(PaletteError::Rewritten(index));
        }
        *slot = Some(value);
        self.written += 1;
        Ok(())
    }

    /// The completed stream; fails on the first unwritten slot.
    pub fn finish(self) -> Result<Vec<T>, PaletteError> {
        if self.written != self.slots.len() {
            let missing = self.slots.iter().position(Option::is_none).unwrap_or(0);
            return Err(PaletteError::Unwritten(missing));
        }
        self.slots
            .into_iter()
            .enumerate()
            .map(|(i, v)| v.ok_or(PaletteError::Unwritten(i)))
            .collect()
    }
}

// ── PaletteTable ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaletteTable<T> {
    palette: Vec<T>,
    indices: Vec<usize>,
}

impl<T: Clone + Eq + Hash> PaletteTable<T> {
    pub fn encode(stream: &[T]) -> Self {
        // (value, count) in first-seen order.
        let mut counts: Vec<(&T, usize)> = Vec::new();
        let mut seen: HashMap<&T, usize> = HashMap::new();
        for value in stream {
            match seen.get(value) {
                Some(&at) => counts[at].1 += 1,
                None => {
                    seen.insert(value, counts.len());
                    counts.push((value, 1));
                }
            }
        }
        counts.sort_by(|a, b| b.1.cmp(&a.1));

        let position: HashMap<&T, usize> = counts.iter().enumerate().map(|(i, (v, _))| (*v, i)).collect();
        let indices = stream.iter().map(|v| position[v]).collect();
        let palette = counts.into_iter().map(|(v, _)| v.clone()).collect();
        Self { palette, indices }
    }

    /// Expand back into the dense stream.
    pub fn decode(&self) -> Result<Vec<T>, PaletteError> {
        let len = self.palette.len();
        self.indices
            .iter()
            .map(|&index| self.palette.get(index).cloned().ok_or(PaletteError::BadIndex { index, len }))
            .collect()
    }
}

impl<T> PaletteTable<T> {
    pub fn palette(&self) -> &[T] {
        &self.palette
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }
}
