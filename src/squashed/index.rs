use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};
use std::ops::Range;

use crate::coord::SLOTS_PER_REGION;
use super::ArchiveError;

/// Number of `u32` entries in the index: one start offset per slot plus the
/// end offset of the last slot.
pub const INDEX_ENTRIES: usize = SLOTS_PER_REGION + 1;
/// Byte length of the index, and therefore the offset of the first payload.
pub const INDEX_SIZE: usize = INDEX_ENTRIES * 4;

/// Running-offset table at the head of a squashed archive.
///
/// `offsets[k]..offsets[k + 1]` is the byte range of slot `k`; an empty range
/// means the slot holds no chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SquashedIndex {
    offsets: Vec<u32>,
}

impl Default for SquashedIndex {
    fn default() -> Self {
        Self { offsets: vec![INDEX_SIZE as u32; INDEX_ENTRIES] }
    }
}

impl SquashedIndex {
    /// Build from explicit offsets, validating the table invariants.
    pub fn from_offsets(offsets: Vec<u32>) -> Result<Self, ArchiveError> {
        if offsets.len() != INDEX_ENTRIES {
            return Err(ArchiveError::IndexLength(offsets.len()));
        }
        if (offsets[0] as usize) < INDEX_SIZE {
            return Err(ArchiveError::CorruptIndex { slot: 0, start: INDEX_SIZE as u32, end: offsets[0] });
        }
        for (slot, pair) in offsets.windows(2).enumerate() {
            if pair[0] > pair[1] {
                return Err(ArchiveError::CorruptIndex { slot, start: pair[0], end: pair[1] });
            }
        }
        Ok(Self { offsets })
    }

    pub fn read<R: Read>(mut reader: R) -> Result<Self, ArchiveError> {
        let mut offsets = vec![0u32; INDEX_ENTRIES];
        reader.read_u32_into::<LittleEndian>(&mut offsets)?;
        Self::from_offsets(offsets)
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        for &offset in &self.offsets {
            writer.write_u32::<LittleEndian>(offset)?;
        }
        Ok(())
    }

    /// Byte range of `slot`, or `None` if the slot is empty.
    pub fn range(&self, slot: usize) -> Result<Option<Range<u64>>, ArchiveError> {
        if slot >= SLOTS_PER_REGION {
            return Err(ArchiveError::SlotOutOfRange(slot));
        }
        let (start, end) = (self.offsets[slot] as u64, self.offsets[slot + 1] as u64);
        Ok((start < end).then_some(start..end))
    }

    /// Offset one past the last payload byte.
    pub fn end(&self) -> u64 {
        self.offsets[SLOTS_PER_REGION] as u64
    }

    /// Non-empty slots with their byte ranges, in slot order.
    pub fn present(&self) -> impl Iterator<Item = (usize, Range<u64>)> + '_ {
        self.offsets
            .windows(2)
            .enumerate()
            .filter(|(_, w)| w[0] < w[1])
            .map(|(slot, w)| (slot, w[0] as u64..w[1] as u64))
    }

    pub(crate) fn offsets(&self) -> &[u32] {
        &self.offsets
    }
}
