//! Squashed region archives (`s.X.Z.smca`): writer and reader.
//!
//! # Layout
//! ```text
//! offset 0     : 1025 × u32 LE running offsets  (4100 bytes)
//! offset 4100  : payload of slot 0 | payload of slot 1 | ... | payload of slot 1023
//! ```
//! Slot `k` occupies `offsets[k]..offsets[k + 1]`; equal offsets mean the slot
//! holds no chunk, so a stored payload is never empty.  Slots follow region order (`local_z * 32 + local_x`).
//! Payloads are opaque here; in practice they are zlib-compressed chunk NBT.
//!
//! There is no magic number or version field.  Only this single running-offset
//! layout is read or written.
//!
//! # Writer
//! [`SquashedWriter`] reserves the index with zero bytes, streams payloads in
//! slot order while recording offsets, and on [`SquashedWriter::finish`] seeks
//! back to offset 0 and overwrites the placeholder with the final index.
//!
//! # Reader
//! [`SquashedReader`] reads and validates the index once, then serves
//! random-access reads by slot or by chunk coordinate.

mod index;

pub use index::{SquashedIndex, INDEX_ENTRIES, INDEX_SIZE};

use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::ops::Range;
use thiserror::Error;

use crate::coord::{ChunkPos, SLOTS_PER_REGION};

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Slot {0} out of range (0..1024)")]
    SlotOutOfRange(usize),
    #[error("Slot {slot} written out of order (next free slot is {next})")]
    SlotOrder { slot: usize, next: usize },
    #[error("Index has {0} entries, expected 1025")]
    IndexLength(usize),
    #[error("Corrupt index at slot {slot}: offset {end} precedes {start}")]
    CorruptIndex { slot: usize, start: u32, end: u32 },
    #[error("Archive exceeds the 4 GiB offset limit")]
    TooLarge,
    #[error("Slot {0} payload is empty")]
    EmptyPayload(usize),
    #[error("Slot {slot} ends at byte {end}, past end of archive ({len} bytes)")]
    Truncated { slot: usize, end: u64, len: u64 },
}

// ── Writer ───────────────────────────────────────────────────────────────────

pub struct SquashedWriter<W: Write + Seek> {
    writer:    W,
    offsets:   Vec<u32>,
    position:  u64,
    /// Number of payload bytes written so far (excluding the index).
    pub bytes_written: u64,
}

impl<W: Write + Seek> SquashedWriter<W> {
    pub fn new(mut writer: W) -> io::Result<Self> {
        writer.seek(SeekFrom::Start(0))?;
        writer.write_all(&[0u8; INDEX_SIZE])?; // reserved; overwritten on finish
        let mut offsets = Vec::with_capacity(INDEX_ENTRIES);
        offsets.push(INDEX_SIZE as u32);
        Ok(Self { writer, offsets, position: INDEX_SIZE as u64, bytes_written: 0 })
    }

    /// Next slot that will receive a payload.
    pub fn next_slot(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Mark every slot before `slot` as empty.
    fn advance_to(&mut self, slot: usize) -> Result<(), ArchiveError> {
        if slot >= SLOTS_PER_REGION {
            return Err(ArchiveError::SlotOutOfRange(slot));
        }
        if slot < self.next_slot() {
            return Err(ArchiveError::SlotOrder { slot, next: self.next_slot() });
        }
        let current = self.position as u32;
        while self.next_slot() < slot {
            self.offsets.push(current);
        }
        Ok(())
    }

    fn close_slot(&mut self) -> Result<(), ArchiveError> {
        let end = u32::try_from(self.position).map_err(|_| ArchiveError::TooLarge)?;
        self.offsets.push(end);
        Ok(())
    }

    /// Append `payload` as the contents of `slot`.  Slots must be strictly
    /// increasing; skipped slots become empty.  An empty payload is rejected,
    /// since the index could not tell it from an absent slot.
    pub fn write_slot(&mut self, slot: usize, payload: &[u8]) -> Result<(), ArchiveError> {
        if payload.is_empty() {
            return Err(ArchiveError::EmptyPayload(slot));
        }
        self.advance_to(slot)?;
        self.writer.write_all(payload)?;
        self.position      += payload.len() as u64;
        self.bytes_written += payload.len() as u64;
        self.close_slot()
    }

    /// Stream the contents of `source` into `slot` without buffering it.
    /// Returns the number of bytes copied.  An empty source is rejected and
    /// leaves `slot` open.
    pub fn copy_slot<R: Read>(&mut self, slot: usize, source: &mut R) -> Result<u64, ArchiveError> {
        self.advance_to(slot)?;
        let copied = io::copy(source, &mut self.writer)?;
        if copied == 0 {
            return Err(ArchiveError::EmptyPayload(slot));
        }
        self.position      += copied;
        self.bytes_written += copied;
        self.close_slot()?;
        Ok(copied)
    }

    /// Write the final index over the placeholder and hand back the stream.
    pub fn finish(mut self) -> Result<W, ArchiveError> {
        let end = u32::try_from(self.position).map_err(|_| ArchiveError::TooLarge)?;
        while self.offsets.len() < INDEX_ENTRIES {
            self.offsets.push(end);
        }
        let index = SquashedIndex::from_offsets(self.offsets)?;
        self.writer.seek(SeekFrom::Start(0))?;
        index.write(&mut self.writer)?;
        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// Encode an in-memory archive from `(slot, payload)` pairs in ascending slot order.
/// `None` payloads and omitted slots are stored as absent; `Some(&[])` is
/// rejected with [`ArchiveError::EmptyPayload`].
pub fn encode<'a, I>(chunks: I) -> Result<Vec<u8>, ArchiveError>
where
    I: IntoIterator<Item = (usize, Option<&'a [u8]>)>,
{
    let mut writer = SquashedWriter::new(Cursor::new(Vec::new()))?;
    for (slot, payload) in chunks {
        match payload {
            Some(bytes) => writer.write_slot(slot, bytes)?,
            None        => writer.advance_to(slot)?,
        }
    }
    Ok(writer.finish()?.into_inner())
}

/// Read the payload of `slot` from an in-memory archive.
pub fn decode(archive: &[u8], slot: usize) -> Result<Option<Vec<u8>>, ArchiveError> {
    SquashedReader::new(Cursor::new(archive))?.read_slot(slot)
}

// ── Reader ───────────────────────────────────────────────────────────────────

pub struct SquashedReader<R: Read + Seek> {
    reader:    R,
    pub index: SquashedIndex,
    len:       u64,
}

impl<R: Read + Seek> SquashedReader<R> {
    pub fn new(mut reader: R) -> Result<Self, ArchiveError> {
        let len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;
        let index = SquashedIndex::read(&mut reader)?;
        Ok(Self { reader, index, len })
    }

    /// Payload of `slot`, or `None` when the slot is empty.
    pub fn read_slot(&mut self, slot: usize) -> Result<Option<Vec<u8>>, ArchiveError> {
        let range = match self.index.range(slot)? {
            Some(r) => r,
            None    => return Ok(None),
        };
        if range.end > self.len {
            return Err(ArchiveError::Truncated { slot, end: range.end, len: self.len });
        }
        self.reader.seek(SeekFrom::Start(range.start))?;
        let mut payload = vec![0u8; (range.end - range.start) as usize];
        self.reader.read_exact(&mut payload)?;
        Ok(Some(payload))
    }

    /// Payload of `chunk`, addressed by its slot inside its region.
    pub fn read_chunk(&mut self, chunk: ChunkPos) -> Result<Option<Vec<u8>>, ArchiveError> {
        self.read_slot(chunk.slot())
    }

    /// Total archive length in bytes, index included.
    pub fn byte_len(&self) -> u64 {
        self.len
    }

    /// Whether any slot holds a chunk.
    pub fn has_chunks(&self) -> bool {
        self.index.present().next().is_some()
    }

    /// Every present slot with its location and CRC-32.
    pub fn slots(&mut self) -> Result<Vec<SlotInfo>, ArchiveError> {
        let present: Vec<(usize, Range<u64>)> = self.index.present().collect();
        let mut out = Vec::with_capacity(present.len());
        for (slot, range) in present {
            let payload = self.read_slot(slot)?.unwrap_or_default();
            out.push(SlotInfo {
                slot,
                offset: range.start,
                length: range.end - range.start,
                crc32:  crc32fast::hash(&payload),
            });
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotInfo {
    pub slot:   usize,
    pub offset: u64,
    pub length: u64,
    pub crc32:  u32,
}
