//! Chunk payload compression schemes.
//!
//! # Identity rules
//! Every chunk stored in a region file is prefixed by a one-byte scheme id.
//! Those ids are frozen by the region format:
//!
//! | Id | Scheme |
//! |----|--------|
//! | 1  | gzip (RFC 1952) |
//! | 2  | zlib (RFC 1950) |
//! | 3  | uncompressed |
//! | 4  | LZ4 block stream (`LZ4Block` framing) |
//!
//! Bit 7 of the id marks a chunk whose payload lives in an external `.mcc`
//! file next to the region; [`split_external_flag`] separates the two.
//!
//! Loose chunk files (`c.X.Z.nbt.z`) and squashed archive payloads are always
//! zlib.  [`to_zlib`] normalises any stored payload to that form.

use std::io::{Read, Write};
use byteorder::{LittleEndian, ReadBytesExt};
use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;
use thiserror::Error;

/// Bit set on the scheme byte when the payload is stored in a `.mcc` file.
pub const EXTERNAL_FLAG: u8 = 0x80;

// ── CompressionScheme ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionScheme {
    Gzip         = 1,
    Zlib         = 2,
    Uncompressed = 3,
    Lz4          = 4,
}

impl CompressionScheme {
    /// Resolve an on-disk scheme byte (external flag already removed).
    pub fn from_byte(b: u8) -> Result<Self, CodecError> {
        match b {
            1 => Ok(CompressionScheme::Gzip),
            2 => Ok(CompressionScheme::Zlib),
            3 => Ok(CompressionScheme::Uncompressed),
            4 => Ok(CompressionScheme::Lz4),
            _ => Err(CodecError::UnknownScheme(b)),
        }
    }

    /// Human-readable name (diagnostics only, never parsed).
    pub fn name(self) -> &'static str {
        match self {
            CompressionScheme::Gzip         => "gzip",
            CompressionScheme::Zlib         => "zlib",
            CompressionScheme::Uncompressed => "none",
            CompressionScheme::Lz4          => "lz4",
        }
    }
}

/// Split a raw scheme byte into (scheme byte, stored externally).
pub fn split_external_flag(b: u8) -> (u8, bool) {
    (b & !EXTERNAL_FLAG, b & EXTERNAL_FLAG != 0)
}

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Compression error: {0}")]
    Compression(String),
    #[error("Decompression error: {0}")]
    Decompression(String),
    #[error("Unknown compression scheme: {0}")]
    UnknownScheme(u8),
    #[error("Compression scheme {0} is decode-only")]
    EncodeUnsupported(&'static str),
}

// ── Codec trait ──────────────────────────────────────────────────────────────

pub trait Codec: Send + Sync {
    fn scheme(&self) -> CompressionScheme;
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError>;
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError>;
}

// ── Built-in codec implementations ──────────────────────────────────────────

pub struct NoneCodec;
impl Codec for NoneCodec {
    fn scheme(&self) -> CompressionScheme { CompressionScheme::Uncompressed }
    fn compress(&self, data: &[u8])   -> Result<Vec<u8>, CodecError> { Ok(data.to_vec()) }
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> { Ok(data.to_vec()) }
}

pub struct ZlibCodec;
impl Codec for ZlibCodec {
    fn scheme(&self) -> CompressionScheme { CompressionScheme::Zlib }
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut w = ZlibEncoder::new(Vec::new(), Compression::default());
        w.write_all(data).map_err(|e| CodecError::Compression(e.to_string()))?;
        w.finish().map_err(|e| CodecError::Compression(e.to_string()))
    }
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        ZlibDecoder::new(data)
            .read_to_end(&mut out)
            .map_err(|e| CodecError::Decompression(e.to_string()))?;
        Ok(out)
    }
}

pub struct GzipCodec;
impl Codec for GzipCodec {
    fn scheme(&self) -> CompressionScheme { CompressionScheme::Gzip }
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut w = GzEncoder::new(Vec::new(), Compression::default());
        w.write_all(data).map_err(|e| CodecError::Compression(e.to_string()))?;
        w.finish().map_err(|e| CodecError::Compression(e.to_string()))
    }
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        GzDecoder::new(data)
            .read_to_end(&mut out)
            .map_err(|e| CodecError::Decompression(e.to_string()))?;
        Ok(out)
    }
}

const LZ4_BLOCK_MAGIC:  &[u8; 8] = b"LZ4Block";
const LZ4_METHOD_RAW:   u8 = 0x10;
const LZ4_METHOD_LZ4:   u8 = 0x20;

/// Decoder for the `LZ4Block` stream framing used by scheme 4.
///
/// Each frame is `magic(8) | token(1) | comp_len(4 LE) | orig_len(4 LE) |
/// checksum(4 LE) | payload`.  A frame with `orig_len == 0` terminates the
/// stream.  Frame checksums are not verified.
pub struct Lz4Codec;
impl Codec for Lz4Codec {
    fn scheme(&self) -> CompressionScheme { CompressionScheme::Lz4 }
    fn compress(&self, _: &[u8]) -> Result<Vec<u8>, CodecError> {
        Err(CodecError::EncodeUnsupported("lz4"))
    }
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let corrupt = |what: &str| CodecError::Decompression(format!("LZ4Block: {what}"));
        let mut cursor = std::io::Cursor::new(data);
        let mut out = Vec::new();

        while (cursor.position() as usize) < data.len() {
            let mut magic = [0u8; 8];
            cursor.read_exact(&mut magic).map_err(|_| corrupt("truncated frame header"))?;
            if &magic != LZ4_BLOCK_MAGIC {
                return Err(corrupt("bad magic"));
            }
            let token    = cursor.read_u8().map_err(|_| corrupt("truncated frame header"))?;
            let comp_len = cursor.read_u32::<LittleEndian>().map_err(|_| corrupt("truncated frame header"))? as usize;
            let orig_len = cursor.read_u32::<LittleEndian>().map_err(|_| corrupt("truncated frame header"))? as usize;
            let _checksum = cursor.read_u32::<LittleEndian>().map_err(|_| corrupt("truncated frame header"))?;
            if orig_len == 0 {
                break;
            }

            let start = cursor.position() as usize;
            let end   = start.checked_add(comp_len).filter(|&e| e <= data.len())
                .ok_or_else(|| corrupt("frame payload past end of data"))?;
            let payload = &data[start..end];
            match token & 0xF0 {
                LZ4_METHOD_RAW => out.extend_from_slice(payload),
                LZ4_METHOD_LZ4 => {
                    let block = lz4_flex::block::decompress(payload, orig_len)
                        .map_err(|e| CodecError::Decompression(e.to_string()))?;
                    out.extend_from_slice(&block);
                }
                other => return Err(corrupt(&format!("unknown method 0x{other:02x}"))),
            }
            cursor.set_position(end as u64);
        }
        Ok(out)
    }
}

// ── Factory ──────────────────────────────────────────────────────────────────

pub fn get_codec(scheme: CompressionScheme) -> Box<dyn Codec> {
    match scheme {
        CompressionScheme::Gzip         => Box::new(GzipCodec),
        CompressionScheme::Zlib         => Box::new(ZlibCodec),
        CompressionScheme::Uncompressed => Box::new(NoneCodec),
        CompressionScheme::Lz4          => Box::new(Lz4Codec),
    }
}

/// Re-encode a stored payload as zlib.  Zlib payloads pass through untouched.
pub fn to_zlib(scheme: CompressionScheme, payload: Vec<u8>) -> Result<Vec<u8>, CodecError> {
    if scheme == CompressionScheme::Zlib {
        return Ok(payload);
    }
    let raw = get_codec(scheme).decompress(&payload)?;
    ZlibCodec.compress(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;

    const SAMPLE: &[u8] = b"sections sections sections sections block_states palette";

    #[test]
    fn flate_codecs_roundtrip() {
        for scheme in [CompressionScheme::Gzip, CompressionScheme::Zlib, CompressionScheme::Uncompressed] {
            let codec = get_codec(scheme);
            assert_eq!(codec.scheme(), scheme);
            let packed = codec.compress(SAMPLE).unwrap();
            assert_eq!(codec.decompress(&packed).unwrap(), SAMPLE, "{}", scheme.name());
        }
    }

    #[test]
    fn scheme_bytes() {
        assert_eq!(CompressionScheme::from_byte(2).unwrap(), CompressionScheme::Zlib);
        assert!(matches!(CompressionScheme::from_byte(9), Err(CodecError::UnknownScheme(9))));
        assert_eq!(split_external_flag(0x82), (2, true));
        assert_eq!(split_external_flag(0x01), (1, false));
    }

    fn lz4_frame(token: u8, payload: &[u8], orig_len: u32) -> Vec<u8> {
        let mut frame = LZ4_BLOCK_MAGIC.to_vec();
        frame.write_u8(token).unwrap();
        frame.write_u32::<LittleEndian>(payload.len() as u32).unwrap();
        frame.write_u32::<LittleEndian>(orig_len).unwrap();
        frame.write_u32::<LittleEndian>(0).unwrap();
        frame.extend_from_slice(payload);
        frame
    }

    #[test]
    fn lz4_block_stream_decodes() {
        let compressed = lz4_flex::block::compress(SAMPLE);
        let mut stream = lz4_frame(LZ4_METHOD_LZ4 | 0x06, &compressed, SAMPLE.len() as u32);
        stream.extend(lz4_frame(LZ4_METHOD_RAW, b"tail", 4));
        stream.extend(lz4_frame(LZ4_METHOD_RAW, &[], 0));

        let mut expected = SAMPLE.to_vec();
        expected.extend_from_slice(b"tail");
        assert_eq!(Lz4Codec.decompress(&stream).unwrap(), expected);
        assert!(Lz4Codec.compress(SAMPLE).is_err());
    }

    #[test]
    fn lz4_rejects_truncated_frame() {
        let mut stream = lz4_frame(LZ4_METHOD_RAW, b"abcdef", 6);
        stream.truncate(stream.len() - 2);
        assert!(Lz4Codec.decompress(&stream).is_err());
    }

    #[test]
    fn to_zlib_normalises() {
        let gz = GzipCodec.compress(SAMPLE).unwrap();
        let z = to_zlib(CompressionScheme::Gzip, gz).unwrap();
        assert_eq!(ZlibCodec.decompress(&z).unwrap(), SAMPLE);

        let already = ZlibCodec.compress(SAMPLE).unwrap();
        assert_eq!(to_zlib(CompressionScheme::Zlib, already.clone()).unwrap(), already);
    }
}
