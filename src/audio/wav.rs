//! # WAV Container Parsing
//!
//! Reads the canonical little-endian RIFF/WAVE layout and locates the sample data.
//!
//! ## Layout:
//! ```text
//! "RIFF" <u32 size> "WAVE"
//! "fmt " <u32 size> <u16 format> <u16 channels> <u32 rate> <u32 byte rate> <u16 block align> <u16 bits>
//! <zero or more other chunks, skipped>
//! "data" <u32 size> <samples...>
//! ```
//!
//! Only the `data` chunk is interpreted after the format block. Metadata chunks
//! (`LIST`, `fact`, ...) are skipped without validation.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::ops::Range;
use std::path::Path;
use tracing::debug;

use crate::audio::buffer::SampleBuffer;
use crate::audio::format::{AudioMetadata, SampleWidth, WAVE_FORMAT_EXTENSIBLE, WAVE_FORMAT_PCM};
use crate::error::{StreamError, StreamResult};

/// Size of the canonical header written by [`write_wav`].
pub const CANONICAL_HEADER_LEN: usize = 44;

const FMT_BLOCK_LEN: u32 = 16;

/// Result of parsing a WAV header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavLayout {
    pub metadata: AudioMetadata,

    /// Byte rate declared in the header (not used for streaming)
    pub byte_rate: u32,

    /// Block align declared in the header (not used for streaming)
    pub block_align: u16,

    /// Absolute byte range of the sample payload
    pub data: Range<u64>,
}

impl WavLayout {
    pub fn data_len(&self) -> u64 {
        self.data.end - self.data.start
    }
}

fn format_err(msg: impl Into<String>) -> StreamError {
    StreamError::Format(msg.into())
}

/// Map a short read to a format error, keeping other I/O errors as they are.
fn read_err(what: &str) -> impl FnOnce(io::Error) -> StreamError + '_ {
    move |err| {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            format_err(format!("unexpected end of input while reading {}", what))
        } else {
            StreamError::Transport(err)
        }
    }
}

fn read_tag<R: Read>(reader: &mut R, what: &str) -> StreamResult<[u8; 4]> {
    let mut tag = [0u8; 4];
    reader.read_exact(&mut tag).map_err(read_err(what))?;
    Ok(tag)
}

fn expect_tag<R: Read>(reader: &mut R, expected: &[u8; 4]) -> StreamResult<()> {
    let tag = read_tag(reader, "header tag")?;
    if &tag != expected {
        return Err(format_err(format!(
            "expected {:?} tag, found {:?}",
            String::from_utf8_lossy(expected),
            String::from_utf8_lossy(&tag)
        )));
    }
    Ok(())
}

/// Parse the header and locate the data chunk.
///
/// On success the reader is positioned at the first sample byte.
///
/// ## Errors:
/// - **Format**: bad tags, short header, unsupported format tag or bit depth,
///   zero frame size, or no `data` chunk before the end of input
/// - **Transport**: the underlying reader failed
pub fn parse_header<R: Read + Seek>(reader: &mut R) -> StreamResult<WavLayout> {
    expect_tag(reader, b"RIFF")?;
    let _riff_size = reader.read_u32::<LittleEndian>().map_err(read_err("RIFF size"))?;
    expect_tag(reader, b"WAVE")?;
    expect_tag(reader, b"fmt ")?;

    let fmt_size = reader.read_u32::<LittleEndian>().map_err(read_err("fmt size"))?;
    if fmt_size < FMT_BLOCK_LEN {
        return Err(format_err(format!("fmt chunk too short: {} bytes", fmt_size)));
    }
    let format = reader.read_u16::<LittleEndian>().map_err(read_err("format tag"))?;
    let channels = reader.read_u16::<LittleEndian>().map_err(read_err("channel count"))?;
    let sample_rate = reader.read_u32::<LittleEndian>().map_err(read_err("sample rate"))?;
    let byte_rate = reader.read_u32::<LittleEndian>().map_err(read_err("byte rate"))?;
    let block_align = reader.read_u16::<LittleEndian>().map_err(read_err("block align"))?;
    let bit_depth = reader.read_u16::<LittleEndian>().map_err(read_err("bits per sample"))?;

    // Extension bytes (cbSize, WAVE_FORMAT_EXTENSIBLE fields) are not interpreted
    let fmt_extra = fmt_size - FMT_BLOCK_LEN;
    if fmt_extra > 0 {
        reader.seek(SeekFrom::Current(padded(fmt_extra) as i64))?;
    }

    let metadata = AudioMetadata::new(sample_rate, channels, bit_depth, format);
    validate_metadata(&metadata)?;

    let (data_start, data_len) = find_data_chunk(reader)?;
    let end_of_input = reader.seek(SeekFrom::End(0))?;
    let data_end = data_start + data_len as u64;
    if data_end > end_of_input {
        return Err(format_err(format!(
            "data chunk declares {} bytes but only {} are present",
            data_len,
            end_of_input.saturating_sub(data_start)
        )));
    }
    reader.seek(SeekFrom::Start(data_start))?;

    debug!(
        sample_rate,
        channels,
        bit_depth,
        format,
        data_len,
        "Parsed WAV header"
    );

    Ok(WavLayout {
        metadata,
        byte_rate,
        block_align,
        data: data_start..data_end,
    })
}

fn validate_metadata(metadata: &AudioMetadata) -> StreamResult<()> {
    if metadata.format != WAVE_FORMAT_PCM && metadata.format != WAVE_FORMAT_EXTENSIBLE {
        return Err(format_err(format!(
            "unsupported format tag {:#06x}, only linear PCM is supported",
            metadata.format
        )));
    }
    if metadata.frame_size() == 0 {
        return Err(format_err(format!(
            "invalid frame size computed from metadata: channels={} bitdepth={}",
            metadata.channels, metadata.bit_depth
        )));
    }
    if SampleWidth::from_bit_depth(metadata.bit_depth).is_none() {
        return Err(format_err(format!(
            "unsupported bit depth {}, expected 8, 16, 24 or 32",
            metadata.bit_depth
        )));
    }
    Ok(())
}

/// RIFF chunks are word aligned: odd sizes carry one pad byte.
fn padded(size: u32) -> u64 {
    size as u64 + (size as u64 & 1)
}

/// Scan chunk headers until the `data` chunk. Returns its offset and declared length.
fn find_data_chunk<R: Read + Seek>(reader: &mut R) -> StreamResult<(u64, u32)> {
    loop {
        let mut id = [0u8; 4];
        match reader.read_exact(&mut id) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(format_err("no data chunk found before end of input"));
            }
            Err(err) => return Err(err.into()),
        }
        let size = reader
            .read_u32::<LittleEndian>()
            .map_err(|_| format_err("no data chunk found before end of input"))?;

        if &id == b"data" {
            let offset = reader.stream_position()?;
            return Ok((offset, size));
        }

        debug!(chunk = %String::from_utf8_lossy(&id), size, "Skipping WAV chunk");
        reader.seek(SeekFrom::Current(padded(size) as i64))?;
    }
}

/// Parse a WAV stream and load its sample payload.
pub fn read_wav<R: Read + Seek>(reader: &mut R) -> StreamResult<(AudioMetadata, SampleBuffer)> {
    let layout = parse_header(reader)?;

    let mut samples = vec![0u8; layout.data_len() as usize];
    reader.read_exact(&mut samples).map_err(read_err("samples"))?;

    let buffer = SampleBuffer::new(samples, layout.metadata.frame_size())?;
    Ok((layout.metadata, buffer))
}

/// Open and read a WAV file. The file handle is closed before returning.
pub fn read_wav_file(path: impl AsRef<Path>) -> StreamResult<(AudioMetadata, SampleBuffer)> {
    let file = File::open(path.as_ref())?;
    let mut reader = BufReader::new(file);
    read_wav(&mut reader)
}

/// Write a canonical 44-byte-header WAV.
pub fn write_wav<W: Write>(writer: &mut W, metadata: &AudioMetadata, samples: &[u8]) -> StreamResult<()> {
    let data_len = u32::try_from(samples.len())
        .map_err(|_| format_err("sample data too large for a WAV container"))?;
    let riff_len = data_len
        .checked_add(CANONICAL_HEADER_LEN as u32 - 8)
        .ok_or_else(|| format_err("sample data too large for a WAV container"))?;
    let block_align = metadata.frame_size() as u16;
    let byte_rate = metadata.sample_rate * block_align as u32;

    writer.write_all(b"RIFF")?;
    writer.write_u32::<LittleEndian>(riff_len)?;
    writer.write_all(b"WAVE")?;

    writer.write_all(b"fmt ")?;
    writer.write_u32::<LittleEndian>(FMT_BLOCK_LEN)?;
    writer.write_u16::<LittleEndian>(WAVE_FORMAT_PCM)?;
    writer.write_u16::<LittleEndian>(metadata.channels)?;
    writer.write_u32::<LittleEndian>(metadata.sample_rate)?;
    writer.write_u32::<LittleEndian>(byte_rate)?;
    writer.write_u16::<LittleEndian>(block_align)?;
    writer.write_u16::<LittleEndian>(metadata.bit_depth)?;

    writer.write_all(b"data")?;
    writer.write_u32::<LittleEndian>(data_len)?;
    writer.write_all(samples)?;
    if data_len % 2 == 1 {
        writer.write_u8(0)?;
    }
    Ok(())
}

pub fn write_wav_file(path: impl AsRef<Path>, metadata: &AudioMetadata, samples: &[u8]) -> StreamResult<()> {
    let mut writer = BufWriter::new(File::create(path.as_ref())?);
    write_wav(&mut writer, metadata, samples)?;
    writer.flush()?;
    Ok(())
}
