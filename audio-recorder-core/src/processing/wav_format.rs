//! WAV file format utilities.
//!
//! Generates RIFF/WAVE headers and encodes f32 samples into the
//! little-endian sample formats the writer supports.
//!
//! Mono and stereo 16-bit PCM or 32-bit float use the plain 16-byte `fmt `
//! chunk (44-byte header). More than two channels, or integer PCM deeper
//! than 16 bits, use `WAVE_FORMAT_EXTENSIBLE` (68-byte header).

use crate::models::audio_models::{OutputFileFormat, SampleEncoding};

/// Size of the plain WAV RIFF header in bytes.
pub const WAV_HEADER_SIZE: usize = 44;

/// Size of the header with a `WAVE_FORMAT_EXTENSIBLE` fmt chunk.
pub const WAV_EXTENSIBLE_HEADER_SIZE: usize = 68;

/// `WAVE_FORMAT_PCM`.
pub const FORMAT_PCM: u16 = 1;

/// `WAVE_FORMAT_IEEE_FLOAT`.
pub const FORMAT_IEEE_FLOAT: u16 = 3;

/// `WAVE_FORMAT_EXTENSIBLE`.
pub const FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// Largest data chunk a RIFF file can describe, leaving room for the
/// extensible header and a pad byte.
pub const MAX_DATA_SIZE: u64 = u32::MAX as u64 - (WAV_EXTENSIBLE_HEADER_SIZE as u64 - 8) - 1;

/// Largest encoded sample, in bytes.
pub const MAX_SAMPLE_BYTES: usize = 4;

/// Tail of the KSDATAFORMAT_SUBTYPE GUIDs; the first two bytes carry the
/// format code.
const SUBTYPE_GUID_TAIL: [u8; 14] = [
    0x00, 0x00, 0x00, 0x00, 0x10, 0x00, 0x80, 0x00, 0x00, 0xAA, 0x00, 0x38, 0x9B, 0x71,
];

/// Whether `format` needs a `WAVE_FORMAT_EXTENSIBLE` fmt chunk.
pub fn needs_extensible(format: &OutputFileFormat) -> bool {
    format.channels > 2 || (format.encoding == SampleEncoding::PcmInt && format.bit_depth > 16)
}

/// Header length for `format`: where the sample data starts.
pub fn header_size(format: &OutputFileFormat) -> usize {
    if needs_extensible(format) {
        WAV_EXTENSIBLE_HEADER_SIZE
    } else {
        WAV_HEADER_SIZE
    }
}

/// Pad bytes that follow a data chunk of `data_size` bytes (RIFF chunks
/// are word aligned).
pub fn pad_size(data_size: u32) -> u32 {
    data_size & 1
}

/// Generate a WAV RIFF header.
///
/// Plain layout:
/// ```text
/// [0-3]    "RIFF"
/// [4-7]    36 + data_size + pad
/// [8-11]   "WAVE"
/// [12-15]  "fmt "
/// [16-19]  16 (fmt chunk size)
/// [20-21]  format code (1 = PCM, 3 = IEEE float)
/// [22-23]  channels
/// [24-27]  sample_rate
/// [28-31]  byte_rate = sample_rate * channels * bit_depth / 8
/// [32-33]  block_align = channels * bit_depth / 8
/// [34-35]  bit_depth
/// [36-39]  "data"
/// [40-43]  data_size
/// ```
///
/// The extensible layout has a 40-byte fmt chunk (format code 0xFFFE,
/// cbSize 22, valid bits, channel mask, subformat GUID), moving `data`
/// to offset 60.
pub fn generate_wav_header(format: &OutputFileFormat, data_size: u32) -> Vec<u8> {
    let extensible = needs_extensible(format);
    let header_len = header_size(format);
    let fmt_len: u32 = if extensible { 40 } else { 16 };
    let byte_rate = format.sample_rate * format.bytes_per_frame();
    let block_align = format.bytes_per_frame() as u16;
    let riff_size = (header_len as u32 - 8) + data_size + pad_size(data_size);

    let mut header = Vec::with_capacity(header_len);

    header.extend_from_slice(b"RIFF");
    header.extend_from_slice(&riff_size.to_le_bytes());
    header.extend_from_slice(b"WAVE");

    header.extend_from_slice(b"fmt ");
    header.extend_from_slice(&fmt_len.to_le_bytes());
    let tag = if extensible {
        FORMAT_EXTENSIBLE
    } else {
        format_code(format.encoding)
    };
    header.extend_from_slice(&tag.to_le_bytes());
    header.extend_from_slice(&format.channels.to_le_bytes());
    header.extend_from_slice(&format.sample_rate.to_le_bytes());
    header.extend_from_slice(&byte_rate.to_le_bytes());
    header.extend_from_slice(&block_align.to_le_bytes());
    header.extend_from_slice(&format.bit_depth.to_le_bytes());

    if extensible {
        header.extend_from_slice(&22u16.to_le_bytes());
        header.extend_from_slice(&format.bit_depth.to_le_bytes());
        header.extend_from_slice(&channel_mask(format.channels).to_le_bytes());
        header.extend_from_slice(&format_code(format.encoding).to_le_bytes());
        header.extend_from_slice(&SUBTYPE_GUID_TAIL);
    }

    header.extend_from_slice(b"data");
    header.extend_from_slice(&data_size.to_le_bytes());

    debug_assert_eq!(header.len(), header_len);
    header
}

/// Speaker positions for common layouts; 0 leaves them unassigned.
fn channel_mask(channels: u16) -> u32 {
    match channels {
        1 => 0x4,
        2 => 0x3,
        4 => 0x33,
        6 => 0x3F,
        8 => 0x63F,
        _ => 0,
    }
}

pub fn format_code(encoding: SampleEncoding) -> u16 {
    match encoding {
        SampleEncoding::PcmInt => FORMAT_PCM,
        SampleEncoding::Float => FORMAT_IEEE_FLOAT,
    }
}

/// Encode one sample into `out`, returning the number of bytes used.
///
/// Integer encodings clamp to [-1.0, 1.0] and scale by the positive
/// maximum, so -1.0 maps to `-MAX` rather than `MIN`.
#[inline]
pub fn encode_sample(
    sample: f32,
    format: &OutputFileFormat,
    out: &mut [u8; MAX_SAMPLE_BYTES],
) -> usize {
    match (format.encoding, format.bit_depth) {
        (SampleEncoding::Float, _) => {
            out.copy_from_slice(&sample.to_le_bytes());
            4
        }
        (SampleEncoding::PcmInt, 16) => {
            let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            out[..2].copy_from_slice(&value.to_le_bytes());
            2
        }
        (SampleEncoding::PcmInt, 24) => {
            let value = (sample.clamp(-1.0, 1.0) * 8_388_607.0) as i32;
            out[..3].copy_from_slice(&value.to_le_bytes()[..3]);
            3
        }
        (SampleEncoding::PcmInt, _) => {
            let value = (sample.clamp(-1.0, 1.0) as f64 * i32::MAX as f64) as i32;
            out.copy_from_slice(&value.to_le_bytes());
            4
        }
    }
}
