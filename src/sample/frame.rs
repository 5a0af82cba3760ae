//! Frame geometry of compressed samples, and the forward scan that indexes frames

use crate::{
    result::{SampleError, SampleResult},
    riff::{ChunkStream, Whence},
};

/// How one channel of one frame is stored
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum CompressionMode {
    /// 16 bit samples, stored as is
    Pcm16 = 0,
    /// 16 bit samples, 8 bit second order deltas
    Delta16To8 = 1,
    /// 24 bit samples, stored as is
    Pcm24 = 2,
    /// 24 bit samples, 16 bit third order deltas
    Delta24To16 = 3,
    /// 24 bit samples, packed 12 bit third order deltas
    Delta24To12 = 4,
    /// 24 bit samples, 8 bit third order deltas
    Delta24To8 = 5,
}

const BYTES_PER_FRAME: [usize; 6] = [4096, 2052, 768, 524, 396, 268];
const BYTES_PER_FRAME_NO_HDR: [usize; 6] = [4096, 2048, 768, 512, 384, 256];
const HEADER_SIZE: [usize; 6] = [0, 4, 0, 12, 12, 12];
const BITS_PER_SAMPLE: [usize; 6] = [16, 8, 24, 16, 12, 8];

impl CompressionMode {
    /// On-disk size of a full frame of this channel, header included
    #[must_use]
    pub const fn bytes_per_frame(self) -> usize {
        BYTES_PER_FRAME[self as usize]
    }
    /// On-disk size of a full frame of this channel, without header
    #[must_use]
    pub const fn bytes_per_frame_no_header(self) -> usize {
        BYTES_PER_FRAME_NO_HDR[self as usize]
    }
    /// Size of the header seeding the delta recurrence
    #[must_use]
    pub const fn header_size(self) -> usize {
        HEADER_SIZE[self as usize]
    }
    /// Stored bits per sample
    #[must_use]
    pub const fn bits_per_sample(self) -> usize {
        BITS_PER_SAMPLE[self as usize]
    }
    /// Whether this mode belongs to 24 bit samples
    #[must_use]
    pub const fn is_24bit(self) -> bool {
        self as u8 >= Self::Pcm24 as u8
    }
    /// Parses a frame's mode byte, rejecting modes of the other bit depth
    pub fn for_bit_depth(raw: u8, bit_depth: u16) -> SampleResult<Self> {
        let mode = Self::try_from(raw)?;
        if mode.is_24bit() != (bit_depth == 24) {
            return Err(SampleError::UnknownCompressionMode(raw));
        }
        Ok(mode)
    }
}

impl TryFrom<u8> for CompressionMode {
    type Error = SampleError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::Pcm16,
            1 => Self::Delta16To8,
            2 => Self::Pcm24,
            3 => Self::Delta24To16,
            4 => Self::Delta24To12,
            5 => Self::Delta24To8,
            _ => return Err(SampleError::UnknownCompressionMode(value)),
        })
    }
}

/// Samples per frame of 16 bit samples
pub const SAMPLES_PER_FRAME_16: usize = 2048;
/// Samples per frame of 24 bit samples
pub const SAMPLES_PER_FRAME_24: usize = 256;
/// Samples covered by one frame table entry, regardless of bit depth
pub const SAMPLES_PER_TABLE_ENTRY: usize = 2048;

/// Frame layout of a compressed sample, established by one forward scan
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameIndex {
    /// Byte offsets of every frame starting at a multiple of [`SAMPLES_PER_TABLE_ENTRY`]
    pub table: Vec<usize>,
    /// Sum of all frames' sample counts
    pub samples_total: usize,
    /// Sample count of the final, possibly short, frame
    pub samples_in_last_frame: usize,
}

fn read_u8(stream: &mut impl ChunkStream) -> u8 {
    let mut b = [0];
    stream.read(&mut b);
    b[0]
}

/// Walks all frames of `stream` by their mode bytes, without decoding anything.
///
/// Leaves the stream positioned at its start.
pub fn scan(
    stream: &mut impl ChunkStream,
    channels: u16,
    bit_depth: u16,
) -> SampleResult<FrameIndex> {
    let samples_per_frame = if bit_depth == 24 {
        SAMPLES_PER_FRAME_24
    } else {
        SAMPLES_PER_FRAME_16
    };
    let mut index = FrameIndex::default();
    stream.set_pos(0, Whence::Start);
    if !stream.is_ready() {
        return Ok(index);
    }
    for i in 0usize.. {
        // 24 bit frames are small, every 8th offset is enough
        if bit_depth != 24 || i & 7 == 0 {
            index.table.push(stream.pos());
        }
        let (frame_size, header_size, bits) = if channels == 2 {
            let l = CompressionMode::for_bit_depth(read_u8(stream), bit_depth)?;
            let r = CompressionMode::for_bit_depth(read_u8(stream), bit_depth)?;
            (
                l.bytes_per_frame() + r.bytes_per_frame(),
                l.header_size() + r.header_size(),
                l.bits_per_sample() + r.bits_per_sample(),
            )
        } else {
            let mode = CompressionMode::for_bit_depth(read_u8(stream), bit_depth)?;
            (
                mode.bytes_per_frame(),
                mode.header_size(),
                mode.bits_per_sample(),
            )
        };
        let remaining = stream.remaining();
        if remaining <= frame_size {
            index.samples_in_last_frame = (remaining.saturating_sub(header_size) << 3) / bits;
            index.samples_total += index.samples_in_last_frame;
            break;
        }
        index.samples_total += samples_per_frame;
        stream.set_pos(frame_size, Whence::CurPos);
    }
    stream.set_pos(0, Whence::Start);
    tracing::debug!(
        frames = index.table.len(),
        samples = index.samples_total,
        "Scanned compressed sample"
    );
    Ok(index)
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::riff::{ChunkId, MemChunk},
    };

    #[test]
    fn geometry_is_consistent() {
        for raw in 0..6 {
            let mode = CompressionMode::try_from(raw).unwrap();
            assert_eq!(
                mode.bytes_per_frame(),
                mode.bytes_per_frame_no_header() + mode.header_size()
            );
            let samples = if mode.is_24bit() {
                SAMPLES_PER_FRAME_24
            } else {
                SAMPLES_PER_FRAME_16
            };
            assert_eq!(
                mode.bytes_per_frame_no_header(),
                samples * mode.bits_per_sample() / 8
            );
        }
        assert_eq!(
            CompressionMode::try_from(6),
            Err(SampleError::UnknownCompressionMode(6))
        );
        assert_eq!(
            CompressionMode::for_bit_depth(3, 16),
            Err(SampleError::UnknownCompressionMode(3))
        );
        assert_eq!(
            CompressionMode::for_bit_depth(1, 24),
            Err(SampleError::UnknownCompressionMode(1))
        );
    }

    #[test]
    fn scan_mono_16() {
        // Two full mode 1 frames, then a 10 sample mode 0 frame
        let mut data = Vec::new();
        for _ in 0..2 {
            data.push(1);
            data.extend_from_slice(&[0; 2052]);
        }
        data.push(0);
        data.extend_from_slice(&[0; 20]);
        let mut ck = MemChunk::new(ChunkId::DATA, &data);
        let index = scan(&mut ck, 1, 16).unwrap();
        assert_eq!(index.table, [0, 2053, 4106]);
        assert_eq!(index.samples_total, 2 * 2048 + 10);
        assert_eq!(index.samples_in_last_frame, 10);
        assert_eq!(ck.pos(), 0);
    }

    #[test]
    fn scan_stereo_24_keeps_every_8th_offset() {
        let frame = 2 + CompressionMode::Delta24To8.bytes_per_frame() * 2;
        let mut data = Vec::new();
        for _ in 0..9 {
            data.extend_from_slice(&[5, 5]);
            data.extend_from_slice(&[0; 268 * 2]);
        }
        // Last frame: 100 samples per channel
        data.extend_from_slice(&[5, 5]);
        data.extend_from_slice(&[0; 24 + 200]);
        let mut ck = MemChunk::new(ChunkId::DATA, &data);
        let index = scan(&mut ck, 2, 24).unwrap();
        assert_eq!(index.table, [0, 8 * frame]);
        assert_eq!(index.samples_total, 9 * 256 + 100);
    }

    #[test]
    fn scan_rejects_unknown_modes() {
        let data = [1, 9, 0, 0];
        let mut ck = MemChunk::new(ChunkId::DATA, &data);
        assert_eq!(
            scan(&mut ck, 2, 16),
            Err(SampleError::UnknownCompressionMode(9))
        );
    }
}
