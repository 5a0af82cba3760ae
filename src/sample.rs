//! Streaming of Gigasampler sample data, compressed or plain PCM

mod buffer;
pub mod decompress;
pub mod frame;
mod looping;

pub use {
    buffer::{DecompressionBuffer, RamCache, create_decompression_buffer},
    looping::{LoopType, PlaybackState, SampleLoop},
};

use {
    crate::{
        result::{SampleError, SampleResult},
        riff::{ChunkId, ChunkList, ChunkStream, Whence},
    },
    decompress::{Channel, Span, decompress16, decompress24},
    frame::{
        CompressionMode, FrameIndex, SAMPLES_PER_FRAME_16, SAMPLES_PER_FRAME_24,
        SAMPLES_PER_TABLE_ENTRY,
    },
    std::mem,
};

/// Layout of the decoded sample points
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SampleFormat {
    /// 1 (mono) or 2 (stereo)
    pub channels: u16,
    /// 8, 16 or 24. Compressed samples are 16 or 24 bit.
    pub bit_depth: u16,
    /// Sample points per second
    pub sample_rate: u32,
}

/// Gigasampler compression parameters, from the `ewav` chunk
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CompressionInfo {
    /// The 24 bit data was dithered before compression
    pub dithered: bool,
    /// Low bits cut off each 24 bit sample before compression
    pub truncated_bits: u32,
}

#[derive(Debug)]
struct Compression {
    info: CompressionInfo,
    index: FrameIndex,
}

/// Head of the `fmt ` chunk
#[derive(Clone, Copy, bytemuck::AnyBitPattern)]
#[repr(C)]
struct FmtHeader {
    _format_tag: u16,
    channels: u16,
    samples_per_sec: u32,
    _avg_bytes_per_sec: u32,
    _block_align: u16,
    bits_per_sample: u16,
}

/// Head of the `smpl` chunk, followed by the loops
#[derive(Clone, Copy, bytemuck::AnyBitPattern)]
#[repr(C)]
struct SmplHeader {
    _manufacturer: u32,
    _product: u32,
    _sample_period: u32,
    midi_unity_note: u32,
    midi_pitch_fraction: u32,
    _smpte_format: u32,
    _smpte_offset: u32,
    loop_count: u32,
    _sampler_data: u32,
}

#[derive(Clone, Copy, bytemuck::AnyBitPattern)]
#[repr(C)]
struct SmplLoop {
    _cue_point_id: u32,
    loop_type: u32,
    start: u32,
    end: u32,
    _fraction: u32,
    play_count: u32,
}

fn read_pod<T: bytemuck::AnyBitPattern>(ck: &mut impl ChunkStream) -> Option<T> {
    let mut buf = vec![0; size_of::<T>()];
    (ck.read(&mut buf) == buf.len()).then(|| bytemuck::pod_read_unaligned(&buf))
}

const EWAV_TRUNCATED_BITS_MONO: usize = 64;
const EWAV_TRUNCATED_BITS_STEREO: usize = 84;

fn read_u32_at(ck: &mut impl ChunkStream, pos: usize) -> Option<u32> {
    ck.set_pos(pos, Whence::Start);
    read_pod::<u32>(ck).map(u32::from_le)
}

/// A sample, streamed from its `data` chunk
#[derive(Debug)]
pub struct Sample<S> {
    data: S,
    format: SampleFormat,
    compression: Option<Compression>,
    samples_total: usize,
    sample_pos: usize,
    frame_offset: usize,
    internal_buffer: DecompressionBuffer,
    cache: RamCache,
    sample_loop: Option<SampleLoop>,
    midi_unity_note: u8,
    fine_tune: u32,
}

impl<S: ChunkStream> Sample<S> {
    /// Creates a sample streaming from `data`.
    ///
    /// Compressed samples are scanned once here to index their frames.
    pub fn new(
        mut data: S,
        format: SampleFormat,
        compression: Option<CompressionInfo>,
    ) -> SampleResult<Self> {
        if !matches!(format.channels, 1 | 2) {
            return Err(SampleError::UnsupportedChannels(format.channels));
        }
        let depth_ok = if compression.is_some() {
            matches!(format.bit_depth, 16 | 24)
        } else {
            matches!(format.bit_depth, 8 | 16 | 24)
        };
        if !depth_ok {
            return Err(SampleError::UnsupportedBitDepth(format.bit_depth));
        }
        let frame_size = usize::from(format.channels) * usize::from(format.bit_depth / 8);
        let (compression, samples_total) = match compression {
            Some(info) => {
                let index = frame::scan(&mut data, format.channels, format.bit_depth)?;
                let total = index.samples_total;
                (Some(Compression { info, index }), total)
            }
            None => (None, data.size() / frame_size),
        };
        Ok(Self {
            data,
            format,
            compression,
            samples_total,
            sample_pos: 0,
            frame_offset: 0,
            internal_buffer: DecompressionBuffer::default(),
            cache: RamCache::default(),
            sample_loop: None,
            midi_unity_note: 60,
            fine_tune: 0,
        })
    }
    /// Creates a sample from the sub chunks of a `wave` list.
    ///
    /// The sample is compressed if the list has an `ewav` chunk.
    pub fn from_wave_list<L: ChunkList<Chunk = S>>(list: &L) -> SampleResult<Self> {
        let mut fmt = list
            .sub_chunk(ChunkId::FMT)
            .ok_or(SampleError::MissingChunk(ChunkId::FMT))?;
        let header: FmtHeader = read_pod(&mut fmt).ok_or(SampleError::InvalidFormatChunk)?;
        let format = SampleFormat {
            channels: u16::from_le(header.channels),
            bit_depth: u16::from_le(header.bits_per_sample),
            sample_rate: u32::from_le(header.samples_per_sec),
        };
        let data = list
            .sub_chunk(ChunkId::DATA)
            .ok_or(SampleError::MissingChunk(ChunkId::DATA))?;
        let compression = list
            .sub_chunk(ChunkId::EWAV)
            .map(|mut ewav| read_compression_info(&mut ewav, format));
        tracing::debug!(
            channels = format.channels,
            bit_depth = format.bit_depth,
            compressed = compression.is_some(),
            "Opening wave"
        );
        let mut sample = Self::new(data, format, compression)?;
        if let Some(mut smpl) = list.sub_chunk(ChunkId::SMPL) {
            sample.read_smpl(&mut smpl);
        }
        Ok(sample)
    }
    fn read_smpl(&mut self, ck: &mut S) {
        let Some(header) = read_pod::<SmplHeader>(ck) else {
            tracing::warn!("Ignoring truncated smpl chunk");
            return;
        };
        self.midi_unity_note = u8::try_from(u32::from_le(header.midi_unity_note)).unwrap_or(60);
        self.fine_tune = u32::from_le(header.midi_pitch_fraction);
        if u32::from_le(header.loop_count) == 0 {
            return;
        }
        if let Some(lp) = read_pod::<SmplLoop>(ck) {
            let start = u32::from_le(lp.start);
            let end = u32::from_le(lp.end);
            self.sample_loop = Some(SampleLoop {
                loop_type: LoopType::from_raw(u32::from_le(lp.loop_type)),
                start,
                length: end.saturating_sub(start).saturating_add(1),
                play_count: u32::from_le(lp.play_count),
            });
        }
    }
    /// Sample point layout
    pub const fn format(&self) -> SampleFormat {
        self.format
    }
    /// Compression parameters, if the sample is compressed
    pub fn compression(&self) -> Option<CompressionInfo> {
        self.compression.as_ref().map(|c| c.info)
    }
    /// Whether the sample data is stored in compressed frames
    pub const fn is_compressed(&self) -> bool {
        self.compression.is_some()
    }
    /// First loop of the `smpl` chunk
    pub const fn sample_loop(&self) -> Option<SampleLoop> {
        self.sample_loop
    }
    /// MIDI note the sample plays at its original pitch
    pub const fn midi_unity_note(&self) -> u8 {
        self.midi_unity_note
    }
    /// Fraction of a semitone above the unity note, in 1/2^32 steps
    pub const fn fine_tune(&self) -> u32 {
        self.fine_tune
    }
    /// Number of sample points (one per channel each)
    pub const fn samples_total(&self) -> usize {
        self.samples_total
    }
    /// Bytes per decoded sample point, all channels included
    pub fn frame_size(&self) -> usize {
        usize::from(self.format.channels) * usize::from(self.format.bit_depth / 8)
    }
    /// Sample points per compressed frame. 0 for uncompressed samples.
    pub const fn samples_per_frame(&self) -> usize {
        match (&self.compression, self.format.bit_depth) {
            (None, _) => 0,
            (Some(_), 24) => SAMPLES_PER_FRAME_24,
            (Some(_), _) => SAMPLES_PER_FRAME_16,
        }
    }
    /// Upper bound of a compressed frame's size, mode bytes included
    pub fn worst_case_frame_size(&self) -> usize {
        self.samples_per_frame() * self.frame_size() + usize::from(self.format.channels)
    }
    /// Estimate of the compressed bytes holding `samples` sample points,
    /// plus one worst case frame
    pub fn guess_size(&self, samples: usize) -> usize {
        let size = if self.format.bit_depth == 24 {
            samples + (samples >> 1) + (samples >> 8) * 13
        } else {
            samples + (samples >> 10) * 5
        };
        let size = if self.format.channels == 2 {
            size << 1
        } else {
            size
        };
        size + self.worst_case_frame_size()
    }
    /// Sample points one read through `buffer` is guaranteed to fit
    pub fn worst_case_max_samples(&self, buffer: &DecompressionBuffer) -> usize {
        match self.worst_case_frame_size() {
            0 => 0,
            wcfs => buffer.size() / wcfs * self.samples_per_frame(),
        }
    }
    /// Current position in sample points
    pub fn get_pos(&self) -> usize {
        if self.compression.is_some() {
            self.sample_pos
        } else {
            self.data.pos() / self.frame_size()
        }
    }
    /// Moves the read position to sample point `count`, relative to `whence`.
    ///
    /// Returns the new position, which is clamped to the sample.
    pub fn set_pos(&mut self, count: usize, whence: Whence) -> usize {
        let Some(comp) = &self.compression else {
            let frame_size = self.frame_size();
            return self.data.set_pos(count.saturating_mul(frame_size), whence) / frame_size;
        };
        let pos = match whence {
            Whence::Start => count,
            Whence::CurPos => self.sample_pos.saturating_add(count),
            Whence::Backward => self.sample_pos.saturating_sub(count),
            Whence::End => self.samples_total.saturating_sub(1).saturating_sub(count),
        };
        self.sample_pos = pos.min(self.samples_total);
        let frame = self.sample_pos / SAMPLES_PER_TABLE_ENTRY;
        self.frame_offset = self.sample_pos % SAMPLES_PER_TABLE_ENTRY;
        let offset = comp
            .index
            .table
            .get(frame)
            .copied()
            .unwrap_or_else(|| self.data.size());
        self.data.set_pos(offset, Whence::Start);
        self.sample_pos
    }
    /// Reads up to `count` sample points into `buf`, as little endian
    /// interleaved PCM. Returns the amount of sample points read.
    ///
    /// Compressed samples are read through `scratch` if given, or through a
    /// buffer owned by this sample otherwise.
    pub fn read(
        &mut self,
        buf: &mut [u8],
        count: usize,
        scratch: Option<&mut DecompressionBuffer>,
    ) -> SampleResult<usize> {
        let frame_size = self.frame_size();
        let count = count.min(buf.len() / frame_size);
        if count == 0 {
            return Ok(0);
        }
        if self.compression.is_none() {
            let read = self.data.read(&mut buf[..count * frame_size]);
            return Ok(read / frame_size);
        }
        if let Some(scratch) = scratch {
            return self.read_compressed(buf, count, scratch);
        }
        let mut internal = mem::take(&mut self.internal_buffer);
        internal.grow(self.guess_size(count));
        let result = self.read_compressed(buf, count, &mut internal);
        self.internal_buffer = internal;
        result
    }
    #[expect(clippy::too_many_lines)]
    fn read_compressed(
        &mut self,
        buf: &mut [u8],
        mut count: usize,
        scratch: &mut DecompressionBuffer,
    ) -> SampleResult<usize> {
        let Some(comp) = &self.compression else {
            return Ok(0);
        };
        let (truncated_bits, samples_in_last_frame) =
            (comp.info.truncated_bits, comp.index.samples_in_last_frame);
        if self.sample_pos >= self.samples_total {
            return Ok(0);
        }
        let bit_depth = self.format.bit_depth;
        let stereo = self.format.channels == 2;
        let channels = usize::from(self.format.channels);
        let samples_per_frame = self.samples_per_frame();
        let wcfs = self.worst_case_frame_size();
        let mut assumed = self.guess_size(count);
        if scratch.size() < assumed {
            let reduced = self.worst_case_max_samples(scratch);
            tracing::warn!(
                "Decompression buffer too small ({} < {assumed} bytes), reading {reduced} instead of {count} samples",
                scratch.size()
            );
            count = reduced;
            assumed = self.guess_size(count);
        }
        let mut remaining_samples = count;
        let mut frame_offset = mem::take(&mut self.frame_offset);
        let len = assumed.min(scratch.size());
        let mut filled = self.data.read(&mut scratch.bytes_mut()[..len]);
        let mut remaining_bytes = filled;
        let mut p = 0;
        let mut dst = 0;
        while remaining_samples > 0 && remaining_bytes > 0 {
            let src = &scratch.bytes()[..filled];
            let mode_at = |at: usize| {
                let raw = *src.get(at).ok_or(SampleError::TruncatedFrame)?;
                CompressionMode::for_bit_depth(raw, bit_depth)
            };
            let mode_l = mode_at(p)?;
            p += 1;
            let mut frame_samples = samples_per_frame;
            let frame_bytes;
            let next_frame_offset;
            let mut right_offset = 0;
            let mut mode_r = None;
            if stereo {
                let r = mode_at(p)?;
                p += 1;
                frame_bytes = mode_l.bytes_per_frame() + r.bytes_per_frame() + 2;
                right_offset = mode_l.bytes_per_frame_no_header();
                next_frame_offset = right_offset + r.bytes_per_frame_no_header();
                if remaining_bytes < frame_bytes {
                    frame_samples = samples_in_last_frame;
                    // Odd 12 bit tails are padded to whole byte triples
                    let n = if mode_l == CompressionMode::Delta24To12 && frame_samples & 1 == 1 {
                        frame_samples + 1
                    } else {
                        frame_samples
                    };
                    right_offset = (n * mode_l.bits_per_sample()) >> 3;
                }
                mode_r = Some(r);
            } else {
                frame_bytes = mode_l.bytes_per_frame() + 1;
                next_frame_offset = mode_l.bytes_per_frame_no_header();
                if remaining_bytes < frame_bytes {
                    frame_samples = samples_in_last_frame;
                }
            }

            let span = if frame_offset + remaining_samples >= frame_samples {
                if frame_offset <= frame_samples {
                    Span {
                        skip: frame_offset,
                        copy: frame_samples - frame_offset,
                    }
                } else {
                    Span {
                        skip: frame_samples,
                        copy: 0,
                    }
                }
            } else {
                // Only part of this frame is wanted, the next read starts over at its beginning
                self.data.set_pos(remaining_bytes, Whence::Backward);
                self.frame_offset = frame_offset + remaining_samples;
                Span {
                    skip: frame_offset,
                    copy: remaining_samples,
                }
            };
            remaining_samples -= span.copy;

            if remaining_bytes > frame_bytes {
                remaining_bytes -= frame_bytes;
                if remaining_samples == 0 && frame_offset + span.copy == frame_samples {
                    // Stopped exactly at the end of a frame
                    self.data.set_pos(remaining_bytes, Whence::Backward);
                }
            } else {
                remaining_bytes = 0;
            }
            frame_offset -= span.skip;

            if span.copy == 0 {
                p += frame_bytes - channels;
            } else {
                let out = buf.get_mut(dst..).ok_or(SampleError::BufferTooSmall)?;
                let header = |at: usize, mode: CompressionMode| {
                    src.get(at..at + mode.header_size())
                        .ok_or(SampleError::TruncatedFrame)
                };
                let data = |at: usize| src.get(at..).ok_or(SampleError::TruncatedFrame);
                let params_l = header(p, mode_l)?;
                p += params_l.len();
                let params_r = match mode_r {
                    Some(r) => header(p, r)?,
                    None => &[],
                };
                p += params_r.len();
                let bytes_l = mode_l.bits_per_sample() / 8;
                let left = Channel {
                    mode: mode_l,
                    params: params_l,
                    data: data(p)?,
                    stride: mode_r.map_or(bytes_l, |r| bytes_l + r.bits_per_sample() / 8),
                };
                if bit_depth == 24 {
                    let step = 3 * channels;
                    decompress24(&left, out, step, span, truncated_bits)?;
                    if let Some(mode) = mode_r {
                        let right = Channel {
                            mode,
                            params: params_r,
                            data: data(p + right_offset)?,
                            stride: 0,
                        };
                        let out = out.get_mut(3..).ok_or(SampleError::BufferTooSmall)?;
                        decompress24(&right, out, step, span, truncated_bits)?;
                    }
                    dst += span.copy * step;
                } else {
                    let step = 2 * channels;
                    decompress16(&left, out, step, span)?;
                    if let Some(mode) = mode_r {
                        let right = Channel {
                            mode,
                            params: params_r,
                            data: data(p + bytes_l)?,
                            stride: left.stride,
                        };
                        let out = out.get_mut(2..).ok_or(SampleError::BufferTooSmall)?;
                        decompress16(&right, out, step, span)?;
                    }
                    dst += span.copy * step;
                }
                p += next_frame_offset;
            }

            if remaining_samples > 0 && remaining_bytes < wcfs && self.data.is_ready() {
                self.data.set_pos(remaining_bytes, Whence::Backward);
                let assumed = self
                    .guess_size(remaining_samples)
                    .min(self.data.remaining())
                    .min(scratch.size());
                filled = self.data.read(&mut scratch.bytes_mut()[..assumed]);
                remaining_bytes = filled;
                p = 0;
            }
        }
        let read = count - remaining_samples;
        self.sample_pos = (self.sample_pos + read).min(self.samples_total);
        Ok(read)
    }
    fn fill_cache(&mut self, count: usize, null_samples: usize) -> SampleResult<&RamCache> {
        let frame_size = self.frame_size();
        let count = count.min(self.samples_total);
        let mut data = vec![0; (count + null_samples) * frame_size];
        self.set_pos(0, Whence::Start);
        let mut read = 0;
        while read < count {
            let n = self.read(&mut data[read * frame_size..count * frame_size], count - read, None)?;
            if n == 0 {
                break;
            }
            read += n;
        }
        self.cache = RamCache {
            data,
            size: read * frame_size,
        };
        tracing::debug!(
            samples = read,
            null_bytes = self.cache.null_extension_size(),
            "Cached sample"
        );
        Ok(&self.cache)
    }
    /// Decodes the whole sample into memory
    pub fn load_sample_data(&mut self) -> SampleResult<&RamCache> {
        self.fill_cache(self.samples_total, 0)
    }
    /// Decodes the first `count` sample points into memory
    pub fn load_sample_data_partial(&mut self, count: usize) -> SampleResult<&RamCache> {
        self.fill_cache(count, 0)
    }
    /// Decodes the whole sample into memory, followed by `null_samples` silent sample points
    pub fn load_sample_data_with_null_samples_extension(
        &mut self,
        null_samples: usize,
    ) -> SampleResult<&RamCache> {
        self.fill_cache(self.samples_total, null_samples)
    }
    /// Frees the cached sample data
    pub fn release_sample_data(&mut self) {
        self.cache = RamCache::default();
    }
    /// Cached sample data, empty unless loaded
    pub const fn cache(&self) -> &RamCache {
        &self.cache
    }
}

fn read_compression_info(ewav: &mut impl ChunkStream, format: SampleFormat) -> CompressionInfo {
    let version = read_u32_at(ewav, 0).unwrap_or(0);
    if version <= 2 || format.bit_depth != 24 {
        return CompressionInfo::default();
    }
    let dithered = read_u32_at(ewav, 4).is_some_and(|v| v != 0);
    let at = if format.channels == 2 {
        EWAV_TRUNCATED_BITS_STEREO
    } else {
        EWAV_TRUNCATED_BITS_MONO
    };
    let truncated_bits = read_u32_at(ewav, at).unwrap_or(0).min(8);
    CompressionInfo {
        dithered,
        truncated_bits,
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            riff::{MemChunk, MemList},
            testing::{self, pcm16_bytes, pcm24_bytes},
        },
        super::frame::CompressionMode::{
            Delta16To8, Delta24To8, Delta24To12, Delta24To16, Pcm16, Pcm24,
        },
        proptest::prelude::*,
    };

    const MONO16: SampleFormat = SampleFormat {
        channels: 1,
        bit_depth: 16,
        sample_rate: 44100,
    };

    fn compressed(data: &[u8], channels: u16, bit_depth: u16) -> Sample<MemChunk<'_>> {
        let format = SampleFormat {
            channels,
            bit_depth,
            sample_rate: 48000,
        };
        Sample::new(
            MemChunk::new(ChunkId::DATA, data),
            format,
            Some(CompressionInfo::default()),
        )
        .unwrap()
    }

    fn read_all<S: ChunkStream>(sample: &mut Sample<S>, chunk: usize) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = vec![0; chunk * sample.frame_size()];
        loop {
            let n = sample.read(&mut buf, chunk, None).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n * sample.frame_size()]);
        }
        out
    }

    #[test]
    fn mono16_mixed_modes() {
        let pcm = testing::test_signal16(5000, 8000, 0);
        let data = testing::compress16(&pcm, 1, &[Delta16To8, Pcm16]).unwrap();
        let mut sample = compressed(&data, 1, 16);
        assert_eq!(sample.samples_total(), 5000);
        assert_eq!(sample.samples_per_frame(), 2048);
        assert_eq!(sample.worst_case_frame_size(), 4097);
        let mut buf = vec![0; 5000 * 2];
        assert_eq!(sample.read(&mut buf, 5000, None).unwrap(), 5000);
        assert_eq!(buf, pcm16_bytes(&pcm));
        assert_eq!(sample.get_pos(), 5000);
        assert_eq!(sample.read(&mut buf, 10, None).unwrap(), 0);
    }

    #[test]
    fn stereo16_in_odd_chunks() {
        let left = testing::test_signal16(4500, 8000, 1);
        let right = testing::test_signal16(4500, 6000, 2);
        let pcm: Vec<i16> = left.iter().zip(&right).flat_map(|(l, r)| [*l, *r]).collect();
        let data = testing::compress16(&pcm, 2, &[Delta16To8, Pcm16, Pcm16, Delta16To8]).unwrap();
        let mut sample = compressed(&data, 2, 16);
        assert_eq!(sample.samples_total(), 4500);
        assert_eq!(read_all(&mut sample, 333), pcm16_bytes(&pcm));
    }

    #[test]
    fn stereo24_all_modes() {
        // Odd last frame, to exercise the padded 12 bit left channel
        let n = 3 * 256 + 233;
        let left = testing::test_signal(n, 30000.0, 3);
        let right = testing::test_signal(n, 20000.0, 4);
        let pcm: Vec<i32> = left.iter().zip(&right).flat_map(|(l, r)| [*l, *r]).collect();
        let modes = [Delta24To12, Delta24To16, Delta24To8, Pcm24, Delta24To16, Delta24To12];
        let data = testing::compress24(&pcm, 2, &modes).unwrap();
        let mut sample = compressed(&data, 2, 24);
        assert_eq!(sample.samples_total(), n);
        assert_eq!(sample.frame_size(), 6);
        assert_eq!(read_all(&mut sample, 100), pcm24_bytes(&pcm));
    }

    #[test]
    fn mono24_odd_12bit_tail() {
        let pcm = testing::test_signal(2 * 256 + 99, 200_000.0, 5);
        let data = testing::compress24(&pcm, 1, &[Delta24To12]).unwrap();
        let mut sample = compressed(&data, 1, 24);
        assert_eq!(sample.samples_total(), pcm.len());
        assert_eq!(read_all(&mut sample, 1000), pcm24_bytes(&pcm));
    }

    #[test]
    fn seeking_compressed() {
        let pcm = testing::test_signal(20 * 256 + 17, 30000.0, 6);
        let data = testing::compress24(&pcm, 1, &[Delta24To8, Delta24To16]).unwrap();
        let mut sample = compressed(&data, 1, 24);
        let total = pcm.len();
        let mut buf = vec![0; 10 * 3];
        // Past the first table entry and a few whole frames into the second
        for start in [0, 255, 256, 2047, 2048, 3000, total - 10] {
            assert_eq!(sample.set_pos(start, Whence::Start), start);
            assert_eq!(sample.read(&mut buf, 10, None).unwrap(), 10);
            assert_eq!(buf, pcm24_bytes(&pcm[start..start + 10]), "at {start}");
            assert_eq!(sample.get_pos(), start + 10);
        }
        assert_eq!(sample.set_pos(0, Whence::End), total - 1);
        assert_eq!(sample.set_pos(5, Whence::Backward), total - 6);
        assert_eq!(sample.set_pos(100, Whence::CurPos), total);
        assert_eq!(sample.read(&mut buf, 10, None).unwrap(), 0);
        assert_eq!(sample.set_pos(usize::MAX, Whence::Backward), 0);
    }

    #[test]
    fn small_external_buffer_reduces_count() {
        let pcm = testing::test_signal16(5000, 8000, 7);
        let data = testing::compress16(&pcm, 1, &[Delta16To8]).unwrap();
        let mut sample = compressed(&data, 1, 16);
        let mut scratch = create_decompression_buffer(1000);
        assert!(scratch.size() < sample.guess_size(5000));
        assert_eq!(sample.worst_case_max_samples(&scratch), 2048);
        let mut buf = vec![0; 5000 * 2];
        let n = sample.read(&mut buf, 5000, Some(&mut scratch)).unwrap();
        assert_eq!(n, 2048);
        assert_eq!(buf[..n * 2], pcm16_bytes(&pcm[..n]));
        let mut big = create_decompression_buffer(5000);
        let m = sample.read(&mut buf, 5000, Some(&mut big)).unwrap();
        assert_eq!(m, 5000 - 2048);
        assert_eq!(buf[..m * 2], pcm16_bytes(&pcm[n..]));
        scratch.destroy();
        sample.set_pos(0, Whence::Start);
        assert_eq!(sample.read(&mut buf, 10, Some(&mut scratch)).unwrap(), 0);
    }

    #[test]
    fn uncompressed_passthrough() {
        let pcm: Vec<i16> = (0..200).collect();
        let data = pcm16_bytes(&pcm);
        let format = SampleFormat {
            channels: 2,
            ..MONO16
        };
        let mut sample = Sample::new(MemChunk::new(ChunkId::DATA, &data), format, None).unwrap();
        assert!(!sample.is_compressed());
        assert_eq!(sample.samples_total(), 100);
        assert_eq!(sample.samples_per_frame(), 0);
        assert_eq!(sample.set_pos(10, Whence::Start), 10);
        let mut buf = [0; 8];
        assert_eq!(sample.read(&mut buf, 2, None).unwrap(), 2);
        assert_eq!(buf, pcm16_bytes(&[20, 21, 22, 23])[..]);
        assert_eq!(sample.get_pos(), 12);
        assert_eq!(sample.set_pos(1000, Whence::CurPos), 100);
        assert_eq!(sample.read(&mut buf, 2, None).unwrap(), 0);
    }

    #[test]
    fn ram_cache() {
        let pcm = testing::test_signal16(3000, 8000, 8);
        let data = testing::compress16(&pcm, 1, &[Delta16To8]).unwrap();
        let mut sample = compressed(&data, 1, 16);
        assert!(sample.cache().is_empty());
        let cache = sample.load_sample_data_with_null_samples_extension(10).unwrap();
        assert_eq!(cache.data(), pcm16_bytes(&pcm));
        assert_eq!(cache.null_extension_size(), 20);
        assert!(cache.padded()[cache.size()..].iter().all(|&b| b == 0));
        let cache = sample.load_sample_data_partial(100).unwrap();
        assert_eq!(cache.data(), pcm16_bytes(&pcm[..100]));
        assert_eq!(cache.null_extension_size(), 0);
        // More than there is gets clamped
        let cache = sample.load_sample_data_partial(9999).unwrap();
        assert_eq!(cache.size(), 6000);
        assert_eq!(sample.load_sample_data().unwrap().data(), pcm16_bytes(&pcm));
        sample.release_sample_data();
        assert!(sample.cache().is_empty());
    }

    #[test]
    fn open_wave_file() {
        let pcm = testing::test_signal(600, 300_000.0, 10);
        let data = testing::compress24(&pcm, 1, &[Delta24To16]).unwrap();
        let format = SampleFormat {
            channels: 1,
            bit_depth: 24,
            sample_rate: 96000,
        };
        let info = CompressionInfo {
            dithered: true,
            truncated_bits: 4,
        };
        let lp = SampleLoop {
            loop_type: LoopType::Bidirectional,
            start: 100,
            length: 400,
            play_count: 3,
        };
        let file = testing::wave_file(format, &data, Some(info), Some(lp));
        let list = MemList::from_riff(&file, ChunkId::WAVE).unwrap();
        let mut sample = Sample::from_wave_list(&list).unwrap();
        assert_eq!(sample.format(), format);
        assert_eq!(sample.compression(), Some(info));
        assert_eq!(sample.sample_loop(), Some(lp));
        assert_eq!(sample.midi_unity_note(), 60);
        let widened: Vec<i32> = pcm.iter().map(|v| v << 4).collect();
        assert_eq!(read_all(&mut sample, 128), pcm24_bytes(&widened));
    }

    #[test]
    fn plain_wave_file() {
        let pcm: Vec<i16> = (-50..50).collect();
        let file = testing::wave_file(MONO16, &pcm16_bytes(&pcm), None, None);
        let list = MemList::from_riff(&file, ChunkId::WAVE).unwrap();
        let mut sample = Sample::from_wave_list(&list).unwrap();
        assert_eq!(sample.compression(), None);
        assert_eq!(sample.sample_loop(), None);
        assert_eq!(read_all(&mut sample, 7), pcm16_bytes(&pcm));
    }

    #[test]
    fn broken_wave_lists() {
        let mut list = MemList::new();
        list.push(ChunkId::FMT, &[1, 0, 1, 0]);
        assert_eq!(
            Sample::from_wave_list(&list).err(),
            Some(SampleError::InvalidFormatChunk)
        );
        let file = testing::wave_file(MONO16, &[], None, None);
        let full = MemList::from_riff(&file, ChunkId::WAVE).unwrap();
        let mut list = MemList::new();
        list.push(ChunkId::FMT, full.sub_chunk(ChunkId::FMT).unwrap().data());
        assert_eq!(
            Sample::from_wave_list(&list).err(),
            Some(SampleError::MissingChunk(ChunkId::DATA))
        );
        let data = [0; 8];
        let bad = |channels, bit_depth, compressed: bool| {
            let format = SampleFormat {
                channels,
                bit_depth,
                sample_rate: 1,
            };
            let info = compressed.then(CompressionInfo::default);
            Sample::new(MemChunk::new(ChunkId::DATA, &data), format, info).err()
        };
        assert_eq!(bad(3, 16, false), Some(SampleError::UnsupportedChannels(3)));
        assert_eq!(bad(1, 8, true), Some(SampleError::UnsupportedBitDepth(8)));
        assert_eq!(bad(1, 12, false), Some(SampleError::UnsupportedBitDepth(12)));
        assert_eq!(bad(1, 16, true), None);
    }

    proptest! {
        #[test]
        fn split_reads_match_one_read(k in 0usize..=4100, stereo in any::<bool>()) {
            let channels = if stereo { 2 } else { 1 };
            let n = 4100;
            let pcm = testing::test_signal16(n * usize::from(channels), 8000, 9);
            let data = testing::compress16(&pcm, channels, &[Delta16To8, Pcm16, Pcm16]).unwrap();
            let mut sample = compressed(&data, channels, 16);
            let fs = sample.frame_size();
            let mut whole = vec![0; n * fs];
            prop_assert_eq!(sample.read(&mut whole, n, None).unwrap(), n);
            sample.set_pos(0, Whence::Start);
            let mut split = vec![0; n * fs];
            prop_assert_eq!(sample.read(&mut split[..k * fs], k, None).unwrap(), k);
            prop_assert_eq!(sample.read(&mut split[k * fs..], n - k, None).unwrap(), n - k);
            prop_assert_eq!(whole, split);
        }
    }
}
