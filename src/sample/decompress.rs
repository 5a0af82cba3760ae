//! Differential frame decoders.
//!
//! Every decoder runs its recurrence over `skip` samples without writing,
//! then writes the following `copy` samples. This lets a read that starts in
//! the middle of a frame reuse the frame header instead of a separate seek.

use {
    super::frame::CompressionMode,
    crate::result::{SampleError, SampleResult},
};

/// One channel's share of a frame
#[derive(Clone, Copy, Debug)]
pub struct Channel<'a> {
    /// How the channel is stored
    pub mode: CompressionMode,
    /// Frame header seeding the recurrence. Empty for uncompressed modes.
    pub params: &'a [u8],
    /// Sample data, starting at the channel's first sample
    pub data: &'a [u8],
    /// Distance between two samples of this channel in `data` (16 bit only)
    pub stride: usize,
}

/// Which samples of a frame to decode
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Span {
    /// Samples to run through without output
    pub skip: usize,
    /// Samples to write after skipping
    pub copy: usize,
}

impl Span {
    const fn end(self) -> usize {
        self.skip + self.copy
    }
}

fn bytes<const N: usize>(src: &[u8], at: usize) -> SampleResult<[u8; N]> {
    at.checked_add(N)
        .and_then(|end| src.get(at..end))
        .and_then(|s| s.try_into().ok())
        .ok_or(SampleError::TruncatedFrame)
}

fn get8(src: &[u8], at: usize) -> SampleResult<i32> {
    let [b] = bytes(src, at)?;
    Ok(i32::from(b.cast_signed()))
}

fn get16(src: &[u8], at: usize) -> SampleResult<i32> {
    Ok(i32::from(i16::from_le_bytes(bytes(src, at)?)))
}

fn get24(src: &[u8], at: usize) -> SampleResult<i32> {
    let [a, b, c] = bytes(src, at)?;
    Ok(i32::from_le_bytes([0, a, b, c]) >> 8)
}

const fn sign_extend12(x: i32) -> i32 {
    (x << 20) >> 20
}

fn get12lo(src: &[u8], at: usize) -> SampleResult<i32> {
    let [a, b] = bytes(src, at)?;
    Ok(sign_extend12(i32::from(a) | (i32::from(b & 0x0f) << 8)))
}

fn get12hi(src: &[u8], at: usize) -> SampleResult<i32> {
    let [_, b, c] = bytes(src, at)?;
    Ok(sign_extend12(i32::from(b >> 4) | (i32::from(c) << 4)))
}

/// Two 12 bit residuals share three bytes
fn get12(src: &[u8], index: usize) -> SampleResult<i32> {
    let at = index / 2 * 3;
    if index & 1 == 0 {
        get12lo(src, at)
    } else {
        get12hi(src, at)
    }
}

fn out<const N: usize>(dst: &mut [u8], at: usize) -> SampleResult<&mut [u8]> {
    at.checked_add(N)
        .and_then(|end| dst.get_mut(at..end))
        .ok_or(SampleError::BufferTooSmall)
}

fn store16(dst: &mut [u8], at: usize, value: i32) -> SampleResult {
    #[expect(clippy::cast_possible_truncation)]
    let value = value as i16;
    out::<2>(dst, at)?.copy_from_slice(&value.to_le_bytes());
    Ok(())
}

fn store24(dst: &mut [u8], at: usize, value: i32) -> SampleResult {
    out::<3>(dst, at)?.copy_from_slice(&value.to_le_bytes()[..3]);
    Ok(())
}

/// Decodes `span` of a 16 bit channel into little endian `i16`s, `dst_step` bytes apart
pub fn decompress16(ch: &Channel, dst: &mut [u8], dst_step: usize, span: Span) -> SampleResult {
    match ch.mode {
        CompressionMode::Pcm16 => {
            for i in 0..span.copy {
                let v = get16(ch.data, (span.skip + i) * ch.stride)?;
                store16(dst, i * dst_step, v)?;
            }
        }
        CompressionMode::Delta16To8 => {
            let mut y = get16(ch.params, 0)?;
            let mut dy = get16(ch.params, 2)?;
            for i in 0..span.end() {
                dy = dy.wrapping_sub(get8(ch.data, i * ch.stride)?);
                y = y.wrapping_sub(dy);
                if let Some(n) = i.checked_sub(span.skip) {
                    store16(dst, n * dst_step, y)?;
                }
            }
        }
        mode => return Err(SampleError::UnknownCompressionMode(mode as u8)),
    }
    Ok(())
}

/// Running state of the third order recurrence of 24 bit frames
#[derive(Clone, Copy, Debug)]
struct Delta24 {
    y: i32,
    dy: i32,
    ddy: i32,
    dddy: i32,
}

impl Delta24 {
    fn from_params(params: &[u8]) -> SampleResult<Self> {
        let y = get24(params, 0)?;
        Ok(Self {
            y,
            dy: y.wrapping_sub(get24(params, 3)?),
            ddy: get24(params, 6)?,
            dddy: get24(params, 9)?,
        })
    }
    const fn step(&mut self, residual: i32) -> i32 {
        self.dddy = self.dddy.wrapping_sub(residual);
        self.ddy = self.ddy.wrapping_sub(self.dddy);
        self.dy = self.dy.wrapping_neg().wrapping_sub(self.ddy);
        self.y = self.y.wrapping_add(self.dy);
        self.y
    }
}

/// Decodes `span` of a 24 bit channel into 3 byte little endian samples, `dst_step` bytes apart.
///
/// Output is shifted left by `truncated_bits`, restoring the magnitude of
/// samples that were stored with their low bits cut off.
pub fn decompress24(
    ch: &Channel,
    dst: &mut [u8],
    dst_step: usize,
    span: Span,
    truncated_bits: u32,
) -> SampleResult {
    let widen = |v: i32| v.checked_shl(truncated_bits).unwrap_or(0);
    let residual: fn(&[u8], usize) -> SampleResult<i32> = match ch.mode {
        CompressionMode::Pcm24 => {
            for i in 0..span.copy {
                let v = get24(ch.data, (span.skip + i) * 3)?;
                store24(dst, i * dst_step, widen(v))?;
            }
            return Ok(());
        }
        CompressionMode::Delta24To16 => |src, i| get16(src, i * 2),
        CompressionMode::Delta24To12 => get12,
        CompressionMode::Delta24To8 => get8,
        mode => return Err(SampleError::UnknownCompressionMode(mode as u8)),
    };
    let mut state = Delta24::from_params(ch.params)?;
    for i in 0..span.end() {
        let y = state.step(residual(ch.data, i)?);
        if let Some(n) = i.checked_sub(span.skip) {
            store24(dst, n * dst_step, widen(y))?;
        }
    }
    Ok(())
}
