//! Builders for sample data with known content.
//!
//! The encoders pick frame headers so that steadily sloped signals encode to
//! small residuals. They give up (`None`) when a residual doesn't fit the mode.

use crate::{
    riff::ChunkId,
    sample::{
        CompressionInfo, SampleFormat, SampleLoop,
        frame::{CompressionMode, SAMPLES_PER_FRAME_16, SAMPLES_PER_FRAME_24},
    },
};

const fn low_byte(v: i32) -> u8 {
    v.to_le_bytes()[0]
}

fn put24(out: &mut Vec<u8>, v: i32) -> Option<()> {
    (-0x80_0000..0x80_0000)
        .contains(&v)
        .then(|| out.extend_from_slice(&v.to_le_bytes()[..3]))
}

fn first_slope<T: Copy + Into<i32>>(pcm: &[T]) -> (i32, i32) {
    match pcm {
        [a, b, ..] => {
            let (a, b): (i32, i32) = ((*a).into(), (*b).into());
            (a, b - a)
        }
        [a] => ((*a).into(), 0),
        [] => (0, 0),
    }
}

/// Encodes one channel of a 16 bit frame into its header and sample bytes
#[must_use]
pub fn encode16(mode: CompressionMode, pcm: &[i16]) -> Option<(Vec<u8>, Vec<u8>)> {
    match mode {
        CompressionMode::Pcm16 => {
            let data = pcm.iter().flat_map(|s| s.to_le_bytes()).collect();
            Some((Vec::new(), data))
        }
        CompressionMode::Delta16To8 => {
            let (s0, d) = first_slope(pcm);
            let mut dy = -d;
            let mut y = s0 - d;
            let mut header = i16::try_from(y).ok()?.to_le_bytes().to_vec();
            header.extend_from_slice(&i16::try_from(dy).ok()?.to_le_bytes());
            let mut data = Vec::with_capacity(pcm.len());
            for &s in pcm {
                let s = i32::from(s);
                let next_dy = y - s;
                data.push(i8::try_from(dy - next_dy).ok()?.cast_unsigned());
                y = s;
                dy = next_dy;
            }
            Some((header, data))
        }
        _ => None,
    }
}

fn pack12(residuals: &[i32]) -> Option<Vec<u8>> {
    if !residuals.iter().all(|x| (-0x800..0x800).contains(x)) {
        return None;
    }
    let mut out = Vec::with_capacity(residuals.len() * 3 / 2 + 1);
    for pair in residuals.chunks(2) {
        let a = pair[0];
        out.push(low_byte(a));
        match pair.get(1) {
            Some(&b) => {
                out.push(low_byte(((a >> 8) & 0xf) | ((b & 0xf) << 4)));
                out.push(low_byte(b >> 4));
            }
            None => out.push(low_byte((a >> 8) & 0xf)),
        }
    }
    Some(out)
}

/// Encodes one channel of a 24 bit frame into its header and sample bytes.
///
/// Odd length 12 bit data is not padded.
#[must_use]
pub fn encode24(mode: CompressionMode, pcm: &[i32]) -> Option<(Vec<u8>, Vec<u8>)> {
    if mode == CompressionMode::Pcm24 {
        let mut data = Vec::with_capacity(pcm.len() * 3);
        for &s in pcm {
            put24(&mut data, s)?;
        }
        return Some((Vec::new(), data));
    }
    let (s0, d) = first_slope(pcm);
    let (mut y, mut dy, mut ddy, mut dddy) = (s0 - d, d, -2 * d, 0);
    let mut header = Vec::with_capacity(12);
    for v in [y, y - dy, ddy, dddy] {
        put24(&mut header, v)?;
    }
    let mut residuals = Vec::with_capacity(pcm.len());
    for &s in pcm {
        let next_dy = s - y;
        let next_ddy = -dy - next_dy;
        let next_dddy = ddy - next_ddy;
        residuals.push(dddy - next_dddy);
        (y, dy, ddy, dddy) = (s, next_dy, next_ddy, next_dddy);
    }
    let data = match mode {
        CompressionMode::Delta24To16 => {
            let mut data = Vec::with_capacity(residuals.len() * 2);
            for x in residuals {
                data.extend_from_slice(&i16::try_from(x).ok()?.to_le_bytes());
            }
            data
        }
        CompressionMode::Delta24To12 => pack12(&residuals)?,
        CompressionMode::Delta24To8 => residuals
            .into_iter()
            .map(|x| i8::try_from(x).ok().map(i8::cast_unsigned))
            .collect::<Option<_>>()?,
        _ => return None,
    };
    Some((header, data))
}

fn channel_modes(
    modes: &[CompressionMode],
    frame: usize,
    channels: usize,
) -> Option<Vec<CompressionMode>> {
    if modes.is_empty() {
        return None;
    }
    Some(
        (0..channels)
            .map(|c| modes[(frame * channels + c) % modes.len()])
            .collect(),
    )
}

fn deinterleave<T: Copy>(frame: &[T], channel: usize, channels: usize) -> Vec<T> {
    frame.iter().skip(channel).step_by(channels).copied().collect()
}

/// Compresses interleaved 16 bit PCM into the body of a `data` chunk.
///
/// Frame `f` stores channel `c` in `modes[(f * channels + c) % modes.len()]`.
#[must_use]
pub fn compress16(pcm: &[i16], channels: u16, modes: &[CompressionMode]) -> Option<Vec<u8>> {
    let ch = usize::from(channels);
    let mut out = Vec::new();
    for (f, frame) in pcm.chunks(SAMPLES_PER_FRAME_16 * ch).enumerate() {
        let mut parts = Vec::with_capacity(ch);
        for (c, mode) in channel_modes(modes, f, ch)?.into_iter().enumerate() {
            parts.push((mode, encode16(mode, &deinterleave(frame, c, ch))?));
        }
        out.extend(parts.iter().map(|(mode, _)| *mode as u8));
        for (_, (params, _)) in &parts {
            out.extend_from_slice(params);
        }
        for i in 0..frame.len() / ch {
            for (mode, (_, data)) in &parts {
                let w = mode.bits_per_sample() / 8;
                out.extend_from_slice(data.get(i * w..(i + 1) * w)?);
            }
        }
    }
    Some(out)
}

/// Compresses interleaved 24 bit PCM into the body of a `data` chunk.
///
/// Modes are assigned like in [`compress16`].
#[must_use]
pub fn compress24(pcm: &[i32], channels: u16, modes: &[CompressionMode]) -> Option<Vec<u8>> {
    let ch = usize::from(channels);
    let mut out = Vec::new();
    for (f, frame) in pcm.chunks(SAMPLES_PER_FRAME_24 * ch).enumerate() {
        let mut parts = Vec::with_capacity(ch);
        for (c, mode) in channel_modes(modes, f, ch)?.into_iter().enumerate() {
            parts.push((mode, encode24(mode, &deinterleave(frame, c, ch))?));
        }
        out.extend(parts.iter().map(|(mode, _)| *mode as u8));
        for (_, (params, _)) in &parts {
            out.extend_from_slice(params);
        }
        let odd = (frame.len() / ch) & 1 == 1;
        for (c, (mode, (_, data))) in parts.iter().enumerate() {
            out.extend_from_slice(data);
            // Left 12 bit data of stereo frames always fills whole byte triples
            if c == 0 && ch == 2 && odd && *mode == CompressionMode::Delta24To12 {
                out.push(0);
            }
        }
    }
    Some(out)
}

fn push_chunk(out: &mut Vec<u8>, id: ChunkId, body: &[u8]) {
    out.extend_from_slice(&id.0);
    out.extend_from_slice(&u32::try_from(body.len()).unwrap_or(u32::MAX).to_le_bytes());
    out.extend_from_slice(body);
    if body.len() & 1 == 1 {
        out.push(0);
    }
}

fn le32(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Builds a `RIFF` `WAVE` file around the `data` chunk body `data`.
///
/// Compressed files get an `ewav` chunk, looped ones a `smpl` chunk with
/// unity note 60.
#[must_use]
pub fn wave_file(
    format: SampleFormat,
    data: &[u8],
    compression: Option<CompressionInfo>,
    lp: Option<SampleLoop>,
) -> Vec<u8> {
    let block_align = format.channels * format.bit_depth / 8;
    let mut fmt = Vec::with_capacity(16);
    fmt.extend_from_slice(&1u16.to_le_bytes());
    fmt.extend_from_slice(&format.channels.to_le_bytes());
    fmt.extend_from_slice(&format.sample_rate.to_le_bytes());
    fmt.extend_from_slice(&(format.sample_rate * u32::from(block_align)).to_le_bytes());
    fmt.extend_from_slice(&block_align.to_le_bytes());
    fmt.extend_from_slice(&format.bit_depth.to_le_bytes());
    let mut body = ChunkId::WAVE.0.to_vec();
    push_chunk(&mut body, ChunkId::FMT, &fmt);
    if let Some(info) = compression {
        let mut ewav = vec![0; 88];
        ewav[..4].copy_from_slice(&3u32.to_le_bytes());
        ewav[4..8].copy_from_slice(&u32::from(info.dithered).to_le_bytes());
        let at = if format.channels == 2 { 84 } else { 64 };
        ewav[at..at + 4].copy_from_slice(&info.truncated_bits.to_le_bytes());
        push_chunk(&mut body, ChunkId::EWAV, &ewav);
    }
    if let Some(lp) = lp {
        let mut smpl = le32(&[0, 0, 0, 60, 0, 0, 0, 1, 0]);
        let last = (lp.start + lp.length).saturating_sub(1);
        smpl.extend(le32(&[
            0,
            lp.loop_type as u32,
            lp.start,
            last,
            0,
            lp.play_count,
        ]));
        push_chunk(&mut body, ChunkId::SMPL, &smpl);
    }
    push_chunk(&mut body, ChunkId::DATA, data);
    let mut out = Vec::with_capacity(body.len() + 8);
    push_chunk(&mut out, ChunkId::RIFF, &body);
    out
}

/// Slowly wandering test signal, bounded by `amplitude`
#[must_use]
#[expect(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn test_signal(len: usize, amplitude: f64, seed: u32) -> Vec<i32> {
    (0..len)
        .map(|i| {
            let t = i as f64 + f64::from(seed) * 7.0;
            (amplitude * (t / 40.0).sin() * (t / 333.0).cos()) as i32
        })
        .collect()
}

/// Little endian bytes of 16 bit PCM
#[must_use]
pub fn pcm16_bytes(pcm: &[i16]) -> Vec<u8> {
    pcm.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Little endian 3 byte packing of 24 bit PCM
#[must_use]
pub fn pcm24_bytes(pcm: &[i32]) -> Vec<u8> {
    pcm.iter().flat_map(|s| s.to_le_bytes()[..3].to_vec()).collect()
}

/// [`test_signal`] narrowed to 16 bit
#[must_use]
pub fn test_signal16(len: usize, amplitude: i16, seed: u32) -> Vec<i16> {
    test_signal(len, f64::from(amplitude), seed)
        .into_iter()
        .map(|v| i16::try_from(v).unwrap_or_default())
        .collect()
}
