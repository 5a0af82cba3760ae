use {
    super::{DecompressionBuffer, Sample},
    crate::{
        Archive, ArchiveResult, Serializable,
        result::SampleResult,
        riff::{ChunkStream, Whence},
    },
};

/// Playback direction of a loop
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoopType {
    /// Jump back to the loop start at the loop end
    #[default]
    Normal = 0,
    /// Play forward, then backward, then forward again
    Bidirectional = 1,
    /// Play forward until the loop end, then loop backward
    Backward = 2,
}

crate::impl_archivable_enum!(LoopType: u32 { Normal, Bidirectional, Backward });

impl LoopType {
    /// Loop type of a `smpl` loop entry. Unknown types play as [`Self::Normal`].
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::Bidirectional,
            2 => Self::Backward,
            _ => Self::Normal,
        }
    }
}

/// Loop region of a sample
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SampleLoop {
    /// Direction
    pub loop_type: LoopType,
    /// First sample point of the loop
    pub start: u32,
    /// Sample points in the loop
    pub length: u32,
    /// Times the loop is played. 0 loops endlessly.
    pub play_count: u32,
}

impl SampleLoop {
    /// First sample point after the loop
    #[must_use]
    pub const fn end(&self) -> usize {
        self.start as usize + self.length as usize
    }
}

impl Serializable for SampleLoop {
    fn serialize(&mut self, ar: &mut Archive) -> ArchiveResult {
        ar.member("loop_type", &mut self.loop_type)?;
        ar.member("start", &mut self.start)?;
        ar.member("length", &mut self.length)?;
        ar.member("play_count", &mut self.play_count)
    }
}

crate::impl_archivable!(SampleLoop);

/// Where a looped playback is, carried between [`Sample::read_and_loop`] calls
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlaybackState {
    /// Next sample point to play
    pub position: usize,
    /// Currently playing backward
    pub reverse: bool,
    /// Loop passes left, for loops with a play count
    pub loop_cycles_left: u32,
}

impl PlaybackState {
    /// State at the start of the sample
    #[must_use]
    pub const fn new(lp: &SampleLoop) -> Self {
        Self {
            position: 0,
            reverse: false,
            loop_cycles_left: lp.play_count,
        }
    }
}

/// Reverses the order of `frame_size` sized frames
fn reverse_frames(area: &mut [u8], frame_size: usize) {
    area.reverse();
    for frame in area.chunks_exact_mut(frame_size) {
        frame.reverse();
    }
}

impl<S: ChunkStream> Sample<S> {
    fn read_at(
        &mut self,
        buf: &mut [u8],
        at: usize,
        count: usize,
        scratch: &mut Option<&mut DecompressionBuffer>,
    ) -> SampleResult<usize> {
        let dst = buf.get_mut(at * self.frame_size()..).unwrap_or_default();
        self.read(dst, count, scratch.as_deref_mut())
    }
    /// Reads the `count` sample points before `end` into `buf` at `at`, last one first
    fn read_reversed(
        &mut self,
        buf: &mut [u8],
        at: usize,
        end: usize,
        count: usize,
        scratch: &mut Option<&mut DecompressionBuffer>,
    ) -> SampleResult<usize> {
        self.set_pos(end - count, Whence::Start);
        let mut read = 0;
        while read < count {
            let n = self.read_at(buf, at + read, count - read, scratch)?;
            if n == 0 {
                break;
            }
            read += n;
        }
        let fs = self.frame_size();
        if let Some(area) = buf.get_mut(at * fs..(at + read) * fs) {
            reverse_frames(area, fs);
        }
        Ok(read)
    }
    /// Reads up to `count` sample points like [`Self::read`], following `lp`.
    ///
    /// Starts at `state.position` and leaves `state` ready for the next call.
    /// Loops that reach past the end of the sample are ignored.
    #[expect(clippy::too_many_lines)]
    pub fn read_and_loop(
        &mut self,
        buf: &mut [u8],
        count: usize,
        state: &mut PlaybackState,
        lp: &SampleLoop,
        mut scratch: Option<&mut DecompressionBuffer>,
    ) -> SampleResult<usize> {
        let mut to_read = count.min(buf.len() / self.frame_size());
        let mut total = 0;
        let start = lp.start as usize;
        let end = lp.end();
        let finite = lp.play_count != 0;
        self.set_pos(state.position, Whence::Start);
        let loop_usable = lp.length > 0 && end <= self.samples_total();
        if lp.length > 0 && !loop_usable {
            tracing::warn!(
                "Loop {start}..{end} exceeds the sample's {} points, playing unlooped",
                self.samples_total()
            );
        }
        if loop_usable && self.get_pos() <= end {
            match lp.loop_type {
                LoopType::Normal => {
                    while to_read > 0 {
                        if finite && state.loop_cycles_left == 0 {
                            break;
                        }
                        let to_end = end.saturating_sub(self.get_pos());
                        let read = self.read_at(buf, total, to_read.min(to_end), &mut scratch)?;
                        to_read -= read;
                        total += read;
                        if read == to_end {
                            state.loop_cycles_left = state.loop_cycles_left.saturating_sub(1);
                            self.set_pos(start, Whence::Start);
                        } else if read == 0 {
                            break;
                        }
                    }
                }
                LoopType::Bidirectional => {
                    while to_read > 0 {
                        if finite && state.loop_cycles_left == 0 {
                            break;
                        }
                        let pos = self.get_pos();
                        if state.reverse {
                            let n = to_read.min(pos.saturating_sub(start));
                            let read = self.read_reversed(buf, total, pos, n, &mut scratch)?;
                            to_read -= read;
                            total += read;
                            let back = pos - read;
                            self.set_pos(back, Whence::Start);
                            if back <= start {
                                state.loop_cycles_left = state.loop_cycles_left.saturating_sub(1);
                                state.reverse = false;
                            } else if read < n {
                                break;
                            }
                        } else {
                            let to_end = end.saturating_sub(pos);
                            let read = self.read_at(buf, total, to_read.min(to_end), &mut scratch)?;
                            to_read -= read;
                            total += read;
                            if read == to_end {
                                state.reverse = true;
                            } else if read == 0 {
                                break;
                            }
                        }
                    }
                }
                LoopType::Backward => {
                    while !state.reverse && to_read > 0 {
                        let to_end = end.saturating_sub(self.get_pos());
                        let read = self.read_at(buf, total, to_read.min(to_end), &mut scratch)?;
                        to_read -= read;
                        total += read;
                        if read == to_end {
                            state.reverse = true;
                        } else if read == 0 {
                            break;
                        }
                    }
                    if state.reverse && self.get_pos() < start {
                        self.set_pos(end, Whence::Start);
                    }
                    while state.reverse && to_read > 0 {
                        if finite && state.loop_cycles_left == 0 {
                            break;
                        }
                        let pos = self.get_pos();
                        let n = to_read.min(pos.saturating_sub(start));
                        let read = self.read_reversed(buf, total, pos, n, &mut scratch)?;
                        to_read -= read;
                        total += read;
                        let back = pos - read;
                        if back <= start {
                            state.loop_cycles_left = state.loop_cycles_left.saturating_sub(1);
                            self.set_pos(end, Whence::Start);
                        } else {
                            self.set_pos(back, Whence::Start);
                            if read < n {
                                break;
                            }
                        }
                    }
                }
            }
        }
        while to_read > 0 {
            let read = self.read_at(buf, total, to_read, &mut scratch)?;
            if read == 0 {
                break;
            }
            to_read -= read;
            total += read;
        }
        state.position = self.get_pos();
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            riff::{ChunkId, MemChunk},
            sample::{CompressionInfo, SampleFormat, frame::CompressionMode},
            testing::{self, pcm16_bytes},
        },
    };

    const MONO16: SampleFormat = SampleFormat {
        channels: 1,
        bit_depth: 16,
        sample_rate: 22050,
    };

    fn ramp() -> (Vec<i16>, Vec<u8>) {
        let pcm: Vec<i16> = (0..100).collect();
        let data = pcm16_bytes(&pcm);
        (pcm, data)
    }

    fn decoded(buf: &[u8]) -> Vec<i16> {
        buf.chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect()
    }

    #[test]
    fn normal_loop_wraps_once() {
        let pcm = testing::test_signal16(5000, 8000, 11);
        let data = testing::compress16(&pcm, 1, &[CompressionMode::Delta16To8]).unwrap();
        let chunk = || MemChunk::new(ChunkId::DATA, &data);
        let info = Some(CompressionInfo::default());
        let mut sample = Sample::new(chunk(), MONO16, info).unwrap();
        let lp = SampleLoop {
            loop_type: LoopType::Normal,
            start: 1000,
            length: 3000,
            play_count: 1,
        };
        let mut state = PlaybackState::new(&lp);
        let mut looped = vec![0; 6000 * 2];
        assert_eq!(
            sample
                .read_and_loop(&mut looped, 6000, &mut state, &lp, None)
                .unwrap(),
            6000
        );
        assert_eq!(state.loop_cycles_left, 0);
        assert_eq!(state.position, 3000);

        let mut manual = Sample::new(chunk(), MONO16, info).unwrap();
        let mut expected = vec![0; 6000 * 2];
        assert_eq!(manual.read(&mut expected, 4000, None).unwrap(), 4000);
        manual.set_pos(1000, Whence::Start);
        assert_eq!(manual.read(&mut expected[8000..], 2000, None).unwrap(), 2000);
        assert_eq!(looped, expected);
    }

    #[test]
    fn endless_loop_across_calls() {
        let (_, data) = ramp();
        let mut sample = Sample::new(MemChunk::new(ChunkId::DATA, &data), MONO16, None).unwrap();
        let lp = SampleLoop {
            loop_type: LoopType::Normal,
            start: 90,
            length: 10,
            play_count: 0,
        };
        let mut state = PlaybackState {
            position: 85,
            ..PlaybackState::new(&lp)
        };
        let mut buf = [0; 12 * 2];
        for expected in [
            [85, 86, 87, 88, 89, 90, 91, 92, 93, 94, 95, 96],
            [97, 98, 99, 90, 91, 92, 93, 94, 95, 96, 97, 98],
        ] {
            assert_eq!(
                sample
                    .read_and_loop(&mut buf, 12, &mut state, &lp, None)
                    .unwrap(),
                12
            );
            assert_eq!(decoded(&buf), expected);
        }
        assert_eq!(state.position, 99);
    }

    #[test]
    fn bidirectional_loop() {
        let (_, data) = ramp();
        let mut sample = Sample::new(MemChunk::new(ChunkId::DATA, &data), MONO16, None).unwrap();
        let lp = SampleLoop {
            loop_type: LoopType::Bidirectional,
            start: 10,
            length: 20,
            play_count: 0,
        };
        let mut state = PlaybackState::new(&lp);
        let mut buf = vec![0; 70 * 2];
        let n = sample
            .read_and_loop(&mut buf, 70, &mut state, &lp, None)
            .unwrap();
        assert_eq!(n, 70);
        let expected: Vec<i16> = (0..30).chain((10..30).rev()).chain(10..30).collect();
        assert_eq!(decoded(&buf), expected);
        assert!(state.reverse);
        // Continues backward from the loop end
        let mut buf = [0; 3 * 2];
        sample
            .read_and_loop(&mut buf, 3, &mut state, &lp, None)
            .unwrap();
        assert_eq!(decoded(&buf), [29, 28, 27]);
        assert_eq!(state.position, 27);
    }

    #[test]
    fn backward_loop_then_release() {
        let (_, data) = ramp();
        let mut sample = Sample::new(MemChunk::new(ChunkId::DATA, &data), MONO16, None).unwrap();
        let lp = SampleLoop {
            loop_type: LoopType::Backward,
            start: 10,
            length: 20,
            play_count: 2,
        };
        let mut state = PlaybackState::new(&lp);
        let mut buf = vec![0; 80 * 2];
        let n = sample
            .read_and_loop(&mut buf, 80, &mut state, &lp, None)
            .unwrap();
        assert_eq!(n, 80);
        let expected: Vec<i16> = (0..30)
            .chain((10..30).rev())
            .chain((10..30).rev())
            .chain(30..40)
            .collect();
        assert_eq!(decoded(&buf), expected);
        assert_eq!(state.loop_cycles_left, 0);
        assert_eq!(state.position, 40);
    }

    #[test]
    fn loops_outside_the_sample_are_ignored() {
        let (pcm, data) = ramp();
        let mut sample = Sample::new(MemChunk::new(ChunkId::DATA, &data), MONO16, None).unwrap();
        let lp = SampleLoop {
            loop_type: LoopType::Normal,
            start: 50,
            length: 51,
            play_count: 0,
        };
        let mut state = PlaybackState::new(&lp);
        let mut buf = vec![0; 200 * 2];
        let n = sample
            .read_and_loop(&mut buf, 200, &mut state, &lp, None)
            .unwrap();
        assert_eq!(n, 100);
        assert_eq!(decoded(&buf[..200]), pcm);
    }

    #[test]
    fn loop_settings_archive() {
        let mut lp = SampleLoop {
            loop_type: LoopType::Backward,
            start: 1234,
            length: 99,
            play_count: 7,
        };
        let mut ar = Archive::new();
        ar.serialize(&mut lp).unwrap();
        let raw = ar.raw_data().to_vec();
        let mut restored = SampleLoop::default();
        Archive::from_raw_data(&raw)
            .unwrap()
            .deserialize(&mut restored)
            .unwrap();
        assert_eq!(restored, lp);
        assert_eq!(LoopType::from_raw(9), LoopType::Normal);
    }
}
