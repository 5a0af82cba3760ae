//! Streams Gigasampler wave data to raw PCM on stdout
#![forbid(unsafe_code)]

use {
    anstyle::AnsiColor,
    clap::Parser,
    gigsrx::{
        ChunkId, ChunkStream, CompressionInfo, MemChunk, MemList, PlaybackState, Sample,
        SampleFormat, create_decompression_buffer,
        sample::frame::CompressionMode, testing,
    },
    std::{
        error::Error,
        io::{IsTerminal, Write as _},
        path::PathBuf,
    },
    tracing_subscriber::EnvFilter,
};

#[derive(clap::Parser)]
struct Args {
    /// RIFF WAVE file, or a bare data chunk body with `--raw`
    path: Option<PathBuf>,
    /// Treat the input as a bare data chunk with the given layout
    #[arg(long)]
    raw: bool,
    /// Channels of raw input
    #[arg(short = 'c', long, default_value = "1")]
    channels: u16,
    /// Bit depth of raw input
    #[arg(short = 'b', long, default_value = "16")]
    bit_depth: u16,
    /// Raw input is compressed
    #[arg(long)]
    compressed: bool,
    /// Truncated bits of compressed raw 24 bit input
    #[arg(long, default_value = "0")]
    truncated_bits: u32,
    /// Sample points to read per call
    #[arg(long, default_value = "4096")]
    chunk: usize,
    /// Play the sample's loop, stopping after this many sample points
    #[arg(long)]
    looped: Option<usize>,
    /// Write even if stdout is a terminal
    #[arg(short, long)]
    force: bool,
    /// Decode generated wave data and compare it with its source
    #[arg(long)]
    selftest: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();
    if args.selftest {
        return selftest();
    }
    let Some(path) = &args.path else {
        return Err("Need an input file (or --selftest)".into());
    };
    let data = std::fs::read(path)
        .map_err(|e| format!("Failed to read '{}': {e}", path.display()))?;
    let mut stdout = std::io::stdout().lock();
    if stdout.is_terminal() && !args.force {
        return Err("Refusing to write PCM to a terminal, pipe it somewhere (or --force)".into());
    }
    let pcm = if args.raw {
        let format = SampleFormat {
            channels: args.channels,
            bit_depth: args.bit_depth,
            sample_rate: 44_100,
        };
        let compression = args.compressed.then_some(CompressionInfo {
            dithered: false,
            truncated_bits: args.truncated_bits,
        });
        let sample = Sample::new(MemChunk::new(ChunkId::DATA, &data), format, compression)?;
        stream(sample, &args)?
    } else {
        let list = MemList::from_riff(&data, ChunkId::WAVE)?;
        let sample = Sample::from_wave_list(&list)?;
        stream(sample, &args)?
    };
    stdout.write_all(&pcm)?;
    Ok(())
}

fn stream<S: ChunkStream>(mut sample: Sample<S>, args: &Args) -> Result<Vec<u8>, Box<dyn Error>> {
    let format = sample.format();
    eprintln!(
        "{} ch, {} bit, {} Hz, {} points{}",
        format.channels,
        format.bit_depth,
        format.sample_rate,
        sample.samples_total(),
        if sample.is_compressed() {
            " (compressed)"
        } else {
            ""
        }
    );
    let chunk = args.chunk.max(1);
    let mut scratch = create_decompression_buffer(chunk);
    let mut buf = vec![0; chunk * sample.frame_size()];
    let mut out = Vec::new();
    match (args.looped, sample.sample_loop()) {
        (Some(limit), Some(lp)) => {
            eprintln!(
                "Loop: {:?} {}..{} x{}",
                lp.loop_type,
                lp.start,
                lp.end(),
                lp.play_count
            );
            let mut state = PlaybackState::new(&lp);
            let mut left = limit;
            while left > 0 {
                let n = sample.read_and_loop(
                    &mut buf,
                    chunk.min(left),
                    &mut state,
                    &lp,
                    Some(&mut scratch),
                )?;
                if n == 0 {
                    break;
                }
                out.extend_from_slice(&buf[..n * sample.frame_size()]);
                left -= n;
            }
        }
        (looped, _) => {
            if looped.is_some() {
                tracing::warn!("Sample has no loop, playing it once");
            }
            loop {
                let n = sample.read(&mut buf, chunk, Some(&mut scratch))?;
                if n == 0 {
                    break;
                }
                out.extend_from_slice(&buf[..n * sample.frame_size()]);
            }
        }
    }
    Ok(out)
}

struct Case {
    name: &'static str,
    format: SampleFormat,
    modes: &'static [CompressionMode],
    amplitude: f64,
}

const fn layout(channels: u16, bit_depth: u16) -> SampleFormat {
    SampleFormat {
        channels,
        bit_depth,
        sample_rate: 44_100,
    }
}

const CASES: &[Case] = &[
    Case {
        name: "mono 16 bit",
        format: layout(1, 16),
        modes: &[CompressionMode::Delta16To8, CompressionMode::Pcm16],
        amplitude: 8000.0,
    },
    Case {
        name: "stereo 16 bit",
        format: layout(2, 16),
        modes: &[CompressionMode::Delta16To8],
        amplitude: 8000.0,
    },
    Case {
        name: "mono 24 bit",
        format: layout(1, 24),
        modes: &[
            CompressionMode::Delta24To8,
            CompressionMode::Delta24To12,
            CompressionMode::Delta24To16,
            CompressionMode::Pcm24,
        ],
        amplitude: 30000.0,
    },
    Case {
        name: "stereo 24 bit",
        format: layout(2, 24),
        modes: &[CompressionMode::Delta24To12, CompressionMode::Delta24To16],
        amplitude: 100_000.0,
    },
];

fn selftest() -> Result<(), Box<dyn Error>> {
    const POINTS: usize = 10_000;
    let mut failed = false;
    for case in CASES {
        let channels = usize::from(case.format.channels);
        let signal = testing::test_signal(POINTS * channels, case.amplitude, 3);
        let (data, expected) = if case.format.bit_depth == 16 {
            let pcm: Vec<i16> = signal
                .iter()
                .map(|&v| i16::try_from(v).unwrap_or_default())
                .collect();
            (
                testing::compress16(&pcm, case.format.channels, case.modes),
                testing::pcm16_bytes(&pcm),
            )
        } else {
            (
                testing::compress24(&signal, case.format.channels, case.modes),
                testing::pcm24_bytes(&signal),
            )
        };
        let Some(data) = data else {
            fail(&format!("{}: test signal doesn't fit the modes", case.name));
            failed = true;
            continue;
        };
        let file = testing::wave_file(case.format, &data, Some(CompressionInfo::default()), None);
        let list = MemList::from_riff(&file, ChunkId::WAVE)?;
        let sample = Sample::from_wave_list(&list)?;
        let args = Args::parse_from(["gigcat", "--chunk", "1000"]);
        let decoded = stream(sample, &args)?;
        if decoded == expected {
            pass(case.name);
        } else {
            fail(case.name);
            failed = true;
        }
    }
    if failed {
        return Err("Self test failed".into());
    }
    Ok(())
}

fn pass(msg: &str) {
    let style = anstyle::Style::new()
        .fg_color(Some(anstyle::Color::Ansi(AnsiColor::Green)))
        .bold();
    eprintln!("{style}[PASS]{style:#} {msg}");
}

fn fail(msg: &str) {
    let style = anstyle::Style::new()
        .fg_color(Some(anstyle::Color::Ansi(AnsiColor::Red)))
        .bold();
    eprintln!("{style}[FAIL]{style:#} {msg}");
}
