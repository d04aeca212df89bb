use anyhow::Context;
use clap::Parser;
use gsf::{AudioGrain, Grain, GrainMeta, GrainPayload, GsfEncoder, Rational, Timestamp};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read};
use std::path::PathBuf;
use uuid::Uuid;

/// Chunks raw audio samples into grains, origin timestamps advancing by the
/// samples carried.
#[derive(Parser, Debug)]
#[clap(name = "wrap_audio_in_gsf", version)]
struct Args {
    /// Raw audio input.
    input: PathBuf,
    /// GSF output.
    output: PathBuf,
    /// Sample rate in Hz.
    #[clap(long)]
    sample_rate: u32,
    /// Samples per grain.
    #[clap(long, default_value_t = 1920)]
    samples_per_grain: u32,
    /// Channel count.
    #[clap(long, default_value_t = 2)]
    channels: u16,
    /// Audio format name, e.g. s16_interleaved.
    #[clap(long, default_value = "s16_interleaved")]
    format: String,
}

fn main() -> anyhow::Result<()> {
    gsf_tools::init_logger();
    let args = Args::parse();

    anyhow::ensure!(args.sample_rate > 0, "sample rate must be positive");
    anyhow::ensure!(args.samples_per_grain > 0, "samples per grain must be positive");
    anyhow::ensure!(args.channels > 0, "channel count must be positive");
    let format = gsf_tools::parse_audio_format(&args.format)?;

    let audio = AudioGrain {
        format,
        channels: args.channels,
        samples: args.samples_per_grain,
        sample_rate: args.sample_rate,
    };
    let sample_stride = format.bytes_per_sample() as usize * args.channels as usize;
    let grain_size = audio.expected_length() as usize;

    let mut input = BufReader::new(
        File::open(&args.input).with_context(|| format!("cannot open {}", args.input.display()))?,
    );
    let output = File::create(&args.output)
        .with_context(|| format!("cannot create {}", args.output.display()))?;

    let mut encoder = GsfEncoder::seekable(BufWriter::new(output));
    let segment = encoder.add_segment()?;
    encoder.add_segment_tag(segment, "encoder", "wrap_audio_in_gsf")?;
    encoder.start()?;

    let source_id = Uuid::new_v4();
    let flow_id = Uuid::new_v4();
    let mut samples_written = 0u64;
    let mut grains = 0u64;
    loop {
        let mut chunk = vec![0u8; grain_size];
        let filled = read_chunk(&mut input, &mut chunk)?;
        if filled == 0 {
            break;
        }
        let whole = filled / sample_stride;
        if whole == 0 {
            log::warn!("dropping {} trailing bytes of a partial sample", filled);
            break;
        }
        chunk.truncate(whole * sample_stride);

        let origin = Timestamp::from_nanos(
            i128::from(samples_written) * 1_000_000_000 / i128::from(args.sample_rate),
        )?;
        let mut meta = GrainMeta::new(source_id, flow_id, origin);
        meta.rate = Rational::new(args.sample_rate, args.samples_per_grain);
        meta.duration = Rational::new(whole as u32, args.sample_rate);

        let mut payload = audio.clone();
        payload.samples = whole as u32;
        let grain = Grain::with_data(meta, GrainPayload::Audio(payload), chunk);
        encoder.add_grain(segment, &grain)?;

        samples_written += whole as u64;
        grains += 1;
        if filled < grain_size {
            break;
        }
    }
    encoder.end()?;

    log::info!(
        "wrapped {} samples into {} grains at {} Hz",
        samples_written,
        grains,
        args.sample_rate
    );
    Ok(())
}

/// Fills `chunk` as far as the input goes; returns the bytes read.
fn read_chunk<R: Read>(reader: &mut R, chunk: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < chunk.len() {
        let n = reader.read(&mut chunk[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
