use anyhow::Context;
use clap::Parser;
use gsf::{
    CogFrameLayout, Grain, GrainMeta, GrainPayload, GsfEncoder, Rational, Timestamp, VideoGrain,
};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read};
use std::path::PathBuf;
use uuid::Uuid;

/// Frames raw video bytes by the declared geometry and wraps one grain per
/// frame, origin timestamps incrementing at the declared rate.
#[derive(Parser, Debug)]
#[clap(name = "wrap_video_in_gsf", version)]
struct Args {
    /// Raw video input.
    input: PathBuf,
    /// GSF output.
    output: PathBuf,
    /// Frame geometry as WxH, e.g. 1920x1080.
    #[clap(long)]
    size: String,
    /// Frame format name, e.g. u8_422.
    #[clap(long, default_value = "u8_422")]
    format: String,
    /// Frame rate as num or num/den.
    #[clap(long, default_value = "25")]
    rate: String,
}

fn main() -> anyhow::Result<()> {
    gsf_tools::init_logger();
    let args = Args::parse();

    let (width, height) = gsf_tools::parse_size(&args.size)?;
    let format = gsf_tools::parse_frame_format(&args.format)?;
    let rate = gsf_tools::parse_rate(&args.rate)?;

    let video = VideoGrain::with_geometry(format, CogFrameLayout::FullFrame, width, height);
    let frame_size = video.total_length() as usize;
    anyhow::ensure!(frame_size > 0, "geometry implies empty frames");

    let mut input = BufReader::new(
        File::open(&args.input).with_context(|| format!("cannot open {}", args.input.display()))?,
    );
    let output = File::create(&args.output)
        .with_context(|| format!("cannot create {}", args.output.display()))?;

    let mut encoder = GsfEncoder::seekable(BufWriter::new(output));
    let segment = encoder.add_segment()?;
    encoder.add_segment_tag(segment, "encoder", "wrap_video_in_gsf")?;
    encoder.start()?;

    let source_id = Uuid::new_v4();
    let flow_id = Uuid::new_v4();
    let mut frames = 0u64;
    loop {
        let mut frame = vec![0u8; frame_size];
        match read_frame(&mut input, &mut frame)? {
            0 => break,
            n if n < frame_size => {
                log::warn!("dropping {} trailing bytes of a partial frame", n);
                break;
            }
            _ => {}
        }

        let origin = Timestamp::from_nanos(
            i128::from(frames) * i128::from(rate.denominator) * 1_000_000_000
                / i128::from(rate.numerator),
        )?;
        let mut meta = GrainMeta::new(source_id, flow_id, origin);
        meta.rate = rate;
        meta.duration = Rational::new(rate.denominator, rate.numerator);

        let grain = Grain::with_data(meta, GrainPayload::Video(video.clone()), frame);
        encoder.add_grain(segment, &grain)?;
        frames += 1;
    }
    encoder.end()?;

    log::info!(
        "wrapped {} frames of {}x{} {} at {}",
        frames,
        width,
        height,
        format,
        rate
    );
    Ok(())
}

/// Fills `frame` as far as the input goes; returns the bytes read.
fn read_frame<R: Read>(reader: &mut R, frame: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < frame.len() {
        let n = reader.read(&mut frame[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
