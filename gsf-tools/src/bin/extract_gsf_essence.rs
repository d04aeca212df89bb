use anyhow::Context;
use clap::Parser;
use gsf::{DecodeOptions, GsfDecoder};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;

/// Concatenates the grain payloads of each segment into raw essence files.
///
/// With a single segment (or an explicit --local-id) the essence lands at
/// the given output path; multiple segments get `<out>.<local_id>` each.
#[derive(Parser, Debug)]
#[clap(name = "extract_gsf_essence", version)]
struct Args {
    /// The GSF file to read.
    input: PathBuf,
    /// Where the essence goes.
    output: PathBuf,
    /// Extract only the segment with this local id.
    #[clap(long)]
    local_id: Option<u16>,
}

fn main() -> anyhow::Result<()> {
    gsf_tools::init_logger();
    let args = Args::parse();

    let mut options = DecodeOptions::new();
    if let Some(local_id) = args.local_id {
        options = options.local_ids([local_id]);
    }
    let file = File::open(&args.input)
        .with_context(|| format!("cannot open {}", args.input.display()))?;
    let mut decoder = GsfDecoder::with_options(BufReader::new(file), options)
        .with_context(|| format!("cannot parse {}", args.input.display()))?;

    let single_output = args.local_id.is_some() || decoder.head().segments.len() <= 1;
    let mut outputs: BTreeMap<u16, BufWriter<File>> = BTreeMap::new();
    let mut written: BTreeMap<u16, u64> = BTreeMap::new();

    while let Some((local_id, grain)) = decoder.next_grain()? {
        let sink = match outputs.entry(local_id) {
            std::collections::btree_map::Entry::Occupied(e) => e.into_mut(),
            std::collections::btree_map::Entry::Vacant(e) => {
                let path = if single_output {
                    args.output.clone()
                } else {
                    let mut name = args.output.as_os_str().to_os_string();
                    name.push(format!(".{}", local_id));
                    PathBuf::from(name)
                };
                let file = File::create(&path)
                    .with_context(|| format!("cannot create {}", path.display()))?;
                e.insert(BufWriter::new(file))
            }
        };
        let bytes = grain
            .data
            .bytes()
            .context("grain data is an unfetched lazy handle")?;
        sink.write_all(bytes)?;
        *written.entry(local_id).or_default() += bytes.len() as u64;
    }

    for (local_id, sink) in &mut outputs {
        sink.flush()?;
        log::info!(
            "segment {}: {} essence bytes",
            local_id,
            written.get(local_id).copied().unwrap_or(0)
        );
    }
    Ok(())
}
