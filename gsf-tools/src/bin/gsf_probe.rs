use clap::Parser;
use gsf::{DecodeOptions, GrainType, GsfDecoder, GsfError};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::process::ExitCode;

/// Prints the structure of a GSF file: identity, segments, tags and
/// per-variant grain counts.
#[derive(Parser, Debug)]
#[clap(name = "gsf_probe", version)]
struct Args {
    /// The GSF file to inspect.
    file: PathBuf,
}

fn main() -> ExitCode {
    gsf_tools::init_logger();
    let args = Args::parse();
    match probe(&args.file) {
        Ok(()) => ExitCode::SUCCESS,
        Err(GsfError::Io(e)) => {
            eprintln!("gsf_probe: {}: {}", args.file.display(), e);
            ExitCode::from(1)
        }
        Err(e) => {
            eprintln!("gsf_probe: {}: {}", args.file.display(), e);
            ExitCode::from(2)
        }
    }
}

fn probe(path: &PathBuf) -> Result<(), GsfError> {
    let file = File::open(path)?;
    let mut decoder = GsfDecoder::with_options(
        BufReader::new(file),
        DecodeOptions::new().skip_data(true),
    )?;

    let header = *decoder.file_header();
    let head = decoder.head().clone();

    println!("GSF file: {}", path.display());
    println!(
        "  version: {}.{}",
        header.major_version, header.minor_version
    );
    println!("  id: {}", head.id);
    println!("  created: {}", head.created);
    println!("  tags: {}", head.tags.len());
    for (i, tag) in head.tags.iter().enumerate() {
        println!("    tag[{}]: {}={}", i, tag.key, tag.value);
    }

    // (grains observed, per-variant counts) keyed by local id
    let mut observed: BTreeMap<u16, BTreeMap<GrainType, u64>> = BTreeMap::new();
    while let Some((local_id, grain)) = decoder.next_grain()? {
        *observed
            .entry(local_id)
            .or_default()
            .entry(grain.grain_type())
            .or_default() += 1;
    }

    println!("  segments: {}", head.segments.len());
    for segment in &head.segments {
        let counts = observed.remove(&segment.local_id).unwrap_or_default();
        println!("  segment[local_id={}]", segment.local_id);
        println!("    id: {}", segment.id);
        println!("    declared count: {}", segment.count);
        println!(
            "    observed count: {}",
            counts.values().sum::<u64>()
        );
        println!("    tags: {}", segment.tags.len());
        for (i, tag) in segment.tags.iter().enumerate() {
            println!("      tag[{}]: {}={}", i, tag.key, tag.value);
        }
        for (grain_type, count) in &counts {
            println!("    {} grains: {}", grain_type, count);
        }
    }

    // grains of segments the head never declared
    for (local_id, counts) in &observed {
        println!("  undeclared segment[local_id={}]", local_id);
        println!("    observed count: {}", counts.values().sum::<u64>());
        for (grain_type, count) in counts {
            println!("    {} grains: {}", grain_type, count);
        }
    }
    Ok(())
}
