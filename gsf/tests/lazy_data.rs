use gsf::{
    decode_all, CogFrameFormat, CogFrameLayout, DecodeOptions, Grain, GrainData, GrainPayload,
    GsfDecoder, ReadOnlySource, VideoGrain,
};
use std::io::{Cursor, Read, Seek, SeekFrom};

mod common;

/// Counts the bytes actually read, as opposed to seeked over.
struct SpyingReader<R> {
    inner: R,
    bytes_read: u64,
}

impl<R> SpyingReader<R> {
    fn new(inner: R) -> Self {
        SpyingReader {
            inner,
            bytes_read: 0,
        }
    }
}

impl<R: Read> Read for SpyingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.bytes_read += n as u64;
        Ok(n)
    }
}

impl<R: Seek> Seek for SpyingReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.inner.seek(pos)
    }
}

/// Three full HD frames, 6 220 800 bytes each.
fn big_video_file() -> (Vec<u8>, Vec<Grain>) {
    let video = VideoGrain::with_geometry(
        CogFrameFormat::U8_420,
        CogFrameLayout::FullFrame,
        1920,
        2160,
    );
    assert_eq!(video.total_length(), 6_220_800);
    let grains: Vec<Grain> = (0u8..3)
        .map(|i| {
            Grain::with_data(
                common::base_meta(),
                GrainPayload::Video(video.clone()),
                vec![i; video.total_length() as usize],
            )
        })
        .collect();
    (common::encode_single_segment(&grains), grains)
}

#[test]
fn skip_data_reads_only_headers() {
    let (bytes, _) = big_video_file();
    let total = bytes.len() as u64;

    let spy = SpyingReader::new(Cursor::new(bytes));
    let mut decoder =
        GsfDecoder::with_options(spy, DecodeOptions::new().skip_data(true)).unwrap();

    let mut lazy_lengths = Vec::new();
    while let Some((_, grain)) = decoder.next_grain().unwrap() {
        match grain.data {
            GrainData::Lazy(lazy) => lazy_lengths.push(lazy.length),
            GrainData::Bytes(_) => panic!("data was materialised despite skip_data"),
        }
    }
    assert_eq!(lazy_lengths, vec![6_220_800; 3]);

    let bytes_read = decoder.into_inner().bytes_read;
    assert!(
        bytes_read < 2_000,
        "{} of {} bytes read, payloads were not skipped",
        bytes_read,
        total
    );
}

#[test]
fn lazy_handles_fetch_after_iteration() {
    let (bytes, originals) = big_video_file();
    let mut decoder = GsfDecoder::with_options(
        Cursor::new(bytes),
        DecodeOptions::new().skip_data(true),
    )
    .unwrap();

    let mut grains = Vec::new();
    while let Some((_, grain)) = decoder.next_grain().unwrap() {
        grains.push(grain);
    }
    for (mut grain, original) in grains.into_iter().zip(originals) {
        decoder.realize(&mut grain).unwrap();
        assert_eq!(grain, original);
    }
}

#[test]
fn fetches_interleave_with_iteration() {
    let (bytes, originals) = big_video_file();
    let mut decoder = GsfDecoder::with_options(
        Cursor::new(bytes),
        DecodeOptions::new().skip_data(true),
    )
    .unwrap();

    // Fetch the first grain's data while the grain loop is still running,
    // then keep iterating; the loop must be unaffected.
    let (_, mut first) = decoder.next_grain().unwrap().unwrap();
    decoder.realize(&mut first).unwrap();
    assert_eq!(first.data.bytes().unwrap()[0], 0);

    let mut rest = 0;
    while let Some((_, grain)) = decoder.next_grain().unwrap() {
        assert!(matches!(grain.data, GrainData::Lazy(_)));
        rest += 1;
    }
    assert_eq!(rest, originals.len() - 1);
}

#[test]
fn local_id_filter_skips_other_segments() {
    let grain = common::video_grain_16x2();
    let mut encoder = gsf::GsfEncoder::seekable(Cursor::new(Vec::new()));
    let one = encoder.add_segment_with(Some(1), None).unwrap();
    let two = encoder.add_segment_with(Some(2), None).unwrap();
    encoder.start().unwrap();
    encoder.add_grain(one, &grain).unwrap();
    encoder.add_grain(two, &grain).unwrap();
    encoder.add_grain(one, &grain).unwrap();
    encoder.end().unwrap();
    let bytes = encoder.into_inner().0.into_inner();

    let mut decoder = GsfDecoder::with_options(
        Cursor::new(bytes),
        DecodeOptions::new().local_ids([2]),
    )
    .unwrap();
    let collected: Vec<_> = decoder.grains().collect::<Result<Vec<_>, _>>().unwrap();
    assert_eq!(collected.len(), 1);
    assert_eq!(collected[0].0, 2);
}

#[test]
fn forward_only_sources_stream_but_do_not_fetch() {
    let (bytes, _) = big_video_file();

    // Streaming decode through the forward-only adapter.
    let source = ReadOnlySource::new(&bytes[..]);
    let mut decoder =
        GsfDecoder::with_options(source, DecodeOptions::new().skip_data(true)).unwrap();

    let (_, grain) = decoder.next_grain().unwrap().unwrap();
    let lazy = match grain.data {
        GrainData::Lazy(lazy) => lazy,
        GrainData::Bytes(_) => panic!("expected a lazy handle"),
    };
    // Rewinding to the payload is not possible on this source.
    assert!(decoder.fetch(&lazy).is_err());
    // But iteration carries on.
    assert!(decoder.next_grain().unwrap().is_some());
}

#[test]
fn eager_decode_still_materialises() {
    let (bytes, originals) = big_video_file();
    let file = decode_all(Cursor::new(bytes)).unwrap();
    assert_eq!(file.grains.values().next().unwrap(), &originals);
}
