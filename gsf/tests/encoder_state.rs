use gsf::{decode_all, DecodeOptions, GsfDecoder, GsfEncoder, GsfError};
use std::io::Cursor;

mod common;

#[test]
fn grains_cannot_be_added_before_start() {
    let mut encoder = GsfEncoder::seekable(Cursor::new(Vec::new()));
    let segment = encoder.add_segment().unwrap();
    assert!(matches!(
        encoder.add_grain(segment, &common::empty_grain()),
        Err(GsfError::EncoderState { .. })
    ));
}

#[test]
fn end_requires_start() {
    let mut encoder = GsfEncoder::seekable(Cursor::new(Vec::new()));
    assert!(matches!(
        encoder.end(),
        Err(GsfError::EncoderState { .. })
    ));
}

#[test]
fn start_happens_once() {
    let mut encoder = GsfEncoder::seekable(Cursor::new(Vec::new()));
    encoder.add_segment().unwrap();
    encoder.start().unwrap();
    assert!(matches!(
        encoder.start(),
        Err(GsfError::EncoderState { .. })
    ));
}

#[test]
fn closed_encoders_refuse_grains() {
    let mut encoder = GsfEncoder::seekable(Cursor::new(Vec::new()));
    let segment = encoder.add_segment().unwrap();
    encoder.start().unwrap();
    encoder.end().unwrap();
    assert!(matches!(
        encoder.add_grain(segment, &common::empty_grain()),
        Err(GsfError::EncoderState { .. })
    ));
}

#[test]
fn file_tags_are_fixed_at_start() {
    let mut encoder = GsfEncoder::seekable(Cursor::new(Vec::new()));
    encoder.add_segment().unwrap();
    encoder.add_file_tag("before", "ok").unwrap();
    encoder.start().unwrap();
    assert!(matches!(
        encoder.add_file_tag("after", "no"),
        Err(GsfError::EncoderState { .. })
    ));
}

#[test]
fn segment_tags_are_fixed_at_start() {
    let mut encoder = GsfEncoder::seekable(Cursor::new(Vec::new()));
    let segment = encoder.add_segment().unwrap();
    encoder.start().unwrap();
    assert!(matches!(
        encoder.add_segment_tag(segment, "late", "no"),
        Err(GsfError::EncoderState { .. })
    ));
}

#[test]
fn duplicate_local_ids_are_rejected() {
    let mut encoder = GsfEncoder::seekable(Cursor::new(Vec::new()));
    encoder.add_segment_with(Some(7), None).unwrap();
    assert!(matches!(
        encoder.add_segment_with(Some(7), None),
        Err(GsfError::DuplicateLocalId(7))
    ));
    // Fresh ids steer around taken ones.
    let next = encoder.add_segment().unwrap();
    assert_ne!(next.local_id(), 7);
}

#[test]
fn segments_added_after_start_are_undeclared() {
    let mut encoder = GsfEncoder::seekable(Cursor::new(Vec::new()));
    let declared = encoder.add_segment_with(Some(1), None).unwrap();
    encoder.start().unwrap();
    let late = encoder.add_segment_with(Some(2), None).unwrap();
    encoder.add_grain(declared, &common::empty_grain()).unwrap();
    encoder.add_grain(late, &common::empty_grain()).unwrap();
    encoder.end().unwrap();
    let bytes = encoder.into_inner().0.into_inner();

    // The head only declares segment 1; segment 2's grains are still in
    // the stream and a non-strict decode sees them.
    let mut decoder = GsfDecoder::with_options(
        Cursor::new(bytes.clone()),
        DecodeOptions::new(),
    )
    .unwrap();
    assert_eq!(decoder.head().segments.len(), 1);
    assert_eq!(decoder.head().segments[0].local_id, 1);
    let collected: Vec<_> = decoder.grains().collect::<Result<Vec<_>, _>>().unwrap();
    assert_eq!(collected.len(), 2);

    // Strict decode refuses the undeclared local id.
    assert!(matches!(
        decode_all(Cursor::new(bytes)),
        Err(GsfError::UnknownLocalId(2))
    ));
}

#[test]
fn grain_counts_track_writes() {
    let mut encoder = GsfEncoder::seekable(Cursor::new(Vec::new()));
    let segment = encoder.add_segment().unwrap();
    encoder.start().unwrap();
    assert_eq!(encoder.grain_count(segment), 0);
    encoder.add_grain(segment, &common::empty_grain()).unwrap();
    encoder.add_grain(segment, &common::empty_grain()).unwrap();
    assert_eq!(encoder.grain_count(segment), 2);
}

#[test]
fn overlong_tag_values_are_rejected() {
    let mut encoder = GsfEncoder::seekable(Cursor::new(Vec::new()));
    encoder.add_segment().unwrap();
    let long = "x".repeat(70_000);
    encoder.add_file_tag("key", &long).unwrap();
    assert!(matches!(
        encoder.start(),
        Err(GsfError::ValueOutOfRange(_))
    ));
}

#[test]
fn unit_offsets_must_stay_inside_the_payload() {
    use gsf::{CodedVideoGrain, CogFrameFormat, CogFrameLayout, Grain, GrainPayload};

    let grain = Grain::with_data(
        common::base_meta(),
        GrainPayload::CodedVideo(CodedVideoGrain {
            format: CogFrameFormat::U8_420,
            layout: CogFrameLayout::FullFrame,
            origin_width: 64,
            origin_height: 64,
            coded_width: 64,
            coded_height: 64,
            key_frame: false,
            temporal_offset: 0,
            unit_offsets: vec![0, 100],
        }),
        vec![0u8; 100],
    );

    let mut encoder = GsfEncoder::seekable(Cursor::new(Vec::new()));
    let segment = encoder.add_segment().unwrap();
    encoder.start().unwrap();
    assert!(matches!(
        encoder.add_grain(segment, &grain),
        Err(GsfError::ValueOutOfRange(_))
    ));
}

#[test]
fn lazy_data_cannot_be_encoded() {
    let mut grain = common::empty_grain();
    grain.data = gsf::GrainData::Lazy(gsf::LazyData {
        offset: 0,
        length: 10,
    });

    let mut encoder = GsfEncoder::seekable(Cursor::new(Vec::new()));
    let segment = encoder.add_segment().unwrap();
    encoder.start().unwrap();
    assert!(matches!(
        encoder.add_grain(segment, &grain),
        Err(GsfError::ValueOutOfRange(_))
    ));
}

/// A writer that fails after a byte budget, for exercising the failed
/// state.
struct FailingWriter {
    budget: usize,
}

impl std::io::Write for FailingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if buf.len() > self.budget {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            ));
        }
        self.budget -= buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn write_errors_are_sticky() {
    let mut encoder = GsfEncoder::streaming(FailingWriter { budget: 150 });
    let segment = encoder.add_segment().unwrap();
    encoder.start().unwrap();

    let mut failed = false;
    for _ in 0..4 {
        if encoder.add_grain(segment, &common::video_grain_16x2()).is_err() {
            failed = true;
            break;
        }
    }
    assert!(failed, "writer budget never exhausted");

    // Everything afterwards reports the failed state.
    assert!(matches!(
        encoder.add_grain(segment, &common::empty_grain()),
        Err(GsfError::EncoderState { .. })
    ));
    assert!(matches!(encoder.end(), Err(GsfError::EncoderState { .. })));
}
