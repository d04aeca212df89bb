#![cfg(feature = "async")]

use gsf::{
    decode_all, decode_all_async, AsyncGsfDecoder, AsyncGsfEncoder, AsyncReadOnlySource,
    DecodeOptions, GrainData,
};
use std::io::Cursor;

mod common;

#[tokio::test]
async fn async_decode_matches_sync_decode() {
    let grains = vec![
        common::empty_grain(),
        common::video_grain_16x2(),
    ];
    let bytes = common::encode_single_segment(&grains);

    let sync_file = decode_all(Cursor::new(bytes.clone())).unwrap();
    let async_file = decode_all_async(Cursor::new(bytes)).await.unwrap();
    assert_eq!(sync_file.head, async_file.head);
    assert_eq!(sync_file.grains, async_file.grains);
}

#[tokio::test]
async fn async_encoder_round_trips() {
    let grains = vec![
        common::video_grain_16x2(),
        common::empty_grain(),
    ];

    let mut encoder = AsyncGsfEncoder::seekable(Cursor::new(Vec::new()));
    let segment = encoder.add_segment_with(Some(1), None).unwrap();
    encoder.add_segment_tag(segment, "codec", "raw").unwrap();
    encoder.start().await.unwrap();
    for grain in &grains {
        encoder.add_grain(segment, grain).await.unwrap();
    }
    encoder.end().await.unwrap();
    let bytes = encoder.into_inner().0.into_inner();

    let file = decode_all(Cursor::new(bytes)).unwrap();
    assert_eq!(file.head.segments[0].count, 2);
    assert_eq!(file.grains[&1], grains);
}

#[tokio::test]
async fn async_streaming_sink_leaves_counts_unknown() {
    let mut encoder = AsyncGsfEncoder::streaming(Vec::new());
    let segment = encoder.add_segment().unwrap();
    encoder.start().await.unwrap();
    encoder.add_grain(segment, &common::empty_grain()).await.unwrap();
    encoder.end().await.unwrap();
    let bytes = encoder.into_inner().0;

    let file = decode_all(Cursor::new(bytes)).unwrap();
    assert_eq!(file.head.segments[0].count, -1);
}

#[tokio::test]
async fn async_lazy_handles_fetch() {
    let grains = vec![common::video_grain_16x2()];
    let bytes = common::encode_single_segment(&grains);

    let mut decoder = AsyncGsfDecoder::with_options(
        Cursor::new(bytes),
        DecodeOptions::new().skip_data(true),
    )
    .await
    .unwrap();

    let (_, mut grain) = decoder.next_grain().await.unwrap().unwrap();
    assert!(matches!(grain.data, GrainData::Lazy(_)));
    decoder.realize(&mut grain).await.unwrap();
    assert_eq!(grain, grains[0]);
    assert!(decoder.next_grain().await.unwrap().is_none());
}

#[tokio::test]
async fn async_forward_only_source_streams() {
    let grains = vec![
        common::empty_grain(),
        common::video_grain_16x2(),
        common::empty_grain(),
    ];
    let bytes = common::encode_single_segment(&grains);

    let source = AsyncReadOnlySource::new(Cursor::new(bytes));
    let mut decoder = AsyncGsfDecoder::with_options(
        source,
        DecodeOptions::new().skip_data(true),
    )
    .await
    .unwrap();

    let mut count = 0;
    while let Some((_, grain)) = decoder.next_grain().await.unwrap() {
        if grain.data.len() > 0 {
            assert!(matches!(grain.data, GrainData::Lazy(_)));
        }
        count += 1;
    }
    assert_eq!(count, 3);
}
