#![allow(dead_code)]

use gsf::{
    CogFrameFormat, CogFrameLayout, Grain, GrainMeta, GrainPayload, GsfEncoder, Rational,
    Timestamp, VideoGrain,
};
use std::io::Cursor;
use uuid::Uuid;

pub const SOURCE_ID: Uuid = Uuid::from_bytes([
    0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd, 0xee,
    0xff,
]);

pub const FLOW_ID: Uuid = Uuid::from_bytes([
    0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff,
    0x00,
]);

pub fn base_meta() -> GrainMeta {
    let mut meta = GrainMeta::new(SOURCE_ID, FLOW_ID, Timestamp::ZERO);
    meta.rate = Rational::new(25, 1);
    meta.duration = Rational::new(1, 25);
    meta
}

pub fn empty_grain() -> Grain {
    Grain::new(base_meta(), GrainPayload::Empty)
}

/// A 16x2 U8_422 grain: components 16x2/stride 16/length 32, then two of
/// 8x2/stride 8/length 16, 64 bytes total, filled with a counting pattern.
pub fn video_grain_16x2() -> Grain {
    let video = VideoGrain::with_geometry(
        CogFrameFormat::U8_422,
        CogFrameLayout::FullFrame,
        16,
        2,
    );
    let data: Vec<u8> = (0u8..64).collect();
    Grain::with_data(base_meta(), GrainPayload::Video(video), data)
}

/// Encodes grains into one segment on a seekable in-memory sink.
pub fn encode_single_segment(grains: &[Grain]) -> Vec<u8> {
    let mut encoder = GsfEncoder::seekable(Cursor::new(Vec::new()));
    let segment = encoder.add_segment().unwrap();
    encoder.start().unwrap();
    for grain in grains {
        encoder.add_grain(segment, grain).unwrap();
    }
    encoder.end().unwrap();
    encoder.into_inner().0.into_inner()
}
