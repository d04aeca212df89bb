use byteorder::{LittleEndian, WriteBytesExt};
use gsf::block::{BlockBuilder, FileHeader};
use gsf::prelude::Encode;
use gsf::{decode_all, DateTime, GsfDecoder, Rational, Timestamp};
use std::io::{Cursor, Write};

mod common;

fn write_file_header(out: &mut Vec<u8>, major: u16, minor: u16) {
    FileHeader {
        file_type: *b"grsg",
        major_version: major,
        minor_version: minor,
    }
    .write_to(out)
    .unwrap();
}

fn write_head(out: &mut Vec<u8>, major: u16) {
    let mut b = BlockBuilder::new();
    b.begin(*b"head");
    common::SOURCE_ID.write_to(&mut b).unwrap();
    if major >= 8 {
        DateTime::from_unix_seconds(1_611_446_400).write_to(&mut b).unwrap();
    } else {
        // v7: 10 octet unsigned timestamp plus a deprecated zero region
        b.write_u48::<LittleEndian>(1_611_446_400).unwrap();
        b.write_u32::<LittleEndian>(0).unwrap();
        b.write_all(&[0u8; 16]).unwrap();
    }
    b.begin(*b"segm");
    b.write_u16::<LittleEndian>(1).unwrap();
    common::FLOW_ID.write_to(&mut b).unwrap();
    b.write_i64::<LittleEndian>(-1).unwrap();
    b.end().unwrap();
    b.end().unwrap();
    out.extend_from_slice(&b.into_bytes());
}

/// One empty grain for segment 1, optionally with an unrecognised child
/// block inside its gbhd.
fn write_empty_grain(out: &mut Vec<u8>, unknown_child: bool) {
    let mut b = BlockBuilder::new();
    b.begin(*b"grai");
    b.write_u16::<LittleEndian>(1).unwrap();
    b.begin(*b"gbhd");
    common::SOURCE_ID.write_to(&mut b).unwrap();
    common::FLOW_ID.write_to(&mut b).unwrap();
    Timestamp::ZERO.write_to(&mut b).unwrap();
    Timestamp::ZERO.write_to(&mut b).unwrap();
    Rational::new(25, 1).write_to(&mut b).unwrap();
    Rational::new(1, 25).write_to(&mut b).unwrap();
    if unknown_child {
        b.begin(*b"xxxx");
        b.write_all(&[0xeeu8; 8]).unwrap();
        b.end().unwrap();
    }
    b.end().unwrap();
    b.begin(*b"grdt");
    b.end().unwrap();
    b.end().unwrap();
    out.extend_from_slice(&b.into_bytes());
}

fn write_terminator(out: &mut Vec<u8>) {
    out.extend_from_slice(b"grai");
    out.extend_from_slice(&0u32.to_le_bytes());
}

#[test]
fn newer_minor_with_unknown_child_decodes_identically() {
    let mut plain = Vec::new();
    write_file_header(&mut plain, 8, 0);
    write_head(&mut plain, 8);
    write_empty_grain(&mut plain, false);
    write_terminator(&mut plain);

    let mut extended = Vec::new();
    write_file_header(&mut extended, 8, 99);
    write_head(&mut extended, 8);
    write_empty_grain(&mut extended, true);
    write_terminator(&mut extended);

    let a = decode_all(Cursor::new(plain)).unwrap();
    let b = decode_all(Cursor::new(extended)).unwrap();
    assert_eq!(a.head, b.head);
    assert_eq!(a.grains, b.grains);
}

#[test]
fn unknown_top_level_blocks_are_skipped() {
    let grain = common::video_grain_16x2();
    let bytes = common::encode_single_segment(std::slice::from_ref(&grain));
    let reference = decode_all(Cursor::new(bytes.clone())).unwrap();

    // Splice an unrecognised block between head and the first grai.
    let head_size =
        u32::from_le_bytes(bytes[16..20].try_into().unwrap()) as usize;
    let at = 12 + head_size;
    let mut spliced = bytes[..at].to_vec();
    spliced.extend_from_slice(b"junk");
    spliced.extend_from_slice(&16u32.to_le_bytes());
    spliced.extend_from_slice(&[0xa5; 8]);
    spliced.extend_from_slice(&bytes[at..]);

    let result = decode_all(Cursor::new(spliced)).unwrap();
    assert_eq!(result.grains, reference.grains);
}

#[test]
fn fill_blocks_are_skipped_everywhere() {
    let mut bytes = Vec::new();
    write_file_header(&mut bytes, 8, 0);

    // fill before head
    let mut fill = BlockBuilder::new();
    fill.fill(32).unwrap();
    bytes.extend_from_slice(&fill.into_bytes());

    write_head(&mut bytes, 8);
    write_empty_grain(&mut bytes, false);

    // fill between grains and before the terminator
    let mut fill = BlockBuilder::new();
    fill.fill(5).unwrap();
    bytes.extend_from_slice(&fill.into_bytes());
    write_terminator(&mut bytes);

    let file = decode_all(Cursor::new(bytes)).unwrap();
    assert_eq!(file.grains[&1].len(), 1);
}

#[test]
fn v7_head_layout_is_recognised() {
    let mut bytes = Vec::new();
    write_file_header(&mut bytes, 7, 0);
    write_head(&mut bytes, 7);
    write_empty_grain(&mut bytes, false);
    write_terminator(&mut bytes);

    let file = decode_all(Cursor::new(bytes)).unwrap();
    assert_eq!(file.head.created, DateTime::from_unix_seconds(1_611_446_400));
    assert_eq!(file.grains[&1].len(), 1);
}

#[test]
fn both_terminator_forms_are_accepted() {
    // Header-only grai of size 8.
    let mut sized = Vec::new();
    write_file_header(&mut sized, 8, 0);
    write_head(&mut sized, 8);
    write_empty_grain(&mut sized, false);
    sized.extend_from_slice(b"grai");
    sized.extend_from_slice(&8u32.to_le_bytes());

    // Eight zero octets.
    let mut zeroed = Vec::new();
    write_file_header(&mut zeroed, 8, 0);
    write_head(&mut zeroed, 8);
    write_empty_grain(&mut zeroed, false);
    zeroed.extend_from_slice(&[0u8; 8]);

    for bytes in [sized, zeroed] {
        let mut decoder = GsfDecoder::new(Cursor::new(bytes)).unwrap();
        assert!(decoder.next_grain().unwrap().is_some());
        assert!(decoder.next_grain().unwrap().is_none());
    }
}

#[test]
fn missing_terminator_tolerated_when_streaming() {
    let mut bytes = Vec::new();
    write_file_header(&mut bytes, 8, 0);
    write_head(&mut bytes, 8);
    write_empty_grain(&mut bytes, false);
    // no terminator

    let mut decoder = GsfDecoder::new(Cursor::new(bytes.clone())).unwrap();
    assert!(decoder.next_grain().unwrap().is_some());
    assert!(decoder.next_grain().unwrap().is_none());

    // strict mode refuses the same stream
    assert!(decode_all(Cursor::new(bytes)).is_err());
}

#[test]
fn undeclared_local_id_needs_non_strict_mode() {
    let mut bytes = Vec::new();
    write_file_header(&mut bytes, 8, 0);
    write_head(&mut bytes, 8);
    write_empty_grain(&mut bytes, false);
    // a grain naming a local id with no segm entry
    {
        let mut b = BlockBuilder::new();
        b.begin(*b"grai");
        b.write_u16::<LittleEndian>(9).unwrap();
        b.begin(*b"gbhd");
        common::SOURCE_ID.write_to(&mut b).unwrap();
        common::FLOW_ID.write_to(&mut b).unwrap();
        Timestamp::ZERO.write_to(&mut b).unwrap();
        Timestamp::ZERO.write_to(&mut b).unwrap();
        Rational::new(25, 1).write_to(&mut b).unwrap();
        Rational::new(1, 25).write_to(&mut b).unwrap();
        b.end().unwrap();
        b.begin(*b"grdt");
        b.end().unwrap();
        b.end().unwrap();
        bytes.extend_from_slice(&b.into_bytes());
    }
    write_terminator(&mut bytes);

    let mut decoder = GsfDecoder::new(Cursor::new(bytes.clone())).unwrap();
    let collected: Vec<_> = decoder.grains().collect::<Result<Vec<_>, _>>().unwrap();
    assert_eq!(collected.len(), 2);
    assert_eq!(collected[1].0, 9);

    assert!(matches!(
        decode_all(Cursor::new(bytes)),
        Err(gsf::GsfError::UnknownLocalId(9))
    ));
}
