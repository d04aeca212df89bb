use crate::block::{tags, BlockBuilder, ChildBlocks};
use crate::error::GsfError;
use crate::format::{CogAudioFormat, CogFrameFormat, CogFrameLayout};
use crate::grain::{
    AudioGrain, CodedAudioGrain, CodedVideoGrain, EventGrain, Grain, GrainMeta, GrainPayload,
    VideoComponent, VideoGrain,
};
use crate::prelude::*;
use crate::types::{Rational, TimeLabel, Timestamp};
use crate::utils::skip;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Read;
use uuid::Uuid;

/// Parses a `gbhd` payload into the common header and the payload variant.
/// A body without a variant child is an empty grain.
pub(crate) fn parse_gbhd<R: Read>(
    reader: &mut R,
    payload_len: u64,
) -> Result<(GrainMeta, GrainPayload)> {
    let mut bounded = reader.take(payload_len);

    let source_id = Uuid::from_reader(&mut bounded)?;
    let flow_id = Uuid::from_reader(&mut bounded)?;
    let origin_timestamp = Timestamp::from_reader(&mut bounded)?;
    let sync_timestamp = Timestamp::from_reader(&mut bounded)?;
    let rate = Rational::from_reader(&mut bounded)?;
    let duration = Rational::from_reader(&mut bounded)?;

    let mut timelabels = Vec::new();
    let mut payload: Option<GrainPayload> = None;

    let mut children = ChildBlocks::new(bounded.limit());
    while let Some(header) = children.next(&mut bounded)? {
        let len = header.payload_len()?;
        let mut child = (&mut bounded).take(len);
        match header.tag {
            tags::TILS => {
                let n = child.read_u16::<LittleEndian>()?;
                for _ in 0..n {
                    timelabels.push(TimeLabel::from_reader(&mut child)?);
                }
            }
            tags::VGHD => set_variant(&mut payload, parse_vghd(&mut child, len)?)?,
            tags::CGHD => set_variant(&mut payload, parse_cghd(&mut child, len)?)?,
            tags::AGHD => set_variant(&mut payload, parse_aghd(&mut child)?)?,
            tags::CAHD => set_variant(&mut payload, parse_cahd(&mut child)?)?,
            tags::EGHD => {
                let event = EventGrain {
                    event_type: child.read_u8()?,
                };
                set_variant(&mut payload, GrainPayload::Event(event))?;
            }
            other => {
                log::debug!(
                    "skipping {} block inside gbhd",
                    String::from_utf8_lossy(&other)
                );
            }
        }
        let rest = child.limit();
        skip(&mut child, rest)?;
    }

    let meta = GrainMeta {
        source_id,
        flow_id,
        origin_timestamp,
        sync_timestamp,
        creation_timestamp: origin_timestamp,
        rate,
        duration,
        timelabels,
    };
    Ok((meta, payload.unwrap_or(GrainPayload::Empty)))
}

fn set_variant(slot: &mut Option<GrainPayload>, payload: GrainPayload) -> Result<()> {
    if slot.is_some() {
        return Err(GsfError::MalformedBlock(
            "gbhd carries more than one variant header".to_string(),
        ));
    }
    *slot = Some(payload);
    Ok(())
}

fn parse_vghd<R: Read>(reader: &mut R, payload_len: u64) -> Result<GrainPayload> {
    let mut bounded = reader.take(payload_len);
    let format = CogFrameFormat::from(bounded.read_u32::<LittleEndian>()?);
    let layout = CogFrameLayout::from(bounded.read_u32::<LittleEndian>()?);
    let width = bounded.read_u32::<LittleEndian>()?;
    let height = bounded.read_u32::<LittleEndian>()?;
    let extension = bounded.read_u32::<LittleEndian>()?;
    let aspect_ratio = Rational::from_reader(&mut bounded)?;
    let pixel_aspect_ratio = Rational::from_reader(&mut bounded)?;

    let mut components = Vec::new();
    let mut children = ChildBlocks::new(bounded.limit());
    while let Some(header) = children.next(&mut bounded)? {
        let mut child = (&mut bounded).take(header.payload_len()?);
        if header.tag == tags::COMP {
            let n = child.read_u16::<LittleEndian>()?;
            components.reserve(n as usize);
            for _ in 0..n {
                components.push(VideoComponent {
                    width: child.read_u32::<LittleEndian>()?,
                    height: child.read_u32::<LittleEndian>()?,
                    stride: child.read_u32::<LittleEndian>()?,
                    length: child.read_u32::<LittleEndian>()?,
                });
            }
        }
        let rest = child.limit();
        skip(&mut child, rest)?;
    }

    Ok(GrainPayload::Video(VideoGrain {
        format,
        layout,
        width,
        height,
        extension,
        aspect_ratio,
        pixel_aspect_ratio,
        components,
    }))
}

fn parse_cghd<R: Read>(reader: &mut R, payload_len: u64) -> Result<GrainPayload> {
    let mut bounded = reader.take(payload_len);
    let format = CogFrameFormat::from(bounded.read_u32::<LittleEndian>()?);
    let layout = CogFrameLayout::from(bounded.read_u32::<LittleEndian>()?);
    let origin_width = bounded.read_u32::<LittleEndian>()?;
    let origin_height = bounded.read_u32::<LittleEndian>()?;
    let coded_width = bounded.read_u32::<LittleEndian>()?;
    let coded_height = bounded.read_u32::<LittleEndian>()?;
    let key_frame = bounded.read_u8()? != 0;
    let temporal_offset = bounded.read_i32::<LittleEndian>()?;

    let mut unit_offsets = Vec::new();
    let mut children = ChildBlocks::new(bounded.limit());
    while let Some(header) = children.next(&mut bounded)? {
        let mut child = (&mut bounded).take(header.payload_len()?);
        if header.tag == tags::UNOF {
            let n = child.read_u16::<LittleEndian>()?;
            unit_offsets.reserve(n as usize);
            for _ in 0..n {
                unit_offsets.push(child.read_u32::<LittleEndian>()?);
            }
        }
        let rest = child.limit();
        skip(&mut child, rest)?;
    }

    Ok(GrainPayload::CodedVideo(CodedVideoGrain {
        format,
        layout,
        origin_width,
        origin_height,
        coded_width,
        coded_height,
        key_frame,
        temporal_offset,
        unit_offsets,
    }))
}

fn parse_aghd<R: Read>(reader: &mut R) -> Result<GrainPayload> {
    Ok(GrainPayload::Audio(AudioGrain {
        format: CogAudioFormat::from(reader.read_u32::<LittleEndian>()?),
        channels: reader.read_u16::<LittleEndian>()?,
        samples: reader.read_u32::<LittleEndian>()?,
        sample_rate: reader.read_u32::<LittleEndian>()?,
    }))
}

fn parse_cahd<R: Read>(reader: &mut R) -> Result<GrainPayload> {
    Ok(GrainPayload::CodedAudio(CodedAudioGrain {
        format: CogAudioFormat::from(reader.read_u32::<LittleEndian>()?),
        channels: reader.read_u16::<LittleEndian>()?,
        samples: reader.read_u32::<LittleEndian>()?,
        priming: reader.read_u32::<LittleEndian>()?,
        remainder: reader.read_u32::<LittleEndian>()?,
        sample_rate: reader.read_u32::<LittleEndian>()?,
    }))
}

#[cfg(feature = "async")]
pub(crate) async fn parse_gbhd_async<R>(
    reader: &mut R,
    payload_len: u64,
) -> Result<(GrainMeta, GrainPayload)>
where
    R: AsyncRead + Unpin + Send,
{
    // Variant headers are small and fully contained in the gbhd payload, so
    // the async path buffers the payload once and reuses the sync parser.
    let raw = crate::utils::take_async(reader, payload_len as usize).await?;
    parse_gbhd(&mut std::io::Cursor::new(raw), payload_len)
}

fn check_u16_count(len: usize, what: &str) -> Result<u16> {
    u16::try_from(len).map_err(|_| {
        GsfError::ValueOutOfRange(format!("{} entries of {} exceed the u16 count field", len, what))
    })
}

/// Serializes a grain's `gbhd` block into the builder: common header, then
/// `tils` when labels are present, then the variant header.
pub(crate) fn write_gbhd(builder: &mut BlockBuilder, grain: &Grain) -> Result<()> {
    builder.begin(tags::GBHD);
    grain.meta.source_id.write_to(builder)?;
    grain.meta.flow_id.write_to(builder)?;
    grain.meta.origin_timestamp.write_to(builder)?;
    grain.meta.sync_timestamp.write_to(builder)?;
    grain.meta.rate.write_to(builder)?;
    grain.meta.duration.write_to(builder)?;

    if !grain.meta.timelabels.is_empty() {
        builder.begin(tags::TILS);
        builder.write_u16::<LittleEndian>(check_u16_count(
            grain.meta.timelabels.len(),
            "timelabels",
        )?)?;
        for label in &grain.meta.timelabels {
            label.write_to(builder)?;
        }
        builder.end()?;
    }

    match &grain.payload {
        GrainPayload::Empty => {}
        GrainPayload::Video(video) => write_vghd(builder, video)?,
        GrainPayload::CodedVideo(coded) => write_cghd(builder, coded, grain.data.len())?,
        GrainPayload::Audio(audio) => {
            builder.begin(tags::AGHD);
            builder.write_u32::<LittleEndian>(u32::from(audio.format))?;
            builder.write_u16::<LittleEndian>(audio.channels)?;
            builder.write_u32::<LittleEndian>(audio.samples)?;
            builder.write_u32::<LittleEndian>(audio.sample_rate)?;
            builder.end()?;
        }
        GrainPayload::CodedAudio(coded) => {
            builder.begin(tags::CAHD);
            builder.write_u32::<LittleEndian>(u32::from(coded.format))?;
            builder.write_u16::<LittleEndian>(coded.channels)?;
            builder.write_u32::<LittleEndian>(coded.samples)?;
            builder.write_u32::<LittleEndian>(coded.priming)?;
            builder.write_u32::<LittleEndian>(coded.remainder)?;
            builder.write_u32::<LittleEndian>(coded.sample_rate)?;
            builder.end()?;
        }
        GrainPayload::Event(event) => {
            builder.begin(tags::EGHD);
            builder.write_u8(event.event_type)?;
            builder.end()?;
        }
    }

    builder.end()
}

fn write_vghd(builder: &mut BlockBuilder, video: &VideoGrain) -> Result<()> {
    builder.begin(tags::VGHD);
    builder.write_u32::<LittleEndian>(u32::from(video.format))?;
    builder.write_u32::<LittleEndian>(u32::from(video.layout))?;
    builder.write_u32::<LittleEndian>(video.width)?;
    builder.write_u32::<LittleEndian>(video.height)?;
    builder.write_u32::<LittleEndian>(video.extension)?;
    video.aspect_ratio.write_to(builder)?;
    video.pixel_aspect_ratio.write_to(builder)?;

    if !video.components.is_empty() {
        builder.begin(tags::COMP);
        builder.write_u16::<LittleEndian>(check_u16_count(video.components.len(), "components")?)?;
        for component in &video.components {
            builder.write_u32::<LittleEndian>(component.width)?;
            builder.write_u32::<LittleEndian>(component.height)?;
            builder.write_u32::<LittleEndian>(component.stride)?;
            builder.write_u32::<LittleEndian>(component.length)?;
        }
        builder.end()?;
    }
    builder.end()
}

fn write_cghd(builder: &mut BlockBuilder, coded: &CodedVideoGrain, data_len: u64) -> Result<()> {
    builder.begin(tags::CGHD);
    builder.write_u32::<LittleEndian>(u32::from(coded.format))?;
    builder.write_u32::<LittleEndian>(u32::from(coded.layout))?;
    builder.write_u32::<LittleEndian>(coded.origin_width)?;
    builder.write_u32::<LittleEndian>(coded.origin_height)?;
    builder.write_u32::<LittleEndian>(coded.coded_width)?;
    builder.write_u32::<LittleEndian>(coded.coded_height)?;
    builder.write_u8(u8::from(coded.key_frame))?;
    builder.write_i32::<LittleEndian>(coded.temporal_offset)?;

    if !coded.unit_offsets.is_empty() {
        for &offset in &coded.unit_offsets {
            if u64::from(offset) >= data_len {
                return Err(GsfError::ValueOutOfRange(format!(
                    "unit offset {} not below the payload length {}",
                    offset, data_len
                )));
            }
        }
        builder.begin(tags::UNOF);
        builder.write_u16::<LittleEndian>(check_u16_count(
            coded.unit_offsets.len(),
            "unit offsets",
        )?)?;
        for &offset in &coded.unit_offsets {
            builder.write_u32::<LittleEndian>(offset)?;
        }
        builder.end()?;
    }
    builder.end()
}
