use crate::format::{CogAudioFormat, CogFrameFormat, CogFrameLayout};
use crate::types::{Rational, TimeLabel, Timestamp};
use std::fmt;
use uuid::Uuid;

/// The discriminant of a grain's payload variant.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GrainType {
    Empty,
    Video,
    CodedVideo,
    Audio,
    CodedAudio,
    Event,
}

impl GrainType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrainType::Empty => "empty",
            GrainType::Video => "video",
            GrainType::CodedVideo => "coded_video",
            GrainType::Audio => "audio",
            GrainType::CodedAudio => "coded_audio",
            GrainType::Event => "event",
        }
    }
}

impl fmt::Display for GrainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields shared by every grain variant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrainMeta {
    pub source_id: Uuid,
    pub flow_id: Uuid,
    pub origin_timestamp: Timestamp,
    pub sync_timestamp: Timestamp,
    /// Wall clock time the grain was created. Not carried on the wire; the
    /// decoder sets it to the decoded origin timestamp.
    pub creation_timestamp: Timestamp,
    pub rate: Rational,
    pub duration: Rational,
    pub timelabels: Vec<TimeLabel>,
}

impl GrainMeta {
    pub fn new(source_id: Uuid, flow_id: Uuid, origin: Timestamp) -> Self {
        GrainMeta {
            source_id,
            flow_id,
            origin_timestamp: origin,
            sync_timestamp: origin,
            creation_timestamp: origin,
            rate: Rational::new(25, 1),
            duration: Rational::new(1, 25),
            timelabels: Vec::new(),
        }
    }
}

/// One plane of a video grain. The offset of a component is implied by the
/// lengths of the components before it and is never stored.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct VideoComponent {
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub length: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VideoGrain {
    pub format: CogFrameFormat,
    pub layout: CogFrameLayout,
    pub width: u32,
    pub height: u32,
    pub extension: u32,
    pub aspect_ratio: Rational,
    pub pixel_aspect_ratio: Rational,
    pub components: Vec<VideoComponent>,
}

impl VideoGrain {
    /// Derives the component list for a format and geometry: one component
    /// for packed formats, luma plus two subsampled chroma planes for planar
    /// ones, strides tight.
    pub fn with_geometry(
        format: CogFrameFormat,
        layout: CogFrameLayout,
        width: u32,
        height: u32,
    ) -> Self {
        let components = if format.is_planar() {
            let bpv = format.bytes_per_value();
            let chroma_width = width >> format.horizontal_shift();
            let chroma_height = height >> format.vertical_shift();
            let luma = VideoComponent {
                width,
                height,
                stride: width * bpv,
                length: width * bpv * height,
            };
            let chroma = VideoComponent {
                width: chroma_width,
                height: chroma_height,
                stride: chroma_width * bpv,
                length: chroma_width * bpv * chroma_height,
            };
            vec![luma, chroma, chroma]
        } else {
            let stride = width * format.packed_bytes_per_pixel();
            vec![VideoComponent {
                width,
                height,
                stride,
                length: stride * height,
            }]
        };
        VideoGrain {
            format,
            layout,
            width,
            height,
            extension: 0,
            aspect_ratio: Rational::new(0, 0),
            pixel_aspect_ratio: Rational::new(0, 0),
            components,
        }
    }

    /// Component offsets, each the sum of the preceding lengths.
    pub fn component_offsets(&self) -> Vec<u64> {
        let mut offsets = Vec::with_capacity(self.components.len());
        let mut offset = 0u64;
        for component in &self.components {
            offsets.push(offset);
            offset += u64::from(component.length);
        }
        offsets
    }

    pub fn total_length(&self) -> u64 {
        self.components.iter().map(|c| u64::from(c.length)).sum()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodedVideoGrain {
    pub format: CogFrameFormat,
    pub layout: CogFrameLayout,
    pub origin_width: u32,
    pub origin_height: u32,
    pub coded_width: u32,
    pub coded_height: u32,
    pub key_frame: bool,
    pub temporal_offset: i32,
    pub unit_offsets: Vec<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioGrain {
    pub format: CogAudioFormat,
    pub channels: u16,
    pub samples: u32,
    pub sample_rate: u32,
}

impl AudioGrain {
    /// Payload length implied by `format x channels x samples`. The codec
    /// never recomputes this; consumers and the wrap tools may.
    pub fn expected_length(&self) -> u64 {
        u64::from(self.format.bytes_per_sample())
            * u64::from(self.channels)
            * u64::from(self.samples)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodedAudioGrain {
    pub format: CogAudioFormat,
    pub channels: u16,
    pub samples: u32,
    pub priming: u32,
    pub remainder: u32,
    pub sample_rate: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventGrain {
    /// Payload type; 0 is a JSON payload by convention.
    pub event_type: u8,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GrainPayload {
    Empty,
    Video(VideoGrain),
    CodedVideo(CodedVideoGrain),
    Audio(AudioGrain),
    CodedAudio(CodedAudioGrain),
    Event(EventGrain),
}

impl From<&GrainPayload> for GrainType {
    fn from(payload: &GrainPayload) -> Self {
        match payload {
            GrainPayload::Empty => GrainType::Empty,
            GrainPayload::Video(_) => GrainType::Video,
            GrainPayload::CodedVideo(_) => GrainType::CodedVideo,
            GrainPayload::Audio(_) => GrainType::Audio,
            GrainPayload::CodedAudio(_) => GrainType::CodedAudio,
            GrainPayload::Event(_) => GrainType::Event,
        }
    }
}

/// A grain's data region: either materialised bytes or a handle to a byte
/// range of the source stream, realised through the decoder that issued it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GrainData {
    Bytes(Vec<u8>),
    Lazy(LazyData),
}

/// A deferred read of a grain payload. Valid while the issuing decoder is
/// open; fetching restores the decoder's stream position afterwards.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LazyData {
    pub offset: u64,
    pub length: u64,
}

impl GrainData {
    pub fn len(&self) -> u64 {
        match self {
            GrainData::Bytes(bytes) => bytes.len() as u64,
            GrainData::Lazy(lazy) => lazy.length,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The materialised bytes, or `None` for an unfetched lazy handle.
    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            GrainData::Bytes(bytes) => Some(bytes),
            GrainData::Lazy(_) => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Grain {
    pub meta: GrainMeta,
    pub payload: GrainPayload,
    pub data: GrainData,
}

impl Grain {
    /// A grain with a zero-filled data region of the payload's natural size.
    pub fn new(meta: GrainMeta, payload: GrainPayload) -> Self {
        let length = expected_payload_length(&payload);
        Grain {
            meta,
            payload,
            data: GrainData::Bytes(vec![0u8; length.unwrap_or(0) as usize]),
        }
    }

    pub fn with_data(meta: GrainMeta, payload: GrainPayload, data: Vec<u8>) -> Self {
        Grain {
            meta,
            payload,
            data: GrainData::Bytes(data),
        }
    }

    pub fn grain_type(&self) -> GrainType {
        GrainType::from(&self.payload)
    }

    /// The data length the payload implies, where it implies one: 0 for
    /// empty grains, the component sum for video. Audio lengths are a
    /// consumer concern ([`AudioGrain::expected_length`]); coded and event
    /// payloads carry opaque data of any length.
    pub fn expected_data_length(&self) -> Option<u64> {
        expected_payload_length(&self.payload)
    }
}

fn expected_payload_length(payload: &GrainPayload) -> Option<u64> {
    match payload {
        GrainPayload::Empty => Some(0),
        GrainPayload::Video(v) => Some(v.total_length()),
        GrainPayload::Audio(_)
        | GrainPayload::CodedVideo(_)
        | GrainPayload::CodedAudio(_)
        | GrainPayload::Event(_) => None,
    }
}
