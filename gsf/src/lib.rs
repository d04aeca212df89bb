//! Codec for the Grain Sequence Format (GSF): a chunked binary container
//! (`"SSBB"` envelope, file type `"grsg"`) holding sequences of media
//! grains, plus a structural comparator for grains and grain sequences.

pub mod block;
pub mod blocks;
pub mod compare;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod format;
pub mod grain;
pub mod prelude;
pub mod psnr;
pub mod source;
pub mod types;

mod utils;

pub use blocks::{Head, Segment, Tag};
pub use decoder::{decode_all, DecodeOptions, GsfDecoder, GsfFile};
pub use encoder::{GsfEncoder, SegmentRef};
pub use error::GsfError;
pub use format::{CogAudioFormat, CogFrameFormat, CogFrameLayout};
pub use grain::{
    AudioGrain, CodedAudioGrain, CodedVideoGrain, EventGrain, Grain, GrainData, GrainMeta,
    GrainPayload, GrainType, LazyData, VideoComponent, VideoGrain,
};
pub use source::ReadOnlySource;
pub use types::{DateTime, Rational, TimeLabel, Timecode, Timestamp, WireString};

#[cfg(feature = "async")]
pub use decoder::{decode_all_async, AsyncGsfDecoder};
#[cfg(feature = "async")]
pub use encoder::AsyncGsfEncoder;
#[cfg(feature = "async")]
pub use source::AsyncReadOnlySource;
