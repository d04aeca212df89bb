//! Shared argument parsing and setup for the GSF command line tools.

use anyhow::{bail, Context};
use gsf::{CogAudioFormat, CogFrameFormat, Rational};
use log::LevelFilter;

pub fn init_logger() {
    env_logger::builder()
        .filter_level(LevelFilter::Info)
        .parse_env("GSF_LOG")
        .init();
}

/// Parses `WxH`, e.g. `1920x1080`.
pub fn parse_size(value: &str) -> anyhow::Result<(u32, u32)> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .with_context(|| format!("size {:?} is not WxH", value))?;
    Ok((
        w.parse().with_context(|| format!("bad width {:?}", w))?,
        h.parse().with_context(|| format!("bad height {:?}", h))?,
    ))
}

/// Parses `num` or `num/den`, e.g. `25` or `30000/1001`.
pub fn parse_rate(value: &str) -> anyhow::Result<Rational> {
    let (num, den) = match value.split_once('/') {
        Some((num, den)) => (num, den),
        None => (value, "1"),
    };
    let rate = Rational::new(
        num.parse().with_context(|| format!("bad rate {:?}", value))?,
        den.parse().with_context(|| format!("bad rate {:?}", value))?,
    );
    if rate.is_null() {
        bail!("rate {:?} has a zero term", value);
    }
    Ok(rate)
}

const FRAME_FORMATS: &[(&str, CogFrameFormat)] = &[
    ("yuyv", CogFrameFormat::Yuyv),
    ("uyvy", CogFrameFormat::Uyvy),
    ("ayuv", CogFrameFormat::Ayuv),
    ("rgb", CogFrameFormat::Rgb),
    ("rgba", CogFrameFormat::Rgba),
    ("bgra", CogFrameFormat::Bgra),
    ("u8_444", CogFrameFormat::U8_444),
    ("u8_422", CogFrameFormat::U8_422),
    ("u8_420", CogFrameFormat::U8_420),
    ("s16_444", CogFrameFormat::S16_444),
    ("s16_422", CogFrameFormat::S16_422),
    ("s16_420", CogFrameFormat::S16_420),
    ("s16_444_10bit", CogFrameFormat::S16_444_10Bit),
    ("s16_422_10bit", CogFrameFormat::S16_422_10Bit),
    ("s16_420_10bit", CogFrameFormat::S16_420_10Bit),
    ("s16_444_12bit", CogFrameFormat::S16_444_12Bit),
    ("s16_422_12bit", CogFrameFormat::S16_422_12Bit),
    ("s16_420_12bit", CogFrameFormat::S16_420_12Bit),
];

pub fn parse_frame_format(value: &str) -> anyhow::Result<CogFrameFormat> {
    let needle = value.to_ascii_lowercase();
    FRAME_FORMATS
        .iter()
        .find(|(name, _)| *name == needle)
        .map(|(_, format)| *format)
        .with_context(|| {
            format!(
                "unknown frame format {:?}, expected one of: {}",
                value,
                FRAME_FORMATS
                    .iter()
                    .map(|(name, _)| *name)
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        })
}

const AUDIO_FORMATS: &[(&str, CogAudioFormat)] = &[
    ("s16_planes", CogAudioFormat::S16Planes),
    ("s16_pairs", CogAudioFormat::S16Pairs),
    ("s16_interleaved", CogAudioFormat::S16Interleaved),
    ("s24_planes", CogAudioFormat::S24Planes),
    ("s24_pairs", CogAudioFormat::S24Pairs),
    ("s24_interleaved", CogAudioFormat::S24Interleaved),
    ("s32_planes", CogAudioFormat::S32Planes),
    ("s32_pairs", CogAudioFormat::S32Pairs),
    ("s32_interleaved", CogAudioFormat::S32Interleaved),
    ("float_planes", CogAudioFormat::FloatPlanes),
    ("float_pairs", CogAudioFormat::FloatPairs),
    ("float_interleaved", CogAudioFormat::FloatInterleaved),
    ("double_planes", CogAudioFormat::DoublePlanes),
    ("double_pairs", CogAudioFormat::DoublePairs),
    ("double_interleaved", CogAudioFormat::DoubleInterleaved),
];

pub fn parse_audio_format(value: &str) -> anyhow::Result<CogAudioFormat> {
    let needle = value.to_ascii_lowercase();
    AUDIO_FORMATS
        .iter()
        .find(|(name, _)| *name == needle)
        .map(|(_, format)| *format)
        .with_context(|| {
            format!(
                "unknown audio format {:?}, expected one of: {}",
                value,
                AUDIO_FORMATS
                    .iter()
                    .map(|(name, _)| *name)
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        })
}
