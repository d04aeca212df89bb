use crate::error::GsfError;
use crate::format::{CogAudioFormat, CogFrameFormat};
use crate::grain::VideoComponent;
use crate::prelude::Result;

/// The sample layout of a data region handed to a PSNR kernel.
pub enum DataLayout<'a> {
    Video {
        format: CogFrameFormat,
        components: &'a [VideoComponent],
    },
    Audio {
        format: CogAudioFormat,
        channels: u16,
        samples: u32,
    },
}

/// Computes a decibel value per video component or audio channel from two
/// equally laid out byte buffers. Identical buffers yield `+∞`.
pub trait PsnrKernel {
    fn psnr(&self, a: &[u8], b: &[u8], layout: &DataLayout<'_>) -> Result<Vec<f64>>;
}

/// Mean-squared-error reference kernel.
pub struct MsePsnr;

impl PsnrKernel for MsePsnr {
    fn psnr(&self, a: &[u8], b: &[u8], layout: &DataLayout<'_>) -> Result<Vec<f64>> {
        if a.len() != b.len() {
            return Err(GsfError::ValueOutOfRange(format!(
                "data regions of {} and {} bytes cannot be compared",
                a.len(),
                b.len()
            )));
        }
        match layout {
            DataLayout::Video { format, components } => video_psnr(a, b, *format, components),
            DataLayout::Audio {
                format,
                channels,
                samples,
            } => audio_psnr(a, b, *format, *channels, *samples),
        }
    }
}

fn db(mse: f64, peak: f64) -> f64 {
    if mse == 0.0 {
        f64::INFINITY
    } else {
        10.0 * (peak * peak / mse).log10()
    }
}

fn video_psnr(
    a: &[u8],
    b: &[u8],
    format: CogFrameFormat,
    components: &[VideoComponent],
) -> Result<Vec<f64>> {
    let bpv = format.bytes_per_value() as usize;
    let peak = f64::from((1u32 << format.active_bits()) - 1);

    let mut out = Vec::with_capacity(components.len());
    let mut offset = 0usize;
    for component in components {
        let len = component.length as usize;
        let end = offset + len;
        if end > a.len() {
            return Err(GsfError::ValueOutOfRange(format!(
                "component at offset {} of length {} overruns {} data bytes",
                offset,
                len,
                a.len()
            )));
        }
        let (pa, pb) = (&a[offset..end], &b[offset..end]);
        let mse = match bpv {
            2 => mse_u16(pa, pb),
            _ => mse_u8(pa, pb),
        };
        out.push(db(mse, peak));
        offset = end;
    }
    Ok(out)
}

fn mse_u8(a: &[u8], b: &[u8]) -> f64 {
    if a.is_empty() {
        return 0.0;
    }
    let sum: f64 = a
        .iter()
        .zip(b)
        .map(|(&x, &y)| {
            let d = f64::from(x) - f64::from(y);
            d * d
        })
        .sum();
    sum / a.len() as f64
}

fn mse_u16(a: &[u8], b: &[u8]) -> f64 {
    let n = a.len() / 2;
    if n == 0 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..n {
        let x = u16::from_le_bytes([a[2 * i], a[2 * i + 1]]);
        let y = u16::from_le_bytes([b[2 * i], b[2 * i + 1]]);
        let d = f64::from(x) - f64::from(y);
        sum += d * d;
    }
    sum / n as f64
}

fn audio_psnr(
    a: &[u8],
    b: &[u8],
    format: CogAudioFormat,
    channels: u16,
    samples: u32,
) -> Result<Vec<f64>> {
    let bps = format.bytes_per_sample() as usize;
    let channels = channels as usize;
    let samples = samples as usize;
    if channels == 0 || samples == 0 {
        return Ok(vec![f64::INFINITY; channels]);
    }
    if a.len() < channels * samples * bps {
        return Err(GsfError::ValueOutOfRange(format!(
            "{} data bytes do not hold {} samples of {} channels",
            a.len(),
            samples,
            channels
        )));
    }

    let peak = if format.is_float() {
        1.0
    } else {
        ((1u64 << (8 * bps - 1)) - 1) as f64
    };

    // Sample index stride per channel. Planes hold each channel whole, the
    // interleaved packings alternate channels sample by sample; channel
    // pairs are planes of two interleaved channels.
    let code = u32::from(format) & 0x3;
    if code == 1 && channels % 2 != 0 {
        return Err(GsfError::ValueOutOfRange(format!(
            "{} channels cannot be stored as pairs",
            channels
        )));
    }
    let mut out = Vec::with_capacity(channels);
    for channel in 0..channels {
        let (start, step) = match code {
            0 => (channel * samples, 1),
            1 => ((channel / 2) * 2 * samples + channel % 2, 2),
            _ => (channel, channels),
        };
        let mut sum = 0.0;
        for i in 0..samples {
            let at = (start + i * step) * bps;
            let d = sample_value(a, at, bps, format) - sample_value(b, at, bps, format);
            sum += d * d;
        }
        out.push(db(sum / samples as f64, peak));
    }
    Ok(out)
}

fn sample_value(buf: &[u8], at: usize, bps: usize, format: CogAudioFormat) -> f64 {
    if format.is_float() {
        return match bps {
            8 => f64::from_le_bytes(buf[at..at + 8].try_into().unwrap_or([0; 8])),
            _ => f64::from(f32::from_le_bytes(buf[at..at + 4].try_into().unwrap_or([0; 4]))),
        };
    }
    match bps {
        2 => f64::from(i16::from_le_bytes(buf[at..at + 2].try_into().unwrap_or([0; 2]))),
        3 => {
            let raw = i32::from(buf[at]) | i32::from(buf[at + 1]) << 8 | i32::from(buf[at + 2]) << 16;
            // sign-extend 24 bits
            f64::from(raw << 8 >> 8)
        }
        _ => f64::from(i32::from_le_bytes(buf[at..at + 4].try_into().unwrap_or([0; 4]))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grain::VideoGrain;
    use crate::format::CogFrameLayout;

    #[test]
    fn identical_video_is_infinite() {
        let video = VideoGrain::with_geometry(
            CogFrameFormat::U8_422,
            CogFrameLayout::FullFrame,
            16,
            2,
        );
        let data = vec![0x40u8; video.total_length() as usize];
        let layout = DataLayout::Video {
            format: video.format,
            components: &video.components,
        };
        let values = MsePsnr.psnr(&data, &data, &layout).unwrap();
        assert_eq!(values.len(), 3);
        assert!(values.iter().all(|v| v.is_infinite()));
    }

    #[test]
    fn single_byte_error_is_finite() {
        let video = VideoGrain::with_geometry(
            CogFrameFormat::U8_444,
            CogFrameLayout::FullFrame,
            8,
            8,
        );
        let a = vec![0u8; video.total_length() as usize];
        let mut b = a.clone();
        b[10] ^= 0xff;
        let layout = DataLayout::Video {
            format: video.format,
            components: &video.components,
        };
        let values = MsePsnr.psnr(&a, &b, &layout).unwrap();
        assert!(values[0].is_finite());
        assert!(values[0] > 20.0);
    }

    #[test]
    fn audio_channels_are_independent() {
        // Two channels interleaved, channel 1 corrupted.
        let samples = 64u32;
        let mut a = vec![0u8; 2 * 2 * samples as usize];
        let b = a.clone();
        for i in 0..samples as usize {
            a[(i * 2 + 1) * 2] = 0x10;
        }
        let layout = DataLayout::Audio {
            format: CogAudioFormat::S16Interleaved,
            channels: 2,
            samples,
        };
        let values = MsePsnr.psnr(&a, &b, &layout).unwrap();
        assert!(values[0].is_infinite());
        assert!(values[1].is_finite());
    }
}
