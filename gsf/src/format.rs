//! Closed registries of the numeric frame and audio format codes.
//!
//! Video format codes are structured: the low two bits select the chroma
//! subsampling (0 `4:4:4`, 1 `4:2:2`, 3 `4:2:0`), bits 2-3 hold
//! bytes-per-value minus one, bits 10-11 the active bit depth selector
//! (0 native, 1 ten bit, 2 twelve bit) and bit 13 marks planar storage.
//! Audio codes: low two bits select the packing (0 planes, 1 pairs,
//! 2 interleaved), bits 2-3 the sample size and bit 5 floating point.
//! Codes outside the registries survive round trips through `Unknown`.

const PLANAR: u32 = 0x2000;
const DEPTH_10: u32 = 0x0400;
const DEPTH_12: u32 = 0x0800;

macro_rules! u32_registry {
    ($name:ident { $($variant:ident = $value:literal => $label:literal,)+ }) => {
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant,)+
            Unknown(u32),
        }

        impl From<u32> for $name {
            fn from(value: u32) -> Self {
                match value {
                    $($value => $name::$variant,)+
                    other => $name::Unknown(other),
                }
            }
        }

        impl From<$name> for u32 {
            fn from(format: $name) -> Self {
                match format {
                    $($name::$variant => $value,)+
                    $name::Unknown(other) => other,
                }
            }
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label,)+
                    $name::Unknown(_) => "unknown",
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $name::Unknown(code) => write!(f, "unknown(0x{:04x})", code),
                    _ => f.write_str(self.as_str()),
                }
            }
        }
    };
}

u32_registry!(CogFrameFormat {
    Invalid = 0x0000 => "INVALID",
    Yuyv = 0x0001 => "YUYV",
    Uyvy = 0x0002 => "UYVY",
    Ayuv = 0x0003 => "AYUV",
    Rgb = 0x0044 => "RGB",
    Rgba = 0x0045 => "RGBA",
    Bgra = 0x0046 => "BGRA",
    U8_444 = 0x2000 => "U8_444",
    U8_422 = 0x2001 => "U8_422",
    U8_420 = 0x2003 => "U8_420",
    S16_444 = 0x2004 => "S16_444",
    S16_422 = 0x2005 => "S16_422",
    S16_420 = 0x2007 => "S16_420",
    S16_444_10Bit = 0x2404 => "S16_444_10BIT",
    S16_422_10Bit = 0x2405 => "S16_422_10BIT",
    S16_420_10Bit = 0x2407 => "S16_420_10BIT",
    S16_444_12Bit = 0x2804 => "S16_444_12BIT",
    S16_422_12Bit = 0x2805 => "S16_422_12BIT",
    S16_420_12Bit = 0x2807 => "S16_420_12BIT",
});

impl CogFrameFormat {
    pub fn is_planar(&self) -> bool {
        u32::from(*self) & PLANAR != 0
    }

    /// Chroma width divisor exponent: 4:2:2 and 4:2:0 halve chroma width.
    pub fn horizontal_shift(&self) -> u32 {
        u32::from(*self) & 0x1
    }

    /// Chroma height divisor exponent: 4:2:0 halves chroma height.
    pub fn vertical_shift(&self) -> u32 {
        (u32::from(*self) >> 1) & 0x1
    }

    pub fn bytes_per_value(&self) -> u32 {
        ((u32::from(*self) >> 2) & 0x3) + 1
    }

    pub fn active_bits(&self) -> u32 {
        match u32::from(*self) & (DEPTH_10 | DEPTH_12) {
            DEPTH_10 => 10,
            DEPTH_12 => 12,
            _ => 8 * self.bytes_per_value(),
        }
    }

    /// Bytes per pixel for packed formats: 2 for YUYV/UYVY 4:2:2 pairs,
    /// otherwise one value per sample of the pixel.
    pub(crate) fn packed_bytes_per_pixel(&self) -> u32 {
        match self {
            CogFrameFormat::Yuyv | CogFrameFormat::Uyvy => 2,
            CogFrameFormat::Ayuv | CogFrameFormat::Rgba | CogFrameFormat::Bgra => 4,
            CogFrameFormat::Rgb => 3,
            _ => self.bytes_per_value(),
        }
    }
}

u32_registry!(CogFrameLayout {
    FullFrame = 0x0000 => "FULL_FRAME",
    SeparateFields = 0x0001 => "SEPARATE_FIELDS",
    SingleField = 0x0002 => "SINGLE_FIELD",
    MixedFields = 0x0003 => "MIXED_FIELDS",
    SegmentedFrame = 0x0004 => "SEGMENTED_FRAME",
});

u32_registry!(CogAudioFormat {
    S16Planes = 0x0000 => "S16_PLANES",
    S16Pairs = 0x0001 => "S16_PAIRS",
    S16Interleaved = 0x0002 => "S16_INTERLEAVED",
    S24Planes = 0x0004 => "S24_PLANES",
    S24Pairs = 0x0005 => "S24_PAIRS",
    S24Interleaved = 0x0006 => "S24_INTERLEAVED",
    S32Planes = 0x0008 => "S32_PLANES",
    S32Pairs = 0x0009 => "S32_PAIRS",
    S32Interleaved = 0x000a => "S32_INTERLEAVED",
    FloatPlanes = 0x0020 => "FLOAT_PLANES",
    FloatPairs = 0x0021 => "FLOAT_PAIRS",
    FloatInterleaved = 0x0022 => "FLOAT_INTERLEAVED",
    DoublePlanes = 0x0024 => "DOUBLE_PLANES",
    DoublePairs = 0x0025 => "DOUBLE_PAIRS",
    DoubleInterleaved = 0x0026 => "DOUBLE_INTERLEAVED",
});

impl CogAudioFormat {
    pub fn bytes_per_sample(&self) -> u32 {
        let code = u32::from(*self);
        let size = (code >> 2) & 0x3;
        if code & 0x20 != 0 {
            // floating point: f32 or f64
            if size == 1 {
                8
            } else {
                4
            }
        } else {
            size + 2
        }
    }

    pub fn is_float(&self) -> bool {
        u32::from(*self) & 0x20 != 0
    }

    pub fn is_interleaved(&self) -> bool {
        u32::from(*self) & 0x3 == 0x2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_format_fields() {
        assert!(CogFrameFormat::U8_422.is_planar());
        assert_eq!(CogFrameFormat::U8_422.horizontal_shift(), 1);
        assert_eq!(CogFrameFormat::U8_422.vertical_shift(), 0);
        assert_eq!(CogFrameFormat::U8_420.vertical_shift(), 1);
        assert_eq!(CogFrameFormat::U8_444.bytes_per_value(), 1);
        assert_eq!(CogFrameFormat::S16_422_10Bit.bytes_per_value(), 2);
        assert_eq!(CogFrameFormat::S16_422_10Bit.active_bits(), 10);
        assert_eq!(CogFrameFormat::S16_420_12Bit.active_bits(), 12);
        assert_eq!(CogFrameFormat::S16_444.active_bits(), 16);
        assert!(!CogFrameFormat::Yuyv.is_planar());
    }

    #[test]
    fn unknown_codes_survive() {
        let format = CogFrameFormat::from(0xdead_beef);
        assert_eq!(format, CogFrameFormat::Unknown(0xdead_beef));
        assert_eq!(u32::from(format), 0xdead_beef);

        assert_eq!(u32::from(CogFrameLayout::from(0x77)), 0x77);
        assert_eq!(u32::from(CogAudioFormat::from(0x1f)), 0x1f);
    }

    #[test]
    fn audio_sample_sizes() {
        assert_eq!(CogAudioFormat::S16Interleaved.bytes_per_sample(), 2);
        assert_eq!(CogAudioFormat::S24Planes.bytes_per_sample(), 3);
        assert_eq!(CogAudioFormat::S32Pairs.bytes_per_sample(), 4);
        assert_eq!(CogAudioFormat::FloatInterleaved.bytes_per_sample(), 4);
        assert_eq!(CogAudioFormat::DoublePlanes.bytes_per_sample(), 8);
        assert!(CogAudioFormat::S16Interleaved.is_interleaved());
        assert!(!CogAudioFormat::S16Planes.is_interleaved());
    }
}
