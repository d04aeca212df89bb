use crate::error::GsfError;
use crate::prelude::*;
use crate::utils::*;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io::{Read, Write};
use uuid::Uuid;

pub(crate) const NANOS_PER_SECOND: u32 = 1_000_000_000;
const MAX_SECONDS: u64 = (1 << 48) - 1;

pub(crate) fn read_bool<R: Read>(reader: &mut R) -> Result<bool> {
    Ok(reader.read_u8()? != 0)
}

pub(crate) fn write_bool<W: Write>(writer: &mut W, value: bool) -> Result<()> {
    writer.write_u8(u8::from(value))?;
    Ok(())
}

impl Decode for Uuid {
    fn from_reader<R: Read>(reader: &mut R) -> Result<Self> {
        let mut raw = [0u8; 16];
        reader.read_exact(&mut raw)?;
        Ok(Uuid::from_bytes(raw))
    }
}

#[cfg(feature = "async")]
#[async_trait::async_trait]
impl AsyncDecode for Uuid {
    async fn from_async_reader<R>(reader: &mut R) -> Result<Self>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut raw = [0u8; 16];
        reader.read_exact(&mut raw).await?;
        Ok(Uuid::from_bytes(raw))
    }
}

impl Encode for Uuid {
    fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(self.as_bytes())?;
        Ok(())
    }
}

/// An unsigned rational on 8 octets. Either side being 0 signals a
/// null/invalid value to consumers; the codec preserves the literal fields.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Rational {
    pub numerator: u32,
    pub denominator: u32,
}

impl Rational {
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Rational {
            numerator,
            denominator,
        }
    }

    pub fn is_null(&self) -> bool {
        self.numerator == 0 || self.denominator == 0
    }

    pub fn as_f64(&self) -> f64 {
        f64::from(self.numerator) / f64::from(self.denominator)
    }

    /// Duration of one period at this rate, in nanoseconds. 0 for null rates.
    pub fn period_nanos(&self) -> u64 {
        if self.is_null() {
            return 0;
        }
        u64::from(self.denominator) * u64::from(NANOS_PER_SECOND) / u64::from(self.numerator)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

impl Decode for Rational {
    fn from_reader<R: Read>(reader: &mut R) -> Result<Self> {
        let numerator = reader.read_u32::<LittleEndian>()?;
        let denominator = reader.read_u32::<LittleEndian>()?;
        Ok(Rational {
            numerator,
            denominator,
        })
    }
}

#[cfg(feature = "async")]
#[async_trait::async_trait]
impl AsyncDecode for Rational {
    async fn from_async_reader<R>(reader: &mut R) -> Result<Self>
    where
        R: AsyncRead + Unpin + Send,
    {
        let numerator = reader.read_u32_le().await?;
        let denominator = reader.read_u32_le().await?;
        Ok(Rational {
            numerator,
            denominator,
        })
    }
}

impl Encode for Rational {
    fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<LittleEndian>(self.numerator)?;
        writer.write_u32::<LittleEndian>(self.denominator)?;
        Ok(())
    }
}

/// A signed nanosecond timestamp on 11 octets: sign (1, non-zero means
/// positive), seconds (6, unsigned) and nanoseconds (4, unsigned).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Timestamp {
    positive: bool,
    seconds: u64,
    nanoseconds: u32,
}

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp {
        positive: true,
        seconds: 0,
        nanoseconds: 0,
    };

    pub fn new(positive: bool, seconds: u64, nanoseconds: u32) -> Result<Self> {
        if nanoseconds >= NANOS_PER_SECOND {
            return Err(GsfError::ValueOutOfRange(format!(
                "timestamp nanoseconds {} not below 10^9",
                nanoseconds
            )));
        }
        if seconds > MAX_SECONDS {
            return Err(GsfError::ValueOutOfRange(format!(
                "timestamp seconds {} do not fit 48 bits",
                seconds
            )));
        }
        Ok(Self::normalized(positive, seconds, nanoseconds))
    }

    // A zero magnitude is canonically positive.
    fn normalized(positive: bool, seconds: u64, nanoseconds: u32) -> Self {
        Timestamp {
            positive: positive || (seconds == 0 && nanoseconds == 0),
            seconds,
            nanoseconds,
        }
    }

    pub fn from_nanos(nanos: i128) -> Result<Self> {
        let positive = nanos >= 0;
        let magnitude = nanos.unsigned_abs();
        let seconds = magnitude / u128::from(NANOS_PER_SECOND);
        if seconds > u128::from(MAX_SECONDS) {
            return Err(GsfError::ValueOutOfRange(format!(
                "timestamp of {} ns does not fit 48 bits of seconds",
                nanos
            )));
        }
        Ok(Self::normalized(
            positive,
            seconds as u64,
            (magnitude % u128::from(NANOS_PER_SECOND)) as u32,
        ))
    }

    pub fn is_positive(&self) -> bool {
        self.positive
    }

    pub fn seconds(&self) -> u64 {
        self.seconds
    }

    pub fn nanoseconds(&self) -> u32 {
        self.nanoseconds
    }

    pub fn as_nanos(&self) -> i128 {
        let magnitude =
            i128::from(self.seconds) * i128::from(NANOS_PER_SECOND) + i128::from(self.nanoseconds);
        if self.positive {
            magnitude
        } else {
            -magnitude
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}:{:09}",
            if self.positive { "" } else { "-" },
            self.seconds,
            self.nanoseconds
        )
    }
}

impl Decode for Timestamp {
    fn from_reader<R: Read>(reader: &mut R) -> Result<Self> {
        let positive = read_bool(reader)?;
        let seconds = reader.read_u48::<LittleEndian>()?;
        let nanoseconds = reader.read_u32::<LittleEndian>()?;
        if nanoseconds >= NANOS_PER_SECOND {
            return Err(GsfError::MalformedBlock(format!(
                "timestamp nanoseconds {} not below 10^9",
                nanoseconds
            )));
        }
        Ok(Self::normalized(positive, seconds, nanoseconds))
    }
}

#[cfg(feature = "async")]
#[async_trait::async_trait]
impl AsyncDecode for Timestamp {
    async fn from_async_reader<R>(reader: &mut R) -> Result<Self>
    where
        R: AsyncRead + Unpin + Send,
    {
        let positive = reader.read_u8().await? != 0;
        let seconds = read_u48_le_async(reader).await?;
        let nanoseconds = reader.read_u32_le().await?;
        if nanoseconds >= NANOS_PER_SECOND {
            return Err(GsfError::MalformedBlock(format!(
                "timestamp nanoseconds {} not below 10^9",
                nanoseconds
            )));
        }
        Ok(Self::normalized(positive, seconds, nanoseconds))
    }
}

impl Encode for Timestamp {
    fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        write_bool(writer, self.positive)?;
        writer.write_u48::<LittleEndian>(self.seconds)?;
        writer.write_u32::<LittleEndian>(self.nanoseconds)?;
        Ok(())
    }
}

/// A calendar date-time on 7 octets: u16 year then month, day, hour, minute
/// and second octets.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DateTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl DateTime {
    /// Converts seconds since the Unix epoch to a calendar date-time.
    pub fn from_unix_seconds(seconds: u64) -> Self {
        let days = (seconds / 86_400) as i64;
        let rem = seconds % 86_400;

        // Civil-from-days conversion over 400 year eras.
        let z = days + 719_468;
        let era = z.div_euclid(146_097);
        let doe = z.rem_euclid(146_097) as u64;
        let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
        let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
        let mp = (5 * doy + 2) / 153;
        let day = (doy - (153 * mp + 2) / 5 + 1) as u8;
        let month = if mp < 10 { mp + 3 } else { mp - 9 } as u8;
        let year = (yoe as i64 + era * 400 + i64::from(month <= 2)) as u16;

        DateTime {
            year,
            month,
            day,
            hour: (rem / 3_600) as u8,
            minute: (rem % 3_600 / 60) as u8,
            second: (rem % 60) as u8,
        }
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

impl Decode for DateTime {
    fn from_reader<R: Read>(reader: &mut R) -> Result<Self> {
        let year = reader.read_u16::<LittleEndian>()?;
        let month = reader.read_u8()?;
        let day = reader.read_u8()?;
        let hour = reader.read_u8()?;
        let minute = reader.read_u8()?;
        let second = reader.read_u8()?;
        Ok(DateTime {
            year,
            month,
            day,
            hour,
            minute,
            second,
        })
    }
}

#[cfg(feature = "async")]
#[async_trait::async_trait]
impl AsyncDecode for DateTime {
    async fn from_async_reader<R>(reader: &mut R) -> Result<Self>
    where
        R: AsyncRead + Unpin + Send,
    {
        let year = reader.read_u16_le().await?;
        let month = reader.read_u8().await?;
        let day = reader.read_u8().await?;
        let hour = reader.read_u8().await?;
        let minute = reader.read_u8().await?;
        let second = reader.read_u8().await?;
        Ok(DateTime {
            year,
            month,
            day,
            hour,
            minute,
            second,
        })
    }
}

impl Encode for DateTime {
    fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u16::<LittleEndian>(self.year)?;
        writer.write_u8(self.month)?;
        writer.write_u8(self.day)?;
        writer.write_u8(self.hour)?;
        writer.write_u8(self.minute)?;
        writer.write_u8(self.second)?;
        Ok(())
    }
}

/// A timecode on 13 octets: frame count, rate numerator, rate denominator
/// and a drop-frame flag.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Timecode {
    pub count: u32,
    pub rate: Rational,
    pub drop_frame: bool,
}

impl fmt::Display for Timecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}{}",
            self.count,
            self.rate,
            if self.drop_frame { " drop" } else { "" }
        )
    }
}

impl Decode for Timecode {
    fn from_reader<R: Read>(reader: &mut R) -> Result<Self> {
        let count = reader.read_u32::<LittleEndian>()?;
        let rate = Rational::from_reader(reader)?;
        let drop_frame = read_bool(reader)?;
        Ok(Timecode {
            count,
            rate,
            drop_frame,
        })
    }
}

#[cfg(feature = "async")]
#[async_trait::async_trait]
impl AsyncDecode for Timecode {
    async fn from_async_reader<R>(reader: &mut R) -> Result<Self>
    where
        R: AsyncRead + Unpin + Send,
    {
        let count = reader.read_u32_le().await?;
        let rate = Rational::from_async_reader(reader).await?;
        let drop_frame = reader.read_u8().await? != 0;
        Ok(Timecode {
            count,
            rate,
            drop_frame,
        })
    }
}

impl Encode for Timecode {
    fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<LittleEndian>(self.count)?;
        self.rate.write_to(writer)?;
        write_bool(writer, self.drop_frame)
    }
}

/// A time label on 29 octets: a 16 octet tag slot and a timecode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimeLabel {
    pub tag: String,
    pub timecode: Timecode,
}

impl fmt::Display for TimeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.tag, self.timecode)
    }
}

impl Decode for TimeLabel {
    fn from_reader<R: Read>(reader: &mut R) -> Result<Self> {
        let tag = take_fixed_string(reader, 16)?;
        let timecode = Timecode::from_reader(reader)?;
        Ok(TimeLabel { tag, timecode })
    }
}

#[cfg(feature = "async")]
#[async_trait::async_trait]
impl AsyncDecode for TimeLabel {
    async fn from_async_reader<R>(reader: &mut R) -> Result<Self>
    where
        R: AsyncRead + Unpin + Send,
    {
        let tag = take_fixed_string_async(reader, 16).await?;
        let timecode = Timecode::from_async_reader(reader).await?;
        Ok(TimeLabel { tag, timecode })
    }
}

impl Encode for TimeLabel {
    fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        write_fixed_string(writer, &self.tag, 16)?;
        self.timecode.write_to(writer)
    }
}

/// A length-prefixed string as read from the wire. Invalid UTF-8 is kept
/// verbatim rather than replaced, and re-encodes byte for byte.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum WireString {
    Utf8(String),
    Raw(Vec<u8>),
}

impl WireString {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            WireString::Utf8(s) => Some(s),
            WireString::Raw(_) => None,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            WireString::Utf8(s) => s.as_bytes(),
            WireString::Raw(raw) => raw,
        }
    }
}

impl From<&str> for WireString {
    fn from(s: &str) -> Self {
        WireString::Utf8(s.to_string())
    }
}

impl From<String> for WireString {
    fn from(s: String) -> Self {
        WireString::Utf8(s)
    }
}

impl fmt::Display for WireString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireString::Utf8(s) => f.write_str(s),
            WireString::Raw(raw) => write!(f, "{}", String::from_utf8_lossy(raw)),
        }
    }
}

impl Decode for WireString {
    fn from_reader<R: Read>(reader: &mut R) -> Result<Self> {
        let len = reader.read_u16::<LittleEndian>()?;
        let raw = take(reader, len as usize)?;
        Ok(match String::from_utf8(raw) {
            Ok(s) => WireString::Utf8(s),
            Err(e) => {
                log::warn!("preserving {} octets of non-UTF-8 string", e.as_bytes().len());
                WireString::Raw(e.into_bytes())
            }
        })
    }
}

#[cfg(feature = "async")]
#[async_trait::async_trait]
impl AsyncDecode for WireString {
    async fn from_async_reader<R>(reader: &mut R) -> Result<Self>
    where
        R: AsyncRead + Unpin + Send,
    {
        let len = reader.read_u16_le().await?;
        let raw = take_async(reader, len as usize).await?;
        Ok(match String::from_utf8(raw) {
            Ok(s) => WireString::Utf8(s),
            Err(e) => WireString::Raw(e.into_bytes()),
        })
    }
}

impl Encode for WireString {
    fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        let bytes = self.as_bytes();
        if bytes.len() > usize::from(u16::MAX) {
            return Err(GsfError::ValueOutOfRange(format!(
                "string of {} octets exceeds the 65535 octet limit",
                bytes.len()
            )));
        }
        writer.write_u16::<LittleEndian>(bytes.len() as u16)?;
        writer.write_all(bytes)?;
        Ok(())
    }
}

/// Reads a u32-length-prefixed byte array.
pub fn read_varbytes<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    let len = reader.read_u32::<LittleEndian>()?;
    Ok(take(reader, len as usize)?)
}

/// Writes a u32-length-prefixed byte array.
pub fn write_varbytes<W: Write>(writer: &mut W, bytes: &[u8]) -> Result<()> {
    let len = u32::try_from(bytes.len()).map_err(|_| {
        GsfError::ValueOutOfRange(format!("byte array of {} octets exceeds u32", bytes.len()))
    })?;
    writer.write_u32::<LittleEndian>(len)?;
    writer.write_all(bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn round_trip<T: Decode + Encode>(value: &T) -> T {
        let mut buf = Vec::new();
        value.write_to(&mut buf).unwrap();
        T::from_reader(&mut Cursor::new(buf)).unwrap()
    }

    #[test]
    fn timestamp_sign_and_magnitude() {
        let ts = Timestamp::new(false, 12, 500_000_000).unwrap();
        assert_eq!(ts.as_nanos(), -12_500_000_000);
        assert_eq!(round_trip(&ts), ts);

        let mut buf = Vec::new();
        ts.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), 11);
        assert_eq!(buf[0], 0);
    }

    #[test]
    fn timestamp_zero_is_positive() {
        let ts = Timestamp::new(false, 0, 0).unwrap();
        assert!(ts.is_positive());
        assert_eq!(ts, Timestamp::ZERO);
    }

    #[test]
    fn timestamp_rejects_nanosecond_overflow() {
        assert!(Timestamp::new(true, 0, 1_000_000_000).is_err());

        let mut wire = vec![1u8];
        wire.extend_from_slice(&[0; 6]);
        wire.extend_from_slice(&1_000_000_000u32.to_le_bytes());
        assert!(matches!(
            Timestamp::from_reader(&mut Cursor::new(wire)),
            Err(GsfError::MalformedBlock(_))
        ));
    }

    #[test]
    fn timestamp_nanos_round_trip() {
        for nanos in [0i128, 40_000_000, -1, 1_234_567_890_123] {
            assert_eq!(Timestamp::from_nanos(nanos).unwrap().as_nanos(), nanos);
        }
    }

    #[test]
    fn datetime_from_unix() {
        let dt = DateTime::from_unix_seconds(0);
        assert_eq!((dt.year, dt.month, dt.day), (1970, 1, 1));

        // 2021-01-24 00:00:00 UTC
        let dt = DateTime::from_unix_seconds(1_611_446_400);
        assert_eq!((dt.year, dt.month, dt.day), (2021, 1, 24));
        assert_eq!((dt.hour, dt.minute, dt.second), (0, 0, 0));
    }

    #[test]
    fn time_label_wire_size() {
        let label = TimeLabel {
            tag: "tc0".to_string(),
            timecode: Timecode {
                count: 1500,
                rate: Rational::new(25, 1),
                drop_frame: false,
            },
        };
        let mut buf = Vec::new();
        label.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), 29);
        assert_eq!(round_trip(&label), label);
    }

    #[test]
    fn wire_string_preserves_invalid_utf8() {
        let mut wire = vec![2u8, 0, 0xff, 0xfe];
        let s = WireString::from_reader(&mut Cursor::new(&mut wire)).unwrap();
        assert_eq!(s.as_str(), None);
        assert_eq!(s.as_bytes(), &[0xff, 0xfe]);

        let mut buf = Vec::new();
        s.write_to(&mut buf).unwrap();
        assert_eq!(buf, vec![2u8, 0, 0xff, 0xfe]);
    }

    #[test]
    fn varbytes_round_trip() {
        let mut buf = Vec::new();
        write_varbytes(&mut buf, b"payload").unwrap();
        assert_eq!(read_varbytes(&mut Cursor::new(buf)).unwrap(), b"payload");
    }
}
