use crate::block::{tags, BlockHeader, ChildBlocks, FileHeader, GSF_FILE_TYPE};
use crate::blocks::{parse_gbhd, Head};
use crate::error::GsfError;
use crate::grain::{Grain, GrainData, GrainMeta, GrainPayload, LazyData};
use crate::prelude::*;
use crate::utils::take;
use byteorder::{LittleEndian, ReadBytesExt};
use std::collections::{BTreeMap, HashSet};
use std::io::{Read, Seek, SeekFrom};

const SUPPORTED_MAJORS: std::ops::RangeInclusive<u16> = 7..=8;

/// Decode behaviour knobs.
///
/// `skip_data` leaves every grain's data region as a lazy handle that
/// [`GsfDecoder::fetch`] realises on demand. `local_ids` drops grains of
/// other segments without materialising them. `strict` turns an undeclared
/// local id and a missing terminator into errors instead of tolerating them.
#[derive(Clone, Debug, Default)]
pub struct DecodeOptions {
    skip_data: bool,
    local_ids: Option<HashSet<u16>>,
    strict: bool,
}

impl DecodeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skip_data(mut self, skip_data: bool) -> Self {
        self.skip_data = skip_data;
        self
    }

    pub fn local_ids<I: IntoIterator<Item = u16>>(mut self, ids: I) -> Self {
        self.local_ids = Some(ids.into_iter().collect());
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    fn wants(&self, local_id: u16) -> bool {
        match &self.local_ids {
            Some(ids) => ids.contains(&local_id),
            None => true,
        }
    }
}

/// Pull decoder for a grain sequence.
///
/// Construction reads the file header and the `head` block; grains are then
/// pulled one at a time in file order. The reader must implement `Seek`;
/// forward-only streams can be wrapped in
/// [`ReadOnlySource`](crate::source::ReadOnlySource).
pub struct GsfDecoder<R: Read + Seek> {
    reader: R,
    file_header: FileHeader,
    head: Head,
    options: DecodeOptions,
    finished: bool,
}

impl<R: Read + Seek> GsfDecoder<R> {
    pub fn new(reader: R) -> Result<Self> {
        Self::with_options(reader, DecodeOptions::default())
    }

    pub fn with_options(mut reader: R, options: DecodeOptions) -> Result<Self> {
        let file_header = FileHeader::from_reader(&mut reader)?;
        check_file_header(&file_header)?;

        let head = loop {
            let header = match read_top_header(&mut reader)? {
                Some(header) => header,
                None => return Err(GsfError::TruncatedInput),
            };
            if header.tag == tags::HEAD {
                break Head::read(
                    &mut reader,
                    header.payload_len()?,
                    file_header.major_version,
                )?;
            }
            if header.is_terminator() || header.tag == tags::GRAIN {
                return Err(GsfError::MalformedBlock(
                    "grain sequence starts before any head block".to_string(),
                ));
            }
            log::debug!("skipping {} block before head", header.tag_lossy());
            reader.seek(SeekFrom::Current(header.payload_len()? as i64))?;
        };

        Ok(GsfDecoder {
            reader,
            file_header,
            head,
            options,
            finished: false,
        })
    }

    pub fn file_header(&self) -> &FileHeader {
        &self.file_header
    }

    pub fn head(&self) -> &Head {
        &self.head
    }

    /// The next `(local_id, grain)` pair, or `None` past the terminator. In
    /// non-strict mode a stream that ends without a terminator also yields
    /// `None`.
    pub fn next_grain(&mut self) -> Result<Option<(u16, Grain)>> {
        if self.finished {
            return Ok(None);
        }
        loop {
            let header = match read_top_header(&mut self.reader)? {
                Some(header) => header,
                None if self.options.strict => return Err(GsfError::TruncatedInput),
                None => {
                    self.finished = true;
                    return Ok(None);
                }
            };
            if header.is_terminator() {
                self.finished = true;
                return Ok(None);
            }
            let payload_len = header.payload_len()?;
            if header.tag != tags::GRAIN {
                log::debug!("skipping top-level {} block", header.tag_lossy());
                self.reader.seek(SeekFrom::Current(payload_len as i64))?;
                continue;
            }
            if let Some(result) = self.read_grain(payload_len)? {
                return Ok(Some(result));
            }
        }
    }

    /// Iterator over the remaining grains.
    pub fn grains(&mut self) -> Grains<'_, R> {
        Grains { decoder: self }
    }

    fn read_grain(&mut self, payload_len: u64) -> Result<Option<(u16, Grain)>> {
        if payload_len < 2 {
            return Err(GsfError::MalformedBlock(
                "grai payload too short for a local id".to_string(),
            ));
        }
        let start = self.reader.stream_position()?;
        let end = start + payload_len;

        let local_id = self.reader.read_u16::<LittleEndian>()?;
        if !self.options.wants(local_id) {
            self.reader.seek(SeekFrom::Start(end))?;
            return Ok(None);
        }
        if self.options.strict && self.head.segment(local_id).is_none() {
            return Err(GsfError::UnknownLocalId(local_id));
        }

        let mut parsed: Option<(GrainMeta, GrainPayload)> = None;
        let mut data: Option<GrainData> = None;

        let mut children = ChildBlocks::new(payload_len - 2);
        while let Some(header) = children.next(&mut self.reader)? {
            let child_len = header.payload_len()?;
            match header.tag {
                tags::GBHD => {
                    if parsed.is_some() {
                        return Err(GsfError::MalformedBlock(
                            "grai carries more than one gbhd".to_string(),
                        ));
                    }
                    parsed = Some(parse_gbhd(&mut self.reader, child_len)?);
                }
                tags::GRDT => {
                    if data.is_some() {
                        return Err(GsfError::MalformedBlock(
                            "grai carries more than one grdt".to_string(),
                        ));
                    }
                    data = Some(if child_len == 0 {
                        GrainData::Bytes(Vec::new())
                    } else if self.options.skip_data {
                        let offset = self.reader.stream_position()?;
                        self.reader.seek(SeekFrom::Current(child_len as i64))?;
                        GrainData::Lazy(LazyData {
                            offset,
                            length: child_len,
                        })
                    } else {
                        GrainData::Bytes(take(&mut self.reader, child_len as usize)?)
                    });
                }
                other => {
                    log::debug!(
                        "skipping {} block inside grai",
                        String::from_utf8_lossy(&other)
                    );
                    self.reader.seek(SeekFrom::Current(child_len as i64))?;
                }
            }
        }
        self.reader.seek(SeekFrom::Start(end))?;

        let (meta, payload) = parsed.ok_or_else(|| {
            GsfError::MalformedBlock("grai carries no gbhd block".to_string())
        })?;
        let data = data.ok_or_else(|| {
            GsfError::MalformedBlock("grai carries no grdt block".to_string())
        })?;

        let grain = Grain {
            meta,
            payload,
            data,
        };
        if let Some(expected) = grain.expected_data_length() {
            if expected > grain.data.len() {
                return Err(GsfError::TruncatedPayload {
                    expected,
                    actual: grain.data.len(),
                });
            }
        }
        Ok(Some((local_id, grain)))
    }

    /// Realises a lazy data handle. The stream position is saved and
    /// restored, so fetches may be interleaved with grain iteration. Fails
    /// on sources that cannot seek backwards.
    pub fn fetch(&mut self, lazy: &LazyData) -> Result<Vec<u8>> {
        let saved = self.reader.stream_position()?;
        self.reader.seek(SeekFrom::Start(lazy.offset))?;
        let bytes = take(&mut self.reader, lazy.length as usize);
        self.reader.seek(SeekFrom::Start(saved))?;
        Ok(bytes?)
    }

    /// Replaces a grain's lazy handle with the fetched bytes. Grains whose
    /// data is already materialised are left alone.
    pub fn realize(&mut self, grain: &mut Grain) -> Result<()> {
        if let GrainData::Lazy(lazy) = &grain.data {
            let lazy = *lazy;
            grain.data = GrainData::Bytes(self.fetch(&lazy)?);
        }
        Ok(())
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

pub struct Grains<'a, R: Read + Seek> {
    decoder: &'a mut GsfDecoder<R>,
}

impl<R: Read + Seek> Iterator for Grains<'_, R> {
    type Item = Result<(u16, Grain)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.decoder.next_grain().transpose()
    }
}

/// A whole eagerly-decoded file: the head plus every grain keyed by segment.
#[derive(Clone, Debug)]
pub struct GsfFile {
    pub head: Head,
    pub grains: BTreeMap<u16, Vec<Grain>>,
}

/// Eagerly decodes a complete file, data included, in strict mode.
pub fn decode_all<R: Read + Seek>(reader: R) -> Result<GsfFile> {
    let mut decoder = GsfDecoder::with_options(reader, DecodeOptions::new().strict(true))?;
    let mut grains: BTreeMap<u16, Vec<Grain>> = BTreeMap::new();
    for segment in &decoder.head.segments {
        grains.insert(segment.local_id, Vec::new());
    }
    while let Some((local_id, grain)) = decoder.next_grain()? {
        grains.entry(local_id).or_default().push(grain);
    }
    Ok(GsfFile {
        head: decoder.head,
        grains,
    })
}

fn check_file_header(header: &FileHeader) -> Result<()> {
    if header.file_type != GSF_FILE_TYPE {
        return Err(GsfError::WrongFileType(header.file_type));
    }
    if !SUPPORTED_MAJORS.contains(&header.major_version) {
        return Err(GsfError::UnsupportedMajorVersion(header.major_version));
    }
    if header.major_version == 8 && header.minor_version > crate::block::GSF_MINOR_VERSION {
        log::debug!(
            "minor version {} is newer than this reader, unknown blocks will be skipped",
            header.minor_version
        );
    }
    Ok(())
}

/// Reads a top-level block header, reporting a clean end of stream as
/// `None`. A partially present header is truncation.
fn read_top_header<R: Read>(reader: &mut R) -> Result<Option<BlockHeader>> {
    let mut tag = [0u8; 4];
    if reader.read(&mut tag[..1])? == 0 {
        return Ok(None);
    }
    reader.read_exact(&mut tag[1..])?;
    let size = reader.read_u32::<LittleEndian>()?;
    Ok(Some(BlockHeader { tag, size }))
}

#[cfg(feature = "async")]
pub use r#async::{decode_all_async, AsyncGsfDecoder};

#[cfg(feature = "async")]
mod r#async {
    use super::*;
    use crate::blocks::parse_gbhd_async;
    use crate::utils::take_async;
    use tokio::io::AsyncSeekExt;

    /// Async twin of [`GsfDecoder`]: every raw read suspends. The reader
    /// must implement `AsyncSeek`; forward-only streams can be wrapped in
    /// [`AsyncReadOnlySource`](crate::source::AsyncReadOnlySource).
    ///
    /// Dropping a `next_grain` future mid-flight leaves the reader at an
    /// unspecified offset; seek explicitly before reusing it.
    pub struct AsyncGsfDecoder<R> {
        reader: R,
        file_header: FileHeader,
        head: Head,
        options: DecodeOptions,
        finished: bool,
    }

    impl<R> AsyncGsfDecoder<R>
    where
        R: AsyncRead + AsyncSeek + Unpin + Send,
    {
        pub async fn new(reader: R) -> Result<Self> {
            Self::with_options(reader, DecodeOptions::default()).await
        }

        pub async fn with_options(mut reader: R, options: DecodeOptions) -> Result<Self> {
            let file_header = FileHeader::from_async_reader(&mut reader).await?;
            check_file_header(&file_header)?;

            let head = loop {
                let header = match read_top_header_async(&mut reader).await? {
                    Some(header) => header,
                    None => return Err(GsfError::TruncatedInput),
                };
                if header.tag == tags::HEAD {
                    break Head::read_async(
                        &mut reader,
                        header.payload_len()?,
                        file_header.major_version,
                    )
                    .await?;
                }
                if header.is_terminator() || header.tag == tags::GRAIN {
                    return Err(GsfError::MalformedBlock(
                        "grain sequence starts before any head block".to_string(),
                    ));
                }
                reader
                    .seek(SeekFrom::Current(header.payload_len()? as i64))
                    .await?;
            };

            Ok(AsyncGsfDecoder {
                reader,
                file_header,
                head,
                options,
                finished: false,
            })
        }

        pub fn file_header(&self) -> &FileHeader {
            &self.file_header
        }

        pub fn head(&self) -> &Head {
            &self.head
        }

        pub async fn next_grain(&mut self) -> Result<Option<(u16, Grain)>> {
            if self.finished {
                return Ok(None);
            }
            loop {
                let header = match read_top_header_async(&mut self.reader).await? {
                    Some(header) => header,
                    None if self.options.strict => return Err(GsfError::TruncatedInput),
                    None => {
                        self.finished = true;
                        return Ok(None);
                    }
                };
                if header.is_terminator() {
                    self.finished = true;
                    return Ok(None);
                }
                let payload_len = header.payload_len()?;
                if header.tag != tags::GRAIN {
                    self.reader
                        .seek(SeekFrom::Current(payload_len as i64))
                        .await?;
                    continue;
                }
                if let Some(result) = self.read_grain(payload_len).await? {
                    return Ok(Some(result));
                }
            }
        }

        async fn read_grain(&mut self, payload_len: u64) -> Result<Option<(u16, Grain)>> {
            if payload_len < 2 {
                return Err(GsfError::MalformedBlock(
                    "grai payload too short for a local id".to_string(),
                ));
            }
            let start = self.reader.stream_position().await?;
            let end = start + payload_len;

            let local_id = self.reader.read_u16_le().await?;
            if !self.options.wants(local_id) {
                self.reader.seek(SeekFrom::Start(end)).await?;
                return Ok(None);
            }
            if self.options.strict && self.head.segment(local_id).is_none() {
                return Err(GsfError::UnknownLocalId(local_id));
            }

            let mut parsed: Option<(GrainMeta, GrainPayload)> = None;
            let mut data: Option<GrainData> = None;

            let mut children = ChildBlocks::new(payload_len - 2);
            while let Some(header) = children.next_async(&mut self.reader).await? {
                let child_len = header.payload_len()?;
                match header.tag {
                    tags::GBHD => {
                        if parsed.is_some() {
                            return Err(GsfError::MalformedBlock(
                                "grai carries more than one gbhd".to_string(),
                            ));
                        }
                        parsed = Some(parse_gbhd_async(&mut self.reader, child_len).await?);
                    }
                    tags::GRDT => {
                        if data.is_some() {
                            return Err(GsfError::MalformedBlock(
                                "grai carries more than one grdt".to_string(),
                            ));
                        }
                        data = Some(if child_len == 0 {
                            GrainData::Bytes(Vec::new())
                        } else if self.options.skip_data {
                            let offset = self.reader.stream_position().await?;
                            self.reader
                                .seek(SeekFrom::Current(child_len as i64))
                                .await?;
                            GrainData::Lazy(LazyData {
                                offset,
                                length: child_len,
                            })
                        } else {
                            GrainData::Bytes(take_async(&mut self.reader, child_len as usize).await?)
                        });
                    }
                    _ => {
                        self.reader
                            .seek(SeekFrom::Current(child_len as i64))
                            .await?;
                    }
                }
            }
            self.reader.seek(SeekFrom::Start(end)).await?;

            let (meta, payload) = parsed.ok_or_else(|| {
                GsfError::MalformedBlock("grai carries no gbhd block".to_string())
            })?;
            let data = data.ok_or_else(|| {
                GsfError::MalformedBlock("grai carries no grdt block".to_string())
            })?;

            let grain = Grain {
                meta,
                payload,
                data,
            };
            if let Some(expected) = grain.expected_data_length() {
                if expected > grain.data.len() {
                    return Err(GsfError::TruncatedPayload {
                        expected,
                        actual: grain.data.len(),
                    });
                }
            }
            Ok(Some((local_id, grain)))
        }

        pub async fn fetch(&mut self, lazy: &LazyData) -> Result<Vec<u8>> {
            let saved = self.reader.stream_position().await?;
            self.reader.seek(SeekFrom::Start(lazy.offset)).await?;
            let bytes = take_async(&mut self.reader, lazy.length as usize).await;
            self.reader.seek(SeekFrom::Start(saved)).await?;
            Ok(bytes?)
        }

        pub async fn realize(&mut self, grain: &mut Grain) -> Result<()> {
            if let GrainData::Lazy(lazy) = &grain.data {
                let lazy = *lazy;
                grain.data = GrainData::Bytes(self.fetch(&lazy).await?);
            }
            Ok(())
        }

        pub fn into_inner(self) -> R {
            self.reader
        }
    }

    /// Async twin of [`decode_all`].
    pub async fn decode_all_async<R>(reader: R) -> Result<GsfFile>
    where
        R: AsyncRead + AsyncSeek + Unpin + Send,
    {
        let mut decoder =
            AsyncGsfDecoder::with_options(reader, DecodeOptions::new().strict(true)).await?;
        let mut grains: BTreeMap<u16, Vec<Grain>> = BTreeMap::new();
        for segment in &decoder.head.segments {
            grains.insert(segment.local_id, Vec::new());
        }
        while let Some((local_id, grain)) = decoder.next_grain().await? {
            grains.entry(local_id).or_default().push(grain);
        }
        Ok(GsfFile {
            head: decoder.head,
            grains,
        })
    }

    async fn read_top_header_async<R>(reader: &mut R) -> Result<Option<BlockHeader>>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut tag = [0u8; 4];
        if reader.read(&mut tag[..1]).await? == 0 {
            return Ok(None);
        }
        reader.read_exact(&mut tag[1..]).await?;
        let size = reader.read_u32_le().await?;
        Ok(Some(BlockHeader { tag, size }))
    }
}
