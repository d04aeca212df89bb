use crate::block::{tags, ChildBlocks};
use crate::error::GsfError;
use crate::prelude::*;
use crate::types::{DateTime, WireString};
use crate::utils::skip;
use byteorder::{LittleEndian, ReadBytesExt};
use std::collections::HashMap;
use std::io::Read;
use uuid::Uuid;

/// A `(key, value)` string tag, attached to the file or to a segment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tag {
    pub key: WireString,
    pub value: WireString,
}

impl Tag {
    pub fn new(key: &str, value: &str) -> Self {
        Tag {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl Decode for Tag {
    fn from_reader<R: Read>(reader: &mut R) -> Result<Self> {
        let key = WireString::from_reader(reader)?;
        let value = WireString::from_reader(reader)?;
        Ok(Tag { key, value })
    }
}

#[cfg(feature = "async")]
#[async_trait::async_trait]
impl AsyncDecode for Tag {
    async fn from_async_reader<R>(reader: &mut R) -> Result<Self>
    where
        R: AsyncRead + Unpin + Send,
    {
        let key = WireString::from_async_reader(reader).await?;
        let value = WireString::from_async_reader(reader).await?;
        Ok(Tag { key, value })
    }
}

impl Encode for Tag {
    fn write_to<W: std::io::Write>(&self, writer: &mut W) -> Result<()> {
        self.key.write_to(writer)?;
        self.value.write_to(writer)
    }
}

/// Maps tags by key, last value winning; keys that are not valid UTF-8 are
/// left out of the map but remain in the list.
pub(crate) fn tag_map(tags: &[Tag]) -> HashMap<&str, &str> {
    let mut map = HashMap::new();
    for tag in tags {
        if let (Some(key), Some(value)) = (tag.key.as_str(), tag.value.as_str()) {
            map.insert(key, value);
        }
    }
    map
}

/// A declared segment: holds the grains of one flow under a file-local id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    pub local_id: u16,
    pub id: Uuid,
    /// Grain count, or -1 when unknown at write time.
    pub count: i64,
    pub tags: Vec<Tag>,
}

impl Segment {
    pub(crate) fn read<R: Read>(reader: &mut R, payload_len: u64) -> Result<Self> {
        let mut bounded = reader.take(payload_len);
        let local_id = bounded.read_u16::<LittleEndian>()?;
        let id = Uuid::from_reader(&mut bounded)?;
        let count = bounded.read_i64::<LittleEndian>()?;

        let mut tags_out = Vec::new();
        let mut children = ChildBlocks::new(bounded.limit());
        while let Some(header) = children.next(&mut bounded)? {
            let mut child = (&mut bounded).take(header.payload_len()?);
            if header.tag == tags::TAG {
                tags_out.push(Tag::from_reader(&mut child)?);
            } else {
                log::debug!("skipping {} block inside segm", header.tag_lossy());
            }
            let rest = child.limit();
            skip(&mut child, rest)?;
        }
        Ok(Segment {
            local_id,
            id,
            count,
            tags: tags_out,
        })
    }

    #[cfg(feature = "async")]
    pub(crate) async fn read_async<R>(reader: &mut R, payload_len: u64) -> Result<Self>
    where
        R: AsyncRead + Unpin + Send,
    {
        use crate::utils::skip_async;

        let mut bounded = reader.take(payload_len);
        let local_id = bounded.read_u16_le().await?;
        let id = Uuid::from_async_reader(&mut bounded).await?;
        let count = bounded.read_i64_le().await?;

        let mut tags_out = Vec::new();
        let mut children = ChildBlocks::new(bounded.limit());
        while let Some(header) = children.next_async(&mut bounded).await? {
            let mut child = (&mut bounded).take(header.payload_len()?);
            if header.tag == tags::TAG {
                tags_out.push(Tag::from_async_reader(&mut child).await?);
            }
            let rest = child.limit();
            skip_async(&mut child, rest).await?;
        }
        Ok(Segment {
            local_id,
            id,
            count,
            tags: tags_out,
        })
    }

    pub fn tag_map(&self) -> HashMap<&str, &str> {
        tag_map(&self.tags)
    }
}

/// The parsed `head` block: file identity plus the declared segments and
/// file-level tags.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Head {
    pub id: Uuid,
    pub created: DateTime,
    pub segments: Vec<Segment>,
    pub tags: Vec<Tag>,
}

impl Head {
    pub(crate) fn read<R: Read>(reader: &mut R, payload_len: u64, major: u16) -> Result<Self> {
        let mut bounded = reader.take(payload_len);
        let id = Uuid::from_reader(&mut bounded)?;
        let created = read_created(&mut bounded, major)?;

        let mut segments: Vec<Segment> = Vec::new();
        let mut tags_out = Vec::new();
        let mut children = ChildBlocks::new(bounded.limit());
        while let Some(header) = children.next(&mut bounded)? {
            let mut child = (&mut bounded).take(header.payload_len()?);
            match header.tag {
                tags::SEGM => {
                    let limit = child.limit();
                    let segment = Segment::read(&mut child, limit)?;
                    if segments.iter().any(|s| s.local_id == segment.local_id) {
                        return Err(GsfError::DuplicateLocalId(segment.local_id));
                    }
                    segments.push(segment);
                }
                tags::TAG => tags_out.push(Tag::from_reader(&mut child)?),
                other => {
                    log::debug!(
                        "skipping {} block inside head",
                        String::from_utf8_lossy(&other)
                    );
                }
            }
            let rest = child.limit();
            skip(&mut child, rest)?;
        }
        Ok(Head {
            id,
            created,
            segments,
            tags: tags_out,
        })
    }

    #[cfg(feature = "async")]
    pub(crate) async fn read_async<R>(reader: &mut R, payload_len: u64, major: u16) -> Result<Self>
    where
        R: AsyncRead + Unpin + Send,
    {
        use crate::utils::skip_async;

        let mut bounded = reader.take(payload_len);
        let id = Uuid::from_async_reader(&mut bounded).await?;
        let created = read_created_async(&mut bounded, major).await?;

        let mut segments: Vec<Segment> = Vec::new();
        let mut tags_out = Vec::new();
        let mut children = ChildBlocks::new(bounded.limit());
        while let Some(header) = children.next_async(&mut bounded).await? {
            let mut child = (&mut bounded).take(header.payload_len()?);
            match header.tag {
                tags::SEGM => {
                    let limit = child.limit();
                    let segment = Segment::read_async(&mut child, limit).await?;
                    if segments.iter().any(|s| s.local_id == segment.local_id) {
                        return Err(GsfError::DuplicateLocalId(segment.local_id));
                    }
                    segments.push(segment);
                }
                tags::TAG => tags_out.push(Tag::from_async_reader(&mut child).await?),
                _ => {}
            }
            let rest = child.limit();
            skip_async(&mut child, rest).await?;
        }
        Ok(Head {
            id,
            created,
            segments,
            tags: tags_out,
        })
    }

    pub fn segment(&self, local_id: u16) -> Option<&Segment> {
        self.segments.iter().find(|s| s.local_id == local_id)
    }

    pub fn tag_map(&self) -> HashMap<&str, &str> {
        tag_map(&self.tags)
    }
}

/// `created` is a 7 octet date-time from major version 8 onwards. Version 7
/// carried a 10 octet unsigned timestamp followed by a deprecated 16 octet
/// zero region.
fn read_created<R: Read>(reader: &mut R, major: u16) -> Result<DateTime> {
    if major >= 8 {
        DateTime::from_reader(reader)
    } else {
        let seconds = reader.read_u48::<LittleEndian>()?;
        let _nanoseconds = reader.read_u32::<LittleEndian>()?;
        skip(reader, 16)?;
        Ok(DateTime::from_unix_seconds(seconds))
    }
}

#[cfg(feature = "async")]
async fn read_created_async<R>(reader: &mut R, major: u16) -> Result<DateTime>
where
    R: AsyncRead + Unpin + Send,
{
    use crate::utils::{read_u48_le_async, skip_async};

    if major >= 8 {
        DateTime::from_async_reader(reader).await
    } else {
        let seconds = read_u48_le_async(reader).await?;
        let _nanoseconds = reader.read_u32_le().await?;
        skip_async(reader, 16).await?;
        Ok(DateTime::from_unix_seconds(seconds))
    }
}
