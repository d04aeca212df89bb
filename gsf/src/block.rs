use crate::error::GsfError;
use crate::prelude::*;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

pub const SSB_SIGNATURE: [u8; 4] = *b"SSBB";
pub const GSF_FILE_TYPE: [u8; 4] = *b"grsg";
pub const GSF_MAJOR_VERSION: u16 = 8;
pub const GSF_MINOR_VERSION: u16 = 0;
pub const BLOCK_HEADER_LEN: u64 = 8;

pub(crate) mod tags {
    pub const HEAD: [u8; 4] = *b"head";
    pub const SEGM: [u8; 4] = *b"segm";
    pub const TAG: [u8; 4] = *b"tag ";
    pub const GRAIN: [u8; 4] = *b"grai";
    pub const GBHD: [u8; 4] = *b"gbhd";
    pub const GRDT: [u8; 4] = *b"grdt";
    pub const TILS: [u8; 4] = *b"tils";
    pub const VGHD: [u8; 4] = *b"vghd";
    pub const CGHD: [u8; 4] = *b"cghd";
    pub const AGHD: [u8; 4] = *b"aghd";
    pub const CAHD: [u8; 4] = *b"cahd";
    pub const EGHD: [u8; 4] = *b"eghd";
    pub const COMP: [u8; 4] = *b"comp";
    pub const UNOF: [u8; 4] = *b"unof";
    pub const FILL: [u8; 4] = *b"fill";
}

/// The 12 octet SSB file header.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FileHeader {
    pub file_type: [u8; 4],
    pub major_version: u16,
    pub minor_version: u16,
}

impl Decode for FileHeader {
    fn from_reader<R: Read>(reader: &mut R) -> Result<Self> {
        let mut signature = [0u8; 4];
        reader.read_exact(&mut signature)?;
        if signature != SSB_SIGNATURE {
            return Err(GsfError::UnsupportedSignature);
        }
        let mut file_type = [0u8; 4];
        reader.read_exact(&mut file_type)?;
        let major_version = reader.read_u16::<LittleEndian>()?;
        let minor_version = reader.read_u16::<LittleEndian>()?;
        Ok(FileHeader {
            file_type,
            major_version,
            minor_version,
        })
    }
}

#[cfg(feature = "async")]
#[async_trait::async_trait]
impl AsyncDecode for FileHeader {
    async fn from_async_reader<R>(reader: &mut R) -> Result<Self>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut signature = [0u8; 4];
        reader.read_exact(&mut signature).await?;
        if signature != SSB_SIGNATURE {
            return Err(GsfError::UnsupportedSignature);
        }
        let mut file_type = [0u8; 4];
        reader.read_exact(&mut file_type).await?;
        let major_version = reader.read_u16_le().await?;
        let minor_version = reader.read_u16_le().await?;
        Ok(FileHeader {
            file_type,
            major_version,
            minor_version,
        })
    }
}

impl Encode for FileHeader {
    fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&SSB_SIGNATURE)?;
        writer.write_all(&self.file_type)?;
        writer.write_u16::<LittleEndian>(self.major_version)?;
        writer.write_u16::<LittleEndian>(self.minor_version)?;
        Ok(())
    }
}

/// The 8 octet block header: ASCII tag and total size including the header.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BlockHeader {
    pub tag: [u8; 4],
    pub size: u32,
}

impl BlockHeader {
    /// A sequence terminator is a `grai` block with a size field of 0, a
    /// header-only `grai` block of size 8, or eight zero octets.
    pub fn is_terminator(&self) -> bool {
        (self.tag == tags::GRAIN && (self.size == 0 || self.size == 8))
            || (self.tag == [0u8; 4] && self.size == 0)
    }

    pub fn payload_len(&self) -> Result<u64> {
        match u64::from(self.size).checked_sub(BLOCK_HEADER_LEN) {
            Some(len) => Ok(len),
            None => Err(GsfError::MalformedBlock(format!(
                "block {} size {} underflows the 8 octet header",
                self.tag_lossy(),
                self.size
            ))),
        }
    }

    pub fn tag_lossy(&self) -> String {
        String::from_utf8_lossy(&self.tag).to_string()
    }
}

impl Decode for BlockHeader {
    fn from_reader<R: Read>(reader: &mut R) -> Result<Self> {
        let mut tag = [0u8; 4];
        reader.read_exact(&mut tag)?;
        let size = reader.read_u32::<LittleEndian>()?;
        Ok(BlockHeader { tag, size })
    }
}

#[cfg(feature = "async")]
#[async_trait::async_trait]
impl AsyncDecode for BlockHeader {
    async fn from_async_reader<R>(reader: &mut R) -> Result<Self>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut tag = [0u8; 4];
        reader.read_exact(&mut tag).await?;
        let size = reader.read_u32_le().await?;
        Ok(BlockHeader { tag, size })
    }
}

impl Encode for BlockHeader {
    fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.tag)?;
        writer.write_u32::<LittleEndian>(self.size)?;
        Ok(())
    }
}

/// Bounded walk over the children of a block. `next` hands out the child
/// header and accounts for the whole child; the caller must then consume
/// exactly the child's payload from the reader.
pub(crate) struct ChildBlocks {
    remaining: u64,
}

impl ChildBlocks {
    pub(crate) fn new(parent_payload_len: u64) -> Self {
        ChildBlocks {
            remaining: parent_payload_len,
        }
    }

    pub(crate) fn next<R: Read>(&mut self, reader: &mut R) -> Result<Option<BlockHeader>> {
        if !self.begin()? {
            return Ok(None);
        }
        let header = BlockHeader::from_reader(reader)?;
        self.account(header)
    }

    #[cfg(feature = "async")]
    pub(crate) async fn next_async<R>(&mut self, reader: &mut R) -> Result<Option<BlockHeader>>
    where
        R: AsyncRead + Unpin + Send,
    {
        if !self.begin()? {
            return Ok(None);
        }
        let header = BlockHeader::from_async_reader(reader).await?;
        self.account(header)
    }

    fn begin(&mut self) -> Result<bool> {
        if self.remaining == 0 {
            return Ok(false);
        }
        if self.remaining < BLOCK_HEADER_LEN {
            return Err(GsfError::MalformedBlock(format!(
                "{} trailing octets cannot hold a child block header",
                self.remaining
            )));
        }
        Ok(true)
    }

    fn account(&mut self, header: BlockHeader) -> Result<Option<BlockHeader>> {
        let payload = header.payload_len()?;
        let total = payload + BLOCK_HEADER_LEN;
        if total > self.remaining {
            return Err(GsfError::MalformedBlock(format!(
                "child block {} of {} octets exceeds the {} octets left in its parent",
                header.tag_lossy(),
                total,
                self.remaining
            )));
        }
        self.remaining -= total;
        Ok(Some(header))
    }
}

/// An in-memory block writer. `begin` opens a block, `end` back-patches its
/// size field; blocks nest. Used to assemble whole blocks before they are
/// handed to a sink, so non-seekable sinks still get correct size fields.
#[derive(Default)]
pub struct BlockBuilder {
    buf: Vec<u8>,
    open: Vec<usize>,
}

impl BlockBuilder {
    pub fn new() -> Self {
        BlockBuilder::default()
    }

    pub fn begin(&mut self, tag: [u8; 4]) {
        self.buf.extend_from_slice(&tag);
        self.open.push(self.buf.len());
        self.buf.extend_from_slice(&[0u8; 4]);
    }

    pub fn end(&mut self) -> Result<()> {
        let at = self.open.pop().expect("block builder end without begin");
        let size = self.buf.len() - at + 4;
        let size = u32::try_from(size).map_err(|_| {
            GsfError::ValueOutOfRange(format!("block of {} octets exceeds the u32 size field", size))
        })?;
        self.buf[at..at + 4].copy_from_slice(&size.to_le_bytes());
        Ok(())
    }

    /// Emits a `fill` block carrying `n` zero octets.
    pub fn fill(&mut self, n: u32) -> Result<()> {
        self.begin(tags::FILL);
        self.buf.resize(self.buf.len() + n as usize, 0);
        self.end()
    }

    /// Current length, which is also the offset of the next write.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        debug_assert!(self.open.is_empty(), "unterminated block");
        self.buf
    }
}

impl Write for BlockBuilder {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Writes the terminator: tag `grai` with a size field of 0.
pub(crate) fn write_terminator<W: Write>(writer: &mut W) -> Result<()> {
    BlockHeader {
        tag: tags::GRAIN,
        size: 0,
    }
    .write_to(writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn header_round_trip() {
        let header = BlockHeader {
            tag: tags::HEAD,
            size: 42,
        };
        let mut buf = Vec::new();
        header.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), 8);
        assert_eq!(BlockHeader::from_reader(&mut Cursor::new(buf)).unwrap(), header);
    }

    #[test]
    fn terminator_forms() {
        for (tag, size) in [(tags::GRAIN, 0), (tags::GRAIN, 8), ([0u8; 4], 0)] {
            assert!(BlockHeader { tag, size }.is_terminator());
        }
        assert!(!BlockHeader {
            tag: tags::GRAIN,
            size: 20
        }
        .is_terminator());
    }

    #[test]
    fn size_underflow_is_malformed() {
        let header = BlockHeader {
            tag: tags::GBHD,
            size: 5,
        };
        assert!(matches!(
            header.payload_len(),
            Err(GsfError::MalformedBlock(_))
        ));
    }

    #[test]
    fn child_must_fit_parent() {
        let mut wire = Vec::new();
        BlockHeader {
            tag: tags::TILS,
            size: 64,
        }
        .write_to(&mut wire)
        .unwrap();

        let mut children = ChildBlocks::new(16);
        assert!(matches!(
            children.next(&mut Cursor::new(wire)),
            Err(GsfError::MalformedBlock(_))
        ));
    }

    #[test]
    fn builder_nests_and_patches_sizes() {
        let mut builder = BlockBuilder::new();
        builder.begin(tags::HEAD);
        builder.write_all(&[0xaa; 4]).unwrap();
        builder.begin(tags::SEGM);
        builder.write_all(&[0xbb; 2]).unwrap();
        builder.end().unwrap();
        builder.end().unwrap();

        let bytes = builder.into_bytes();
        // outer: 8 + 4 + inner(8 + 2)
        assert_eq!(&bytes[0..4], b"head");
        assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), 22);
        assert_eq!(&bytes[12..16], b"segm");
        assert_eq!(u32::from_le_bytes(bytes[16..20].try_into().unwrap()), 10);
    }

    #[test]
    fn fill_block() {
        let mut builder = BlockBuilder::new();
        builder.fill(5).unwrap();
        let bytes = builder.into_bytes();
        assert_eq!(&bytes[0..4], b"fill");
        assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), 13);
        assert_eq!(&bytes[8..], &[0u8; 5]);
    }
}
