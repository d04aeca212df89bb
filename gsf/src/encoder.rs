use crate::block::{
    tags, write_terminator, BlockBuilder, FileHeader, GSF_FILE_TYPE, GSF_MAJOR_VERSION,
    GSF_MINOR_VERSION,
};
use crate::blocks::{write_gbhd, Tag};
use crate::error::GsfError;
use crate::grain::{Grain, GrainData};
use crate::prelude::*;
use crate::types::DateTime;
use byteorder::{LittleEndian, WriteBytesExt};
use std::io::{Seek, SeekFrom, Write};
use uuid::Uuid;

/// Where encoded blocks go. `patch` rewrites already-emitted octets and
/// reports whether the sink could honour it, which decides whether segment
/// counts are back-patched on close.
pub trait Sink: Write {
    fn patch(&mut self, offset: u64, bytes: &[u8]) -> std::io::Result<bool>;
}

/// A sink over a seekable writer; `patch` seeks, rewrites and seeks back.
pub struct Seekable<W: Write + Seek>(pub W);

impl<W: Write + Seek> Write for Seekable<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.0.flush()
    }
}

impl<W: Write + Seek> Sink for Seekable<W> {
    fn patch(&mut self, offset: u64, bytes: &[u8]) -> std::io::Result<bool> {
        let saved = self.0.stream_position()?;
        self.0.seek(SeekFrom::Start(offset))?;
        self.0.write_all(bytes)?;
        self.0.seek(SeekFrom::Start(saved))?;
        Ok(true)
    }
}

/// A sink over a forward-only writer; patches are declined and segment
/// counts stay at -1 in the emitted file.
pub struct Streaming<W: Write>(pub W);

impl<W: Write> Write for Streaming<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.0.flush()
    }
}

impl<W: Write> Sink for Streaming<W> {
    fn patch(&mut self, _offset: u64, _bytes: &[u8]) -> std::io::Result<bool> {
        Ok(false)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Phase {
    Open,
    Started,
    Closed,
    Failed,
}

impl Phase {
    fn as_str(&self) -> &'static str {
        match self {
            Phase::Open => "open",
            Phase::Started => "started",
            Phase::Closed => "closed",
            Phase::Failed => "failed",
        }
    }
}

/// A handle to a declared segment; pass it back to
/// [`GsfEncoder::add_grain`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SegmentRef(u16);

impl SegmentRef {
    pub fn local_id(&self) -> u16 {
        self.0
    }
}

struct SegmentState {
    local_id: u16,
    id: Uuid,
    tags: Vec<Tag>,
    grains_written: u64,
    /// Absolute offset of the -1 count placeholder, for declared segments.
    count_offset: Option<u64>,
}

/// The sink-independent half of the encoder: phase tracking, segment and
/// tag bookkeeping and block serialization.
struct EncoderCore {
    phase: Phase,
    file_id: Uuid,
    created: DateTime,
    file_tags: Vec<Tag>,
    segments: Vec<SegmentState>,
    next_local_id: u16,
}

impl EncoderCore {
    fn new(file_id: Uuid, created: DateTime) -> Self {
        EncoderCore {
            phase: Phase::Open,
            file_id,
            created,
            file_tags: Vec::new(),
            segments: Vec::new(),
            next_local_id: 1,
        }
    }

    fn now() -> DateTime {
        match std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH) {
            Ok(elapsed) => DateTime::from_unix_seconds(elapsed.as_secs()),
            Err(_) => DateTime::from_unix_seconds(0),
        }
    }

    fn segment_state(&self, local_id: u16) -> Option<&SegmentState> {
        self.segments.iter().find(|s| s.local_id == local_id)
    }

    fn add_segment(&mut self, local_id: Option<u16>, id: Option<Uuid>) -> Result<SegmentRef> {
        match self.phase {
            Phase::Open | Phase::Started => {}
            other => return Err(state_error("open", other)),
        }
        let local_id = match local_id {
            Some(id) => id,
            None => {
                while self.segment_state(self.next_local_id).is_some() {
                    self.next_local_id += 1;
                }
                self.next_local_id
            }
        };
        if self.segment_state(local_id).is_some() {
            return Err(GsfError::DuplicateLocalId(local_id));
        }
        if self.phase == Phase::Started {
            log::debug!(
                "segment {} added after start, it will carry no segm entry",
                local_id
            );
        }
        self.segments.push(SegmentState {
            local_id,
            id: id.unwrap_or_else(Uuid::new_v4),
            tags: Vec::new(),
            grains_written: 0,
            count_offset: None,
        });
        Ok(SegmentRef(local_id))
    }

    fn add_file_tag(&mut self, key: &str, value: &str) -> Result<()> {
        self.require(Phase::Open)?;
        self.file_tags.push(Tag::new(key, value));
        Ok(())
    }

    fn add_segment_tag(&mut self, segment: SegmentRef, key: &str, value: &str) -> Result<()> {
        self.require(Phase::Open)?;
        let state = self
            .segments
            .iter_mut()
            .find(|s| s.local_id == segment.0)
            .ok_or(GsfError::UnknownLocalId(segment.0))?;
        state.tags.push(Tag::new(key, value));
        Ok(())
    }

    /// Serializes the file header and `head` block, remembering the offset
    /// of every -1 count placeholder.
    fn build_head(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        FileHeader {
            file_type: GSF_FILE_TYPE,
            major_version: GSF_MAJOR_VERSION,
            minor_version: GSF_MINOR_VERSION,
        }
        .write_to(&mut out)?;
        let head_base = out.len() as u64;

        let mut builder = BlockBuilder::new();
        builder.begin(tags::HEAD);
        self.file_id.write_to(&mut builder)?;
        self.created.write_to(&mut builder)?;
        for segment in &mut self.segments {
            builder.begin(tags::SEGM);
            builder.write_u16::<LittleEndian>(segment.local_id)?;
            segment.id.write_to(&mut builder)?;
            segment.count_offset = Some(head_base + builder.len() as u64);
            builder.write_i64::<LittleEndian>(-1)?;
            for tag in &segment.tags {
                builder.begin(tags::TAG);
                tag.write_to(&mut builder)?;
                builder.end()?;
            }
            builder.end()?;
        }
        for tag in &self.file_tags {
            builder.begin(tags::TAG);
            tag.write_to(&mut builder)?;
            builder.end()?;
        }
        builder.end()?;

        out.extend_from_slice(&builder.into_bytes());
        Ok(out)
    }

    /// Serializes one grain as a complete `grai` block.
    fn build_grain(&self, segment: SegmentRef, grain: &Grain) -> Result<Vec<u8>> {
        if self.segment_state(segment.0).is_none() {
            return Err(GsfError::UnknownLocalId(segment.0));
        }
        let data = match &grain.data {
            GrainData::Bytes(bytes) => bytes,
            GrainData::Lazy(_) => {
                return Err(GsfError::ValueOutOfRange(
                    "grain data is an unfetched lazy handle".to_string(),
                ))
            }
        };

        let mut builder = BlockBuilder::new();
        builder.begin(tags::GRAIN);
        builder.write_u16::<LittleEndian>(segment.0)?;
        write_gbhd(&mut builder, grain)?;
        builder.begin(tags::GRDT);
        builder.write_all(data)?;
        builder.end()?;
        builder.end()?;
        Ok(builder.into_bytes())
    }

    fn note_grain_written(&mut self, segment: SegmentRef) {
        if let Some(state) = self.segments.iter_mut().find(|s| s.local_id == segment.0) {
            state.grains_written += 1;
        }
    }

    /// The `(offset, count)` rewrites `end` applies on a patchable sink.
    fn count_patches(&self) -> Result<Vec<(u64, i64)>> {
        let mut patches = Vec::with_capacity(self.segments.len());
        for segment in &self.segments {
            let offset = match segment.count_offset {
                Some(offset) => offset,
                None => continue,
            };
            let count = i64::try_from(segment.grains_written).map_err(|_| {
                GsfError::ValueOutOfRange(format!(
                    "grain count {} exceeds the i64 count field",
                    segment.grains_written
                ))
            })?;
            patches.push((offset, count));
        }
        Ok(patches)
    }

    fn require(&self, phase: Phase) -> Result<()> {
        if self.phase != phase {
            return Err(state_error(phase.as_str(), self.phase));
        }
        Ok(())
    }
}

fn state_error(required: &'static str, actual: Phase) -> GsfError {
    GsfError::EncoderState {
        required,
        actual: actual.as_str(),
    }
}

/// Progressive encoder: declare segments and tags, `start` to emit the file
/// header and `head`, stream grains with `add_grain`, `end` to terminate.
/// On a seekable sink `end` back-patches each declared segment's count;
/// otherwise counts stay -1.
///
/// A write error leaves the encoder failed; every later call reports that
/// state through [`GsfError::EncoderState`].
pub struct GsfEncoder<S: Sink> {
    sink: S,
    core: EncoderCore,
}

impl<W: Write + Seek> GsfEncoder<Seekable<W>> {
    pub fn seekable(writer: W) -> Self {
        Self::new(Seekable(writer))
    }
}

impl<W: Write> GsfEncoder<Streaming<W>> {
    pub fn streaming(writer: W) -> Self {
        Self::new(Streaming(writer))
    }
}

impl<S: Sink> GsfEncoder<S> {
    pub fn new(sink: S) -> Self {
        Self::with_head(sink, Uuid::new_v4(), EncoderCore::now())
    }

    pub fn with_head(sink: S, file_id: Uuid, created: DateTime) -> Self {
        GsfEncoder {
            sink,
            core: EncoderCore::new(file_id, created),
        }
    }

    pub fn file_id(&self) -> Uuid {
        self.core.file_id
    }

    /// Declares a segment with a fresh local id and flow id.
    pub fn add_segment(&mut self) -> Result<SegmentRef> {
        self.core.add_segment(None, None)
    }

    /// Declares a segment. Before `start` the segment is serialized into
    /// `head`; afterwards it is accepted for compatibility but carries no
    /// `segm` entry, and its count is never back-patched.
    pub fn add_segment_with(
        &mut self,
        local_id: Option<u16>,
        id: Option<Uuid>,
    ) -> Result<SegmentRef> {
        self.core.add_segment(local_id, id)
    }

    /// Attaches a file-level tag; only possible before `start`.
    pub fn add_file_tag(&mut self, key: &str, value: &str) -> Result<()> {
        self.core.add_file_tag(key, value)
    }

    /// Attaches a tag to a declared segment; only possible before `start`.
    pub fn add_segment_tag(&mut self, segment: SegmentRef, key: &str, value: &str) -> Result<()> {
        self.core.add_segment_tag(segment, key, value)
    }

    /// Writes the file header and the `head` block.
    pub fn start(&mut self) -> Result<()> {
        self.core.require(Phase::Open)?;
        let head = self.core.build_head()?;
        self.write(&head)?;
        self.core.phase = Phase::Started;
        Ok(())
    }

    /// Serializes one grain as a `grai` block. The grain is written out
    /// immediately and not retained.
    pub fn add_grain(&mut self, segment: SegmentRef, grain: &Grain) -> Result<()> {
        self.core.require(Phase::Started)?;
        let block = self.core.build_grain(segment, grain)?;
        self.write(&block)?;
        self.core.note_grain_written(segment);
        Ok(())
    }

    /// Writes the terminator and, when the sink supports patching, rewrites
    /// each declared segment's count with the number of grains written.
    ///
    /// On an already-failed encoder this still appends a terminator on a
    /// best-effort basis, but reports the failed state.
    pub fn end(&mut self) -> Result<()> {
        if self.core.phase == Phase::Failed {
            let _ = write_terminator(&mut self.sink);
            return Err(state_error("started", Phase::Failed));
        }
        self.core.require(Phase::Started)?;

        let mut terminator = Vec::new();
        write_terminator(&mut terminator)?;
        self.write(&terminator)?;

        for (offset, count) in self.core.count_patches()? {
            match self.sink.patch(offset, &count.to_le_bytes()) {
                Ok(true) => {}
                Ok(false) => {
                    log::debug!("sink cannot patch, segment counts stay -1");
                    break;
                }
                Err(e) => return Err(self.fail(e)),
            }
        }
        if let Err(e) = self.sink.flush() {
            return Err(self.fail(e));
        }
        self.core.phase = Phase::Closed;
        Ok(())
    }

    /// Grains written so far for a segment.
    pub fn grain_count(&self, segment: SegmentRef) -> u64 {
        self.core
            .segment_state(segment.0)
            .map(|s| s.grains_written)
            .unwrap_or(0)
    }

    pub fn into_inner(self) -> S {
        self.sink
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if let Err(e) = self.sink.write_all(bytes) {
            return Err(self.fail(e));
        }
        Ok(())
    }

    fn fail(&mut self, error: std::io::Error) -> GsfError {
        self.core.phase = Phase::Failed;
        GsfError::Io(error)
    }
}

#[cfg(feature = "async")]
pub use r#async::{AsyncGsfEncoder, AsyncSeekable, AsyncSink, AsyncStreaming};

#[cfg(feature = "async")]
mod r#async {
    use super::*;
    use tokio::io::AsyncSeekExt;

    /// Async counterpart of [`Sink`]: whole serialized blocks are written
    /// with suspension at every raw write.
    #[async_trait::async_trait]
    pub trait AsyncSink: Send {
        async fn write_all(&mut self, bytes: &[u8]) -> std::io::Result<()>;
        async fn flush(&mut self) -> std::io::Result<()>;
        async fn patch(&mut self, offset: u64, bytes: &[u8]) -> std::io::Result<bool>;
    }

    pub struct AsyncSeekable<W>(pub W);

    #[async_trait::async_trait]
    impl<W: AsyncWrite + AsyncSeek + Unpin + Send> AsyncSink for AsyncSeekable<W> {
        async fn write_all(&mut self, bytes: &[u8]) -> std::io::Result<()> {
            AsyncWriteExt::write_all(&mut self.0, bytes).await
        }

        async fn flush(&mut self) -> std::io::Result<()> {
            AsyncWriteExt::flush(&mut self.0).await
        }

        async fn patch(&mut self, offset: u64, bytes: &[u8]) -> std::io::Result<bool> {
            let saved = self.0.stream_position().await?;
            self.0.seek(SeekFrom::Start(offset)).await?;
            AsyncWriteExt::write_all(&mut self.0, bytes).await?;
            self.0.seek(SeekFrom::Start(saved)).await?;
            Ok(true)
        }
    }

    pub struct AsyncStreaming<W>(pub W);

    #[async_trait::async_trait]
    impl<W: AsyncWrite + Unpin + Send> AsyncSink for AsyncStreaming<W> {
        async fn write_all(&mut self, bytes: &[u8]) -> std::io::Result<()> {
            AsyncWriteExt::write_all(&mut self.0, bytes).await
        }

        async fn flush(&mut self) -> std::io::Result<()> {
            AsyncWriteExt::flush(&mut self.0).await
        }

        async fn patch(&mut self, _offset: u64, _bytes: &[u8]) -> std::io::Result<bool> {
            Ok(false)
        }
    }

    /// Async twin of [`GsfEncoder`] with the same phases and back-patch
    /// behaviour. Dropping an `add_grain` future mid-flight can leave the
    /// sink partially written; treat the output as invalid.
    pub struct AsyncGsfEncoder<S: AsyncSink> {
        sink: S,
        core: EncoderCore,
    }

    impl<W: AsyncWrite + AsyncSeek + Unpin + Send> AsyncGsfEncoder<AsyncSeekable<W>> {
        pub fn seekable(writer: W) -> Self {
            Self::new(AsyncSeekable(writer))
        }
    }

    impl<W: AsyncWrite + Unpin + Send> AsyncGsfEncoder<AsyncStreaming<W>> {
        pub fn streaming(writer: W) -> Self {
            Self::new(AsyncStreaming(writer))
        }
    }

    impl<S: AsyncSink> AsyncGsfEncoder<S> {
        pub fn new(sink: S) -> Self {
            Self::with_head(sink, Uuid::new_v4(), EncoderCore::now())
        }

        pub fn with_head(sink: S, file_id: Uuid, created: DateTime) -> Self {
            AsyncGsfEncoder {
                sink,
                core: EncoderCore::new(file_id, created),
            }
        }

        pub fn file_id(&self) -> Uuid {
            self.core.file_id
        }

        pub fn add_segment(&mut self) -> Result<SegmentRef> {
            self.core.add_segment(None, None)
        }

        pub fn add_segment_with(
            &mut self,
            local_id: Option<u16>,
            id: Option<Uuid>,
        ) -> Result<SegmentRef> {
            self.core.add_segment(local_id, id)
        }

        pub fn add_file_tag(&mut self, key: &str, value: &str) -> Result<()> {
            self.core.add_file_tag(key, value)
        }

        pub fn add_segment_tag(
            &mut self,
            segment: SegmentRef,
            key: &str,
            value: &str,
        ) -> Result<()> {
            self.core.add_segment_tag(segment, key, value)
        }

        pub async fn start(&mut self) -> Result<()> {
            self.core.require(Phase::Open)?;
            let head = self.core.build_head()?;
            self.write(&head).await?;
            self.core.phase = Phase::Started;
            Ok(())
        }

        pub async fn add_grain(&mut self, segment: SegmentRef, grain: &Grain) -> Result<()> {
            self.core.require(Phase::Started)?;
            let block = self.core.build_grain(segment, grain)?;
            self.write(&block).await?;
            self.core.note_grain_written(segment);
            Ok(())
        }

        pub async fn end(&mut self) -> Result<()> {
            if self.core.phase == Phase::Failed {
                let mut terminator = Vec::new();
                write_terminator(&mut terminator)?;
                let _ = self.sink.write_all(&terminator).await;
                return Err(state_error("started", Phase::Failed));
            }
            self.core.require(Phase::Started)?;

            let mut terminator = Vec::new();
            write_terminator(&mut terminator)?;
            self.write(&terminator).await?;

            for (offset, count) in self.core.count_patches()? {
                match self.sink.patch(offset, &count.to_le_bytes()).await {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => return Err(self.fail(e)),
                }
            }
            if let Err(e) = self.sink.flush().await {
                return Err(self.fail(e));
            }
            self.core.phase = Phase::Closed;
            Ok(())
        }

        pub fn grain_count(&self, segment: SegmentRef) -> u64 {
            self.core
                .segment_state(segment.local_id())
                .map(|s| s.grains_written)
                .unwrap_or(0)
        }

        pub fn into_inner(self) -> S {
            self.sink
        }

        async fn write(&mut self, bytes: &[u8]) -> Result<()> {
            if let Err(e) = self.sink.write_all(bytes).await {
                return Err(self.fail(e));
            }
            Ok(())
        }

        fn fail(&mut self, error: std::io::Error) -> GsfError {
            self.core.phase = Phase::Failed;
            GsfError::Io(error)
        }
    }
}
