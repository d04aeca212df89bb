use std::io::{Read, Seek, SeekFrom};

/// Wraps a forward-only reader (socket, pipe) in a `Seek` implementation
/// that satisfies the decoder: forward seeks discard bytes, rewinds fail
/// with `Unsupported`. Lazy data handles therefore cannot be fetched from a
/// wrapped source, while streaming decode works unchanged.
pub struct ReadOnlySource<R: Read> {
    inner: R,
    pos: u64,
}

impl<R: Read> ReadOnlySource<R> {
    pub fn new(inner: R) -> Self {
        ReadOnlySource { inner, pos: 0 }
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for ReadOnlySource<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl<R: Read> Seek for ReadOnlySource<R> {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let target = match pos {
            SeekFrom::Current(n) if n >= 0 => self.pos + n as u64,
            SeekFrom::Start(p) if p >= self.pos => p,
            _ => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::Unsupported,
                    "source does not support seeking backwards",
                ))
            }
        };
        let mut remaining = target - self.pos;
        while remaining > 0 {
            let discarded = std::io::copy(
                &mut self.inner.by_ref().take(remaining),
                &mut std::io::sink(),
            )?;
            if discarded == 0 {
                return Err(std::io::ErrorKind::UnexpectedEof.into());
            }
            remaining -= discarded;
        }
        self.pos = target;
        Ok(self.pos)
    }
}

#[cfg(feature = "async")]
pub use r#async::AsyncReadOnlySource;

#[cfg(feature = "async")]
mod r#async {
    use std::io::SeekFrom;
    use std::pin::Pin;
    use std::task::{ready, Context, Poll};
    use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};

    /// Async twin of [`super::ReadOnlySource`]: forward seeks resolve by
    /// discarding bytes inside `poll_complete`, rewinds fail.
    pub struct AsyncReadOnlySource<R> {
        inner: R,
        pos: u64,
        pending: u64,
    }

    impl<R: AsyncRead + Unpin> AsyncReadOnlySource<R> {
        pub fn new(inner: R) -> Self {
            AsyncReadOnlySource {
                inner,
                pos: 0,
                pending: 0,
            }
        }

        pub fn into_inner(self) -> R {
            self.inner
        }
    }

    impl<R: AsyncRead + Unpin> AsyncRead for AsyncReadOnlySource<R> {
        fn poll_read(
            self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            let this = self.get_mut();
            let before = buf.filled().len();
            ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;
            this.pos += (buf.filled().len() - before) as u64;
            Poll::Ready(Ok(()))
        }
    }

    impl<R: AsyncRead + Unpin> AsyncSeek for AsyncReadOnlySource<R> {
        fn start_seek(self: Pin<&mut Self>, position: SeekFrom) -> std::io::Result<()> {
            let this = self.get_mut();
            let target = match position {
                SeekFrom::Current(n) if n >= 0 => this.pos + n as u64,
                SeekFrom::Start(p) if p >= this.pos => p,
                _ => {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::Unsupported,
                        "source does not support seeking backwards",
                    ))
                }
            };
            this.pending = target - this.pos;
            Ok(())
        }

        fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<u64>> {
            let this = self.get_mut();
            while this.pending > 0 {
                let mut chunk = [0u8; 8192];
                let want = this.pending.min(chunk.len() as u64) as usize;
                let mut buf = ReadBuf::new(&mut chunk[..want]);
                ready!(Pin::new(&mut this.inner).poll_read(cx, &mut buf))?;
                let got = buf.filled().len();
                if got == 0 {
                    return Poll::Ready(Err(std::io::ErrorKind::UnexpectedEof.into()));
                }
                this.pending -= got as u64;
                this.pos += got as u64;
            }
            Poll::Ready(Ok(this.pos))
        }
    }
}
