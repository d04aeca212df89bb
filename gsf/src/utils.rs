use crate::prelude::*;
use std::io::Read;

pub(crate) fn take<R: Read>(reader: &mut R, len: usize) -> std::io::Result<Vec<u8>> {
    let mut r = vec![0u8; len];
    reader.read_exact(&mut r)?;
    Ok(r)
}

#[cfg(feature = "async")]
pub(crate) async fn take_async<R: AsyncRead + Unpin>(
    reader: &mut R,
    len: usize,
) -> std::io::Result<Vec<u8>> {
    let mut r = vec![0u8; len];
    reader.read_exact(&mut r).await?;
    Ok(r)
}

pub(crate) fn skip<R: Read>(reader: &mut R, len: u64) -> std::io::Result<u64> {
    let copied = std::io::copy(&mut reader.take(len), &mut std::io::sink())?;
    if copied < len {
        return Err(std::io::ErrorKind::UnexpectedEof.into());
    }
    Ok(copied)
}

#[cfg(feature = "async")]
pub(crate) async fn skip_async<R: AsyncRead + Unpin>(
    reader: &mut R,
    len: u64,
) -> std::io::Result<u64> {
    let copied = tokio::io::copy(&mut reader.take(len), &mut tokio::io::sink()).await?;
    if copied < len {
        return Err(std::io::ErrorKind::UnexpectedEof.into());
    }
    Ok(copied)
}

/// Reads a fixed-size string slot, ending at the first NUL or the slot end.
pub(crate) fn take_fixed_string<R: Read>(reader: &mut R, len: usize) -> Result<String> {
    let raw = take(reader, len)?;
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    Ok(String::from_utf8_lossy(&raw[..end]).to_string())
}

#[cfg(feature = "async")]
pub(crate) async fn take_fixed_string_async<R: AsyncRead + Unpin>(
    reader: &mut R,
    len: usize,
) -> Result<String> {
    let raw = take_async(reader, len).await?;
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    Ok(String::from_utf8_lossy(&raw[..end]).to_string())
}

pub(crate) fn write_fixed_string<W: std::io::Write>(
    writer: &mut W,
    s: &str,
    len: usize,
) -> Result<()> {
    let bytes = s.as_bytes();
    if bytes.len() > len {
        return Err(crate::error::GsfError::ValueOutOfRange(format!(
            "string {:?} does not fit a {} octet slot",
            s, len
        )));
    }
    let mut slot = vec![0u8; len];
    slot[..bytes.len()].copy_from_slice(bytes);
    writer.write_all(&slot)?;
    Ok(())
}

#[cfg(feature = "async")]
pub(crate) async fn read_u48_le_async<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> std::io::Result<u64> {
    use byteorder::ByteOrder;

    let mut buf = [0; 6];
    reader.read_exact(&mut buf).await?;
    Ok(byteorder::LittleEndian::read_u48(&buf))
}
