//! Multipart message codec
//!
//! Each part travels as a one-byte flags field, a 4-byte big-endian length
//! and the payload. Flag bit 0 marks "more parts follow", so a message with
//! N parts arrives and departs as exactly N parts. A message always has at
//! least one part.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// An ordered multipart message.
pub type Message = Vec<Vec<u8>>;

const FLAG_MORE: u8 = 0x01;

/// Upper bound on a single part, guarding against corrupt length prefixes.
const MAX_PART_LEN: usize = 64 * 1024 * 1024;

pub async fn write_message<W>(writer: &mut W, parts: &[Vec<u8>]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    debug_assert!(!parts.is_empty());

    for (i, part) in parts.iter().enumerate() {
        let flags = if i + 1 < parts.len() { FLAG_MORE } else { 0 };
        writer.write_u8(flags).await?;
        writer.write_u32(part.len() as u32).await?;
        writer.write_all(part).await?;
    }

    writer.flush().await
}

pub async fn read_message<R>(reader: &mut R) -> std::io::Result<Message>
where
    R: AsyncRead + Unpin,
{
    let mut parts = Vec::new();

    loop {
        let flags = reader.read_u8().await?;
        let len = reader.read_u32().await? as usize;

        if len > MAX_PART_LEN {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("frame part length {len} exceeds limit"),
            ));
        }

        let mut part = vec![0u8; len];
        reader.read_exact(&mut part).await?;
        parts.push(part);

        if flags & FLAG_MORE == 0 {
            break;
        }
    }

    Ok(parts)
}

/// Try to decode one complete message from the front of `buf`.
///
/// Returns the message and the number of bytes it occupied, or `None` when
/// the buffer does not yet hold every part. Never consumes `buf`; the caller
/// drains the reported length once it has taken the message.
pub fn decode_message(buf: &[u8]) -> std::io::Result<Option<(Message, usize)>> {
    let mut parts = Vec::new();
    let mut pos = 0usize;

    loop {
        if buf.len() < pos + 5 {
            return Ok(None);
        }

        let flags = buf[pos];
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&buf[pos + 1..pos + 5]);
        let len = u32::from_be_bytes(len_bytes) as usize;

        if len > MAX_PART_LEN {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("frame part length {len} exceeds limit"),
            ));
        }

        if buf.len() < pos + 5 + len {
            return Ok(None);
        }

        parts.push(buf[pos + 5..pos + 5 + len].to_vec());
        pos += 5 + len;

        if flags & FLAG_MORE == 0 {
            return Ok(Some((parts, pos)));
        }
    }
}
