//! Length-prefixed framing for byte-stream transports
//!
//! Each frame is a 4-byte big-endian unsigned length followed by exactly that
//! many bytes of UTF-8 payload. No other envelope bytes exist.
//!
//! [`decode_frame`] never consumes a partial frame: when fewer bytes than the
//! declared length are available it returns [`FrameDecode::Incomplete`] and
//! the caller keeps buffering. [`FrameCodec`] wraps the same rules in a
//! `tokio_util` codec for use with `FramedRead` / `FramedWrite`.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProbeError;

/// Size of the length header in bytes.
pub const HEADER_LEN: usize = 4;

/// Largest payload the framed codec accepts (16 MiB).
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Outcome of decoding from the front of a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameDecode {
    /// A full frame was present.
    Complete {
        /// The UTF-8 payload.
        payload: String,
        /// Header plus payload bytes; slice this many off the buffer.
        consumed: usize,
    },
    /// Not enough bytes yet. Nothing was consumed.
    Incomplete,
}

/// Encode `payload` as one frame.
///
/// # Examples
///
/// ```
/// use mcp_probe::mcp::transport::framing::encode_frame;
///
/// let frame = encode_frame("hi").unwrap();
/// assert_eq!(frame, vec![0, 0, 0, 2, b'h', b'i']);
/// ```
pub fn encode_frame(payload: &str) -> Result<Vec<u8>, ProbeError> {
    let len = u32::try_from(payload.len())
        .map_err(|_| ProbeError::Frame(format!("payload of {} bytes exceeds u32", payload.len())))?;
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(payload.as_bytes());
    Ok(out)
}

/// Decode one frame from the start of `buf`.
///
/// Returns an error only when a complete payload is not valid UTF-8.
pub fn decode_frame(buf: &[u8]) -> Result<FrameDecode, ProbeError> {
    let Some(header) = buf.get(..HEADER_LEN) else {
        return Ok(FrameDecode::Incomplete);
    };
    let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
    let Some(body) = buf.get(HEADER_LEN..HEADER_LEN + len) else {
        return Ok(FrameDecode::Incomplete);
    };
    let payload = std::str::from_utf8(body)
        .map_err(|e| ProbeError::Frame(format!("payload is not valid UTF-8: {}", e)))?;
    Ok(FrameDecode::Complete {
        payload: payload.to_string(),
        consumed: HEADER_LEN + len,
    })
}

/// `tokio_util` codec producing and consuming whole frames as `String`s.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_len: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self {
            max_frame_len: MAX_FRAME_LEN,
        }
    }
}

impl FrameCodec {
    /// Codec with the default 16 MiB limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Codec with a custom payload size limit.
    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self { max_frame_len }
    }
}

impl Decoder for FrameCodec {
    type Item = String;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, Self::Error> {
        if src.len() >= HEADER_LEN {
            let declared = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
            if declared > self.max_frame_len {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    ProbeError::Frame(format!(
                        "frame of {} bytes exceeds limit of {}",
                        declared, self.max_frame_len
                    )),
                ));
            }
            // Reserve up front so a large frame is read without repeated growth.
            src.reserve((HEADER_LEN + declared).saturating_sub(src.len()));
        }

        match decode_frame(src)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?
        {
            FrameDecode::Complete { payload, consumed } => {
                src.advance(consumed);
                Ok(Some(payload))
            }
            FrameDecode::Incomplete => Ok(None),
        }
    }
}

impl Encoder<String> for FrameCodec {
    type Error = std::io::Error;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.len() > self.max_frame_len {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                ProbeError::Frame(format!(
                    "frame of {} bytes exceeds limit of {}",
                    item.len(),
                    self.max_frame_len
                )),
            ));
        }
        dst.reserve(HEADER_LEN + item.len());
        dst.put_u32(item.len() as u32);
        dst.put_slice(item.as_bytes());
        Ok(())
    }
}
