//! Length-prefixed framing over a byte stream.
//!
//! Wire format (plain layout):
//!
//! ```text
//! ┌──────────────────┬──────────────────────────┐
//! │ len: u32 LE      │ payload (len bytes)       │
//! └──────────────────┴──────────────────────────┘
//! ```
//!
//! Checksummed layout (`enable_checksum`):
//!
//! ```text
//! ┌──────────────┬──────────────┬─────────────────┬──────────────┐
//! │ data_len u32 │ cksum_len u32│ checksum bytes  │ data bytes   │
//! └──────────────┴──────────────┴─────────────────┴──────────────┘
//! ```
//!
//! The framer only splits bytes. It never looks inside a payload and never
//! verifies checksums; see [`crate::checksum`] for that.
//!
//! Reads go through an internal buffer, which makes [`Framer::next_frame`]
//! cancel-safe: a timeout or `select!` branch losing the race never drops
//! bytes that were already received, so frames cannot interleave.

use qf_core::error::{FeedError, ProtocolError};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use crate::checksum;

/// Bytes requested from the socket per read call.
const READ_CHUNK: usize = 64 * 1024;

/// Frame header layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameLayout {
    /// `<u32 len><payload>`
    Plain,
    /// `<u32 data_len><u32 checksum_len><checksum><data>`
    Checksummed,
}

impl FrameLayout {
    pub fn from_flag(enable_checksum: bool) -> Self {
        if enable_checksum { Self::Checksummed } else { Self::Plain }
    }

    fn header_len(self) -> usize {
        match self {
            Self::Plain => 4,
            Self::Checksummed => 8,
        }
    }
}

/// One frame as it came off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub data: Vec<u8>,
    /// Present only for the checksummed layout.
    pub checksum: Option<Vec<u8>>,
}

/// Splits a byte stream into [`RawFrame`]s.
pub struct Framer<R> {
    reader: R,
    buf: Vec<u8>,
    /// Start of the unconsumed bytes in `buf`.
    pos: usize,
    chunk: Vec<u8>,
    layout: FrameLayout,
    max_frame_bytes: usize,
}

impl<R: AsyncRead + Unpin> Framer<R> {
    pub fn new(reader: R, layout: FrameLayout, max_frame_bytes: usize) -> Self {
        Self {
            reader,
            buf: Vec::with_capacity(READ_CHUNK),
            pos: 0,
            chunk: vec![0u8; READ_CHUNK],
            layout,
            max_frame_bytes,
        }
    }

    /// Wait for the next complete frame.
    ///
    /// Returns `Ok(None)` on EOF, including EOF in the middle of a frame.
    /// An oversize length header fails as soon as the header is complete,
    /// before any of the body is read.
    pub async fn next_frame(&mut self) -> Result<Option<RawFrame>, FeedError> {
        loop {
            if let Some((frame, consumed)) =
                split_frame(&self.buf[self.pos..], self.layout, self.max_frame_bytes)?
            {
                self.pos += consumed;
                return Ok(Some(frame));
            }

            // Compact once per refill, not once per frame.
            if self.pos > 0 {
                self.buf.drain(..self.pos);
                self.pos = 0;
            }
            let n = self.reader.read(&mut self.chunk).await?;
            if n == 0 {
                if !self.buf.is_empty() {
                    debug!("EOF with {} buffered bytes of an incomplete frame", self.buf.len());
                }
                return Ok(None);
            }
            self.buf.extend_from_slice(&self.chunk[..n]);
        }
    }

    /// `true` when some bytes of a not-yet-complete frame are buffered.
    pub fn has_partial(&self) -> bool {
        self.buf.len() > self.pos
    }
}

/// Try to take one complete frame off the front of `buf`.
///
/// Returns `Ok(None)` if more bytes are needed.
pub fn decode_frame(
    buf: &mut Vec<u8>,
    layout: FrameLayout,
    max_frame_bytes: usize,
) -> Result<Option<RawFrame>, ProtocolError> {
    let Some((frame, consumed)) = split_frame(buf, layout, max_frame_bytes)? else {
        return Ok(None);
    };
    buf.drain(..consumed);
    Ok(Some(frame))
}

/// Parse one complete frame at the start of `buf` without consuming it.
///
/// Returns the frame and the number of bytes it occupies.
pub fn split_frame(
    buf: &[u8],
    layout: FrameLayout,
    max_frame_bytes: usize,
) -> Result<Option<(RawFrame, usize)>, ProtocolError> {
    let header_len = layout.header_len();
    if buf.len() < header_len {
        return Ok(None);
    }

    let data_len = read_u32_le(&buf[0..4]);
    check_len(data_len, max_frame_bytes)?;
    let checksum_len = match layout {
        FrameLayout::Plain => 0,
        FrameLayout::Checksummed => {
            let n = read_u32_le(&buf[4..8]);
            check_len(n, max_frame_bytes)?;
            n
        }
    };

    let total = header_len + checksum_len + data_len;
    if buf.len() < total {
        return Ok(None);
    }

    let frame = match layout {
        FrameLayout::Plain => RawFrame { data: buf[header_len..total].to_vec(), checksum: None },
        FrameLayout::Checksummed => {
            let ck_end = header_len + checksum_len;
            RawFrame {
                checksum: Some(buf[header_len..ck_end].to_vec()),
                data: buf[ck_end..total].to_vec(),
            }
        }
    };
    Ok(Some((frame, total)))
}

/// Encode `data` as one frame in the given layout.
pub fn encode_frame(data: &[u8], layout: FrameLayout) -> Vec<u8> {
    match layout {
        FrameLayout::Plain => {
            let mut out = Vec::with_capacity(4 + data.len());
            out.extend_from_slice(&(data.len() as u32).to_le_bytes());
            out.extend_from_slice(data);
            out
        }
        FrameLayout::Checksummed => {
            let ck = checksum::checksum_of(data);
            let mut out = Vec::with_capacity(8 + ck.len() + data.len());
            out.extend_from_slice(&(data.len() as u32).to_le_bytes());
            out.extend_from_slice(&(ck.len() as u32).to_le_bytes());
            out.extend_from_slice(&ck);
            out.extend_from_slice(data);
            out
        }
    }
}

#[inline]
fn read_u32_le(b: &[u8]) -> usize {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize
}

#[inline]
fn check_len(len: usize, max: usize) -> Result<(), ProtocolError> {
    if len > max {
        Err(ProtocolError::FrameTooLarge { len, max })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn decode_waits_for_full_header_and_body() {
        let mut buf = vec![5, 0, 0];
        assert_eq!(decode_frame(&mut buf, FrameLayout::Plain, 16).unwrap(), None);
        buf.extend_from_slice(&[0, b'h', b'e']);
        assert_eq!(decode_frame(&mut buf, FrameLayout::Plain, 16).unwrap(), None);
        buf.extend_from_slice(b"llo");
        let f = decode_frame(&mut buf, FrameLayout::Plain, 16).unwrap().unwrap();
        assert_eq!(f.data, b"hello");
        assert!(buf.is_empty());
    }

    #[test]
    fn zero_length_frame_is_legal() {
        let mut buf = encode_frame(b"", FrameLayout::Plain);
        buf.extend(encode_frame(b"x", FrameLayout::Plain));
        let f = decode_frame(&mut buf, FrameLayout::Plain, 16).unwrap().unwrap();
        assert!(f.data.is_empty());
        let f = decode_frame(&mut buf, FrameLayout::Plain, 16).unwrap().unwrap();
        assert_eq!(f.data, b"x");
    }

    #[test]
    fn length_at_ceiling_is_accepted_and_one_above_is_not() {
        let max = 32;
        let mut buf = encode_frame(&[b'a'; 32], FrameLayout::Plain);
        let f = decode_frame(&mut buf, FrameLayout::Plain, max).unwrap().unwrap();
        assert_eq!(f.data.len(), 32);

        let mut buf = 33u32.to_le_bytes().to_vec();
        let err = decode_frame(&mut buf, FrameLayout::Plain, max).unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooLarge { len: 33, max: 32 }));
    }

    #[test]
    fn checksummed_layout_splits_checksum_and_data() {
        let mut buf = encode_frame(b"payload", FrameLayout::Checksummed);
        let f = decode_frame(&mut buf, FrameLayout::Checksummed, 1024).unwrap().unwrap();
        assert_eq!(f.data, b"payload");
        assert_eq!(f.checksum.as_deref(), Some(&checksum::checksum_of(b"payload")[..]));
        assert!(buf.is_empty());
    }

    #[test]
    fn checksummed_layout_bounds_checksum_length_too() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&1u32.to_le_bytes());
        buf.extend_from_slice(&4096u32.to_le_bytes());
        assert!(decode_frame(&mut buf, FrameLayout::Checksummed, 1024).is_err());
    }

    #[tokio::test]
    async fn framer_reassembles_split_writes_and_reports_eof() {
        let (mut tx, rx) = tokio::io::duplex(64);
        let mut framer = Framer::new(rx, FrameLayout::Plain, 1024);

        let bytes = [encode_frame(b"first", FrameLayout::Plain), encode_frame(b"second", FrameLayout::Plain)].concat();
        tokio::spawn(async move {
            for chunk in bytes.chunks(3) {
                tx.write_all(chunk).await.unwrap();
                tokio::task::yield_now().await;
            }
        });

        assert_eq!(framer.next_frame().await.unwrap().unwrap().data, b"first");
        assert_eq!(framer.next_frame().await.unwrap().unwrap().data, b"second");
        assert!(framer.next_frame().await.unwrap().is_none());
    }

    #[test]
    fn split_frame_reports_consumed_bytes_without_touching_buffer() {
        let buf = [encode_frame(b"ab", FrameLayout::Plain), encode_frame(b"cde", FrameLayout::Plain)].concat();
        let (f, used) = split_frame(&buf, FrameLayout::Plain, 16).unwrap().unwrap();
        assert_eq!((f.data.as_slice(), used), (&b"ab"[..], 6));
        let (f, used) = split_frame(&buf[used..], FrameLayout::Plain, 16).unwrap().unwrap();
        assert_eq!((f.data.as_slice(), used), (&b"cde"[..], 7));
        assert_eq!(buf.len(), 13);
    }

    #[tokio::test]
    async fn many_small_frames_in_one_chunk_compact_once() {
        let count = 2_000;
        let bytes: Vec<u8> =
            (0..count).flat_map(|i| encode_frame(format!("f{i}").as_bytes(), FrameLayout::Plain)).collect();
        let (mut tx, rx) = tokio::io::duplex(bytes.len() + 16);
        tx.write_all(&bytes).await.unwrap();
        drop(tx);

        let mut framer = Framer::new(rx, FrameLayout::Plain, 64);
        for i in 0..count {
            let f = framer.next_frame().await.unwrap().unwrap();
            assert_eq!(f.data, format!("f{i}").as_bytes());
            // Decoded frames only advance the offset; the buffer is not shifted.
            assert!(framer.pos > 0);
        }
        assert!(!framer.has_partial());
        assert!(framer.next_frame().await.unwrap().is_none());
        assert_eq!((framer.pos, framer.buf.len()), (0, 0));
    }

    #[tokio::test]
    async fn eof_mid_frame_is_eof_not_error() {
        let (mut tx, rx) = tokio::io::duplex(64);
        let mut framer = Framer::new(rx, FrameLayout::Plain, 1024);
        tx.write_all(&[10, 0, 0, 0, b'a', b'b']).await.unwrap();
        drop(tx);
        assert!(framer.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cancelled_read_keeps_partial_bytes() {
        let (mut tx, rx) = tokio::io::duplex(64);
        let mut framer = Framer::new(rx, FrameLayout::Plain, 1024);
        let frame = encode_frame(b"abcdef", FrameLayout::Plain);

        tx.write_all(&frame[..5]).await.unwrap();
        let r = tokio::time::timeout(std::time::Duration::from_millis(20), framer.next_frame()).await;
        assert!(r.is_err());
        assert!(framer.has_partial());

        tx.write_all(&frame[5..]).await.unwrap();
        assert_eq!(framer.next_frame().await.unwrap().unwrap().data, b"abcdef");
        assert!(!framer.has_partial());
    }
}
