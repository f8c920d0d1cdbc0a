use std::io::{self, Cursor};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

/// In-memory feed replaying a fixed byte buffer, then EOF.
///
/// Reads are capped at `chunk` bytes to exercise partial-line handling.
pub struct FakeBuffer {
    data: Cursor<Vec<u8>>,
    chunk: usize,
}

impl FakeBuffer {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data: Cursor::new(data),
            chunk: 7,
        }
    }
}

impl AsyncRead for FakeBuffer {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let pos = self.data.position() as usize;
        let remaining = &self.data.get_ref()[pos..];
        let n = remaining.len().min(buf.remaining()).min(self.chunk);
        buf.put_slice(&remaining[..n]);
        self.data.set_position((pos + n) as u64);
        Poll::Ready(Ok(()))
    }
}
