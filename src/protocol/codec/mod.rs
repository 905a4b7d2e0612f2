mod framed_read;
mod framed_write;

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::length_delimited;

use crate::frame::{Frame, DEFAULT_MAX_FRAME_SIZE, FRAME_HEADER_LEN, MAX_MAX_FRAME_SIZE};
use crate::ProtResult;

pub use self::framed_read::FramedRead;
pub use self::framed_write::FramedWrite;

#[derive(Debug)]
pub struct Codec<T> {
    inner: FramedRead<FramedWrite<T>>,
    max_send_frame_size: usize,
}

impl<T> Codec<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Returns a new `Codec` with the default max frame size
    #[inline]
    pub fn new(io: T) -> Self {
        // Wrap with writer
        let framed_write = FramedWrite::new(io);

        // Delimit the frames
        let delimited = length_delimited::Builder::new()
            .big_endian()
            .length_field_length(3)
            .length_adjustment(FRAME_HEADER_LEN as isize)
            .num_skip(0) // Don't skip the header
            .max_frame_length(MAX_MAX_FRAME_SIZE as usize + FRAME_HEADER_LEN)
            .new_read(framed_write);

        let inner = FramedRead::new(delimited);

        Codec {
            inner,
            max_send_frame_size: DEFAULT_MAX_FRAME_SIZE as usize,
        }
    }

    pub fn get_reader(&mut self) -> &mut FramedRead<FramedWrite<T>> {
        &mut self.inner
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut().get_mut()
    }

    /// Returns `Ready` when the codec can buffer a frame
    pub fn poll_ready(&mut self, cx: &mut Context) -> Poll<io::Result<()>> {
        self.framed_write().poll_ready(cx)
    }

    pub fn poll_flush(&mut self, cx: &mut Context) -> Poll<io::Result<()>> {
        self.framed_write().flush(cx)
    }

    fn framed_write(&mut self) -> &mut FramedWrite<T> {
        self.inner.get_mut()
    }

    pub fn send_frame(&mut self, frame: Frame) -> ProtResult<()> {
        tracing::trace!("发送帧数据: {:?}", frame);
        frame.encode(self.framed_write().get_mut_bytes());
        Ok(())
    }

    pub fn max_send_frame_size(&self) -> usize {
        self.max_send_frame_size
    }

    pub fn set_max_send_frame_size(&mut self, size: usize) {
        self.max_send_frame_size = size;
    }

    pub fn is_write_end(&mut self) -> bool {
        self.framed_write().is_write_end()
    }

    pub fn abort_pending_write(&mut self) {
        self.framed_write().abort_pending_write();
    }

    pub fn shutdown(&mut self, cx: &mut Context) -> Poll<io::Result<()>> {
        self.framed_write().shutdown(cx)
    }
}

impl<T> Stream for Codec<T>
where
    T: AsyncRead + Unpin,
{
    type Item = ProtResult<Frame>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
