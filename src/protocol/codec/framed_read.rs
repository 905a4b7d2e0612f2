use std::pin::Pin;
use std::task::{ready, Poll};

use futures_core::Stream;
use tokio::io::AsyncRead;
use tokio_util::codec::{FramedRead as InnerFramedRead, LengthDelimitedCodec};

use crate::frame::Frame;
use crate::protocol::ProtResult;

#[derive(Debug)]
pub struct FramedRead<T> {
    inner: InnerFramedRead<T, LengthDelimitedCodec>,
}

impl<T> FramedRead<T> {
    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }
}

impl<T> FramedRead<T>
where
    T: AsyncRead + Unpin,
{
    pub fn new(delimited: InnerFramedRead<T, LengthDelimitedCodec>) -> FramedRead<T> {
        FramedRead { inner: delimited }
    }
}

impl<T> Stream for FramedRead<T>
where
    T: AsyncRead + Unpin,
{
    type Item = ProtResult<Frame>;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        let bytes = match ready!(Pin::new(&mut self.inner).poll_next(cx)) {
            Some(Ok(bytes)) => bytes,
            Some(Err(e)) => return Poll::Ready(Some(Err(e.into()))),
            None => return Poll::Ready(None),
        };

        let frame = Frame::parse(bytes)?;
        tracing::trace!("received frame = {:?}", frame);
        Poll::Ready(Some(Ok(frame)))
    }
}
