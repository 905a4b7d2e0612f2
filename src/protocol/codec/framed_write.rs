// Copyright 2023 - 2024 Muxstream See the COPYRIGHT
// file at the top-level directory of this distribution.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.
//
// Author: tickbh
// -----
// Created Date: 2024/01/17 09:42:25

use std::{
    io,
    pin::Pin,
    task::{ready, Context, Poll},
};

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::frame::DEFAULT_MAX_FRAME_SIZE;

#[derive(Debug)]
pub struct FramedWrite<T> {
    /// Upstream `AsyncWrite`
    inner: T,

    buf: BytesMut,

    max_frame_size: u32,
}

impl<T> FramedWrite<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(io: T) -> Self {
        Self {
            inner: io,
            buf: BytesMut::new(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    pub fn into_io(self) -> T {
        self.inner
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    pub fn get_mut_bytes(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    /// 写缓存超过一个最大帧则先落盘, 否则允许继续编码
    pub fn has_capacity(&self) -> bool {
        self.buf.remaining() < self.max_frame_size as usize
    }

    pub fn poll_ready(&mut self, cx: &mut Context) -> Poll<io::Result<()>> {
        if !self.has_capacity() {
            // Try flushing
            ready!(self.flush(cx))?;

            if !self.has_capacity() {
                return Poll::Pending;
            }
        }

        Poll::Ready(Ok(()))
    }

    pub fn flush(&mut self, cx: &mut Context) -> Poll<io::Result<()>> {
        let span = tracing::trace_span!("FramedWrite::flush");
        let _e = span.enter();
        while self.buf.has_remaining() {
            let n = ready!(Pin::new(&mut self.inner).poll_write(cx, self.buf.chunk()))?;
            if n == 0 {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "transport closed while flushing frame",
                )));
            }
            self.buf.advance(n);
        }
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    pub fn shutdown(&mut self, cx: &mut Context) -> Poll<io::Result<()>> {
        ready!(self.flush(cx))?;
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }

    pub fn is_write_end(&self) -> bool {
        self.buf.is_empty()
    }

    /// 丢弃未落盘的数据, 仅供不等待对端的断开路径使用
    pub fn abort_pending_write(&mut self) {
        self.buf.clear();
    }
}

impl<T: AsyncRead + Unpin> AsyncRead for FramedWrite<T> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}
