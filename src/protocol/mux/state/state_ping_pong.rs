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

use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite};

use crate::frame::{Frame, Ping};
use crate::protocol::{codec::Codec, ProtResult};

pub struct StatePingPong {
    ping: Option<Ping>,
    ping_now: bool,
}

impl StatePingPong {
    pub fn new() -> Self {
        StatePingPong {
            ping: None,
            ping_now: false,
        }
    }

    pub fn receive(&mut self, ping: Ping) {
        self.ping = Some(ping);
    }

    /// 保活定时器到期, 下次写入时发出一个PING
    pub fn queue_ping(&mut self) {
        self.ping_now = true;
    }

    pub fn poll_handle<T>(
        &mut self,
        cx: &mut Context<'_>,
        codec: &mut Codec<T>,
    ) -> Poll<ProtResult<()>>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        if let Some(frame) = self.ping.take() {
            if !codec.poll_ready(cx)?.is_ready() {
                self.ping = Some(frame);
                return Poll::Pending;
            }

            let pong = frame.ret_pong();
            codec.send_frame(Frame::Ping(pong))?;
        }
        if self.ping_now {
            if !codec.poll_ready(cx)?.is_ready() {
                return Poll::Pending;
            }
            self.ping_now = false;
            codec.send_frame(Frame::Ping(Ping::rand()))?;
        }
        Poll::Ready(Ok(()))
    }
}
