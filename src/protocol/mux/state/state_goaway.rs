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

use crate::frame::{Frame, GoAway, Reason};
use crate::protocol::{codec::Codec, ProtResult};

pub struct StateGoAway {
    close_now: bool,
    goaway: Option<GoAway>,
    sent: Option<Reason>,
}

impl StateGoAway {
    pub fn new() -> Self {
        StateGoAway {
            close_now: false,
            goaway: None,
            sent: None,
        }
    }

    pub fn poll_handle<T>(
        &mut self,
        cx: &mut Context<'_>,
        codec: &mut Codec<T>,
    ) -> Poll<Option<ProtResult<Reason>>>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        if let Some(frame) = self.goaway.take() {
            if !codec.poll_ready(cx)?.is_ready() {
                self.goaway = Some(frame);
                return Poll::Pending;
            }

            let reason = frame.reason();
            codec.send_frame(Frame::GoAway(frame))?;
            self.sent = Some(reason);
            return Poll::Ready(Some(Ok(reason)));
        }
        Poll::Ready(None)
    }

    pub fn go_away_now(&mut self, frame: GoAway) {
        // 只记录第一个关闭原因
        if self.close_now {
            return;
        }
        self.close_now = true;
        self.goaway = Some(frame);
    }

    /// 本端CLOSE已写入编码器
    pub fn is_sent(&self) -> bool {
        self.sent.is_some()
    }
}
