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

use crate::frame::{Frame, Settings};
use crate::protocol::mux::control::ControlConfig;
use crate::protocol::{codec::Codec, ProtResult};

/// 握手参数交换: 双方各自通告一份Settings并确认对方的,
/// 两个方向都完成后协商值固定, 此后不再重新协商
pub struct StateSettings {
    state: LocalState,
    remote: Option<Settings>,
    remote_done: bool,
}

#[derive(PartialEq, Eq)]
enum LocalState {
    /// 设置发送的settings
    Send(Settings),
    /// 设置等待确认settings
    WaitAck,
    /// 发送并收到了设置
    Done,
}

impl StateSettings {
    pub fn new(settings: Settings) -> Self {
        StateSettings {
            state: LocalState::Send(settings),
            remote: None,
            remote_done: false,
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == LocalState::Done && self.remote_done
    }

    /// 推进握手: 发出本端settings, 对收到的对端settings回ACK.
    /// 返回Ready(true)表示两个方向都已完成
    pub fn poll_handle<T>(
        &mut self,
        cx: &mut Context<'_>,
        codec: &mut Codec<T>,
        config: &mut ControlConfig,
    ) -> Poll<ProtResult<bool>>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        if let LocalState::Send(settings) = &self.state {
            if !codec.poll_ready(cx)?.is_ready() {
                return Poll::Pending;
            }
            codec.send_frame(Frame::Settings(settings.clone()))?;
            self.state = LocalState::WaitAck;
        }

        if let Some(settings) = self.remote.take() {
            if !codec.poll_ready(cx)?.is_ready() {
                self.remote = Some(settings);
                return Poll::Pending;
            }
            codec.send_frame(Frame::Settings(Settings::ack()))?;
            config.apply_remote_settings(&settings);
            self.remote_done = true;
        }

        if !codec.poll_flush(cx)?.is_ready() {
            return Poll::Pending;
        }
        Poll::Ready(Ok(self.is_done()))
    }

    /// 收到一帧Settings, ACK表示本端通告已被对端确认
    pub fn recv_setting(&mut self, setting: Settings) -> ProtResult<()> {
        if setting.is_ack() {
            self.state = LocalState::Done;
        } else {
            self.remote = Some(setting);
        }
        Ok(())
    }
}
