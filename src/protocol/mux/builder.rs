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

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::frame::{
    Role, Settings, DEFAULT_INITIAL_WINDOW_SIZE, DEFAULT_MAX_FRAME_SIZE, DEFAULT_MAX_STREAMS,
    MAX_MAX_FRAME_SIZE,
};
use crate::MuxConnection;

#[derive(Clone, Debug)]
pub struct Builder {
    /// 本端允许对端同时发起的双向流数
    pub max_bidirectional_streams: u32,

    /// 本端允许对端同时发起的单向流数
    pub max_unidirectional_streams: u32,

    /// 每条流初始接收窗口
    pub initial_window_size: u32,

    /// 单个DATA帧的最大负载
    pub max_frame_size: u32,

    /// 静默多久后自毁, None表示无限, 连接永不因安静而中止
    pub idle_timeout: Option<Duration>,

    /// 保活周期覆写, 默认取双方空闲超时较小值的一半
    pub keepalive_interval: Option<Duration>,
}

impl Builder {
    pub fn new() -> Builder {
        Builder {
            max_bidirectional_streams: DEFAULT_MAX_STREAMS,
            max_unidirectional_streams: DEFAULT_MAX_STREAMS,
            initial_window_size: DEFAULT_INITIAL_WINDOW_SIZE,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            idle_timeout: None,
            keepalive_interval: None,
        }
    }

    pub fn max_bidirectional_streams(mut self, max: u32) -> Self {
        self.max_bidirectional_streams = max;
        self
    }

    pub fn max_unidirectional_streams(mut self, max: u32) -> Self {
        self.max_unidirectional_streams = max;
        self
    }

    pub fn initial_window_size(mut self, size: u32) -> Self {
        self.initial_window_size = size;
        self
    }

    pub fn max_frame_size(mut self, max: u32) -> Self {
        assert!(max <= MAX_MAX_FRAME_SIZE);
        self.max_frame_size = max;
        self
    }

    pub fn idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = Some(interval);
        self
    }

    /// 握手时发给对端的通告
    pub fn settings(&self) -> Settings {
        let mut settings = Settings::default();
        settings.set_max_bidirectional_streams(Some(self.max_bidirectional_streams));
        settings.set_max_unidirectional_streams(Some(self.max_unidirectional_streams));
        settings.set_initial_window_size(Some(self.initial_window_size));
        settings.set_idle_timeout_ms(
            self.idle_timeout
                .map(|t| t.as_millis().min(u32::MAX as u128) as u32),
        );
        settings
    }

    pub fn client_connection<T>(self, io: T) -> MuxConnection<T>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        MuxConnection::new(io, self, Role::Client)
    }

    pub fn server_connection<T>(self, io: T) -> MuxConnection<T>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        MuxConnection::new(io, self, Role::Server)
    }
}

impl Default for Builder {
    fn default() -> Self {
        Builder::new()
    }
}
