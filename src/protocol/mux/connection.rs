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

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::poll_fn;
use futures_core::Stream;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc::{
    channel, unbounded_channel, Receiver, Sender, UnboundedReceiver, UnboundedSender,
};
use tokio::sync::{oneshot, Mutex};

use crate::frame::{Frame, Reason, Role};
use crate::protocol::codec::Codec;
use crate::protocol::mux::control::{Command, ConnShared, Control, ControlConfig};
use crate::protocol::mux::state::StateSettings;
use crate::protocol::mux::stream::MuxStream;
use crate::{Builder, Initiator, ProtError, ProtResult};

/// 一条多路复用连接的应用侧句柄.
/// 底层通道由内部驱动任务独占读写, 句柄只与驱动任务通信.
/// 所有挂起点都允许取消(丢弃future), 取消单个调用不影响连接
pub struct MuxConnection<T> {
    config: ControlConfig,
    /// 握手完成前本任务自己驱动编解码器
    codec: Option<Codec<T>>,
    handshake: StateSettings,

    conn: Arc<ConnShared>,
    cmd_tx: UnboundedSender<Command>,
    cmd_rx: Option<UnboundedReceiver<Command>>,
    accept_rx: Mutex<UnboundedReceiver<MuxStream>>,
    accept_tx: Option<UnboundedSender<MuxStream>>,
    wake_tx: Sender<()>,
    wake_rx: Option<Receiver<()>>,

    connected: bool,
}

impl<T> MuxConnection<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(io: T, builder: Builder, role: Role) -> MuxConnection<T> {
        let config = ControlConfig {
            role,
            settings: builder.settings(),
            idle_timeout: builder.idle_timeout,
            keepalive_interval: builder.keepalive_interval,
            remote: None,
        };
        let (cmd_tx, cmd_rx) = unbounded_channel();
        let (accept_tx, accept_rx) = unbounded_channel();
        let (wake_tx, wake_rx) = channel(1);
        let mut codec = Codec::new(io);
        codec.set_max_send_frame_size(builder.max_frame_size as usize);
        MuxConnection {
            handshake: StateSettings::new(config.settings.clone()),
            config,
            codec: Some(codec),
            conn: Arc::new(ConnShared::new()),
            cmd_tx,
            cmd_rx: Some(cmd_rx),
            accept_rx: Mutex::new(accept_rx),
            accept_tx: Some(accept_tx),
            wake_tx,
            wake_rx: Some(wake_rx),
            connected: false,
        }
    }

    pub fn role(&self) -> Role {
        self.config.role
    }

    pub fn is_ready(&self) -> bool {
        self.connected
    }

    /// 交换协议参数并启动驱动任务.
    /// 握手中取消(丢弃future)不破坏连接, 重新调用会从中断处继续
    pub async fn connect(&mut self) -> ProtResult<()>
    where
        T: Send + 'static,
    {
        if self.connected {
            return Ok(());
        }
        if let Some(err) = self.conn.error() {
            return Err(err);
        }
        let codec = self
            .codec
            .as_mut()
            .ok_or(ProtError::Extension("connection is closed"))?;
        let handshake = &mut self.handshake;
        let config = &mut self.config;
        let result = poll_fn(|cx| Self::poll_handshake(cx, codec, handshake, config)).await;
        if let Err(e) = result {
            // 底层通道已坏, 连接转为终止态
            self.conn.record(Reason::PROTOCOL_ERROR, Initiator::Library);
            return Err(e);
        }

        let codec = self.codec.take().unwrap();
        let control = Control::new(
            self.config.clone(),
            self.conn.clone(),
            self.accept_tx.take().unwrap(),
            self.cmd_rx.take().unwrap(),
            self.wake_tx.clone(),
            self.wake_rx.take().unwrap(),
        );
        tokio::spawn(serve(control, codec));
        self.connected = true;
        Ok(())
    }

    fn poll_handshake(
        cx: &mut Context<'_>,
        codec: &mut Codec<T>,
        handshake: &mut StateSettings,
        config: &mut ControlConfig,
    ) -> Poll<ProtResult<()>> {
        loop {
            match handshake.poll_handle(cx, codec, config) {
                Poll::Ready(Ok(true)) => return Poll::Ready(Ok(())),
                Poll::Ready(Ok(false)) => {}
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Pending => {}
            }
            match Pin::new(&mut *codec).poll_next(cx) {
                Poll::Ready(Some(Ok(Frame::Settings(settings)))) => {
                    handshake.recv_setting(settings)?;
                }
                Poll::Ready(Some(Ok(_))) => {
                    // 握手完成前不可能有其它帧
                    return Poll::Ready(Err(ProtError::library_go_away(Reason::PROTOCOL_ERROR)));
                }
                Poll::Ready(Some(Err(e))) => return Poll::Ready(Err(e)),
                Poll::Ready(None) => {
                    return Poll::Ready(Err(ProtError::Extension(
                        "connection closed during handshake",
                    )));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }

    /// 取下一条对端发起的流, 按到达顺序返回. 没有排队的流则挂起.
    /// 同一时刻只允许一个未决的accept
    pub async fn accept_stream(&self) -> ProtResult<MuxStream> {
        if let Some(err) = self.conn.error() {
            return Err(err);
        }
        if !self.connected {
            return Err(ProtError::Extension("connection is not ready"));
        }
        let mut accept_rx = self
            .accept_rx
            .try_lock()
            .map_err(|_| ProtError::Extension("another accept is pending"))?;
        match accept_rx.recv().await {
            Some(stream) => Ok(stream),
            None => Err(self.closed_error()),
        }
    }

    /// 开一条本端发起的流. 同方向已开满对端通告的上限时挂起,
    /// 等待任意一条该方向的流完全结束释放名额(先来先得)
    pub async fn create_stream(&self, bidirectional: bool) -> ProtResult<MuxStream> {
        if let Some(err) = self.conn.error() {
            return Err(err);
        }
        if !self.connected {
            return Err(ProtError::Extension("connection is not ready"));
        }
        let (resp, rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(Command::Open {
                bidirectional,
                resp,
            })
            .is_err()
        {
            return Err(self.closed_error());
        }
        match rx.await {
            Ok(result) => result,
            Err(_) => Err(self.closed_error()),
        }
    }

    /// 优雅关闭: 发送携带错误码的CLOSE, 等待对端确认或断开.
    /// 幂等, 双方同时关闭互不妨碍; 对已关闭连接调用等于空操作
    pub async fn close(&self, reason: Reason) -> ProtResult<()> {
        if !self.connected {
            self.conn.record(reason, Initiator::User);
            return Ok(());
        }
        let (done, rx) = oneshot::channel();
        if self.cmd_tx.send(Command::Close { reason, done }).is_err() {
            // 驱动任务已退出, 连接业已关闭
            return Ok(());
        }
        match rx.await {
            Ok(result) => result,
            Err(_) => Ok(()),
        }
    }

    /// 粗暴断开: 不等待对端确认, 所有未结束的流立即以连接错误终止.
    /// 任意状态下可重复调用
    pub fn dispose(&self) {
        self.conn.record(Reason::NO_ERROR, Initiator::User);
        let _ = self.cmd_tx.send(Command::Dispose);
    }

    fn closed_error(&self) -> ProtError {
        self.conn
            .error()
            .unwrap_or(ProtError::Extension("connection is closed"))
    }
}

impl<T> Drop for MuxConnection<T> {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(Command::Dispose);
    }
}

/// 驱动任务: 连接的全部IO在这里串行完成
async fn serve<T>(mut control: Control, mut codec: Codec<T>)
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    poll_fn(|cx| control.poll_serve(cx, &mut codec)).await;
    log::trace!("连接驱动任务退出");
}
