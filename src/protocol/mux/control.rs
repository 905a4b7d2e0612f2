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

use std::future::Future;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{ready, Context, Poll};
use std::time::Duration;

use futures_core::Stream;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc::{Receiver, Sender, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::time::{sleep, Instant, Sleep};

use crate::frame::{
    Data, Frame, GoAway, Open, Reason, Reset, Role, Settings, StreamIdentifier, WindowSize,
    WindowUpdate, DEFAULT_INITIAL_WINDOW_SIZE, DEFAULT_MAX_STREAMS,
};
use crate::protocol::codec::Codec;
use crate::protocol::mux::inner_stream::InnerStream;
use crate::protocol::mux::state::{StateGoAway, StatePingPong};
use crate::protocol::mux::stream::MuxStream;
use crate::protocol::mux::streams::{OpenWaiter, StreamRegistry};
use crate::{Initiator, ProtError, ProtResult};

#[derive(Debug, Clone)]
pub struct ControlConfig {
    pub role: Role,
    /// 本端握手通告
    pub settings: Settings,
    /// 本端空闲看门狗, None为无限, 即永不因安静而自毁
    pub idle_timeout: Option<Duration>,
    /// 保活周期覆写, 默认取双方空闲超时较小值的一半
    pub keepalive_interval: Option<Duration>,
    /// 对端握手通告, 握手完成后写入且不再变更
    pub remote: Option<Settings>,
}

impl ControlConfig {
    pub fn apply_remote_settings(&mut self, settings: &Settings) {
        self.remote = Some(settings.clone());
    }
}

/// 连接句柄发给驱动任务的指令
pub enum Command {
    Open {
        bidirectional: bool,
        resp: oneshot::Sender<ProtResult<MuxStream>>,
    },
    Close {
        reason: Reason,
        done: oneshot::Sender<ProtResult<()>>,
    },
    Dispose,
}

#[derive(Debug, Clone, Copy)]
enum State {
    /// Currently open in a sane state
    Open,

    /// The codec must be flushed
    Closing(Reason, Initiator),

    /// In a closed state
    Closed(Reason, Initiator),
}

/// 连接级终止原因, 只记录第一次, 所有晚到的调用都观察同一错误
pub(crate) struct ConnShared {
    close: Mutex<Option<(Reason, Initiator)>>,
}

impl ConnShared {
    pub fn new() -> ConnShared {
        ConnShared {
            close: Mutex::new(None),
        }
    }

    pub fn record(&self, reason: Reason, initiator: Initiator) {
        let mut close = self.close.lock().unwrap();
        if close.is_none() {
            *close = Some((reason, initiator));
        }
    }

    pub fn get(&self) -> Option<(Reason, Initiator)> {
        *self.close.lock().unwrap()
    }

    pub fn error(&self) -> Option<ProtError> {
        self.get().map(|(r, i)| ProtError::from_close(r, i))
    }
}

/// 连接的核心: 底层通道唯一的读取者与写入者.
/// 入帧分发到注册表内的流, 出帧从各流的共享状态汇集, 帧内不交错
pub struct Control {
    state: State,
    registry: StreamRegistry,

    goaway: StateGoAway,
    ping_pong: StatePingPong,

    accept_tx: Option<UnboundedSender<MuxStream>>,
    cmd_rx: UnboundedReceiver<Command>,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
    conn: Arc<ConnShared>,

    /// 本端新建流待发送的OPEN帧
    pending_open: VecDeque<StreamIdentifier>,
    close_waiters: Vec<oneshot::Sender<ProtResult<()>>>,

    /// 收到的最后一个对端流号, CLOSE帧带回给对端
    last_recv_id: StreamIdentifier,
    peer_closed: bool,
    /// 对端读方向已结束, 不再轮询读取
    eof: bool,
    /// 放弃写缓冲直接断开
    abrupt: bool,

    send_window_default: WindowSize,
    recv_window_default: WindowSize,

    idle_timeout: Option<Duration>,
    idle_sleep: Option<Pin<Box<Sleep>>>,
    keepalive_interval: Option<Duration>,
    keepalive_sleep: Option<Pin<Box<Sleep>>>,
}

impl Control {
    pub fn new(
        config: ControlConfig,
        conn: Arc<ConnShared>,
        accept_tx: UnboundedSender<MuxStream>,
        cmd_rx: UnboundedReceiver<Command>,
        wake_tx: Sender<()>,
        wake_rx: Receiver<()>,
    ) -> Self {
        let remote = config.remote.clone().unwrap_or_default();
        let max_create_bidi = remote
            .max_bidirectional_streams()
            .unwrap_or(DEFAULT_MAX_STREAMS) as usize;
        let max_create_uni = remote
            .max_unidirectional_streams()
            .unwrap_or(DEFAULT_MAX_STREAMS) as usize;
        let max_accept_bidi = config
            .settings
            .max_bidirectional_streams()
            .unwrap_or(DEFAULT_MAX_STREAMS) as usize;
        let max_accept_uni = config
            .settings
            .max_unidirectional_streams()
            .unwrap_or(DEFAULT_MAX_STREAMS) as usize;
        let send_window_default = remote
            .initial_window_size()
            .unwrap_or(DEFAULT_INITIAL_WINDOW_SIZE);
        let recv_window_default = config
            .settings
            .initial_window_size()
            .unwrap_or(DEFAULT_INITIAL_WINDOW_SIZE);

        let idle_timeout = config.idle_timeout;
        // 保活以双方超时的较小值为准, 保证有限超时的一方不会饿死
        let min_idle = match (
            config.idle_timeout,
            remote.idle_timeout_ms().map(|v| Duration::from_millis(v as u64)),
        ) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        let keepalive_interval = config
            .keepalive_interval
            .or(min_idle.map(|d| (d / 2).max(Duration::from_millis(10))));

        Control {
            state: State::Open,
            registry: StreamRegistry::new(
                config.role,
                max_create_bidi,
                max_create_uni,
                max_accept_bidi,
                max_accept_uni,
            ),
            goaway: StateGoAway::new(),
            ping_pong: StatePingPong::new(),
            accept_tx: Some(accept_tx),
            cmd_rx,
            wake_tx,
            wake_rx,
            conn,
            pending_open: VecDeque::new(),
            close_waiters: Vec::new(),
            last_recv_id: StreamIdentifier::zero(),
            peer_closed: false,
            eof: false,
            abrupt: false,
            send_window_default,
            recv_window_default,
            idle_timeout,
            idle_sleep: idle_timeout.map(|t| Box::pin(sleep(t))),
            keepalive_interval,
            keepalive_sleep: keepalive_interval.map(|t| Box::pin(sleep(t))),
        }
    }

    /// 驱动整条连接: 指令、写出、读入、定时器.
    /// Ready表示连接彻底结束, 任务可以退出
    pub fn poll_serve<T>(&mut self, cx: &mut Context<'_>, codec: &mut Codec<T>) -> Poll<()>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        loop {
            match self.poll_pass(cx, codec) {
                Poll::Ready(Ok(true)) => return Poll::Ready(()),
                Poll::Ready(Ok(false)) => continue,
                Poll::Ready(Err(e)) => {
                    self.handle_error(e);
                    continue;
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }

    /// 完整跑一轮. Ready(true)=连接结束, Ready(false)=状态有变化需再来一轮
    fn poll_pass<T>(
        &mut self,
        cx: &mut Context<'_>,
        codec: &mut Codec<T>,
    ) -> Poll<ProtResult<bool>>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        self.poll_commands(cx);

        if let State::Closed(..) = self.state {
            self.finish_close_waiters();
            if self.abrupt {
                codec.abort_pending_write();
            }
            // 终态只剩清空缓冲关闭通道, IO错误不再影响结果
            match codec.shutdown(cx) {
                Poll::Ready(_) => return Poll::Ready(Ok(true)),
                Poll::Pending => return Poll::Pending,
            }
        }

        while let Poll::Ready(Some(())) = self.wake_rx.poll_recv(cx) {}

        self.reap_streams();

        if let Poll::Ready(Err(e)) = self.poll_write(cx, codec) {
            return Poll::Ready(Err(e));
        }

        if !self.eof {
            match Pin::new(&mut *codec).poll_next(cx) {
                Poll::Ready(Some(Ok(frame))) => {
                    self.reset_idle();
                    self.recv_frame(frame)?;
                    return Poll::Ready(Ok(false));
                }
                Poll::Ready(Some(Err(e))) => return Poll::Ready(Err(e)),
                Poll::Ready(None) => {
                    self.recv_eof();
                    return Poll::Ready(Ok(false));
                }
                Poll::Pending => {}
            }
        }

        if self.poll_timers(cx)? {
            return Poll::Ready(Ok(false));
        }

        if let State::Closing(reason, initiator) = self.state {
            if self.goaway.is_sent() && self.peer_closed {
                self.state = State::Closed(reason, initiator);
                return Poll::Ready(Ok(false));
            }
        }

        Poll::Pending
    }

    fn poll_commands(&mut self, cx: &mut Context<'_>) {
        loop {
            match self.cmd_rx.poll_recv(cx) {
                Poll::Ready(Some(cmd)) => self.handle_command(cmd),
                Poll::Ready(None) => {
                    // 连接句柄已丢弃, 等价于dispose
                    self.dispose_now();
                    return;
                }
                Poll::Pending => return,
            }
        }
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Open {
                bidirectional,
                resp,
            } => {
                if !matches!(self.state, State::Open) {
                    let _ = resp.send(Err(self.recorded_error()));
                    return;
                }
                self.registry.push_waiter(OpenWaiter {
                    bidirectional,
                    resp,
                });
                self.try_grant_opens();
            }
            Command::Close { reason, done } => match self.state {
                State::Open => {
                    self.begin_close(reason, Initiator::User);
                    self.close_waiters.push(done);
                }
                State::Closing(..) => self.close_waiters.push(done),
                State::Closed(..) => {
                    let _ = done.send(Ok(()));
                }
            },
            Command::Dispose => self.dispose_now(),
        }
    }

    fn begin_close(&mut self, reason: Reason, initiator: Initiator) {
        self.conn.record(reason, initiator);
        self.teardown_streams(reason, initiator);
        self.goaway
            .go_away_now(GoAway::new(self.last_recv_id, reason));
        self.state = State::Closing(reason, initiator);
    }

    fn dispose_now(&mut self) {
        if let State::Closed(..) = self.state {
            return;
        }
        self.conn.record(Reason::NO_ERROR, Initiator::User);
        let (reason, initiator) = self.conn.get().unwrap();
        self.teardown_streams(reason, initiator);
        self.abrupt = true;
        self.state = State::Closed(reason, initiator);
    }

    fn teardown_streams(&mut self, reason: Reason, initiator: Initiator) {
        for stream in self.registry.iter() {
            stream.conn_closed(reason, initiator);
        }
        for waiter in self.registry.take_all_waiters() {
            let _ = waiter.resp.send(Err(ProtError::from_close(reason, initiator)));
        }
        self.accept_tx = None;
    }

    fn finish_close_waiters(&mut self) {
        for done in self.close_waiters.drain(..) {
            let _ = done.send(Ok(()));
        }
    }

    fn recorded_error(&self) -> ProtError {
        self.conn
            .error()
            .unwrap_or(ProtError::Extension("connection is closed"))
    }

    fn handle_error(&mut self, e: ProtError) {
        if let State::Closed(..) = self.state {
            return;
        }
        match e {
            ProtError::GoAway(reason, initiator) => {
                self.conn.record(reason, initiator);
                self.teardown_streams(reason, initiator);
                self.goaway
                    .go_away_now(GoAway::new(self.last_recv_id, reason));
                if !matches!(self.state, State::Closing(..)) {
                    self.state = State::Closing(reason, initiator);
                }
                // 协议错误不等待对端确认, CLOSE送出即结束
                self.peer_closed = true;
            }
            e => {
                // 传输层已不可用, 无法再发送任何帧
                log::debug!("连接异常终止: {}", e);
                self.conn.record(Reason::INTERNAL_ERROR, Initiator::Library);
                let (reason, initiator) = self.conn.get().unwrap();
                self.teardown_streams(reason, initiator);
                self.abrupt = true;
                self.state = State::Closed(reason, initiator);
            }
        }
    }

    // ---- 写路径 ----

    fn poll_write<T>(&mut self, cx: &mut Context<'_>, codec: &mut Codec<T>) -> Poll<ProtResult<()>>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        // 流数据先于CLOSE, 本端优雅关闭前已入队的数据要送达
        ready!(self.poll_stream_frames(cx, codec))?;
        ready!(self.ping_pong.poll_handle(cx, codec))?;
        if let Some(Err(e)) = ready!(self.goaway.poll_handle(cx, codec)) {
            return Poll::Ready(Err(e));
        }
        ready!(codec.poll_flush(cx))?;
        Poll::Ready(Ok(()))
    }

    fn poll_stream_frames<T>(
        &mut self,
        cx: &mut Context<'_>,
        codec: &mut Codec<T>,
    ) -> Poll<ProtResult<()>>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        while let Some(id) = self.pending_open.front().copied() {
            ready!(codec.poll_ready(cx))?;
            codec.send_frame(Frame::Open(Open::new(id)))?;
            self.pending_open.pop_front();
        }

        // 按流号轮转, 单流内帧保序, 流之间简单交错
        let ids = self.registry.ids();
        for id in ids {
            let stream = match self.registry.get(&id) {
                Some(stream) => stream.clone(),
                None => continue,
            };
            while stream.has_send_interest() {
                ready!(codec.poll_ready(cx))?;
                if let Some(n) = stream.take_pending_window() {
                    codec.send_frame(Frame::WindowUpdate(WindowUpdate::new(id, n)))?;
                    continue;
                }
                if let Some(reason) = stream.take_pending_reset() {
                    codec.send_frame(Frame::Reset(Reset::new(id, reason)))?;
                    continue;
                }
                let max = codec.max_send_frame_size();
                if let Some((chunk, end)) = stream.take_send_chunk(max) {
                    let mut data = Data::new(id, chunk);
                    data.set_end_stream(end);
                    codec.send_frame(Frame::Data(data))?;
                    continue;
                }
                break;
            }
            if stream.is_fully_terminal() {
                self.registry.release(id);
            }
        }
        self.try_grant_opens();
        Poll::Ready(Ok(()))
    }

    /// 有空位时按FIFO满足挂起的createStream, 完成一条流只放行一个等待者
    fn try_grant_opens(&mut self) {
        if !matches!(self.state, State::Open) {
            return;
        }
        let mut granted = false;
        for bidirectional in [true, false] {
            while self.registry.has_waiter(bidirectional) {
                let id = match self.registry.try_admit_local(bidirectional) {
                    Some(id) => id,
                    None => break,
                };
                granted = true;
                let stream = self.build_stream(id, false);
                self.registry.insert(stream.clone());
                self.pending_open.push_back(id);
                match self.registry.pop_waiter(bidirectional) {
                    Some(waiter) => {
                        if let Err(Ok(mut mux)) =
                            waiter.resp.send(Ok(MuxStream::new(stream, false)))
                        {
                            // 调用方已取消, 刚开的流立即作废, 名额随RESET回收
                            mux.dispose();
                        }
                    }
                    None => {
                        // 等待者都已取消, 这条流直接作废, 流号不回收
                        stream.local_reset(Reason::STREAM_CLOSED, true);
                    }
                }
            }
        }
        if granted {
            // 新排队的OPEN帧要再跑一轮写路径
            let _ = self.wake_tx.try_send(());
        }
    }

    fn build_stream(&self, id: StreamIdentifier, is_remote: bool) -> Arc<InnerStream> {
        let has_input = if is_remote {
            true
        } else {
            id.is_bidirectional()
        };
        let has_output = if is_remote {
            id.is_bidirectional()
        } else {
            true
        };
        Arc::new(InnerStream::new(
            id,
            self.send_window_default,
            self.recv_window_default,
            has_input,
            has_output,
            self.wake_tx.clone(),
        ))
    }

    fn reap_streams(&mut self) {
        let ids = self.registry.ids();
        for id in ids {
            let done = self
                .registry
                .get(&id)
                .map(|s| s.is_fully_terminal() && !s.has_send_interest())
                .unwrap_or(false);
            if done {
                self.registry.release(id);
            }
        }
        self.try_grant_opens();
    }

    // ---- 读路径 ----

    fn recv_frame(&mut self, frame: Frame) -> ProtResult<()> {
        match frame {
            Frame::Settings(_) => {
                // 握手后不允许重新协商
                Err(ProtError::library_go_away(Reason::PROTOCOL_ERROR))
            }
            Frame::Open(open) => self.recv_open(open),
            Frame::Data(data) => self.recv_data(data),
            Frame::WindowUpdate(update) => self.recv_window_update(update),
            Frame::Reset(reset) => self.recv_reset(reset),
            Frame::GoAway(frame) => {
                self.recv_go_away(frame);
                Ok(())
            }
            Frame::Ping(ping) => {
                if !ping.is_ack() {
                    self.ping_pong.receive(ping);
                }
                Ok(())
            }
        }
    }

    fn recv_open(&mut self, open: Open) -> ProtResult<()> {
        let id = open.stream_id();
        self.registry.recv_open(id)?;
        self.last_recv_id = self.last_recv_id.max(id);
        let stream = self.build_stream(id, true);
        self.registry.insert(stream.clone());
        if let Some(tx) = &self.accept_tx {
            let _ = tx.send(MuxStream::new(stream, true));
        }
        Ok(())
    }

    fn recv_data(&mut self, data: Data) -> ProtResult<()> {
        let id = data.stream_id();
        let end = data.is_end_stream();
        match self.registry.get(&id) {
            Some(stream) => {
                let stream = stream.clone();
                match stream.recv_data(data.into_payload(), end) {
                    Ok(true) => Ok(()),
                    Ok(false) => {
                        log::trace!("丢弃流{}输入半边终止后的滞后数据帧", id);
                        Ok(())
                    }
                    Err(reason) => Err(ProtError::library_go_away(reason)),
                }
            }
            None => {
                if self.registry.is_reclaimed(id) {
                    log::debug!("丢弃已回收流{}的滞后数据帧", id);
                    Ok(())
                } else {
                    Err(ProtError::library_go_away(Reason::PROTOCOL_ERROR))
                }
            }
        }
    }

    fn recv_window_update(&mut self, update: WindowUpdate) -> ProtResult<()> {
        if update.is_connection() {
            // 连接级配额保留位, 当前版本不启用
            tracing::trace!("ignore connection window update = {:?}", update);
            return Ok(());
        }
        let id = update.stream_id();
        match self.registry.get(&id) {
            Some(stream) => stream
                .recv_window_update(update.size_increment())
                .map_err(ProtError::library_go_away),
            None => {
                if self.registry.is_reclaimed(id) {
                    log::debug!("丢弃已回收流{}的滞后窗口帧", id);
                    Ok(())
                } else {
                    Err(ProtError::library_go_away(Reason::PROTOCOL_ERROR))
                }
            }
        }
    }

    fn recv_reset(&mut self, reset: Reset) -> ProtResult<()> {
        let id = reset.stream_id();
        match self.registry.get(&id) {
            Some(stream) => {
                stream.clone().recv_reset(reset.reason());
                Ok(())
            }
            None => {
                if self.registry.is_reclaimed(id) {
                    log::debug!("丢弃已回收流{}的滞后重置帧", id);
                    Ok(())
                } else {
                    Err(ProtError::library_go_away(Reason::PROTOCOL_ERROR))
                }
            }
        }
    }

    fn recv_go_away(&mut self, frame: GoAway) {
        self.peer_closed = true;
        if let State::Open = self.state {
            // 对端先关闭: 记录原因, 回CLOSE作为确认
            let reason = frame.reason();
            self.conn.record(reason, Initiator::Remote);
            self.teardown_streams(reason, Initiator::Remote);
            self.goaway
                .go_away_now(GoAway::new(self.last_recv_id, Reason::NO_ERROR));
            self.state = State::Closing(reason, Initiator::Remote);
        }
    }

    fn recv_eof(&mut self) {
        self.peer_closed = true;
        self.eof = true;
        if let State::Open = self.state {
            // 对端未发CLOSE即断开
            self.conn.record(Reason::INTERNAL_ERROR, Initiator::Remote);
            let (reason, _) = self.conn.get().unwrap();
            self.teardown_streams(reason, Initiator::Remote);
            self.abrupt = true;
            self.state = State::Closed(reason, Initiator::Remote);
        }
    }

    // ---- 定时器 ----

    fn reset_idle(&mut self) {
        if let (Some(sleep), Some(timeout)) = (self.idle_sleep.as_mut(), self.idle_timeout) {
            sleep.as_mut().reset(Instant::now() + timeout);
        }
    }

    /// 返回true表示有新帧待发送
    fn poll_timers(&mut self, cx: &mut Context<'_>) -> ProtResult<bool> {
        if let (State::Open, Some(sleep)) = (&self.state, self.idle_sleep.as_mut()) {
            if sleep.as_mut().poll(cx).is_ready() {
                // 看门狗只触发一次
                self.idle_sleep = None;
                return Err(ProtError::library_go_away(Reason::IDLE_TIMEOUT));
            }
        }
        let mut has_send = false;
        if let Some(sleep) = self.keepalive_sleep.as_mut() {
            if sleep.as_mut().poll(cx).is_ready() {
                if let State::Open = self.state {
                    self.ping_pong.queue_ping();
                    has_send = true;
                }
                let interval = self.keepalive_interval.unwrap();
                sleep.as_mut().reset(Instant::now() + interval);
            }
        }
        Ok(has_send)
    }
}
