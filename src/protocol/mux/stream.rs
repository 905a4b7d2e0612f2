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

use std::sync::Arc;

use bytes::Bytes;

use crate::frame::{Reason, StreamIdentifier, WindowSize};
use crate::protocol::mux::inner_stream::{HalfState, InnerStream};
use crate::{ProtError, ProtResult};

/// 写入结果: 对端明确拒收后续数据时返回`Stopped`, 调用方不必再重试
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Sent,
    Stopped,
}

/// 一条逻辑流, 双向流两个半边齐全, 单向流只有与本端方向相符的半边
pub struct MuxStream {
    id: StreamIdentifier,
    is_remote: bool,
    recv: Option<RecvStream>,
    send: Option<SendStream>,
}

impl MuxStream {
    pub(crate) fn new(inner: Arc<InnerStream>, is_remote: bool) -> MuxStream {
        let id = inner.id();
        let has_input = id.is_bidirectional() || is_remote;
        let has_output = id.is_bidirectional() || !is_remote;
        MuxStream {
            id,
            is_remote,
            recv: has_input.then(|| RecvStream {
                inner: inner.clone(),
                unacked: 0,
            }),
            send: has_output.then(|| SendStream { inner }),
        }
    }

    pub fn id(&self) -> StreamIdentifier {
        self.id
    }

    pub fn is_bidirectional(&self) -> bool {
        self.id.is_bidirectional()
    }

    pub fn is_remote(&self) -> bool {
        self.is_remote
    }

    pub fn recv_stream(&mut self) -> Option<&mut RecvStream> {
        self.recv.as_mut()
    }

    pub fn send_stream(&mut self) -> Option<&mut SendStream> {
        self.send.as_mut()
    }

    /// 拆出两个半边分别持有, 缺失的半边为None
    pub fn split(mut self) -> (Option<RecvStream>, Option<SendStream>) {
        (self.recv.take(), self.send.take())
    }

    pub fn take_recv_stream(&mut self) -> Option<RecvStream> {
        self.recv.take()
    }

    pub fn take_send_stream(&mut self) -> Option<SendStream> {
        self.send.take()
    }

    /// 放弃整条流, 未完成的半边以RESET通知对端
    pub fn dispose(&mut self) {
        if let Some(recv) = &mut self.recv {
            recv.complete();
        }
        if let Some(send) = &mut self.send {
            let _ = send.complete(None);
        }
    }
}

impl std::fmt::Debug for MuxStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MuxStream")
            .field("id", &self.id)
            .field("is_remote", &self.is_remote)
            .finish()
    }
}

/// 输入半边: 消费端驱动, 读进度通过`advance`显式确认后才会补充对端窗口
pub struct RecvStream {
    inner: Arc<InnerStream>,
    /// 已交付应用但还未确认的字节数
    unacked: usize,
}

impl RecvStream {
    pub fn id(&self) -> StreamIdentifier {
        self.inner.id()
    }

    /// 读下一块数据, 流正常结束返回None.
    /// 取消(丢弃该future)不影响流上的后续调用
    pub async fn read(&mut self) -> ProtResult<Option<Bytes>> {
        loop {
            let notified = self.inner.recv_notify().notified();
            tokio::pin!(notified);
            // 先注册再检查, 中途到来的通知不会丢
            notified.as_mut().enable();
            {
                let mut state = self.inner.state();
                state.check_error()?;
                if let Some(chunk) = state.recv_buf.pop_front() {
                    self.unacked += chunk.len();
                    return Ok(Some(chunk));
                }
                match state.input {
                    HalfState::Aborted(reason) => {
                        return Err(ProtError::StreamAborted(reason));
                    }
                    HalfState::Completed => return Ok(None),
                    HalfState::Open => {}
                }
                if state.recv_end {
                    // 全部数据已交付
                    state.input = HalfState::Completed;
                    drop(state);
                    self.inner.wake_conn();
                    return Ok(None);
                }
            }
            notified.await;
        }
    }

    /// 确认已处理n字节, 由此产生对端发送窗口的补充.
    /// 不确认则对端写满一个窗口后被反压
    pub fn advance(&mut self, n: usize) {
        let n = n.min(self.unacked);
        if n == 0 {
            return;
        }
        self.unacked -= n;
        let mut state = self.inner.state();
        if state.input.is_terminal() && state.recv_buf.is_empty() {
            return;
        }
        state.pending_window += n as WindowSize;
        drop(state);
        self.inner.wake_conn();
    }

    /// 标记输入半边终止. 对端还在发送时以RESET要求其停止
    pub fn complete(&mut self) {
        let mut state = self.inner.state();
        if state.input.is_terminal() {
            return;
        }
        if state.recv_end {
            // 数据已全部到达, 无需让对端停止
            state.input = HalfState::Completed;
            state.recv_buf.clear();
            drop(state);
            self.inner.wake_conn();
            return;
        }
        drop(state);
        self.inner.local_reset(Reason::STREAM_CLOSED, true);
    }

    /// 等待输入半边关闭: 对端发完END、流被重置或连接终止
    pub async fn closed(&mut self) {
        loop {
            let notified = self.inner.recv_notify().notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let state = self.inner.state();
                if state.recv_end || state.input.is_terminal() || state.conn_close.is_some() {
                    return;
                }
            }
            notified.await;
        }
    }
}

impl Drop for RecvStream {
    fn drop(&mut self) {
        // 丢弃句柄不等于取消流: 不发RESET, 只把输入半边静默收尾
        let unacked = self.unacked as WindowSize;
        self.unacked = 0;
        self.inner.discard_input(unacked);
    }
}

impl std::fmt::Debug for RecvStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecvStream")
            .field("id", &self.inner.id())
            .finish()
    }
}

/// 输出半边: 生产端驱动, 受对端通告的信用窗口反压
pub struct SendStream {
    inner: Arc<InnerStream>,
}

impl SendStream {
    pub fn id(&self) -> StreamIdentifier {
        self.inner.id()
    }

    /// 写入数据, 窗口不足时挂起, 大块写入按窗口拆分逐步放行.
    /// `end_stream`表示之后不会再有写入
    pub async fn write(&mut self, data: Bytes, end_stream: bool) -> ProtResult<WriteOutcome> {
        let mut data = data;
        loop {
            let notified = self.inner.send_notify().notified();
            tokio::pin!(notified);
            // 先注册再检查, 中途到来的通知不会丢
            notified.as_mut().enable();
            {
                let mut state = self.inner.state();
                state.check_error()?;
                match state.output {
                    HalfState::Aborted(reason) => {
                        if state.peer_stopped {
                            return Ok(WriteOutcome::Stopped);
                        }
                        return Err(ProtError::StreamAborted(reason));
                    }
                    HalfState::Completed => {
                        return Err(ProtError::Extension("write after end of stream"));
                    }
                    HalfState::Open => {}
                }
                if state.send_end_requested {
                    return Err(ProtError::Extension("write after end of stream"));
                }
                let wrote = state.admit_send(&mut data);
                if data.is_empty() {
                    if end_stream {
                        state.send_end_requested = true;
                    }
                    let wake = wrote > 0 || end_stream;
                    drop(state);
                    if wake {
                        self.inner.wake_conn();
                    }
                    return Ok(WriteOutcome::Sent);
                }
                drop(state);
                if wrote > 0 {
                    self.inner.wake_conn();
                }
            }
            notified.await;
        }
    }

    /// 标记输出半边终止. 带原因或未发END时放弃, 以RESET通知对端;
    /// 对端输入已关闭时为无害的空操作
    pub fn complete(&mut self, reason: Option<Reason>) -> ProtResult<()> {
        let state = self.inner.state();
        if state.output.is_terminal() || state.peer_stopped {
            return Ok(());
        }
        match reason {
            None if state.send_end_requested => {
                // 已带END写入, 等驱动任务发完即正常完成
                Ok(())
            }
            None => {
                let mut state = state;
                if !state.wrote_any {
                    // 一个字节都没写过, 以空的END收尾而不是重置
                    state.send_end_requested = true;
                    drop(state);
                    self.inner.wake_conn();
                    return Ok(());
                }
                drop(state);
                self.inner.local_reset(Reason::STREAM_CLOSED, false);
                Ok(())
            }
            Some(reason) => {
                drop(state);
                self.inner.local_reset(reason, false);
                Ok(())
            }
        }
    }

    /// 等待输出半边关闭: END已发出、流被重置或连接终止
    pub async fn closed(&mut self) {
        loop {
            let notified = self.inner.send_notify().notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let state = self.inner.state();
                if state.output.is_terminal() || state.conn_close.is_some() {
                    return;
                }
            }
            notified.await;
        }
    }
}

impl Drop for SendStream {
    fn drop(&mut self) {
        let _ = self.complete(None);
    }
}

impl std::fmt::Debug for SendStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendStream")
            .field("id", &self.inner.id())
            .finish()
    }
}
