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

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use bytes::{Buf, Bytes, BytesMut};
use tokio::sync::mpsc::Sender;
use tokio::sync::Notify;

use crate::frame::{Reason, StreamIdentifier, WindowSize};
use crate::protocol::mux::flow_control::FlowControl;
use crate::{Initiator, ProtError};

/// 半边流的生命周期: 打开 -> 正常完成 | 异常终止
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalfState {
    Open,
    Completed,
    Aborted(Reason),
}

impl HalfState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, HalfState::Open)
    }
}

/// 组成流的基本数据, 由连接驱动任务与应用句柄共享,
/// 所有字段统一由`state`锁保护, 计数器不会被两个任务并发修改
pub struct InnerStream {
    id: StreamIdentifier,
    state: Mutex<StreamState>,
    /// 收到数据或输入半边关闭时唤醒读句柄
    recv_notify: Notify,
    /// 窗口补充或输出半边关闭时唤醒写句柄
    send_notify: Notify,
    /// 句柄侧有待发送内容时唤醒驱动任务
    wake_conn: Sender<()>,
}

pub struct StreamState {
    // ---- 输入半边 (对端 -> 本端) ----
    pub recv_buf: VecDeque<Bytes>,
    /// 已收到对端的END标记
    pub recv_end: bool,
    pub input: HalfState,
    pub recv_flow: FlowControl,
    /// 应用已确认消费、待编码成WINDOW_UPDATE的字节数
    pub pending_window: WindowSize,

    // ---- 输出半边 (本端 -> 对端) ----
    pub send_buf: BytesMut,
    pub send_end_requested: bool,
    /// 输出半边写过实际数据
    pub wrote_any: bool,
    pub end_flushed: bool,
    pub output: HalfState,
    pub send_flow: FlowControl,
    /// 待驱动任务发送的RESET错误码
    pub reset_pending: Option<Reason>,
    pub reset_sent: bool,
    /// 对端以STREAM_CLOSED/NO_ERROR重置, 表示干净地拒收后续数据
    pub peer_stopped: bool,
    /// 收到过对端的RESET
    pub peer_reset: bool,

    /// 连接级终止错误, 一旦记录所有后续操作都返回同一错误
    pub conn_close: Option<(Reason, Initiator)>,
}

impl InnerStream {
    pub fn new(
        id: StreamIdentifier,
        send_window: WindowSize,
        recv_window: WindowSize,
        has_input: bool,
        has_output: bool,
        wake_conn: Sender<()>,
    ) -> InnerStream {
        InnerStream {
            id,
            state: Mutex::new(StreamState {
                recv_buf: VecDeque::new(),
                // 单向流缺失的输入不会再有数据, 线路视角一开始就算收完
                recv_end: !has_input,
                // 单向流缺失的半边视作天然完成
                input: if has_input {
                    HalfState::Open
                } else {
                    HalfState::Completed
                },
                recv_flow: FlowControl::new(recv_window),
                pending_window: 0,
                send_buf: BytesMut::new(),
                send_end_requested: false,
                wrote_any: false,
                end_flushed: !has_output,
                output: if has_output {
                    HalfState::Open
                } else {
                    HalfState::Completed
                },
                send_flow: FlowControl::new(send_window),
                reset_pending: None,
                reset_sent: false,
                peer_stopped: false,
                peer_reset: false,
                conn_close: None,
            }),
            recv_notify: Notify::new(),
            send_notify: Notify::new(),
            wake_conn,
        }
    }

    pub fn id(&self) -> StreamIdentifier {
        self.id
    }

    pub fn state(&self) -> MutexGuard<'_, StreamState> {
        self.state.lock().unwrap()
    }

    pub fn recv_notify(&self) -> &Notify {
        &self.recv_notify
    }

    pub fn send_notify(&self) -> &Notify {
        &self.send_notify
    }

    pub fn wake_conn(&self) {
        let _ = self.wake_conn.try_send(());
    }

    /// 驱动任务收到该流的DATA帧. 返回false表示输入半边已终止,
    /// 这是滞后发送方的残余数据, 丢弃即可
    pub fn recv_data(&self, payload: Bytes, end: bool) -> Result<bool, Reason> {
        let mut state = self.state();
        state.recv_flow.recv_data(payload.len() as WindowSize)?;
        if state.input.is_terminal() {
            // 丢弃数据的同时立即归还窗口, 对端不会被一条废弃流卡死;
            // END仍要记账, 名额释放依赖它
            state.pending_window += payload.len() as WindowSize;
            if end {
                state.recv_end = true;
            }
            return Ok(false);
        }
        if state.recv_end {
            // END之后继续发数据是协议错误
            return Err(Reason::PROTOCOL_ERROR);
        }
        if !payload.is_empty() {
            state.recv_buf.push_back(payload);
        }
        if end {
            state.recv_end = true;
        }
        drop(state);
        self.recv_notify.notify_waiters();
        Ok(true)
    }

    /// 驱动任务收到该流的RESET帧
    pub fn recv_reset(&self, reason: Reason) {
        let mut state = self.state();
        state.peer_reset = true;
        if !state.recv_end && !state.input.is_terminal() {
            state.input = HalfState::Aborted(reason);
            state.recv_buf.clear();
        }
        if !state.output.is_terminal() {
            state.output = HalfState::Aborted(reason);
            state.peer_stopped = reason == Reason::STREAM_CLOSED || reason == Reason::NO_ERROR;
            state.send_buf.clear();
        }
        drop(state);
        self.recv_notify.notify_waiters();
        self.send_notify.notify_waiters();
    }

    /// 驱动任务收到该流的WINDOW_UPDATE帧
    pub fn recv_window_update(&self, inc: WindowSize) -> Result<(), Reason> {
        let mut state = self.state();
        state.send_flow.inc_window(inc)?;
        drop(state);
        self.send_notify.notify_waiters();
        Ok(())
    }

    /// 连接终止, 终止错误缓存进每个流
    pub fn conn_closed(&self, reason: Reason, initiator: Initiator) {
        let mut state = self.state();
        if state.conn_close.is_none() {
            state.conn_close = Some((reason, initiator));
        }
        drop(state);
        self.recv_notify.notify_waiters();
        self.send_notify.notify_waiters();
    }

    /// 驱动任务取一块已获准发送的数据, 返回(数据, END标志)
    pub fn take_send_chunk(&self, max: usize) -> Option<(Bytes, bool)> {
        let mut state = self.state();
        if state.output.is_terminal() && state.send_buf.is_empty() {
            return None;
        }
        if state.send_buf.is_empty() {
            if state.send_end_requested && !state.end_flushed {
                state.end_flushed = true;
                state.output = HalfState::Completed;
                drop(state);
                self.send_notify.notify_waiters();
                return Some((Bytes::new(), true));
            }
            return None;
        }
        let len = state.send_buf.len().min(max);
        let chunk = state.send_buf.split_to(len).freeze();
        let end = state.send_buf.is_empty() && state.send_end_requested;
        if end {
            state.end_flushed = true;
            state.output = HalfState::Completed;
        }
        drop(state);
        self.send_notify.notify_waiters();
        Some((chunk, end))
    }

    /// 驱动任务取累积的窗口确认, 同时补充本端接收信用
    pub fn take_pending_window(&self) -> Option<WindowSize> {
        let mut state = self.state();
        if state.pending_window == 0 {
            return None;
        }
        let n = state.pending_window;
        state.pending_window = 0;
        // 确认已发给对端, 从此允许对端再发这么多
        if state.recv_flow.inc_window(n).is_err() {
            return None;
        }
        Some(n)
    }

    /// 驱动任务取待发送的RESET
    pub fn take_pending_reset(&self) -> Option<Reason> {
        let mut state = self.state();
        if state.reset_sent {
            return None;
        }
        let reason = state.reset_pending.take()?;
        state.reset_sent = true;
        Some(reason)
    }

    /// 本端重置整个流: 两个半边就地终止, 并向对端补发RESET.
    /// `complete_input`为真时输入半边按正常完成记录, 供提前读完的场景
    pub fn local_reset(&self, reason: Reason, complete_input: bool) {
        let mut state = self.state();
        // 对端已发END的输入不作废, 缓存的数据仍可读完
        if !state.input.is_terminal() && !state.recv_end {
            state.input = if complete_input {
                HalfState::Completed
            } else {
                HalfState::Aborted(reason)
            };
            state.recv_buf.clear();
        }
        if !state.output.is_terminal() {
            state.output = HalfState::Aborted(reason);
            state.send_buf.clear();
        }
        if !state.reset_sent && state.reset_pending.is_none() {
            state.reset_pending = Some(reason);
        }
        drop(state);
        self.recv_notify.notify_waiters();
        self.send_notify.notify_waiters();
        self.wake_conn();
    }

    /// 读句柄被丢弃: 输入半边就地完成, 之后到达的数据按滞后帧丢弃,
    /// 已缓存与未确认的字节立即归还窗口, 不向对端发RESET
    pub fn discard_input(&self, unacked: WindowSize) {
        let mut state = self.state();
        let mut credit = unacked;
        while let Some(chunk) = state.recv_buf.pop_front() {
            credit += chunk.len() as WindowSize;
        }
        if !state.input.is_terminal() {
            state.input = HalfState::Completed;
        }
        if credit > 0 {
            state.pending_window += credit;
        }
        drop(state);
        self.wake_conn();
    }

    /// 准入名额以双方都能观察到的线路事件为准释放:
    /// 两个方向的END都已走线, 或任意一端的RESET已走线.
    /// 本地句柄的去留不参与, 否则两端的计数会漂移
    pub fn is_fully_terminal(&self) -> bool {
        let state = self.state();
        let reset_done = state.reset_sent || state.peer_reset;
        let input_done = state.recv_end || reset_done;
        let output_done = state.end_flushed || reset_done;
        input_done && output_done && state.send_buf.is_empty()
    }

    pub fn has_send_interest(&self) -> bool {
        let state = self.state();
        !state.send_buf.is_empty()
            || (state.send_end_requested && !state.end_flushed && !state.output.is_terminal())
            || state.pending_window > 0
            || (state.reset_pending.is_some() && !state.reset_sent)
    }
}

impl std::fmt::Debug for InnerStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InnerStream").field("id", &self.id).finish()
    }
}

impl StreamState {
    /// 句柄侧统一的错误出口: 流重置或连接终止都在这里兑现
    pub fn check_error(&self) -> Result<(), ProtError> {
        if let Some((reason, initiator)) = self.conn_close {
            return Err(ProtError::from_close(reason, initiator));
        }
        Ok(())
    }

    pub fn admit_send(&mut self, data: &mut Bytes) -> usize {
        let budget = self.send_flow.available() as usize;
        let len = budget.min(data.len());
        if len > 0 {
            self.send_flow.send_data(len as WindowSize);
            self.send_buf.extend_from_slice(&data.chunk()[..len]);
            data.advance(len);
            self.wrote_any = true;
        }
        len
    }
}
