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

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::frame::{Reason, Role, StreamIdentifier};
use crate::protocol::mux::inner_stream::InnerStream;
use crate::protocol::mux::stream::MuxStream;
use crate::{ProtError, ProtResult};

/// 等待准入名额的createStream调用, FIFO唤醒
pub struct OpenWaiter {
    pub bidirectional: bool,
    pub resp: oneshot::Sender<ProtResult<MuxStream>>,
}

/// 流注册表: 流号到流的映射、流号分配、双向/单向各自的准入配额
pub struct StreamRegistry {
    role: Role,
    streams: HashMap<StreamIdentifier, Arc<InnerStream>>,

    /// 本端可同时发起的上限, 来自对端握手通告
    max_create_bidi: usize,
    max_create_uni: usize,
    /// 对端可同时发起的上限, 即本端握手通告值
    max_accept_bidi: usize,
    max_accept_uni: usize,

    count_create_bidi: usize,
    count_create_uni: usize,
    count_accept_bidi: usize,
    count_accept_uni: usize,

    /// 本端各类型的下一序号
    next_bidi: u32,
    next_uni: u32,
    /// 对端各类型期望的下一序号, 用于重复与单调性判定
    next_remote_bidi: u32,
    next_remote_uni: u32,

    waiters_bidi: VecDeque<OpenWaiter>,
    waiters_uni: VecDeque<OpenWaiter>,
}

impl StreamRegistry {
    pub fn new(
        role: Role,
        max_create_bidi: usize,
        max_create_uni: usize,
        max_accept_bidi: usize,
        max_accept_uni: usize,
    ) -> Self {
        StreamRegistry {
            role,
            streams: HashMap::new(),
            max_create_bidi,
            max_create_uni,
            max_accept_bidi,
            max_accept_uni,
            count_create_bidi: 0,
            count_create_uni: 0,
            count_accept_bidi: 0,
            count_accept_uni: 0,
            next_bidi: 0,
            next_uni: 0,
            next_remote_bidi: 0,
            next_remote_uni: 0,
            waiters_bidi: VecDeque::new(),
            waiters_uni: VecDeque::new(),
        }
    }

    pub fn get(&self, id: &StreamIdentifier) -> Option<&Arc<InnerStream>> {
        self.streams.get(id)
    }

    pub fn insert(&mut self, stream: Arc<InnerStream>) {
        self.streams.insert(stream.id(), stream);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<InnerStream>> {
        self.streams.values()
    }

    pub fn ids(&self) -> Vec<StreamIdentifier> {
        let mut ids: Vec<_> = self.streams.keys().copied().collect();
        // 固定顺序, 数据发送按流号轮转
        ids.sort();
        ids
    }

    /// 本端发起: 有配额则占用一个名额并分配流号
    pub fn try_admit_local(&mut self, bidirectional: bool) -> Option<StreamIdentifier> {
        if bidirectional {
            if self.count_create_bidi >= self.max_create_bidi {
                return None;
            }
            self.count_create_bidi += 1;
            let id = StreamIdentifier::new(self.next_bidi, self.role, true);
            self.next_bidi += 1;
            Some(id)
        } else {
            if self.count_create_uni >= self.max_create_uni {
                return None;
            }
            self.count_create_uni += 1;
            let id = StreamIdentifier::new(self.next_uni, self.role, false);
            self.next_uni += 1;
            Some(id)
        }
    }

    /// 对端发起: 校验类型、单调性与本端通告的上限
    pub fn recv_open(&mut self, id: StreamIdentifier) -> ProtResult<()> {
        if id.is_local_init(self.role) {
            // 对端用了本端的流号空间
            return Err(ProtError::library_go_away(Reason::PROTOCOL_ERROR));
        }
        let (next, count, max) = if id.is_bidirectional() {
            (
                &mut self.next_remote_bidi,
                &mut self.count_accept_bidi,
                self.max_accept_bidi,
            )
        } else {
            (
                &mut self.next_remote_uni,
                &mut self.count_accept_uni,
                self.max_accept_uni,
            )
        };
        if id.ordinal() < *next {
            // 流号重复或回退
            return Err(ProtError::library_go_away(Reason::PROTOCOL_ERROR));
        }
        if *count >= max {
            // 超过本端通告的并发上限
            return Err(ProtError::library_go_away(Reason::PROTOCOL_ERROR));
        }
        *next = id.ordinal() + 1;
        *count += 1;
        Ok(())
    }

    /// 判断一个未登记的流号是否曾经存在过, 用于滞后帧的丢弃判定
    pub fn is_reclaimed(&self, id: StreamIdentifier) -> bool {
        let next = if id.is_local_init(self.role) {
            if id.is_bidirectional() {
                self.next_bidi
            } else {
                self.next_uni
            }
        } else if id.is_bidirectional() {
            self.next_remote_bidi
        } else {
            self.next_remote_uni
        };
        id.ordinal() < next
    }

    /// 两个半边都终止的流从注册表回收, 释放它占用的准入名额
    pub fn release(&mut self, id: StreamIdentifier) -> Option<Arc<InnerStream>> {
        let stream = self.streams.remove(&id)?;
        if id.is_local_init(self.role) {
            if id.is_bidirectional() {
                self.count_create_bidi -= 1;
            } else {
                self.count_create_uni -= 1;
            }
        } else if id.is_bidirectional() {
            self.count_accept_bidi -= 1;
        } else {
            self.count_accept_uni -= 1;
        }
        Some(stream)
    }

    pub fn push_waiter(&mut self, waiter: OpenWaiter) {
        if waiter.bidirectional {
            self.waiters_bidi.push_back(waiter);
        } else {
            self.waiters_uni.push_back(waiter);
        }
    }

    /// 取下一个仍被等待的createStream调用, 已取消的直接跳过
    pub fn pop_waiter(&mut self, bidirectional: bool) -> Option<OpenWaiter> {
        let queue = if bidirectional {
            &mut self.waiters_bidi
        } else {
            &mut self.waiters_uni
        };
        while let Some(waiter) = queue.pop_front() {
            if !waiter.resp.is_closed() {
                return Some(waiter);
            }
        }
        None
    }

    pub fn has_waiter(&self, bidirectional: bool) -> bool {
        if bidirectional {
            self.waiters_bidi.iter().any(|w| !w.resp.is_closed())
        } else {
            self.waiters_uni.iter().any(|w| !w.resp.is_closed())
        }
    }

    /// 连接终止时唤醒所有等待者并清空
    pub fn take_all_waiters(&mut self) -> Vec<OpenWaiter> {
        self.waiters_bidi
            .drain(..)
            .chain(self.waiters_uni.drain(..))
            .collect()
    }
}
