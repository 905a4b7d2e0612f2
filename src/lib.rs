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

//! 把一条可靠的双工字节通道切分成多条互不阻塞的逻辑流:
//! 每条流有独立的信用窗口、半关闭语义与错误隔离,
//! 供上层RPC在单个连接上并发跑多个请求.

mod protocol;

pub use protocol::*;
