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

use std::fmt;

use bytes::{Buf, BufMut};

/// 帧头固定长度: 3字节长度 + 1字节类型 + 1字节标志 + 4字节流号
pub const FRAME_HEADER_LEN: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    length: u32,
    kind: Kind,
    flag: Flag,
    id: StreamIdentifier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Settings = 0,
    Open = 1,
    Data = 2,
    WindowUpdate = 3,
    Reset = 4,
    GoAway = 5,
    Ping = 6,
    Unregistered = 255,
}

impl Kind {
    pub fn new(byte: u8) -> Kind {
        match byte {
            0 => Kind::Settings,
            1 => Kind::Open,
            2 => Kind::Data,
            3 => Kind::WindowUpdate,
            4 => Kind::Reset,
            5 => Kind::GoAway,
            6 => Kind::Ping,
            _ => Kind::Unregistered,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Flag(u8);

impl Flag {
    pub const ACK: Flag = Flag(0x1);
    pub const END_STREAM: Flag = Flag(0x1);
    pub const CONNECTION: Flag = Flag(0x1);

    pub fn new(byte: u8) -> Flag {
        Flag(byte)
    }

    pub fn zero() -> Flag {
        Flag(0)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn contains(&self, other: Flag) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn set(&mut self, other: Flag) {
        self.0 |= other.0;
    }
}

impl fmt::Debug for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Flag({:#x})", self.0)
    }
}

/// 流号, 低位编码发起方与方向:
/// bit0: 0为客户端发起, 1为服务端发起
/// bit1: 0为双向流, 1为单向流
/// 同类流的第n条, 流号为 n * 4 + 类型位
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamIdentifier(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

impl StreamIdentifier {
    pub fn zero() -> StreamIdentifier {
        StreamIdentifier(0)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn new(ordinal: u32, role: Role, bidirectional: bool) -> StreamIdentifier {
        let mut bits = 0;
        if role == Role::Server {
            bits |= 0x1;
        }
        if !bidirectional {
            bits |= 0x2;
        }
        StreamIdentifier(ordinal * 4 + bits)
    }

    pub fn is_client_initiated(&self) -> bool {
        self.0 & 0x1 == 0
    }

    pub fn is_server_initiated(&self) -> bool {
        self.0 & 0x1 == 1
    }

    pub fn is_bidirectional(&self) -> bool {
        self.0 & 0x2 == 0
    }

    pub fn is_unidirectional(&self) -> bool {
        self.0 & 0x2 != 0
    }

    pub fn initiator(&self) -> Role {
        if self.is_client_initiated() {
            Role::Client
        } else {
            Role::Server
        }
    }

    pub fn is_local_init(&self, role: Role) -> bool {
        self.initiator() == role
    }

    /// 该流在其类型内的序号
    pub fn ordinal(&self) -> u32 {
        self.0 >> 2
    }
}

impl fmt::Display for StreamIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<u32> for StreamIdentifier {
    fn from(value: u32) -> Self {
        StreamIdentifier(value)
    }
}

impl FrameHeader {
    pub fn new(kind: Kind, flag: Flag, id: StreamIdentifier) -> FrameHeader {
        FrameHeader {
            length: 0,
            kind,
            flag,
            id,
        }
    }

    pub fn parse<B: Buf>(buf: &mut B) -> FrameHeader {
        debug_assert!(buf.remaining() >= FRAME_HEADER_LEN);
        let length = (buf.get_u8() as u32) << 16 | (buf.get_u8() as u32) << 8 | buf.get_u8() as u32;
        let kind = Kind::new(buf.get_u8());
        let flag = Flag::new(buf.get_u8());
        let id = StreamIdentifier(buf.get_u32());
        FrameHeader {
            length,
            kind,
            flag,
            id,
        }
    }

    pub fn encode<B: BufMut>(&self, buf: &mut B, payload_len: usize) {
        buf.put_u8((payload_len >> 16) as u8);
        buf.put_u8((payload_len >> 8) as u8);
        buf.put_u8(payload_len as u8);
        buf.put_u8(self.kind as u8);
        buf.put_u8(self.flag.bits());
        buf.put_u32(self.id.0);
    }

    pub fn length(&self) -> u32 {
        self.length
    }

    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    pub fn flag(&self) -> Flag {
        self.flag
    }

    pub fn stream_id(&self) -> StreamIdentifier {
        self.id
    }
}
