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

mod data;
mod go_away;
mod head;
mod open;
mod ping;
mod reason;
mod reset;
mod settings;
mod window_update;

pub use self::data::Data;
pub use self::go_away::GoAway;
pub use self::head::{Flag, FrameHeader, Kind, Role, StreamIdentifier, FRAME_HEADER_LEN};
pub use self::open::Open;
pub use self::ping::Ping;
pub use self::reason::Reason;
pub use self::reset::Reset;
pub use self::settings::Settings;
pub use self::window_update::WindowUpdate;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{ProtError, ProtResult};

pub type WindowSize = u32;

pub const MAX_WINDOW_SIZE: WindowSize = (1 << 31) - 1;
pub const DEFAULT_INITIAL_WINDOW_SIZE: WindowSize = 65_535;
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16_384;
pub const MAX_MAX_FRAME_SIZE: u32 = (1 << 24) - 1;
pub const DEFAULT_MAX_STREAMS: u32 = 100;

#[derive(Debug, Clone)]
pub enum Frame {
    Settings(Settings),
    Open(Open),
    Data(Data),
    WindowUpdate(WindowUpdate),
    Reset(Reset),
    GoAway(GoAway),
    Ping(Ping),
}

impl Frame {
    /// 解析一个完整的帧, `bytes`包含帧头与全部负载
    pub fn parse(mut bytes: BytesMut) -> ProtResult<Frame> {
        if bytes.len() < FRAME_HEADER_LEN {
            return Err(ProtError::library_go_away(Reason::PROTOCOL_ERROR));
        }
        let head = FrameHeader::parse(&mut bytes);
        if bytes.remaining() != head.length() as usize {
            return Err(ProtError::library_go_away(Reason::PROTOCOL_ERROR));
        }
        let payload: Bytes = bytes.freeze();
        let frame = match head.kind() {
            Kind::Settings => Frame::Settings(Settings::parse(head, payload)?),
            Kind::Open => Frame::Open(Open::parse(head)?),
            Kind::Data => Frame::Data(Data::parse(head, payload)),
            Kind::WindowUpdate => Frame::WindowUpdate(WindowUpdate::parse(head, payload)?),
            Kind::Reset => Frame::Reset(Reset::parse(head, payload)?),
            Kind::GoAway => Frame::GoAway(GoAway::parse(head, payload)?),
            Kind::Ping => Frame::Ping(Ping::parse(head, payload)?),
            Kind::Unregistered => {
                return Err(ProtError::library_go_away(Reason::PROTOCOL_ERROR));
            }
        };
        Ok(frame)
    }

    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        match self {
            Frame::Settings(v) => v.encode(buf),
            Frame::Open(v) => v.encode(buf),
            Frame::Data(v) => v.encode(buf),
            Frame::WindowUpdate(v) => v.encode(buf),
            Frame::Reset(v) => v.encode(buf),
            Frame::GoAway(v) => v.encode(buf),
            Frame::Ping(v) => v.encode(buf),
        }
    }

    pub fn stream_id(&self) -> StreamIdentifier {
        match self {
            Frame::Open(v) => v.stream_id(),
            Frame::Data(v) => v.stream_id(),
            Frame::WindowUpdate(v) => v.stream_id(),
            Frame::Reset(v) => v.stream_id(),
            _ => StreamIdentifier::zero(),
        }
    }

    pub fn is_end_stream(&self) -> bool {
        match self {
            Frame::Data(v) => v.is_end_stream(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(frame: Frame) -> Frame {
        let mut buf = BytesMut::new();
        frame.encode(&mut buf);
        Frame::parse(buf).unwrap()
    }

    #[test]
    fn frame_round_trip() {
        match round_trip(Frame::Open(Open::new(StreamIdentifier(4)))) {
            Frame::Open(v) => {
                assert_eq!(v.stream_id(), StreamIdentifier(4));
                assert!(v.is_bidirectional());
            }
            f => panic!("unexpected frame {:?}", f),
        }

        let mut data = Data::new(StreamIdentifier(9), Bytes::from_static(b"hello"));
        data.set_end_stream(true);
        match round_trip(Frame::Data(data)) {
            Frame::Data(v) => {
                assert_eq!(v.payload().as_ref(), b"hello");
                assert!(v.is_end_stream());
                assert_eq!(v.stream_id(), StreamIdentifier(9));
            }
            f => panic!("unexpected frame {:?}", f),
        }

        match round_trip(Frame::Reset(Reset::new(StreamIdentifier(2), Reason::STREAM_CLOSED))) {
            Frame::Reset(v) => assert_eq!(v.reason(), Reason::STREAM_CLOSED),
            f => panic!("unexpected frame {:?}", f),
        }

        match round_trip(Frame::GoAway(GoAway::new(StreamIdentifier(8), Reason::SERVER_BUSY))) {
            Frame::GoAway(v) => {
                assert_eq!(v.reason(), Reason::SERVER_BUSY);
                assert_eq!(v.last_stream_id(), StreamIdentifier(8));
            }
            f => panic!("unexpected frame {:?}", f),
        }

        match round_trip(Frame::Ping(Ping::new(*b"12345678"))) {
            Frame::Ping(v) => {
                assert!(!v.is_ack());
                assert_eq!(v.payload(), b"12345678");
            }
            f => panic!("unexpected frame {:?}", f),
        }
    }

    #[test]
    fn zero_window_update_rejected() {
        let mut buf = BytesMut::new();
        FrameHeader::new(Kind::WindowUpdate, Flag::zero(), StreamIdentifier(4)).encode(&mut buf, 4);
        buf.put_u32(0);
        assert!(Frame::parse(buf).is_err());
    }
}
