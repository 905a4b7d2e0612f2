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

use bytes::{Buf, BufMut};

use crate::frame::{Flag, FrameHeader, Kind, Reason, StreamIdentifier};
use crate::{ProtError, ProtResult};

/// 握手时双方各自通告的参数, 由 (u16 id, u32 value) 对组成,
/// 握手完成后不再变更
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    flag: Flag,
    max_bidirectional_streams: Option<u32>,
    max_unidirectional_streams: Option<u32>,
    initial_window_size: Option<u32>,
    idle_timeout_ms: Option<u32>,
}

const SETTINGS_MAX_BIDI_STREAMS: u16 = 0x1;
const SETTINGS_MAX_UNI_STREAMS: u16 = 0x2;
const SETTINGS_INITIAL_WINDOW_SIZE: u16 = 0x3;
const SETTINGS_IDLE_TIMEOUT_MS: u16 = 0x4;

impl Settings {
    pub fn ack() -> Settings {
        Settings {
            flag: Flag::ACK,
            ..Settings::default()
        }
    }

    pub fn is_ack(&self) -> bool {
        self.flag.contains(Flag::ACK)
    }

    pub fn max_bidirectional_streams(&self) -> Option<u32> {
        self.max_bidirectional_streams
    }

    pub fn set_max_bidirectional_streams(&mut self, val: Option<u32>) {
        self.max_bidirectional_streams = val;
    }

    pub fn max_unidirectional_streams(&self) -> Option<u32> {
        self.max_unidirectional_streams
    }

    pub fn set_max_unidirectional_streams(&mut self, val: Option<u32>) {
        self.max_unidirectional_streams = val;
    }

    pub fn initial_window_size(&self) -> Option<u32> {
        self.initial_window_size
    }

    pub fn set_initial_window_size(&mut self, val: Option<u32>) {
        self.initial_window_size = val;
    }

    pub fn idle_timeout_ms(&self) -> Option<u32> {
        self.idle_timeout_ms
    }

    pub fn set_idle_timeout_ms(&mut self, val: Option<u32>) {
        self.idle_timeout_ms = val;
    }

    pub fn parse(head: FrameHeader, mut payload: impl Buf) -> ProtResult<Settings> {
        if head.length() % 6 != 0 {
            return Err(ProtError::library_go_away(Reason::PROTOCOL_ERROR));
        }
        let mut settings = Settings {
            flag: head.flag(),
            ..Settings::default()
        };
        if settings.is_ack() && head.length() != 0 {
            return Err(ProtError::library_go_away(Reason::PROTOCOL_ERROR));
        }
        while payload.remaining() >= 6 {
            let id = payload.get_u16();
            let value = payload.get_u32();
            match id {
                SETTINGS_MAX_BIDI_STREAMS => settings.max_bidirectional_streams = Some(value),
                SETTINGS_MAX_UNI_STREAMS => settings.max_unidirectional_streams = Some(value),
                SETTINGS_INITIAL_WINDOW_SIZE => settings.initial_window_size = Some(value),
                SETTINGS_IDLE_TIMEOUT_MS => settings.idle_timeout_ms = Some(value),
                // 未知配置项跳过, 保持向前兼容
                _ => {}
            }
        }
        Ok(settings)
    }

    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        let head = FrameHeader::new(Kind::Settings, self.flag, StreamIdentifier::zero());
        let mut payload_len = 0;
        self.for_each(|_, _| payload_len += 6);
        head.encode(buf, payload_len);
        self.for_each(|id, value| {
            buf.put_u16(id);
            buf.put_u32(value);
        });
    }

    fn for_each<F: FnMut(u16, u32)>(&self, mut f: F) {
        if let Some(v) = self.max_bidirectional_streams {
            f(SETTINGS_MAX_BIDI_STREAMS, v);
        }
        if let Some(v) = self.max_unidirectional_streams {
            f(SETTINGS_MAX_UNI_STREAMS, v);
        }
        if let Some(v) = self.initial_window_size {
            f(SETTINGS_INITIAL_WINDOW_SIZE, v);
        }
        if let Some(v) = self.idle_timeout_ms {
            f(SETTINGS_IDLE_TIMEOUT_MS, v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use crate::frame::FRAME_HEADER_LEN;

    #[test]
    fn settings_round_trip() {
        let mut settings = Settings::default();
        settings.set_max_bidirectional_streams(Some(16));
        settings.set_initial_window_size(Some(65535));
        settings.set_idle_timeout_ms(Some(30_000));

        let mut buf = BytesMut::new();
        settings.encode(&mut buf);
        assert_eq!(buf.len(), FRAME_HEADER_LEN + 3 * 6);

        let head = FrameHeader::parse(&mut buf);
        let parsed = Settings::parse(head, buf).unwrap();
        assert_eq!(parsed.max_bidirectional_streams(), Some(16));
        assert_eq!(parsed.max_unidirectional_streams(), None);
        assert_eq!(parsed.initial_window_size(), Some(65535));
        assert_eq!(parsed.idle_timeout_ms(), Some(30_000));
        assert!(!parsed.is_ack());
    }

    #[test]
    fn settings_ack() {
        let mut buf = BytesMut::new();
        Settings::ack().encode(&mut buf);
        let head = FrameHeader::parse(&mut buf);
        assert!(Settings::parse(head, buf).unwrap().is_ack());
    }
}
