use bytes::{Buf, BufMut};

use crate::frame::{Flag, FrameHeader, Kind, Reason, StreamIdentifier};
use crate::{ProtError, ProtResult};

/// 保活探测帧, 8字节负载原样回显
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ping {
    ack: bool,
    payload: [u8; 8],
}

impl Ping {
    pub fn new(payload: [u8; 8]) -> Ping {
        Ping {
            ack: false,
            payload,
        }
    }

    pub fn rand() -> Ping {
        Ping::new(rand::random::<u64>().to_be_bytes())
    }

    pub fn is_ack(&self) -> bool {
        self.ack
    }

    pub fn payload(&self) -> &[u8; 8] {
        &self.payload
    }

    /// 回应探测: 原负载回发, 置ACK标志
    pub fn ret_pong(self) -> Ping {
        Ping {
            ack: true,
            payload: self.payload,
        }
    }

    pub fn parse(head: FrameHeader, mut payload: impl Buf) -> ProtResult<Ping> {
        if head.length() != 8 {
            return Err(ProtError::library_go_away(Reason::PROTOCOL_ERROR));
        }
        let mut data = [0u8; 8];
        payload.copy_to_slice(&mut data);
        Ok(Ping {
            ack: head.flag().contains(Flag::ACK),
            payload: data,
        })
    }

    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        let flag = if self.ack { Flag::ACK } else { Flag::zero() };
        FrameHeader::new(Kind::Ping, flag, StreamIdentifier::zero()).encode(buf, 8);
        buf.put_slice(&self.payload);
    }
}
