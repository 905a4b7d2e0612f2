use bytes::BufMut;

use crate::frame::{Flag, FrameHeader, Kind, Reason, StreamIdentifier};
use crate::{ProtError, ProtResult};

/// 新流通告, 方向与发起方由流号低位决定, 无负载
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Open {
    id: StreamIdentifier,
}

impl Open {
    pub fn new(id: StreamIdentifier) -> Open {
        Open { id }
    }

    pub fn stream_id(&self) -> StreamIdentifier {
        self.id
    }

    pub fn is_bidirectional(&self) -> bool {
        self.id.is_bidirectional()
    }

    pub fn parse(head: FrameHeader) -> ProtResult<Open> {
        if head.length() != 0 {
            return Err(ProtError::library_go_away(Reason::PROTOCOL_ERROR));
        }
        Ok(Open {
            id: head.stream_id(),
        })
    }

    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        FrameHeader::new(Kind::Open, Flag::zero(), self.id).encode(buf, 0);
    }
}
