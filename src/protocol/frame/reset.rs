use bytes::{Buf, BufMut};

use crate::frame::{Flag, FrameHeader, Kind, Reason, StreamIdentifier};
use crate::{ProtError, ProtResult};

/// 单个流的终止通告, 双向立即生效, 不影响同连接的其它流
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reset {
    id: StreamIdentifier,
    error_code: Reason,
}

impl Reset {
    pub fn new(id: StreamIdentifier, error_code: Reason) -> Reset {
        Reset { id, error_code }
    }

    pub fn stream_id(&self) -> StreamIdentifier {
        self.id
    }

    pub fn reason(&self) -> Reason {
        self.error_code
    }

    pub fn parse(head: FrameHeader, mut payload: impl Buf) -> ProtResult<Reset> {
        if head.length() != 4 {
            return Err(ProtError::library_go_away(Reason::PROTOCOL_ERROR));
        }
        Ok(Reset {
            id: head.stream_id(),
            error_code: payload.get_u32().into(),
        })
    }

    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        FrameHeader::new(Kind::Reset, Flag::zero(), self.id).encode(buf, 4);
        buf.put_u32(self.error_code.into());
    }
}
