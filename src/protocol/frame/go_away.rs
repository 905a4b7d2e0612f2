use bytes::{Buf, BufMut, Bytes};

use crate::frame::{Flag, FrameHeader, Kind, Reason, StreamIdentifier};
use crate::{ProtError, ProtResult};

/// 连接级关闭通告, 携带错误码与本端已处理的最后一个对端流号
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoAway {
    last_stream_id: StreamIdentifier,
    error_code: Reason,
    debug_data: Bytes,
}

impl GoAway {
    pub fn new(last_stream_id: StreamIdentifier, reason: Reason) -> GoAway {
        GoAway {
            last_stream_id,
            error_code: reason,
            debug_data: Bytes::new(),
        }
    }

    pub fn with_debug_data(
        last_stream_id: StreamIdentifier,
        reason: Reason,
        debug_data: Bytes,
    ) -> GoAway {
        GoAway {
            last_stream_id,
            error_code: reason,
            debug_data,
        }
    }

    pub fn last_stream_id(&self) -> StreamIdentifier {
        self.last_stream_id
    }

    pub fn reason(&self) -> Reason {
        self.error_code
    }

    pub fn debug_data(&self) -> &Bytes {
        &self.debug_data
    }

    pub fn parse(head: FrameHeader, mut payload: Bytes) -> ProtResult<GoAway> {
        if head.length() < 8 {
            return Err(ProtError::library_go_away(Reason::PROTOCOL_ERROR));
        }
        let last_stream_id = StreamIdentifier(payload.get_u32());
        let error_code = payload.get_u32().into();
        Ok(GoAway {
            last_stream_id,
            error_code,
            debug_data: payload,
        })
    }

    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        let head = FrameHeader::new(Kind::GoAway, Flag::zero(), StreamIdentifier::zero());
        head.encode(buf, 8 + self.debug_data.len());
        buf.put_u32(self.last_stream_id.0);
        buf.put_u32(self.error_code.into());
        buf.put_slice(&self.debug_data);
    }
}
