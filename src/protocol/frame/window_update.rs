use bytes::{Buf, BufMut};

use crate::frame::{Flag, FrameHeader, Kind, Reason, StreamIdentifier};
use crate::{ProtError, ProtResult};

/// 流量窗口补充, CONNECTION标志保留给连接级配额
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowUpdate {
    id: StreamIdentifier,
    connection: bool,
    size_increment: u32,
}

impl WindowUpdate {
    pub fn new(id: StreamIdentifier, size_increment: u32) -> WindowUpdate {
        WindowUpdate {
            id,
            connection: false,
            size_increment,
        }
    }

    pub fn stream_id(&self) -> StreamIdentifier {
        self.id
    }

    pub fn is_connection(&self) -> bool {
        self.connection
    }

    pub fn size_increment(&self) -> u32 {
        self.size_increment
    }

    pub fn parse(head: FrameHeader, mut payload: impl Buf) -> ProtResult<WindowUpdate> {
        if head.length() != 4 {
            return Err(ProtError::library_go_away(Reason::PROTOCOL_ERROR));
        }
        let size_increment = payload.get_u32();
        if size_increment == 0 {
            return Err(ProtError::library_go_away(Reason::FLOW_CONTROL_ERROR));
        }
        Ok(WindowUpdate {
            id: head.stream_id(),
            connection: head.flag().contains(Flag::CONNECTION),
            size_increment,
        })
    }

    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        let flag = if self.connection {
            Flag::CONNECTION
        } else {
            Flag::zero()
        };
        FrameHeader::new(Kind::WindowUpdate, flag, self.id).encode(buf, 4);
        buf.put_u32(self.size_increment);
    }
}
