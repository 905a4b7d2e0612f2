use bytes::{BufMut, Bytes};

use crate::frame::{Flag, FrameHeader, Kind, StreamIdentifier};

#[derive(Debug, Clone)]
pub struct Data {
    id: StreamIdentifier,
    end_stream: bool,
    payload: Bytes,
}

impl Data {
    pub fn new(id: StreamIdentifier, payload: Bytes) -> Data {
        Data {
            id,
            end_stream: false,
            payload,
        }
    }

    pub fn stream_id(&self) -> StreamIdentifier {
        self.id
    }

    pub fn is_end_stream(&self) -> bool {
        self.end_stream
    }

    pub fn set_end_stream(&mut self, end: bool) {
        self.end_stream = end;
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    pub fn parse(head: FrameHeader, payload: Bytes) -> Data {
        Data {
            id: head.stream_id(),
            end_stream: head.flag().contains(Flag::END_STREAM),
            payload,
        }
    }

    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        let mut flag = Flag::zero();
        if self.end_stream {
            flag.set(Flag::END_STREAM);
        }
        FrameHeader::new(Kind::Data, flag, self.id).encode(buf, self.payload.len());
        buf.put_slice(&self.payload);
    }
}
