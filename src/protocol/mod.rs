pub mod codec;
mod error;
pub mod frame;
pub mod mux;
pub mod transport;

pub use self::error::{Initiator, ProtError, ProtResult};
pub use self::frame::{Reason, StreamIdentifier};
pub use self::mux::{
    Builder, IdleTimeout, MuxConnection, MuxOptions, MuxStream, RecvStream, SendStream,
    WriteOutcome,
};
