mod builder;
mod connection;
pub(crate) mod control;
mod flow_control;
mod inner_stream;
mod option;
mod state;
mod stream;
mod streams;

pub use self::builder::Builder;
pub use self::connection::MuxConnection;
pub use self::option::{IdleTimeout, MuxOptions};
pub use self::stream::{MuxStream, RecvStream, SendStream, WriteOutcome};
