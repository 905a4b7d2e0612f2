use std::{fmt::Display, io};

use tokio::sync::mpsc::error::SendError;

use crate::frame::Reason;

pub type ProtResult<T> = Result<T, ProtError>;

#[derive(Debug)]
pub enum ProtError {
    /// 标准错误库的错误类型
    IoError(io::Error),
    /// 连接已中止, 包含传输失败/协议错误/空闲超时/本地dispose
    ConnectionAborted(Reason),
    /// 对端发起的正常关闭
    ConnectionClosedByPeer,
    /// 对端容量不足, 主动拒绝
    ServerBusy,
    /// 单个流被重置, 不影响其它流
    StreamAborted(Reason),
    /// 配置内容不被支持
    InvalidConfiguration(String),
    /// 监听地址已被占用
    AddressInUse,
    /// 内部通道已关闭
    SendError,
    /// 其它错误信息
    Extension(&'static str),
    /// 发生错误或者收到关闭消息将要关闭该链接
    GoAway(Reason, Initiator),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Initiator {
    User,
    Library,
    Remote,
}

impl Display for ProtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtError::IoError(e) => write!(f, "io error: {}", e),
            ProtError::ConnectionAborted(r) => write!(f, "connection aborted: {}", r),
            ProtError::ConnectionClosedByPeer => f.write_str("connection closed by peer"),
            ProtError::ServerBusy => f.write_str("server busy"),
            ProtError::StreamAborted(r) => write!(f, "stream aborted: {}", r),
            ProtError::InvalidConfiguration(s) => write!(f, "invalid configuration: {}", s),
            ProtError::AddressInUse => f.write_str("address in use"),
            ProtError::SendError => f.write_str("send error"),
            ProtError::Extension(s) => write!(f, "extension {}", s),
            ProtError::GoAway(r, _) => write!(f, "go away frame: {}", r),
        }
    }
}

impl std::error::Error for ProtError {}

impl From<io::Error> for ProtError {
    fn from(value: io::Error) -> Self {
        ProtError::IoError(value)
    }
}

impl<T> From<SendError<T>> for ProtError {
    fn from(_: SendError<T>) -> Self {
        ProtError::SendError
    }
}

impl ProtError {
    pub(crate) fn library_go_away(reason: Reason) -> Self {
        Self::GoAway(reason, Initiator::Library)
    }

    /// 连接终止后, 后续所有调用都必须拿到一致的终止错误, 该方法从记录值重建
    pub(crate) fn from_close(reason: Reason, initiator: Initiator) -> Self {
        match initiator {
            Initiator::Remote => {
                if reason == Reason::NO_ERROR {
                    ProtError::ConnectionClosedByPeer
                } else if reason == Reason::SERVER_BUSY {
                    ProtError::ServerBusy
                } else if reason.is_application() || reason.is_recognized() {
                    ProtError::ConnectionAborted(reason)
                } else {
                    ProtError::ConnectionAborted(Reason::INTERNAL_ERROR)
                }
            }
            Initiator::User | Initiator::Library => ProtError::ConnectionAborted(reason),
        }
    }

    pub fn is_io(&self) -> bool {
        matches!(self, ProtError::IoError(_))
    }
}
