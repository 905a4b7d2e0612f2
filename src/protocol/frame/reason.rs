use std::fmt;

/// 关闭错误码, 在线路上以u32传输
#[derive(PartialEq, Eq, Clone, Copy, Hash)]
pub struct Reason(u32);

impl Reason {
    pub const NO_ERROR: Reason = Reason(0);
    pub const PROTOCOL_ERROR: Reason = Reason(1);
    pub const INTERNAL_ERROR: Reason = Reason(2);
    pub const FLOW_CONTROL_ERROR: Reason = Reason(3);
    pub const STREAM_CLOSED: Reason = Reason(4);
    pub const IDLE_TIMEOUT: Reason = Reason(5);
    pub const SERVER_BUSY: Reason = Reason(6);

    /// 应用自定义错误码的起始值, 之上的值原样透传给对端
    pub const APPLICATION_BASE: u32 = 0x1000_0000;

    pub fn application(code: u32) -> Reason {
        Reason(Self::APPLICATION_BASE + code)
    }

    pub fn is_application(&self) -> bool {
        self.0 >= Self::APPLICATION_BASE
    }

    pub fn is_recognized(&self) -> bool {
        self.0 <= Self::SERVER_BUSY.0
    }

    pub fn description(&self) -> &str {
        match self.0 {
            0 => "not a result of an error",
            1 => "detected an unspecific protocol error",
            2 => "encountered an unexpected internal error",
            3 => "violated the flow-control protocol",
            4 => "received frame for closed stream",
            5 => "connection idle beyond the negotiated timeout",
            6 => "refusing new work, try against a different peer",
            _ => {
                if self.is_application() {
                    "application defined close code"
                } else {
                    "unknown reason"
                }
            }
        }
    }
}

impl From<u32> for Reason {
    fn from(src: u32) -> Reason {
        Reason(src)
    }
}

impl From<Reason> for u32 {
    fn from(src: Reason) -> u32 {
        src.0
    }
}

impl fmt::Debug for Reason {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.0 {
            0 => "NO_ERROR",
            1 => "PROTOCOL_ERROR",
            2 => "INTERNAL_ERROR",
            3 => "FLOW_CONTROL_ERROR",
            4 => "STREAM_CLOSED",
            5 => "IDLE_TIMEOUT",
            6 => "SERVER_BUSY",
            _ => return write!(fmt, "Reason({:#x})", self.0),
        };
        fmt.write_str(name)
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(self.description())
    }
}
