use crate::frame::{Reason, WindowSize, MAX_WINDOW_SIZE};

/// 单个流单方向的信用窗口, 纯状态不做IO
#[derive(Debug, Clone, Copy)]
pub struct FlowControl {
    window_size: i32,
}

impl FlowControl {
    pub fn new(default: WindowSize) -> Self {
        Self {
            window_size: default as i32,
        }
    }

    pub fn window_size(&self) -> i32 {
        self.window_size
    }

    pub fn is_available(&self) -> bool {
        self.window_size > 0
    }

    pub fn available(&self) -> WindowSize {
        if self.window_size < 0 {
            0
        } else {
            self.window_size as WindowSize
        }
    }

    /// 收到窗口补充, 溢出则为流量协议错误
    pub fn inc_window(&mut self, sz: WindowSize) -> Result<(), Reason> {
        let (val, overflow) = self.window_size.overflowing_add(sz as i32);

        if overflow || val > MAX_WINDOW_SIZE as i32 {
            return Err(Reason::FLOW_CONTROL_ERROR);
        }

        tracing::trace!("inc_window; sz={}; old={}; new={}", sz, self.window_size, val);
        self.window_size = val;
        Ok(())
    }

    /// 发送侧扣减, 调用方必须先用`available`限幅
    pub fn send_data(&mut self, sz: WindowSize) {
        tracing::trace!("send_data; sz={}; window={}", sz, self.window_size);
        debug_assert!(sz <= self.available());
        self.window_size -= sz as i32;
    }

    /// 接收侧扣减, 对端超发则为流量协议错误
    pub fn recv_data(&mut self, sz: WindowSize) -> Result<(), Reason> {
        tracing::trace!("recv_data; sz={}; window={}", sz, self.window_size);
        if (sz as i32) > self.window_size {
            return Err(Reason::FLOW_CONTROL_ERROR);
        }
        self.window_size -= sz as i32;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_arithmetic() {
        let mut flow = FlowControl::new(10);
        assert!(flow.is_available());
        flow.send_data(10);
        assert!(!flow.is_available());
        assert_eq!(flow.available(), 0);

        flow.inc_window(4).unwrap();
        assert_eq!(flow.available(), 4);
        assert_eq!(flow.window_size(), 4);
    }

    #[test]
    fn recv_overrun_rejected() {
        let mut flow = FlowControl::new(4);
        flow.recv_data(4).unwrap();
        assert_eq!(flow.recv_data(1), Err(Reason::FLOW_CONTROL_ERROR));
    }

    #[test]
    fn window_overflow_rejected() {
        let mut flow = FlowControl::new(MAX_WINDOW_SIZE);
        assert_eq!(flow.inc_window(1), Err(Reason::FLOW_CONTROL_ERROR));
    }
}
