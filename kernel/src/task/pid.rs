//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! PID 管理
//!
//! - PID 0: 保留给 idle/引导上下文
//! - PID 1+: 普通任务

use core::sync::atomic::{AtomicU32, Ordering};

use crate::task::Pid;

pub const PID_MAX_LIMIT: u32 = 32768;

/// idle/引导上下文保留 id
pub const PID_IDLE: Pid = 0;

static NEXT_PID: AtomicU32 = AtomicU32::new(PID_IDLE + 1);

pub fn alloc_pid() -> Option<Pid> {
    let pid = NEXT_PID.fetch_add(1, Ordering::Relaxed);
    if pid >= PID_MAX_LIMIT {
        // TODO: 实现 PID 位图复用
        None
    } else {
        Some(pid)
    }
}

pub fn free_pid(_pid: Pid) {
    // TODO: 实现 PID 位图释放
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_pid_monotonic() {
        let a = alloc_pid().unwrap();
        let b = alloc_pid().unwrap();
        assert!(b > a);
        assert_ne!(a, PID_IDLE);
    }
}
