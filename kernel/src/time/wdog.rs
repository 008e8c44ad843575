//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 看门狗定时器
//!
//! 定时器节点由使用方拥有（通常在栈上或嵌在别的结构里），
//! 激活后挂入调度器按到期时间排序的队列，到期滴答里由
//! scheduler_tick 摘下并在临界区外执行回调。

use core::ptr;

use crate::errno::{Errno, KernResult};
use crate::list::ListHead;
use crate::sched::{self, Scheduler};

/// 看门狗回调类型
///
/// 在时钟中断路径上执行，不得阻塞；拿到触发它的调度器引用，
/// 可以直接做唤醒类操作
pub type WdogFn = fn(&Scheduler, *mut u8);

/// 看门狗定时器
///
/// 激活后（挂链后）不得移动
#[repr(C)]
pub struct Wdog {
    /// 定时器队列挂链节点
    pub(crate) node: ListHead,
    /// 到期滴答
    pub(crate) deadline: u64,
    /// 到期回调
    pub(crate) func: Option<WdogFn>,
    /// 回调参数
    pub(crate) arg: *mut u8,
    /// 是否在定时器队列里
    pub(crate) active: bool,
}

// SAFETY: 队列操作全部在调度器临界区内
unsafe impl Send for Wdog {}

impl Wdog {
    pub const fn new() -> Self {
        Self {
            node: ListHead::new(),
            deadline: 0,
            func: None,
            arg: ptr::null_mut(),
            active: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// 到期滴答（激活时有效）
    pub fn deadline(&self) -> u64 {
        self.deadline
    }
}

impl Default for Wdog {
    fn default() -> Self {
        Self::new()
    }
}

/// 在全局调度器上启动看门狗
pub fn wdog_start(wdog: &mut Wdog, delay: u64, func: WdogFn, arg: *mut u8) -> KernResult<()> {
    match sched::kernel() {
        Some(k) => k.wdog_start(wdog, delay, func, arg),
        None => {
            log::error!("wdog_start before scheduler init");
            Err(Errno::OperationNotPermitted)
        }
    }
}

/// 停止尚未触发的看门狗
pub fn wdog_cancel(wdog: &mut Wdog) -> KernResult<()> {
    match sched::kernel() {
        Some(k) => k.wdog_cancel(wdog),
        None => {
            log::error!("wdog_cancel before scheduler init");
            Err(Errno::OperationNotPermitted)
        }
    }
}
