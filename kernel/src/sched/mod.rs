//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 调度器模块
//!
//! 调度器状态是显式对象（[`Scheduler`]），进程级全局实例经
//! spin::Once 建立；本模块的自由函数是外围子系统（驱动、
//! 文件系统、shell）使用的入口，全部委托给全局实例。
//!
//! 启动顺序约定：[`init`] 必须在任何任务阻塞或时钟中断到来
//! 之前执行一次；时钟中断处理函数调用 [`scheduler_tick`]，
//! 返回真时在中断出口调用 [`schedule`]。

pub mod policy;
pub mod sched;

pub use policy::{FifoPolicy, PolicyKind, RrPolicy, SchedPolicyOps};
pub use sched::{Scheduler, TaskEntry};

use spin::Once;

use crate::errno::{Errno, KernResult};
use crate::klog;
use crate::task::Task;

static KERNEL_SCHED: Once<Scheduler> = Once::new();

/// 初始化全局调度器（开机一次）
///
/// 同时安装内核 Logger，让之后的诊断输出可用
pub fn init(kind: PolicyKind) {
    klog::init();
    KERNEL_SCHED.call_once(|| Scheduler::new(kind));
    log::info!(
        "{} {}: scheduler ready ({:?})",
        crate::config::KERNEL_NAME,
        crate::config::KERNEL_VERSION,
        kind
    );
}

/// 全局调度器实例
pub fn kernel() -> Option<&'static Scheduler> {
    KERNEL_SCHED.get()
}

fn with_kernel<T>(default: T, f: impl FnOnce(&'static Scheduler) -> T) -> T {
    match kernel() {
        Some(k) => f(k),
        None => {
            log::error!("scheduler not initialized");
            default
        }
    }
}

/// 当前运行任务
pub fn current() -> Option<*mut Task> {
    kernel().and_then(|k| k.current())
}

/// 选择并切换到下一个任务
pub fn schedule() {
    with_kernel((), |k| k.schedule());
}

/// 自愿让出 CPU
pub fn yield_cpu() {
    with_kernel((), |k| k.yield_cpu());
}

/// 时钟中断入口；返回真时应在中断出口调用 [`schedule`]
pub fn scheduler_tick() -> bool {
    with_kernel(false, |k| k.scheduler_tick())
}

pub fn need_resched() -> bool {
    with_kernel(false, |k| k.need_resched())
}

pub fn set_need_resched() {
    with_kernel((), |k| k.set_need_resched());
}

/// 当前滴答计数
pub fn get_ticks() -> u64 {
    with_kernel(0, |k| k.get_ticks())
}

/// 创建任务控制块（未入队）
pub fn task_create(name: &str, prio: i32) -> KernResult<*mut Task> {
    with_kernel(Err(Errno::OperationNotPermitted), |k| k.task_create(name, prio))
}

/// 创建 + 播种寄存器 + 入队
pub fn task_run(
    name: &str,
    entry: TaskEntry,
    arg: usize,
    prio: i32,
    stack_size: usize,
) -> KernResult<*mut Task> {
    with_kernel(Err(Errno::OperationNotPermitted), |k| {
        k.task_run(name, entry, arg, prio, stack_size)
    })
}

/// 杀死任务并释放其资源
pub fn task_kill(task: *mut Task) -> KernResult<()> {
    with_kernel(Err(Errno::OperationNotPermitted), |k| k.task_kill(task))
}

/// 当前任务退出
pub fn task_exit(code: i32) {
    with_kernel((), |k| k.task_exit(code));
}

/// 把任务从等待队列移回运行队列
pub fn task_remove_from_wait_list(task: *mut Task) -> KernResult<()> {
    with_kernel(Err(Errno::OperationNotPermitted), |k| {
        k.task_remove_from_wait_list(task)
    })
}
