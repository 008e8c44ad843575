//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 条件变量 (task_cond) 机制
//!
//! 核心概念：
//! - 必须与调用者提供的互斥锁配合使用
//! - wait() 挂起调用任务并释放互斥锁，醒来后重新拿锁
//! - signal() 唤醒一个等待任务，broadcast() 唤醒全部
//!
//! 挂起与放锁对调度器是原子的：任务先在关中断临界区内挂入
//! 等待队列并标记阻塞，然后才释放互斥锁，信号方不可能错过它
//! （无丢失唤醒）。内部不产生虚假唤醒，但 signal/broadcast
//! 不保证被唤醒者先于其他任务改写谓词，调用方仍要用
//! 谓词检查循环。

use core::cell::UnsafeCell;

use crate::irq::{self, IrqGuard};
use crate::kassert;
use crate::list::ListHead;
use crate::sched::{self, Scheduler};
use crate::sync::Mutex;

/// 条件变量
///
/// 典型用法：
/// ```ignore
/// mutex.lock();
/// while !condition_is_met() {
///     cond.wait(&mutex); // 释放锁并等待
/// }
/// // ... 谓词成立 ...
/// mutex.unlock();
/// ```
#[repr(C)]
pub struct TaskCond {
    /// 等待队列
    wait: UnsafeCell<ListHead>,
}

// SAFETY: 等待队列的全部修改都在关中断临界区内
unsafe impl Send for TaskCond {}
unsafe impl Sync for TaskCond {}

impl TaskCond {
    pub const fn new() -> Self {
        Self {
            wait: UnsafeCell::new(ListHead::new()),
        }
    }

    /// 运行时初始化
    pub fn init(&self) {
        let _g = IrqGuard::new();
        // SAFETY: 关中断临界区内独占访问
        unsafe {
            (*self.wait.get()).init();
        }
    }

    /// 等待队列头指针，首次使用时原地建环。
    /// 必须在关中断临界区内调用。
    pub(crate) fn wait_head(&self) -> *mut ListHead {
        let head = self.wait.get();
        // SAFETY: 调用者持有中断屏蔽
        unsafe {
            if (*head).next.is_null() {
                (*head).init();
            }
        }
        head
    }

    /// 等待条件满足
    ///
    /// 调用时必须持有 `mutex`；返回时重新持有 `mutex`。
    /// 返回 false 表示使用错误（已记录日志）。
    pub fn wait(&self, mutex: &Mutex) -> bool {
        let Some(sched) = sched::kernel() else {
            log::error!("task_cond: wait before scheduler init ({}:{})", file!(), line!());
            return false;
        };
        self.wait_on(mutex, sched)
    }

    pub(crate) fn wait_on(&self, mutex: &Mutex, sched: &Scheduler) -> bool {
        {
            let _g = IrqGuard::new();

            // 1. 挂入等待队列并退出运行队列（先挂起后放锁）
            kassert!(sched.park_current_on(self.wait_head()), false);

            // 2. 释放互斥锁，信号方现在可以进入临界区
            mutex.unlock_on(sched);

            // 3. 让出 CPU；挂起期间释放一层中断屏蔽
            irq::enable();
            sched.schedule();
            irq::disable();
        }

        // 4. 被唤醒：返回前重新获取互斥锁
        mutex.lock_on(sched)
    }

    /// 唤醒一个等待任务
    ///
    /// 调用时应持有与 wait 方相同的互斥锁
    pub fn signal(&self) -> bool {
        let Some(sched) = sched::kernel() else {
            log::error!("task_cond: signal before scheduler init ({}:{})", file!(), line!());
            return false;
        };
        self.signal_on(sched)
    }

    pub(crate) fn signal_on(&self, sched: &Scheduler) -> bool {
        let _g = IrqGuard::new();
        let head = self.wait_head();
        // SAFETY: 关中断临界区内独占访问
        unsafe {
            if !(*head).is_empty() {
                sched.wake_first_on(head);
            }
        }
        true
    }

    /// 唤醒当前全部等待任务，返回唤醒数量
    pub fn broadcast(&self) -> usize {
        let Some(sched) = sched::kernel() else {
            log::error!("task_cond: broadcast before scheduler init ({}:{})", file!(), line!());
            return 0;
        };
        self.broadcast_on(sched)
    }

    pub(crate) fn broadcast_on(&self, sched: &Scheduler) -> usize {
        let _g = IrqGuard::new();
        let head = self.wait_head();
        let mut woken = 0;
        // SAFETY: 关中断临界区内独占访问
        unsafe {
            while !(*head).is_empty() {
                if sched.wake_first_on(head).is_none() {
                    break;
                }
                woken += 1;
            }
        }
        woken
    }

    /// 是否有任务在等待（诊断用）
    pub fn has_waiters(&self) -> bool {
        let _g = IrqGuard::new();
        // SAFETY: 关中断临界区内独占访问
        unsafe { !(*self.wait_head()).is_empty() }
    }
}

impl Default for TaskCond {
    fn default() -> Self {
        Self::new()
    }
}
