//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 信号量 (Semaphore) 机制
//!
//! 核心概念：
//! - 计数信号量用于任务同步和互斥
//! - lock (P 操作): 获取许可，不足时阻塞
//! - unlock (V 操作): 归还许可，唤醒队首等待者
//!
//! 唤醒只是提示：等待者被移出等待队列重新变为可运行后，
//! 真正跑起来时许可可能又被第三方抢走，所以 lock 里必须
//! 带重新检查的循环。等待队列按挂入顺序唤醒（FIFO 公平性
//! 与队列插入顺序同强度）。

use core::cell::UnsafeCell;
#[cfg(debug_assertions)]
use core::sync::atomic::AtomicU32;
use core::sync::atomic::{AtomicI32, Ordering};

use crate::errno::{Errno, KernResult};
use crate::irq::{self, IrqGuard};
use crate::kassert;
use crate::list::ListHead;
use crate::sched::{self, Scheduler};

/// 信号量
///
/// 计数值只通过原子原语或在关中断临界区内修改；
/// 计数 <= 0 表示没有许可，可能有任务在等待。
#[repr(C)]
pub struct Semaphore {
    /// 许可计数
    count: AtomicI32,
    /// 等待队列（阻塞任务通过各自的 link 节点挂入）
    wait: UnsafeCell<ListHead>,
}

// SAFETY: 等待队列的全部修改都在关中断临界区内
unsafe impl Send for Semaphore {}
unsafe impl Sync for Semaphore {}

impl Semaphore {
    /// 创建新信号量
    ///
    /// ```ignore
    /// // 互斥信号量（二值信号量）
    /// let mutex = Semaphore::new(1);
    ///
    /// // 计数信号量（资源池）
    /// let pool = Semaphore::new(10);
    /// ```
    pub const fn new(value: i32) -> Self {
        Self {
            count: AtomicI32::new(value),
            wait: UnsafeCell::new(ListHead::new()),
        }
    }

    /// 运行时初始化
    pub fn init(&self, value: i32) {
        let _g = IrqGuard::new();
        self.count.store(value, Ordering::Release);
        // SAFETY: 关中断临界区内独占访问
        unsafe {
            (*self.wait.get()).init();
        }
    }

    /// 等待队列头指针，首次使用时原地建环
    ///
    /// 必须在关中断临界区内调用。信号量初始化后不得再移动
    /// （等待队列按地址链接）。
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

    /// 获取许可（可能阻塞）
    ///
    /// 返回 false 表示使用错误（调度器未初始化 / 无运行任务），
    /// 已记录日志
    pub fn lock(&self) -> bool {
        let Some(sched) = sched::kernel() else {
            log::error!("semaphore: lock before scheduler init ({}:{})", file!(), line!());
            return false;
        };
        self.lock_on(sched)
    }

    /// 在指定调度器上获取许可
    pub(crate) fn lock_on(&self, sched: &Scheduler) -> bool {
        let _g = IrqGuard::new();
        loop {
            if irq::atomic_get(&self.count) > 0 {
                irq::atomic_dec(&self.count);
                return true;
            }

            // 没有许可：挂到等待队列并让出 CPU，
            // 恢复执行后回到循环顶部重新检查
            if !sched.block_current_on(self.wait_head()) {
                return false;
            }
        }
    }

    /// 尝试获取许可（非阻塞）
    ///
    /// 没有许可时立即返回 false，这是正常结果而不是错误
    pub fn trylock(&self) -> bool {
        let _g = IrqGuard::new();
        if irq::atomic_get(&self.count) > 0 {
            irq::atomic_dec(&self.count);
            true
        } else {
            false
        }
    }

    /// 归还许可并唤醒队首等待者
    pub fn unlock(&self) -> bool {
        match sched::kernel() {
            Some(sched) => self.unlock_on(sched),
            None => {
                // 调度器未就绪时不可能有等待者，只需要还计数
                let _g = IrqGuard::new();
                irq::atomic_inc(&self.count);
                true
            }
        }
    }

    /// 在指定调度器上归还许可
    ///
    /// 与第三方任务并发的获取尝试之间没有先行保证：
    /// 被唤醒的任务仍要重新检查计数
    pub(crate) fn unlock_on(&self, sched: &Scheduler) -> bool {
        let _g = IrqGuard::new();
        irq::atomic_inc(&self.count);
        let head = self.wait_head();
        // SAFETY: 关中断临界区内独占访问等待队列
        unsafe {
            if !(*head).is_empty() {
                sched.wake_first_on(head);
            }
        }
        true
    }

    /// 销毁信号量
    ///
    /// 还有任务在等待时销毁属于使用错误：记录日志并拒绝，
    /// 资源保持原样
    pub fn destroy(&self) -> KernResult<()> {
        let _g = IrqGuard::new();
        let head = self.wait_head();
        // SAFETY: 同上
        unsafe {
            kassert!((*head).is_empty(), Err(Errno::DeviceOrResourceBusy));
        }
        Ok(())
    }

    /// 当前计数值（仅供参考，返回后随时可能变化）
    pub fn count(&self) -> i32 {
        irq::atomic_get(&self.count)
    }

    /// 是否有任务在等待（诊断用）
    pub fn has_waiters(&self) -> bool {
        let _g = IrqGuard::new();
        // SAFETY: 关中断临界区内独占访问
        unsafe { !(*self.wait_head()).is_empty() }
    }
}

/// 未持有者的占位标记
#[cfg(debug_assertions)]
const NO_HOLDER: u32 = u32::MAX;

/// 互斥锁
///
/// 容量为 1 的信号量。不支持递归加锁；不跟踪持有者——
/// 任务解开自己从未锁过的互斥锁属于未定义的使用错误，
/// 调试构建下记录持有者并断言捕捉这种误用。
#[repr(C)]
pub struct Mutex {
    sem: Semaphore,
    /// 当前持有者的任务 id（仅调试构建）
    #[cfg(debug_assertions)]
    holder: AtomicU32,
}

#[cfg(debug_assertions)]
fn current_task_id(sched: &Scheduler) -> u32 {
    match sched.current() {
        // SAFETY: current 返回的指针在任务被杀死前有效
        Some(task) => unsafe { (*task).id() },
        None => NO_HOLDER,
    }
}

impl Mutex {
    pub const fn new() -> Self {
        Self {
            sem: Semaphore::new(1),
            #[cfg(debug_assertions)]
            holder: AtomicU32::new(NO_HOLDER),
        }
    }

    /// 获取锁，已被占用时阻塞等待
    pub fn lock(&self) -> bool {
        let Some(sched) = sched::kernel() else {
            log::error!("mutex: lock before scheduler init ({}:{})", file!(), line!());
            return false;
        };
        self.lock_on(sched)
    }

    pub(crate) fn lock_on(&self, sched: &Scheduler) -> bool {
        if !self.sem.lock_on(sched) {
            return false;
        }
        #[cfg(debug_assertions)]
        self.holder.store(current_task_id(sched), Ordering::Release);
        true
    }

    /// 尝试获取锁（非阻塞）
    pub fn trylock(&self) -> bool {
        if !self.sem.trylock() {
            return false;
        }
        #[cfg(debug_assertions)]
        if let Some(sched) = sched::kernel() {
            self.holder.store(current_task_id(sched), Ordering::Release);
        }
        true
    }

    /// 释放锁
    pub fn unlock(&self) -> bool {
        match sched::kernel() {
            Some(sched) => self.unlock_on(sched),
            None => self.sem.unlock(),
        }
    }

    pub(crate) fn unlock_on(&self, sched: &Scheduler) -> bool {
        #[cfg(debug_assertions)]
        {
            let me = current_task_id(sched);
            let holder = self.holder.load(Ordering::Acquire);
            debug_assert!(
                holder == NO_HOLDER || me == NO_HOLDER || holder == me,
                "mutex unlocked by task {} but held by task {}",
                me,
                holder
            );
            self.holder.store(NO_HOLDER, Ordering::Release);
        }
        self.sem.unlock_on(sched)
    }

    /// 销毁互斥锁，等待者非空时拒绝
    pub fn destroy(&self) -> KernResult<()> {
        self.sem.destroy()
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}

/// 互斥锁守护（RAII）
///
/// ```ignore
/// {
///     let _guard = mutex.guard();
///     // ... 临界区 ...
/// } // 自动释放锁
/// ```
pub struct MutexGuard<'a> {
    mutex: &'a Mutex,
}

impl<'a> MutexGuard<'a> {
    pub fn new(mutex: &'a Mutex) -> Self {
        mutex.lock();
        Self { mutex }
    }
}

impl Drop for MutexGuard<'_> {
    fn drop(&mut self) {
        self.mutex.unlock();
    }
}

impl Mutex {
    /// 获取锁守护，离开作用域自动释放
    pub fn guard(&self) -> MutexGuard<'_> {
        MutexGuard::new(self)
    }
}
