//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 调度器核心
//!
//! 把策略、任务和体系结构层的上下文切换机制粘在一起：
//! 持有策略实例、当前任务指针、64 位滴答计数器、need_resched
//! 标志和时间片倒计数，由周期性时钟中断驱动抢占。
//!
//! 调度器状态是显式对象（单元测试可以建多个独立实例），
//! 进程级全局实例在 sched 模块里经 spin::Once 建立。
//!
//! 注意：任务经原始指针持有，这在内核开发中是常见做法；
//! 所有状态修改都在关中断临界区（SpinLock）内完成。

use core::mem::offset_of;
use core::ptr;

use alloc::boxed::Box;

use crate::arch;
use crate::errno::{Errno, KernResult};
use crate::irq;
use crate::kassert;
use crate::list::ListHead;
use crate::sched::policy::{FifoPolicy, PolicyKind, RrPolicy, SchedPolicyOps};
use crate::sync::SpinLock;
use crate::task::{alloc_pid, Task, TaskState};
use crate::time::wdog::{Wdog, WdogFn};

/// 任务入口函数类型
pub type TaskEntry = fn(usize);

/// 看门狗批处理大小：到期回调先摘到批里，出临界区再执行
const WDOG_BATCH: usize = 8;

struct SchedInner {
    /// 运行队列归策略私有
    policy: Box<dyn SchedPolicyOps>,

    /// 当前运行任务（空表示还在引导上下文 / 无任务可运行）
    current: *mut Task,

    /// 单调滴答计数，时钟中断里递增；
    /// 关中断读取保证取值不被撕裂
    ticks: u64,

    /// 当前任务剩余时间片（仅轮转策略使用）
    slice_left: u32,

    /// 重新调度请求标志
    need_resched: bool,

    /// 按到期时间排序的看门狗队列
    wdogs: ListHead,

    /// 存活任务数（含僵尸）
    nr_tasks: usize,
}

// SAFETY: 内部裸指针只在关中断临界区内访问
unsafe impl Send for SchedInner {}

pub struct Scheduler {
    inner: SpinLock<SchedInner>,
}

impl Scheduler {
    /// 创建调度器实例
    ///
    /// 策略对象装箱后原地初始化；看门狗队列头在首次使用时
    /// 建环（调度器本体在那之后不得再移动）
    pub fn new(kind: PolicyKind) -> Self {
        let mut policy: Box<dyn SchedPolicyOps> = match kind {
            PolicyKind::Fifo => Box::new(FifoPolicy::new()),
            PolicyKind::Rr => Box::new(RrPolicy::new()),
        };
        policy.init();

        Self {
            inner: SpinLock::new(SchedInner {
                policy,
                current: ptr::null_mut(),
                ticks: 0,
                slice_left: 0,
                need_resched: false,
                wdogs: ListHead::new(),
                nr_tasks: 0,
            }),
        }
    }

    /// 看门狗队列头，首次使用时原地建环
    fn wdogs_head(inner: &mut SchedInner) -> *mut ListHead {
        let head: *mut ListHead = &mut inner.wdogs;
        // SAFETY: 调用方持有调度器锁
        unsafe {
            if (*head).next.is_null() {
                (*head).init();
            }
        }
        head
    }

    /// 当前运行任务
    pub fn current(&self) -> Option<*mut Task> {
        let inner = self.inner.lock();
        if inner.current.is_null() {
            None
        } else {
            Some(inner.current)
        }
    }

    /// 存活任务数
    pub fn nr_tasks(&self) -> usize {
        self.inner.lock().nr_tasks
    }

    // ==================== 任务生命周期 ====================

    /// 创建任务控制块（"已创建"状态，未入队）
    pub fn task_create(&self, name: &str, prio: i32) -> KernResult<*mut Task> {
        let kind = {
            let inner = self.inner.lock();
            kassert!(
                prio >= inner.policy.prio_min() && prio <= inner.policy.prio_max(),
                Err(Errno::InvalidArgument)
            );
            inner.policy.kind()
        };

        let id = alloc_pid().ok_or(Errno::TryAgain)?;
        let mut task = Box::new(Task::new(id, kind, prio, name));
        task.init_fdtable();
        if let Some(cur) = self.current() {
            // SAFETY: current 指针在关中断临界区外仍然有效：
            // 只有 task_kill 释放控制块，而它不会针对运行中的读取方
            unsafe {
                task.set_ppid((*cur).id());
            }
        }

        let task = Box::into_raw(task);
        self.inner.lock().nr_tasks += 1;
        Ok(task)
    }

    /// 任务进入可运行状态（入运行队列）
    pub fn task_start(&self, task: *mut Task) -> KernResult<()> {
        kassert!(!task.is_null(), Err(Errno::InvalidArgument));
        let mut inner = self.inner.lock();
        // SAFETY: 持锁期间独占访问任务链表字段
        unsafe {
            (*task).set_state(TaskState::RUNNING);
            inner.policy.enqueue(task)?;
            if !inner.current.is_null() && (*task).prio() > (*inner.current).prio() {
                inner.need_resched = true;
            }
        }
        Ok(())
    }

    /// 创建 + 播种寄存器 + 入队，一步到位
    ///
    /// 新任务首次被切换到时从 `entry(arg)` 开始执行
    pub fn task_run(
        &self,
        name: &str,
        entry: TaskEntry,
        arg: usize,
        prio: i32,
        stack_size: usize,
    ) -> KernResult<*mut Task> {
        let task = self.task_create(name, prio)?;

        // SAFETY: task_create 刚返回的有效指针，尚未共享
        let seeded = unsafe {
            (*task)
                .alloc_stack(stack_size)
                .and_then(|_| (*task).init_registers(entry as usize, arg))
        };
        if let Err(e) = seeded {
            self.reap(task);
            return Err(e);
        }

        if let Err(e) = self.task_start(task) {
            self.reap(task);
            return Err(e);
        }
        Ok(task)
    }

    /// 杀死任务：从所挂的唯一一条链表上摘除并释放全部资源
    ///
    /// 对任意状态的任务都有效，包括阻塞在等待队列里的任务；
    /// 与并发的 unlock/signal 唤醒竞争是安全的——队列修改
    /// 全部互斥在关中断临界区内
    pub fn task_kill(&self, task: *mut Task) -> KernResult<()> {
        kassert!(!task.is_null(), Err(Errno::InvalidArgument));
        {
            let mut inner = self.inner.lock();
            // SAFETY: 持锁期间独占访问
            unsafe {
                if (*task).is_linked() {
                    if (*task).is_blocked() {
                        // 阻塞中：从资源的等待队列摘链，
                        // 之后的 unlock/signal 不会再碰到它
                        (*task).link.del();
                    } else {
                        // 可运行：经策略摘除（维护队列计数）
                        inner.policy.dequeue(task)?;
                    }
                }
                if inner.current == task {
                    inner.current = ptr::null_mut();
                    inner.need_resched = true;
                }
            }
            inner.nr_tasks = inner.nr_tasks.saturating_sub(1);
        }

        // 释放控制块，栈和 fd 表随 Drop 一起释放
        // SAFETY: 指针来自 task_create 的 Box::into_raw，已不在任何队列
        unsafe {
            drop(Box::from_raw(task));
        }
        Ok(())
    }

    /// 当前任务退出
    ///
    /// 标记僵尸并让出 CPU；控制块由之后的 task_kill 回收。
    /// 真实移植层不会返回到调用方（portable 构建下直接返回）。
    pub fn task_exit(&self, code: i32) {
        {
            let mut inner = self.inner.lock();
            let task = inner.current;
            if task.is_null() {
                log::error!("task_exit from non-task context");
                return;
            }
            // SAFETY: 持锁期间独占访问
            unsafe {
                if (*task).is_linked() && !(*task).is_blocked() {
                    let _ = inner.policy.dequeue(task);
                }
                (*task).set_state(TaskState::ZOMBIE);
                log::info!("task {} ({}) exited with {}", (*task).id(), (*task).name(), code);
            }
            inner.current = ptr::null_mut();
            inner.need_resched = true;
        }
        self.schedule();
    }

    /// task_run/task_create 错误路径上的控制块回收
    fn reap(&self, task: *mut Task) {
        let mut inner = self.inner.lock();
        inner.nr_tasks = inner.nr_tasks.saturating_sub(1);
        drop(inner);
        // SAFETY: 指针来自 Box::into_raw，未入任何队列
        unsafe {
            drop(Box::from_raw(task));
        }
    }

    // ==================== 调度 ====================

    /// 选择并切换到下一个任务
    pub fn schedule(&self) {
        let (prev, next) = {
            let mut inner = self.inner.lock();
            inner.need_resched = false;

            let prev = inner.current;
            let next = match inner.policy.pick_task() {
                Some(t) => t,
                None => {
                    // 没有可运行任务；阻塞/退出的 prev 不再是 current
                    // SAFETY: 持锁期间独占访问
                    if !prev.is_null() && unsafe { !(*prev).is_runnable() } {
                        inner.current = ptr::null_mut();
                    }
                    return;
                }
            };

            if next == prev {
                return;
            }

            inner.current = next;
            // 新任务的时间片
            inner.slice_left = inner.policy.rr_get_interval().unwrap_or(0) as u32;
            (prev, next)
        };

        // 上下文切换在锁外执行；prev 为空表示从引导上下文首次切换
        // SAFETY: 两个控制块都存活（只有 task_kill 释放控制块）
        unsafe {
            let prev_regs = if prev.is_null() {
                ptr::null_mut()
            } else {
                (*prev).regs_ptr()
            };
            arch::switch_context(prev_regs, (*next).regs_ptr());
        }
    }

    /// 自愿让出 CPU
    ///
    /// 当前任务保持可运行（仍在运行队列里），调度器挑选下一个；
    /// 轮转策略会因 pick 的旋转把机会让给同级的下一个任务
    pub fn yield_cpu(&self) {
        self.schedule();
    }

    /// 时钟中断驱动：推进滴答、触发到期看门狗、推进时间片
    ///
    /// 返回是否需要重新调度，中断出口据此调用 [`schedule`](Self::schedule)
    pub fn scheduler_tick(&self) -> bool {
        let now = {
            let mut inner = self.inner.lock();
            inner.ticks += 1;

            // 时间片只约束轮转策略；FIFO 不因滴答抢占
            if !inner.current.is_null() && inner.policy.rr_get_interval().is_some() {
                if inner.slice_left > 0 {
                    inner.slice_left -= 1;
                }
                if inner.slice_left == 0 {
                    inner.slice_left = inner.policy.rr_get_interval().unwrap_or(0) as u32;
                    inner.need_resched = true;
                }
            }
            inner.ticks
        };

        self.run_expired_wdogs(now);
        self.need_resched()
    }

    /// 当前滴答计数
    pub fn get_ticks(&self) -> u64 {
        self.inner.lock().ticks
    }

    pub fn need_resched(&self) -> bool {
        self.inner.lock().need_resched
    }

    pub fn set_need_resched(&self) {
        self.inner.lock().need_resched = true;
    }

    // ==================== 阻塞与唤醒 ====================

    /// 把当前任务挂到等待队列并标记阻塞（不让出 CPU）
    ///
    /// 条件变量用它实现"先挂起再放锁"的原子协议
    pub(crate) fn park_current_on(&self, wait: *mut ListHead) -> bool {
        let mut inner = self.inner.lock();
        let task = inner.current;
        kassert!(!task.is_null(), false);
        // SAFETY: 持锁期间独占访问
        unsafe {
            if (*task).is_linked() {
                let _ = inner.policy.dequeue(task);
            }
            (*task).set_state(TaskState::BLOCKED);
            (*task).link.add_tail(wait);
        }
        true
    }

    /// 挂起当前任务并让出 CPU（信号量的阻塞路径）
    ///
    /// 调用方持有一层中断屏蔽；挂起期间释放它，恢复后重新持有。
    /// 唤醒只是提示：返回后调用方必须重新检查等待条件。
    pub(crate) fn block_current_on(&self, wait: *mut ListHead) -> bool {
        {
            let inner = self.inner.lock();
            let task = inner.current;
            kassert!(!task.is_null(), false);
            // SAFETY: 持锁期间独占访问
            let parked = unsafe { (*task).is_blocked() };
            drop(inner);

            // 已经挂在等待队列上（未被唤醒又轮到自己）就只让出
            if !parked && !self.park_current_on(wait) {
                return false;
            }
        }

        irq::enable();
        self.schedule();
        irq::disable();
        true
    }

    /// 唤醒等待队列队首任务：摘链、置可运行、回运行队列
    ///
    /// 不保证与第三方任务并发获取之间的先后；被唤醒者自己重查
    pub(crate) fn wake_first_on(&self, wait: *mut ListHead) -> Option<*mut Task> {
        let mut inner = self.inner.lock();
        // SAFETY: 持锁期间独占访问；等待队列里只挂 Task::link
        unsafe {
            let task = ListHead::first_entry::<Task>(wait, offset_of!(Task, link))?;
            (*task).link.del();
            (*task).set_state(TaskState::RUNNING);
            if inner.policy.enqueue(task).is_err() {
                return None;
            }
            // 高优先级唤醒触发抢占检查
            if !inner.current.is_null() && (*task).prio() > (*inner.current).prio() {
                inner.need_resched = true;
            }
            Some(task)
        }
    }

    /// 把指定任务从等待队列移回运行队列（阻塞 → 可运行）
    pub fn task_remove_from_wait_list(&self, task: *mut Task) -> KernResult<()> {
        kassert!(!task.is_null(), Err(Errno::InvalidArgument));
        let mut inner = self.inner.lock();
        // SAFETY: 持锁期间独占访问
        unsafe {
            kassert!(
                (*task).is_blocked() && (*task).is_linked(),
                Err(Errno::InvalidArgument)
            );
            (*task).link.del();
            (*task).set_state(TaskState::RUNNING);
            inner.policy.enqueue(task)?;
            if !inner.current.is_null() && (*task).prio() > (*inner.current).prio() {
                inner.need_resched = true;
            }
        }
        Ok(())
    }

    // ==================== 看门狗 ====================

    /// 启动看门狗：`delay` 个滴答后触发回调
    ///
    /// 对已激活的看门狗调用等于重启计时
    pub fn wdog_start(
        &self,
        wdog: *mut Wdog,
        delay: u64,
        func: WdogFn,
        arg: *mut u8,
    ) -> KernResult<()> {
        kassert!(!wdog.is_null(), Err(Errno::InvalidArgument));
        let mut inner = self.inner.lock();
        let deadline = inner.ticks + delay;
        let head = Self::wdogs_head(&mut inner);
        // SAFETY: 持锁期间独占访问看门狗队列
        unsafe {
            if (*wdog).active {
                (*wdog).node.del();
            }
            if (*wdog).node.next.is_null() {
                (*wdog).node.init();
            }
            (*wdog).deadline = deadline;
            (*wdog).func = Some(func);
            (*wdog).arg = arg;
            (*wdog).active = true;

            let off = offset_of!(Wdog, node);
            (*wdog).node.sorted_add(head, |a, b| unsafe {
                let wa = ListHead::entry::<Wdog>(a as *mut ListHead, off);
                let wb = ListHead::entry::<Wdog>(b as *mut ListHead, off);
                (*wa).deadline < (*wb).deadline
            });
        }
        Ok(())
    }

    /// 停止尚未触发的看门狗；已触发/未启动时是空操作
    pub fn wdog_cancel(&self, wdog: *mut Wdog) -> KernResult<()> {
        kassert!(!wdog.is_null(), Err(Errno::InvalidArgument));
        let _inner = self.inner.lock();
        // SAFETY: 持锁期间独占访问
        unsafe {
            if (*wdog).active {
                (*wdog).node.del();
                (*wdog).active = false;
            }
        }
        Ok(())
    }

    /// 触发全部到期看门狗
    ///
    /// 回调在临界区外执行：回调里允许再进调度器
    /// （典型用法是 unlock 一个信号量唤醒睡眠任务）
    fn run_expired_wdogs(&self, now: u64) {
        loop {
            let mut batch: [Option<(WdogFn, *mut u8)>; WDOG_BATCH] = [None; WDOG_BATCH];
            let mut n = 0;

            {
                let mut inner = self.inner.lock();
                let head = Self::wdogs_head(&mut inner);
                while n < WDOG_BATCH {
                    // SAFETY: 持锁期间独占访问；队列按到期时间有序
                    let fired = unsafe {
                        match ListHead::first_entry::<Wdog>(head, offset_of!(Wdog, node)) {
                            Some(w) if (*w).deadline <= now => {
                                (*w).node.del();
                                (*w).active = false;
                                let arg = (*w).arg;
                                (*w).func.map(|f| (f, arg))
                            }
                            _ => break,
                        }
                    };
                    if let Some(pair) = fired {
                        batch[n] = Some(pair);
                        n += 1;
                    }
                }
            }

            for slot in batch.iter().take(n) {
                if let Some((func, arg)) = slot {
                    func(self, *arg);
                }
            }

            if n < WDOG_BATCH {
                break;
            }
        }
    }
}
