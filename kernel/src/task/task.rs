//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 任务控制块 (Task Control Block)
//!
//! 每个执行线索一个控制块：标识、调度元数据、寄存器保存区、
//! 自有栈、文件描述符表、队列挂链节点。
//!
//! 关键不变式：任务同一时刻最多挂在一条链表上——要么某条
//! 运行队列（可运行），要么某个资源的等待队列（阻塞），
//! 由 link 节点的挂链纪律保证（插入时默认节点未挂链）。

use core::alloc::Layout;
use core::ptr;
use core::str;
use core::sync::atomic::{AtomicU32, Ordering};

use alloc::boxed::Box;
use bitflags::bitflags;

use crate::arch::{self, MAX_REG};
use crate::errno::{Errno, KernResult};
use crate::kassert;
use crate::list::ListHead;
use crate::mm;
use crate::sched::policy::PolicyKind;
use crate::task::fdtable::{FdTable, File};

/// 任务标识符类型
pub type Pid = u32;

/// 任务名缓冲区长度
pub const TASK_NAME_LEN: usize = 16;

/// 栈对齐
const STACK_ALIGN: usize = 16;

bitflags! {
    /// 任务状态位掩码
    ///
    /// 空位集表示刚创建、尚未进入调度的任务
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TaskState: u32 {
        /// 可运行（在运行队列中，或正在 CPU 上执行）
        const RUNNING = 1 << 0;
        /// 阻塞在某条等待队列上
        const BLOCKED = 1 << 1;
        /// 已退出，等待回收
        const ZOMBIE = 1 << 2;
    }
}

/// 任务控制块
#[repr(C)]
pub struct Task {
    /// 任务 id
    id: Pid,
    /// 进程 id（单线程任务 pid == id）
    pid: Pid,
    /// 父任务 id
    ppid: Pid,
    /// 进程组 id
    pgid: Pid,
    /// 会话 id
    sid: Pid,

    /// 优先级，取值范围由调度策略给出
    prio: i32,

    /// 状态位掩码
    state: AtomicU32,

    /// 接纳此任务的调度策略
    policy: PolicyKind,

    /// 寄存器保存区
    regs: [usize; MAX_REG],

    /// 自有栈（栈底指针，空表示尚未分配）
    stack: *mut u8,
    stack_size: usize,

    /// 文件描述符表
    fdtable: Option<Box<FdTable>>,

    /// 运行/等待队列挂链节点
    pub(crate) link: ListHead,

    /// 控制终端（非拥有引用）
    ctty: *const File,

    /// 任务名
    name: [u8; TASK_NAME_LEN],
    name_len: u8,
}

// SAFETY: 控制块只在关中断临界区内跨执行流访问
unsafe impl Send for Task {}

impl Task {
    /// 创建新任务控制块
    ///
    /// 新任务处于"已创建"状态（空状态位），寄存器保存区清零，
    /// 栈尚未分配；由 task_run 播种寄存器并送入运行队列
    pub fn new(id: Pid, policy: PolicyKind, prio: i32, name: &str) -> Self {
        let mut name_buf = [0_u8; TASK_NAME_LEN];
        let n = name.len().min(TASK_NAME_LEN);
        name_buf[..n].copy_from_slice(&name.as_bytes()[..n]);

        // link 保持空指针（未挂链）：控制块此刻还会被移动
        // （装箱落到堆上），自指的环只能在首次挂链时按最终
        // 地址建立
        Self {
            id,
            pid: id,
            ppid: 0,
            pgid: id,
            sid: id,
            prio,
            state: AtomicU32::new(TaskState::empty().bits()),
            policy,
            regs: [0; MAX_REG],
            stack: ptr::null_mut(),
            stack_size: 0,
            fdtable: None,
            link: ListHead::new(),
            ctty: ptr::null(),
            name: name_buf,
            name_len: n as u8,
        }
    }

    #[inline]
    pub fn id(&self) -> Pid {
        self.id
    }

    #[inline]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    #[inline]
    pub fn ppid(&self) -> Pid {
        self.ppid
    }

    #[inline]
    pub fn pgid(&self) -> Pid {
        self.pgid
    }

    #[inline]
    pub fn sid(&self) -> Pid {
        self.sid
    }

    pub fn set_ppid(&mut self, ppid: Pid) {
        self.ppid = ppid;
    }

    #[inline]
    pub fn prio(&self) -> i32 {
        self.prio
    }

    #[inline]
    pub fn policy(&self) -> PolicyKind {
        self.policy
    }

    pub fn name(&self) -> &str {
        str::from_utf8(&self.name[..self.name_len as usize]).unwrap_or("?")
    }

    /// 读取状态位掩码
    #[inline]
    pub fn state(&self) -> TaskState {
        TaskState::from_bits_truncate(self.state.load(Ordering::Acquire))
    }

    /// 覆盖状态位掩码
    #[inline]
    pub fn set_state(&self, state: TaskState) {
        self.state.store(state.bits(), Ordering::Release);
    }

    #[inline]
    pub fn is_runnable(&self) -> bool {
        self.state().contains(TaskState::RUNNING)
    }

    #[inline]
    pub fn is_blocked(&self) -> bool {
        self.state().contains(TaskState::BLOCKED)
    }

    /// 是否挂在某条链表上（运行队列或等待队列，至多一条）
    #[inline]
    pub fn is_linked(&self) -> bool {
        self.link.is_linked()
    }

    // ==================== 寄存器与栈 ====================

    /// 寄存器保存区指针（上下文切换用）
    pub(crate) fn regs_ptr(&mut self) -> *mut [usize; MAX_REG] {
        &mut self.regs
    }

    /// 为全新入口播种寄存器保存区
    ///
    /// 必须先分配栈；入口地址和参数写入约定的寄存器槽位
    pub fn init_registers(&mut self, entry: usize, arg: usize) -> KernResult<()> {
        kassert!(!self.stack.is_null(), Err(Errno::InvalidArgument));
        let stack_top = self.stack as usize + self.stack_size;
        arch::task_init_registers(&mut self.regs, entry, arg, stack_top);
        Ok(())
    }

    /// 分配任务栈
    pub fn alloc_stack(&mut self, size: usize) -> KernResult<()> {
        kassert!(size > 0, Err(Errno::InvalidArgument));
        let layout = Layout::from_size_align(size, STACK_ALIGN)
            .map_err(|_| Errno::InvalidArgument)?;
        // SAFETY: layout 非零
        let ptr = unsafe { mm::kzalloc(layout) };
        kassert!(!ptr.is_null(), Err(Errno::OutOfMemory));
        self.stack = ptr;
        self.stack_size = size;
        Ok(())
    }

    /// 释放任务栈
    pub fn free_stack(&mut self) {
        if !self.stack.is_null() {
            // SAFETY: stack 由 alloc_stack 以相同布局分配
            unsafe {
                let layout = Layout::from_size_align_unchecked(self.stack_size, STACK_ALIGN);
                mm::kfree(self.stack, layout);
            }
            self.stack = ptr::null_mut();
            self.stack_size = 0;
        }
    }

    /// 栈顶地址（栈向下生长）
    pub fn stack_top(&self) -> Option<usize> {
        if self.stack.is_null() {
            None
        } else {
            Some(self.stack as usize + self.stack_size)
        }
    }

    // ==================== 文件描述符表 ====================

    /// 创建文件描述符表（惰性，内核任务可以没有）
    pub fn init_fdtable(&mut self) {
        if self.fdtable.is_none() {
            self.fdtable = Some(Box::new(FdTable::new()));
        }
    }

    #[inline]
    pub fn try_fdtable(&self) -> Option<&FdTable> {
        self.fdtable.as_deref()
    }

    #[inline]
    pub fn try_fdtable_mut(&mut self) -> Option<&mut FdTable> {
        self.fdtable.as_deref_mut()
    }

    /// 释放文件描述符表（关闭所有打开文件）
    pub fn free_fdtable(&mut self) {
        if let Some(mut table) = self.fdtable.take() {
            table.close_all();
        }
    }

    // ==================== 控制终端 ====================

    /// 设置控制终端（非拥有）
    pub fn set_ctty(&mut self, tty: *const File) {
        self.ctty = tty;
    }

    pub fn ctty(&self) -> *const File {
        self.ctty
    }
}

impl Drop for Task {
    fn drop(&mut self) {
        debug_assert!(!self.link.is_linked(), "task dropped while linked");
        self.free_stack();
        self.free_fdtable();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_task_is_created_state() {
        let task = Task::new(7, PolicyKind::Fifo, 3, "worker");
        assert_eq!(task.id(), 7);
        assert_eq!(task.pid(), 7);
        assert_eq!(task.pgid(), 7);
        assert_eq!(task.sid(), 7);
        assert_eq!(task.state(), TaskState::empty());
        assert!(!task.is_linked());
        assert_eq!(task.name(), "worker");
    }

    #[test]
    fn test_state_bits() {
        let task = Task::new(1, PolicyKind::Rr, 0, "t");
        task.set_state(TaskState::RUNNING);
        assert!(task.is_runnable());
        assert!(!task.is_blocked());
        task.set_state(TaskState::BLOCKED);
        assert!(task.is_blocked());
        assert!(!task.is_runnable());
    }

    #[test]
    fn test_stack_alloc_and_registers() {
        let mut task = Task::new(2, PolicyKind::Fifo, 1, "t");

        // 栈未分配时播种寄存器是使用错误
        assert_eq!(task.init_registers(0x1000, 0), Err(Errno::InvalidArgument));

        task.alloc_stack(1024).unwrap();
        let top = task.stack_top().unwrap();
        task.init_registers(0x1000, 99).unwrap();
        assert_eq!(task.regs[arch::REG_PC], 0x1000);
        assert_eq!(task.regs[arch::REG_SP], top);
        assert_eq!(task.regs[arch::REG_A0], 99);

        task.free_stack();
        assert!(task.stack_top().is_none());
    }

    #[test]
    fn test_long_name_truncated() {
        let task = Task::new(3, PolicyKind::Fifo, 0, "a-rather-long-task-name");
        assert_eq!(task.name().len(), TASK_NAME_LEN);
    }
}
