//! 控制台输出通道
//!
//! 具体的 UART/串口驱动属于板级代码，不在内核核心范围内；
//! 这里只保留一个可注入的单字符输出槽位，由板级初始化时填入。
//! 槽位未设置时输出被丢弃（早期启动阶段允许静默）。

use core::mem;
use core::sync::atomic::{AtomicUsize, Ordering};

/// 单字符输出函数类型
pub type PutcharFn = fn(u8);

/// 当前输出槽位（0 表示未设置）
///
/// 用 usize 存函数指针，读写无锁，可在中断上下文安全调用
static CONSOLE_SINK: AtomicUsize = AtomicUsize::new(0);

/// 设置控制台输出函数
///
/// 板级启动代码在 UART 就绪后调用一次
pub fn set_sink(f: PutcharFn) {
    CONSOLE_SINK.store(f as usize, Ordering::Release);
}

/// 写入单个字符
pub fn putchar(c: u8) {
    let raw = CONSOLE_SINK.load(Ordering::Acquire);
    if raw != 0 {
        // SAFETY: raw 非 0 时一定是 set_sink 存入的 fn(u8) 指针
        let f: PutcharFn = unsafe { mem::transmute(raw) };
        f(c);
    }
}
