//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 内核日志
//!
//! 在 `log` crate 门面之上实现内核端 Logger，输出走 console 通道，
//! 按级别着色（ANSI）。板级初始化时调用一次 [`init`]，
//! 之后内核各处统一使用 `log::info!` / `log::error!` 等宏。

use log::{Level, LevelFilter, Metadata, Record};

struct KernelLogger;

static LOGGER: KernelLogger = KernelLogger;

fn level_color(level: Level) -> &'static str {
    match level {
        Level::Error => "\x1b[31m", // 红
        Level::Warn => "\x1b[33m",  // 黄
        Level::Info => "\x1b[32m",  // 绿
        Level::Debug => "\x1b[36m", // 青
        Level::Trace => "\x1b[90m", // 灰
    }
}

impl log::Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            crate::println!(
                "{}[{:>5}]\x1b[0m {}",
                level_color(record.level()),
                record.level(),
                record.args()
            );
        }
    }

    fn flush(&self) {}
}

/// 安装内核 Logger
///
/// 重复调用是无害的（第二次 set_logger 返回错误并被忽略）
pub fn init() {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Info);
    }
}

/// 调整日志级别
pub fn set_level(level: LevelFilter) {
    log::set_max_level(level);
}

/// 内核断言：条件不成立时记录 文件/行号/条件 并让调用者返回哨兵值
///
/// 无效参数不会使系统崩溃，只产生一条错误日志加失败返回值
#[macro_export]
macro_rules! kassert {
    ($cond:expr, $ret:expr) => {
        if !$cond {
            log::error!(
                "assertion failed: {} ({}:{})",
                stringify!($cond),
                file!(),
                line!()
            );
            return $ret;
        }
    };
}
