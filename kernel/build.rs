//! Tern 内核构建脚本
//!
//! 这个脚本在编译前运行，负责：
//! 1. 解析 Kernel.toml 配置文件
//! 2. 生成配置常量代码（写入 OUT_DIR，由 config 模块 include!）

use std::env;
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

/// 从配置树中取整数，缺省时回退到默认值
fn get_int(config: &toml::Value, section: &str, key: &str, default: i64) -> i64 {
    config
        .get(section)
        .and_then(|s| s.get(key))
        .and_then(|v| v.as_integer())
        .unwrap_or(default)
}

/// 从配置树中取字符串，缺省时回退到默认值
fn get_str<'a>(config: &'a toml::Value, section: &str, key: &str, default: &'a str) -> &'a str {
    config
        .get(section)
        .and_then(|s| s.get(key))
        .and_then(|v| v.as_str())
        .unwrap_or(default)
}

fn main() {
    println!("cargo:rerun-if-changed=Kernel.toml");

    let content = fs::read_to_string("Kernel.toml").expect("无法读取 Kernel.toml");
    let config: toml::Value = toml::from_str(&content).expect("Kernel.toml 解析失败");

    let name = get_str(&config, "general", "name", "Tern");
    let version = get_str(&config, "general", "version", env!("CARGO_PKG_VERSION"));
    let hz = get_int(&config, "timer", "hz", 100);
    let nr_prio = get_int(&config, "sched", "nr_prio", 32);
    let time_slice = get_int(&config, "sched", "time_slice_ticks", 10);
    let stack_size = get_int(&config, "task", "default_stack_size", 4096);
    let nr_fds = get_int(&config, "task", "nr_fds", 16);
    let heap_size = get_int(&config, "memory", "kernel_heap_size", 1 << 20);

    let mut code = String::new();
    code.push_str("// 此文件由 build.rs 根据 Kernel.toml 自动生成，请勿手动修改\n\n");

    let _ = writeln!(code, "/// 内核名称");
    let _ = writeln!(code, "pub const KERNEL_NAME: &str = {:?};", name);
    let _ = writeln!(code, "/// 内核版本");
    let _ = writeln!(code, "pub const KERNEL_VERSION: &str = {:?};", version);
    let _ = writeln!(code, "/// 每秒时钟中断次数");
    let _ = writeln!(code, "pub const HZ: u64 = {};", hz);
    let _ = writeln!(code, "/// 调度优先级级别数量");
    let _ = writeln!(code, "pub const NR_PRIO: usize = {};", nr_prio);
    let _ = writeln!(code, "/// 轮转调度时间片长度（滴答数）");
    let _ = writeln!(code, "pub const TIME_SLICE_TICKS: u32 = {};", time_slice);
    let _ = writeln!(code, "/// 默认任务栈大小（字节）");
    let _ = writeln!(code, "pub const DEFAULT_STACK_SIZE: usize = {};", stack_size);
    let _ = writeln!(code, "/// 每任务文件描述符表大小");
    let _ = writeln!(code, "pub const NR_FDS: usize = {};", nr_fds);
    let _ = writeln!(code, "/// 裸机堆大小（字节）");
    let _ = writeln!(code, "pub const KERNEL_HEAP_SIZE: usize = {};", heap_size);

    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    fs::write(out_dir.join("config_gen.rs"), code).expect("写入 config_gen.rs 失败");
}
