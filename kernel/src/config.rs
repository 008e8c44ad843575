//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! Tern 内核配置
//!
//! 常量由 build.rs 根据 Kernel.toml 生成，编译期确定，
//! 运行期不可改（嵌入式目标没有运行期配置层）

include!(concat!(env!("OUT_DIR"), "/config_gen.rs"));

/// 最高优先级（数值越大优先级越高）
pub const PRIO_MAX: i32 = NR_PRIO as i32 - 1;

/// 最低优先级
pub const PRIO_MIN: i32 = 0;

/// 每个滴答的微秒数
pub const USEC_PER_TICK: u64 = 1_000_000 / HZ;
