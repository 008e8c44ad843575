//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 体系结构层
//!
//! 内核核心只消费一个很小的接口：寄存器保存区布局、新任务
//! 寄存器初始化、上下文切换入口和中断屏蔽开关。真正的
//! 保存/恢复汇编属于各目标的移植层（cortex-m / riscv64 特性
//! 只是平台标记，汇编不在本仓库范围内）。
//!
//! 默认提供 portable 后端：纯 Rust 实现同样的状态机语义，
//! 宿主环境的构建与单元测试都走这条路径。

pub mod portable;

pub use portable::*;
