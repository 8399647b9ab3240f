//! Spider - Rust 任务编排引擎
//!
//! 接收自由文本任务，判定「直接回答」或「规划-执行」，并在取消、重试与
//! 资源生命周期保障下驱动外部工具（浏览器自动化、沙箱命令、搜索）。
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 编排核心（路由、事件通道、资源生命周期、重试、取消、任务注册表）
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）与按角色工厂
//! - **plan**: Plan-and-Execute 状态机（Planner、StepExecutor、Orchestrator）
//! - **tools**: 能力集（日期、用户输入、浏览器、沙箱、搜索）与执行器
//! - **observability**: tracing 初始化

pub mod config;
pub mod core;
pub mod llm;
pub mod observability;
pub mod plan;
pub mod tools;
