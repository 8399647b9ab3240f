//! 日志初始化
//!
//! RUST_LOG 可覆盖默认级别；事件流（log/plan/result/...）面向任务调用方，
//! tracing 面向运维，两者互不替代。

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// 初始化全局 tracing 订阅者；进程内只能调用一次
pub fn init_tracing(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}
