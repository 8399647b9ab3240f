//! 编排核心：错误、事件通道、路由、资源生命周期、重试、注册表、关闭与运行器

pub mod error;
pub mod events;
pub mod registry;
pub mod resources;
pub mod retry;
pub mod router;
pub mod runner;
pub mod shutdown;

pub use error::AgentError;
pub use events::{task_channel, EventKind, EventStream, ExecutionEvent, TaskChannel};
pub use registry::{TaskEntry, TaskRegistry, TaskState};
pub use resources::{AutomationSession, ResourceSet, SandboxSession, SessionFactory};
pub use retry::{with_retry, RetryPolicy};
pub use router::{Route, Router, DEFAULT_ROUTE};
pub use runner::{Task, TaskResult, TaskRunner, TaskStatus};
pub use shutdown::{ShutdownManager, ShutdownReason};
