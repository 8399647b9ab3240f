//! 任务注册表：显式对象，非全局状态
//!
//! 创建时登记，终态时更新，已完结条目超过容量后按登记顺序淘汰。
//! 由持有方（Web API 层）以引用传递，进程重启不保留（按设计不持久化）。

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::core::runner::TaskStatus;

/// 注册表中一个任务的可见状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Running,
    Completed,
    Error,
    Cancelled,
}

impl From<TaskStatus> for TaskState {
    fn from(status: TaskStatus) -> Self {
        match status {
            TaskStatus::Completed => TaskState::Completed,
            TaskStatus::Error => TaskState::Error,
            TaskStatus::Cancelled => TaskState::Cancelled,
        }
    }
}

/// 注册表条目
#[derive(Debug, Clone, Serialize)]
pub struct TaskEntry {
    pub id: String,
    pub description: String,
    pub state: TaskState,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// 任务注册表；内部用 RwLock，各任务流只在登记 / 终态两个点接触它
pub struct TaskRegistry {
    inner: RwLock<RegistryInner>,
    capacity: usize,
}

struct RegistryInner {
    entries: HashMap<String, TaskEntry>,
    order: VecDeque<String>,
}

impl TaskRegistry {
    /// capacity 为已完结条目的保留上限
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
            capacity: capacity.max(1),
        }
    }

    /// 登记新任务（状态 Running），必要时淘汰最老的已完结条目
    pub async fn insert(&self, id: &str, description: &str) {
        let mut inner = self.inner.write().await;
        inner.entries.insert(
            id.to_string(),
            TaskEntry {
                id: id.to_string(),
                description: description.to_string(),
                state: TaskState::Running,
                created_at: Utc::now(),
                finished_at: None,
            },
        );
        inner.order.push_back(id.to_string());

        while inner.entries.len() > self.capacity {
            // 只淘汰已完结的；全在运行中时不淘汰
            let Some(pos) = inner
                .order
                .iter()
                .position(|id| {
                    inner
                        .entries
                        .get(id)
                        .map(|e| e.state != TaskState::Running)
                        .unwrap_or(true)
                })
            else {
                break;
            };
            if let Some(evicted) = inner.order.remove(pos) {
                inner.entries.remove(&evicted);
            }
        }
    }

    /// 记录终态
    pub async fn mark_finished(&self, id: &str, status: TaskStatus) {
        let mut inner = self.inner.write().await;
        if let Some(entry) = inner.entries.get_mut(id) {
            entry.state = status.into();
            entry.finished_at = Some(Utc::now());
        }
    }

    pub async fn get(&self, id: &str) -> Option<TaskEntry> {
        self.inner.read().await.entries.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_and_finish() {
        let registry = TaskRegistry::default();
        registry.insert("t1", "compare stock prices").await;
        assert_eq!(registry.get("t1").await.unwrap().state, TaskState::Running);

        registry.mark_finished("t1", TaskStatus::Completed).await;
        let entry = registry.get("t1").await.unwrap();
        assert_eq!(entry.state, TaskState::Completed);
        assert!(entry.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_eviction_skips_running_tasks() {
        let registry = TaskRegistry::new(2);
        registry.insert("a", "task a").await;
        registry.mark_finished("a", TaskStatus::Completed).await;
        registry.insert("b", "task b").await; // 一直 Running
        registry.insert("c", "task c").await;

        // a 已完结且最老，被淘汰；b 虽更老但在运行中，保留
        assert!(registry.get("a").await.is_none());
        assert!(registry.get("b").await.is_some());
        assert!(registry.get("c").await.is_some());
        assert_eq!(registry.len().await, 2);
    }
}
