//! 每任务事件通道：单生产者 / 单消费者，有序，以 End 事件收尾
//!
//! 编排流程通过 TaskChannel 发送带单调序号的进度事件；传输层（SSE / CLI 打印）
//! 持有 EventStream 作为唯一读端。消费者断开后继续 emit 不报错、静默丢弃，
//! 事件通道的故障永远不会回传进编排逻辑。

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

/// 事件类型（SSE 的 event 字段即其 snake_case 形式）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// 进度日志（工具调用、路由回退等）
    Log,
    /// 完整计划文本，每任务恰好一次，先于任何 result
    Plan,
    /// 最终答案，成功任务恰好一次
    Result,
    /// 错误描述，失败/取消任务恰好一次
    Error,
    /// 流结束标记，每任务恰好一次且必为最后一条
    End,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Log => "log",
            EventKind::Plan => "plan",
            EventKind::Result => "result",
            EventKind::Error => "error",
            EventKind::End => "end",
        }
    }
}

/// 单条进度事件：任务内序号单调递增
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionEvent {
    pub sequence: u64,
    pub kind: EventKind,
    pub payload: String,
    pub timestamp: DateTime<Utc>,
}

/// 创建一对通道端点：TaskChannel 给编排流程，EventStream 给传输层
pub fn task_channel() -> (TaskChannel, EventStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        TaskChannel {
            tx,
            next_seq: AtomicU64::new(0),
            ended: AtomicBool::new(false),
        },
        EventStream { rx, done: false },
    )
}

/// 事件通道写端：emit 从不阻塞（无界队列），End 之后的事件被忽略
pub struct TaskChannel {
    tx: mpsc::UnboundedSender<ExecutionEvent>,
    next_seq: AtomicU64,
    ended: AtomicBool,
}

impl TaskChannel {
    fn emit(&self, kind: EventKind, payload: impl Into<String>) {
        if self.ended.load(Ordering::SeqCst) {
            return;
        }
        let event = ExecutionEvent {
            sequence: self.next_seq.fetch_add(1, Ordering::SeqCst),
            kind,
            payload: payload.into(),
            timestamp: Utc::now(),
        };
        // 消费者已断开时 send 返回 Err：按契约静默丢弃
        let _ = self.tx.send(event);
    }

    pub fn log(&self, payload: impl Into<String>) {
        self.emit(EventKind::Log, payload);
    }

    pub fn plan(&self, payload: impl Into<String>) {
        self.emit(EventKind::Plan, payload);
    }

    pub fn result(&self, payload: impl Into<String>) {
        self.emit(EventKind::Result, payload);
    }

    pub fn error(&self, payload: impl Into<String>) {
        self.emit(EventKind::Error, payload);
    }

    /// 发送 End 事件；无论任务如何终止都恰好生效一次，之后通道关闭
    pub fn end(&self) {
        if self.ended.load(Ordering::SeqCst) {
            return;
        }
        let event = ExecutionEvent {
            sequence: self.next_seq.fetch_add(1, Ordering::SeqCst),
            kind: EventKind::End,
            payload: String::new(),
            timestamp: Utc::now(),
        };
        let _ = self.tx.send(event);
        self.ended.store(true, Ordering::SeqCst);
    }
}

/// 事件通道读端：按发送顺序产出事件，读到 End 后结束，不可重放
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<ExecutionEvent>,
    done: bool,
}

impl EventStream {
    /// 取下一条事件；End 之后或生产者消失后返回 None
    pub async fn next(&mut self) -> Option<ExecutionEvent> {
        if self.done {
            return None;
        }
        match self.rx.recv().await {
            Some(event) => {
                if event.kind == EventKind::End {
                    self.done = true;
                }
                Some(event)
            }
            None => {
                self.done = true;
                None
            }
        }
    }

    /// 读完整个流（直到 End 或生产者消失），测试与同步模式使用
    pub async fn drain(mut self) -> Vec<ExecutionEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next().await {
            events.push(event);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_ordered_and_terminated() {
        let (tx, rx) = task_channel();
        tx.log("one");
        tx.plan("1. step");
        tx.result("answer");
        tx.end();

        let events = rx.drain().await;
        assert_eq!(events.len(), 4);
        let seqs: Vec<u64> = events.iter().map(|e| e.sequence).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3]);
        assert_eq!(events[0].kind, EventKind::Log);
        assert_eq!(events[3].kind, EventKind::End);
    }

    #[tokio::test]
    async fn test_end_emitted_exactly_once() {
        let (tx, rx) = task_channel();
        tx.end();
        tx.end();
        tx.log("after end is discarded");

        let events = rx.drain().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::End);
    }

    #[tokio::test]
    async fn test_detached_consumer_is_silent() {
        let (tx, rx) = task_channel();
        drop(rx);
        // 消费者断开后 emit 不得 panic、不得报错
        tx.log("into the void");
        tx.result("still fine");
        tx.end();
    }

    #[tokio::test]
    async fn test_stream_stops_after_end() {
        let (tx, mut rx) = task_channel();
        tx.log("x");
        tx.end();

        assert_eq!(rx.next().await.unwrap().kind, EventKind::Log);
        assert_eq!(rx.next().await.unwrap().kind, EventKind::End);
        assert!(rx.next().await.is_none());
    }
}
