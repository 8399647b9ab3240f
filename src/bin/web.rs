//! spider-web：HTTP 任务入口（需 feature "web"）
//!
//! POST /tasks 提交任务：mode=sync 同步返回终态 JSON，mode=stream 以 SSE
//! 推送事件流（event 字段即事件类型，最后必为一条 end）。GET /tasks/:id
//! 查询注册表中的任务状态。进程收到关闭信号后停止接收新连接，在途任务
//! 通过共享的取消 token 终止。

use std::convert::Infallible;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use spider::config::load_config;
use spider::core::{task_channel, ShutdownManager, Task, TaskRegistry, TaskRunner};
use spider::observability::init_tracing;
use spider::tools::{LocalSessionFactory, RejectPrompt};

#[derive(Clone)]
struct AppState {
    runner: Arc<TaskRunner>,
    registry: Arc<TaskRegistry>,
    shutdown: Arc<ShutdownManager>,
}

#[derive(Debug, Deserialize)]
struct TaskRequest {
    task: String,
    /// sync（默认）或 stream；历史上的 async 等同于 sync
    #[serde(default)]
    mode: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("spider=info,tower=warn");

    let config = load_config(None).context("failed to load configuration")?;
    let factory = Arc::new(LocalSessionFactory::from_config(&config));
    // HTTP 部署下没有交互终端，ask_user 工具直接报不可用
    let runner = Arc::new(TaskRunner::from_config(
        config,
        factory,
        Arc::new(RejectPrompt),
    )?);

    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.install_signal_handlers();

    let state = AppState {
        runner,
        registry: Arc::new(TaskRegistry::default()),
        shutdown: Arc::clone(&shutdown),
    };

    let app = Router::new()
        .route("/tasks", post(create_task))
        .route("/tasks/:id", get(get_task))
        .route("/health", get(|| async { "ok" }))
        .with_state(state);

    let addr = std::env::var("SPIDER_WEB_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("cannot bind {}", addr))?;
    tracing::info!(addr = %addr, "spider web API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.wait_for_shutdown().await })
        .await
        .context("server error")?;

    Ok(())
}

async fn create_task(State(state): State<AppState>, Json(req): Json<TaskRequest>) -> Response {
    let description = req.task.trim();
    if description.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "task must not be empty"})),
        )
            .into_response();
    }

    let task = Task::new(description);
    state.registry.insert(&task.id, &task.description).await;
    tracing::info!(task_id = %task.id, mode = ?req.mode, "task accepted");

    let (channel, stream) = task_channel();
    let cancel = state.shutdown.token();

    match req.mode.as_deref() {
        Some("stream") => {
            let runner = Arc::clone(&state.runner);
            let registry = Arc::clone(&state.registry);
            let task_id = task.id.clone();
            tokio::spawn(async move {
                let result = runner.run_task(&task, &channel, &cancel).await;
                registry.mark_finished(&task_id, result.status).await;
            });

            // 事件流直接映射为 SSE：event 为类型，data 为完整事件 JSON
            let sse = futures_util::stream::unfold(stream, |mut stream| async move {
                let event = stream.next().await?;
                let sse_event = Event::default()
                    .event(event.kind.as_str())
                    .data(serde_json::to_string(&event).unwrap_or_default());
                Some((Ok::<_, Infallible>(sse_event), stream))
            });
            Sse::new(sse).keep_alive(KeepAlive::default()).into_response()
        }
        // sync 以及历史兼容的 async：同步等待终态
        _ => {
            drop(stream);
            let result = state.runner.run_task(&task, &channel, &cancel).await;
            state.registry.mark_finished(&task.id, result.status).await;
            Json(serde_json::json!({
                "task_id": task.id,
                "status": result.status,
                "result": result.result,
                "message": result.message,
            }))
            .into_response()
        }
    }
}

async fn get_task(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.registry.get(&id).await {
        Some(entry) => Json(entry).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "task not found"})),
        )
            .into_response(),
    }
}
