//! spider CLI：执行单个任务并把事件流打印到终端

use std::io::Write as _;
use std::sync::Arc;

use anyhow::Context;

use spider::config::load_config;
use spider::core::{task_channel, EventKind, ShutdownManager, Task, TaskRunner, TaskStatus};
use spider::observability::init_tracing;
use spider::tools::{LocalSessionFactory, StdinPrompt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("spider=info");

    let config = load_config(None).context("failed to load configuration")?;

    // 任务描述：命令行参数拼接，否则交互式输入
    let args: Vec<String> = std::env::args().skip(1).collect();
    let description = if args.is_empty() {
        print!("请输入你的任务：");
        std::io::stdout().flush()?;
        let mut line = String::new();
        std::io::stdin().read_line(&mut line)?;
        line.trim().to_string()
    } else {
        args.join(" ")
    };
    if description.is_empty() {
        anyhow::bail!("task description is empty");
    }

    let factory = Arc::new(LocalSessionFactory::from_config(&config));
    let runner = TaskRunner::from_config(config, factory, Arc::new(StdinPrompt))?;

    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.install_signal_handlers();
    let cancel = shutdown.token();

    let task = Task::new(description);
    tracing::info!(task_id = %task.id, "running task from CLI");

    let (channel, mut stream) = task_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = stream.next().await {
            match event.kind {
                EventKind::End => break,
                EventKind::Result => {} // 终态在 main 末尾统一打印
                _ => println!("[{}] {}", event.kind.as_str(), event.payload),
            }
        }
    });

    let result = runner.run_task(&task, &channel, &cancel).await;
    let _ = printer.await;

    match result.status {
        TaskStatus::Completed => {
            println!("\n=== 结果 ===\n{}", result.result.unwrap_or_default());
            Ok(())
        }
        TaskStatus::Cancelled => {
            println!("\n任务已取消");
            Ok(())
        }
        TaskStatus::Error => {
            anyhow::bail!("任务失败: {}", result.message.unwrap_or_default())
        }
    }
}
