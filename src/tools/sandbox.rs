//! 沙箱会话与沙箱工具族：命令执行、写文件、读文件
//!
//! LocalSandbox 在宿主机上以会话私有工作目录模拟远程沙箱：命令只允许
//! 白名单首词、禁止危险子串、带超时；文件读写限制在工作目录内，
//! 越界路径直接拒绝。会话关闭时整个工作目录被回收。

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

use crate::core::{AgentError, SandboxSession};
use crate::tools::Tool;

/// 禁止的命令/子串（即使白名单中有同名，也不允许带这些参数）
const FORBIDDEN_SUBSTR: &[&str] = &[
    "rm -rf",
    "rm -fr",
    "rm -r",
    "wget ",
    "curl | sh",
    "chmod 777",
    "chmod +s",
    "mkfs",
    "dd if=",
    "> /dev/sd",
    ":(){ :|:& };:", // fork bomb
];

/// 本地沙箱会话：每个会话一个独立工作目录
pub struct LocalSandbox {
    root: PathBuf,
    allowed_commands: HashSet<String>,
    timeout_secs: u64,
}

impl LocalSandbox {
    /// 在 base 下创建会话工作目录（session-<uuid>）
    pub async fn create(
        base: &Path,
        allowed_commands: Vec<String>,
        timeout_secs: u64,
    ) -> Result<Self, AgentError> {
        let root = base.join(format!("session-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| AgentError::ResourceAcquisition {
                resource: "sandbox",
                reason: format!("cannot create workspace {}: {}", root.display(), e),
            })?;

        Ok(Self {
            root,
            allowed_commands: allowed_commands.into_iter().map(|s| s.to_lowercase()).collect(),
            timeout_secs,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn is_allowed(&self, raw: &str) -> Result<(), AgentError> {
        let raw_lower = raw.to_lowercase();
        for forbidden in FORBIDDEN_SUBSTR {
            if raw_lower.contains(forbidden) {
                return Err(AgentError::ToolExecutionFailed(format!(
                    "Forbidden pattern: {}",
                    forbidden
                )));
            }
        }
        let name = raw_lower.split_whitespace().next().unwrap_or("");
        if name.is_empty() {
            return Err(AgentError::ToolExecutionFailed("Empty command".to_string()));
        }
        if self.allowed_commands.contains(name) {
            return Ok(());
        }
        Err(AgentError::ToolExecutionFailed(format!(
            "Command '{}' not in allowlist",
            name
        )))
    }

    /// 把相对路径钉在工作目录内；绝对路径与含 .. 的路径一律拒绝
    fn resolve(&self, path: &str) -> Result<PathBuf, AgentError> {
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            return Err(AgentError::PathEscape(path.to_string()));
        }
        for component in candidate.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => return Err(AgentError::PathEscape(path.to_string())),
            }
        }
        Ok(self.root.join(candidate))
    }
}

#[async_trait]
impl SandboxSession for LocalSandbox {
    async fn run_command(&self, command: &str) -> Result<String, AgentError> {
        let command = command.trim();
        self.is_allowed(command)?;

        tracing::info!(command = %command, "sandbox run_command");

        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", command]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", command]);
            c
        };
        cmd.current_dir(&self.root);
        // 超时丢弃 output future 时连带杀掉子进程，不留越过会话生命周期的进程
        cmd.kill_on_drop(true);

        let output = tokio::time::timeout(
            std::time::Duration::from_secs(self.timeout_secs),
            cmd.output(),
        )
        .await
        .map_err(|_| AgentError::ToolTimeout(format!("command timed out after {}s", self.timeout_secs)))?
        .map_err(|e| AgentError::ToolExecutionFailed(format!("Execution failed: {}", e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        Ok(format!("STDOUT:\n{}\nSTDERR:\n{}", stdout.trim(), stderr.trim()))
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<String, AgentError> {
        let resolved = self.resolve(path)?;
        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AgentError::ToolExecutionFailed(format!("mkdir failed: {}", e)))?;
        }
        tokio::fs::write(&resolved, content)
            .await
            .map_err(|e| AgentError::ToolExecutionFailed(format!("write failed: {}", e)))?;
        Ok(format!("Successfully wrote to {}.", path))
    }

    async fn read_file(&self, path: &str) -> Result<String, AgentError> {
        let resolved = self.resolve(path)?;
        tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|e| AgentError::ToolExecutionFailed(format!("read failed: {}", e)))
    }

    async fn close(&self) -> Result<(), AgentError> {
        tokio::fs::remove_dir_all(&self.root)
            .await
            .map_err(|e| AgentError::ToolExecutionFailed(format!(
                "workspace cleanup failed: {}",
                e
            )))?;
        tracing::info!(root = %self.root.display(), "sandbox workspace removed");
        Ok(())
    }
}

/// run_shell_command 工具
pub struct SandboxRunTool {
    session: Arc<dyn SandboxSession>,
}

impl SandboxRunTool {
    pub fn new(session: Arc<dyn SandboxSession>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Tool for SandboxRunTool {
    fn name(&self) -> &str {
        "run_shell_command"
    }

    fn description(&self) -> &str {
        "Execute a shell command in the sandboxed environment. Args: {\"command\": \"...\"}. Returns combined stdout/stderr."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "description": "The shell command to execute" }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, AgentError> {
        let command = args.get("command").and_then(|v| v.as_str()).unwrap_or("");
        if command.trim().is_empty() {
            return Err(AgentError::ToolExecutionFailed("Missing command".to_string()));
        }
        self.session.run_command(command).await
    }
}

/// write_file 工具
pub struct SandboxWriteFileTool {
    session: Arc<dyn SandboxSession>,
}

impl SandboxWriteFileTool {
    pub fn new(session: Arc<dyn SandboxSession>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Tool for SandboxWriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file inside the sandbox. Args: {\"path\": \"relative/path.txt\", \"content\": \"...\"}."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "File path relative to the sandbox root" },
                "content": { "type": "string", "description": "Text content to write" }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, AgentError> {
        let path = args.get("path").and_then(|v| v.as_str()).unwrap_or("").trim();
        let content = args.get("content").and_then(|v| v.as_str()).unwrap_or("");
        if path.is_empty() {
            return Err(AgentError::ToolExecutionFailed("Missing path".to_string()));
        }
        self.session.write_file(path, content).await
    }
}

/// read_file 工具
pub struct SandboxReadFileTool {
    session: Arc<dyn SandboxSession>,
}

impl SandboxReadFileTool {
    pub fn new(session: Arc<dyn SandboxSession>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Tool for SandboxReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a file from the sandbox. Args: {\"path\": \"relative/path.txt\"}. Returns the file content."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "File path relative to the sandbox root" }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, AgentError> {
        let path = args.get("path").and_then(|v| v.as_str()).unwrap_or("").trim();
        if path.is_empty() {
            return Err(AgentError::ToolExecutionFailed("Missing path".to_string()));
        }
        self.session.read_file(path).await
    }
}
