//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `SPIDER__*` 覆盖
//! （双下划线表示嵌套，如 `SPIDER__LLM__PLANNER__MODEL=qwen-max`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmSection,
    pub plan: PlanSection,
    pub browser: BrowserSection,
    pub sandbox: SandboxSection,
    pub search: SearchSection,
    pub retry: RetrySection,
}

/// [llm] 段：四个角色各自的提供方 / 模型 / 温度
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub router: LlmRoleSection,
    pub planner: LlmRoleSection,
    pub executor: LlmRoleSection,
    pub direct_answer: LlmRoleSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            router: LlmRoleSection::new("qwen-turbo", 0.0),
            planner: LlmRoleSection::new("qwen-max", 0.0),
            executor: LlmRoleSection::new("qwen-turbo", 0.0),
            // 直接回答时可以更有创意一点
            direct_answer: LlmRoleSection::new("qwen-turbo", 0.7),
        }
    }
}

/// 单个角色的 LLM 配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmRoleSection {
    /// 提供方：openai / tongyi / google（均走 OpenAI 兼容端点）
    pub provider: String,
    pub model: String,
    pub temperature: f32,
    /// 覆盖提供方的默认端点
    pub base_url: Option<String>,
}

impl LlmRoleSection {
    fn new(model: &str, temperature: f32) -> Self {
        Self {
            provider: "tongyi".to_string(),
            model: model.to_string(),
            temperature,
            base_url: None,
        }
    }
}

impl Default for LlmRoleSection {
    fn default() -> Self {
        Self::new("qwen-turbo", 0.0)
    }
}

/// [plan] 段：规划提示词覆盖与单步工具调用上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlanSection {
    /// 为 None 时使用内置规划提示词（编号步骤 + <END_OF_PLAN> 结尾）
    pub system_prompt: Option<String>,
    #[serde(default = "default_max_tool_calls_per_step")]
    pub max_tool_calls_per_step: usize,
}

impl Default for PlanSection {
    fn default() -> Self {
        Self {
            system_prompt: None,
            max_tool_calls_per_step: default_max_tool_calls_per_step(),
        }
    }
}

fn default_max_tool_calls_per_step() -> usize {
    8
}

/// [browser] 段：自动化会话
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserSection {
    /// true 为无头模式（后台运行），false 会弹出浏览器窗口
    #[serde(default = "default_headless")]
    pub headless: bool,
    /// 单次浏览器操作超时（秒）
    #[serde(default = "default_browser_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for BrowserSection {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            timeout_secs: default_browser_timeout_secs(),
        }
    }
}

fn default_headless() -> bool {
    true
}

fn default_browser_timeout_secs() -> u64 {
    30
}

/// [sandbox] 段：工作目录、命令白名单与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SandboxSection {
    /// 沙箱根目录，未设置时用 ./workspace
    pub workspace_root: Option<PathBuf>,
    /// 允许执行的命令名（仅首词，如 ls、grep、python3）
    #[serde(default = "default_allowed_commands")]
    pub allowed_commands: Vec<String>,
    /// 单次命令超时（秒）
    #[serde(default = "default_sandbox_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SandboxSection {
    fn default() -> Self {
        Self {
            workspace_root: None,
            allowed_commands: default_allowed_commands(),
            timeout_secs: default_sandbox_timeout_secs(),
        }
    }
}

fn default_allowed_commands() -> Vec<String> {
    vec![
        "ls".into(),
        "cat".into(),
        "head".into(),
        "tail".into(),
        "grep".into(),
        "wc".into(),
        "find".into(),
        "echo".into(),
        "date".into(),
        "python3".into(),
    ]
}

fn default_sandbox_timeout_secs() -> u64 {
    30
}

/// [search] 段：搜索超时与结果条数上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    #[serde(default = "default_search_timeout_secs")]
    pub timeout_secs: u64,
    /// 返回结果条数上限
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// 单条结果最大字符数，超出截断
    #[serde(default = "default_max_result_chars")]
    pub max_result_chars: usize,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_search_timeout_secs(),
            max_results: default_max_results(),
            max_result_chars: default_max_result_chars(),
        }
    }
}

fn default_search_timeout_secs() -> u64 {
    15
}

fn default_max_results() -> usize {
    3
}

fn default_max_result_chars() -> usize {
    2000
}

/// [retry] 段：执行步骤的重试策略
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// 首次退避（秒），之后指数翻倍
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,
    /// 退避上限（秒）
    #[serde(default = "default_backoff_cap_secs")]
    pub backoff_cap_secs: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_secs: default_backoff_base_secs(),
            backoff_cap_secs: default_backoff_cap_secs(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_secs() -> u64 {
    4
}

fn default_backoff_cap_secs() -> u64 {
    10
}

/// 从 config 目录加载配置，环境变量 SPIDER__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 SPIDER__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("SPIDER")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
