//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Mock）、按角色工厂

pub mod factory;
pub mod mock;
pub mod openai;
pub mod traits;

pub use factory::create_llm;
pub use mock::MockLlmClient;
pub use openai::OpenAiClient;
pub use traits::{LlmClient, Message, Role};
