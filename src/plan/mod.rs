//! Plan-and-Execute：规划器、逐步执行器与阶段编排

pub mod executor;
pub mod orchestrator;
pub mod planner;

pub use executor::{parse_llm_action, LlmAction, StepExecutor};
pub use orchestrator::{Orchestrator, Phase};
pub use planner::{parse_plan, Plan, Planner, DEFAULT_PLANNER_PROMPT, END_OF_PLAN};
