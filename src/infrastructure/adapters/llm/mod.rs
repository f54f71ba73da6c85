//! LLM Adapter - 补全客户端实现

mod http_completion_client;
mod scripted_completion_client;

pub use http_completion_client::*;
pub use scripted_completion_client::{Responder, ScriptedCompletionClient};
