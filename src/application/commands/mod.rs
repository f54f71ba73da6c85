//! 应用层 - 命令
//!
//! CQRS 命令侧：生成故事

mod story_commands;

pub mod handlers;

pub use story_commands::*;
