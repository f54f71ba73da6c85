//! Storyforge - 分章长篇故事生成流水线
//!
//! 架构设计: DDD + Hexagonal Architecture
//!
//! 领域层 (domain/):
//! - Story Context: 生成请求、章节计划、章节、故事文档、序列器状态
//! - 长度策略、大纲解析、文本清理、章节校验、组装器
//!
//! 应用层 (application/):
//! - Ports: 端口定义（CompletionPort, PipelineEventPort）
//! - Commands: GenerateStory 命令及处理器
//! - Pipeline: 大纲生成、章节序列器、连续性摘要
//! - Retry: 重试策略
//!
//! 基础设施层 (infrastructure/):
//! - Adapters: HTTP Completion Client, Scripted Completion Client
//! - Events: 进度事件发布

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::{load_config, AppConfig};
