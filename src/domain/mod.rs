//! Domain Layer - 领域层
//!
//! 包含一个限界上下文:
//! - Story Context: 故事生成请求、章节计划、章节与最终文档
//!
//! 以及若干纯函数模块（长度策略、大纲解析、文本清理、校验、组装）

pub mod story;

pub mod assembler;
pub mod length_policy;
pub mod outline_parser;
pub mod text_cleaner;
pub mod validation;

pub use assembler::{assemble, assemble_single_shot};
pub use length_policy::{GenerationMode, LengthPolicy};
pub use outline_parser::{parse_outline, OutlineParse};
pub use text_cleaner::{clean_text_ending, count_words, strip_leading_headings};
pub use validation::{ValidationFailure, ValidationPolicy};
