//! Configuration Types
//!
//! 定义所有配置结构体

use serde::Deserialize;
use std::time::Duration;

use crate::application::retry::RetryPolicy;
use crate::application::settings::{ContinuityStrategy, GenerationSettings};
use crate::domain::{LengthPolicy, ValidationPolicy};
use crate::infrastructure::adapters::{
    HttpCompletionClientConfig, DEFAULT_BASE_URL, DEFAULT_MODEL, DEFAULT_TIMEOUT_SECS,
};

/// 应用主配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// LLM 服务配置
    #[serde(default)]
    pub llm: LlmConfig,

    /// 生成参数
    #[serde(default)]
    pub generation: GenerationConfig,

    /// 重试策略
    #[serde(default)]
    pub retry: RetryConfig,

    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// LLM 服务配置
#[derive(Clone, Deserialize)]
pub struct LlmConfig {
    /// OpenAI 兼容服务的基础 URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// API 密钥（建议通过环境变量 STORYFORGE_LLM__API_KEY 设置）
    #[serde(default)]
    pub api_key: Option<String>,

    /// 单次调用超时时间（秒）
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            timeout_secs: default_timeout(),
        }
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl LlmConfig {
    pub fn to_client_config(&self) -> HttpCompletionClientConfig {
        HttpCompletionClientConfig {
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            api_key: self.api_key.clone(),
            timeout_secs: self.timeout_secs,
        }
    }
}

/// 生成参数配置
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationConfig {
    /// 是否启用分章生成
    #[serde(default = "default_true")]
    pub chapter_mode: bool,

    /// 不超过此词数时单次生成
    #[serde(default = "default_3000")]
    pub single_shot_threshold: u32,

    /// 理想章节长度
    #[serde(default = "default_3000")]
    pub ideal_chapter_words: u32,

    /// 目标词数下限
    #[serde(default = "default_min_target")]
    pub min_target_words: u32,

    /// 每章最大生成尝试次数
    #[serde(default = "default_max_attempts")]
    pub max_chapter_attempts: u32,

    /// 章节词数下限（相对目标）
    #[serde(default = "default_min_ratio")]
    pub min_length_ratio: f64,

    /// 章节词数上限（相对目标）
    #[serde(default = "default_max_ratio")]
    pub max_length_ratio: f64,

    /// 连续性摘要策略: llm | heuristic
    #[serde(default)]
    pub continuity: ContinuityStrategy,

    #[serde(default = "default_continuity_chars")]
    pub continuity_max_chars: usize,

    #[serde(default = "default_ending_chars")]
    pub ending_excerpt_chars: usize,

    /// 是否生成尾声
    #[serde(default)]
    pub epilogue: bool,

    /// 单次调用的最大输出 token 数
    #[serde(default = "default_max_tokens")]
    pub max_tokens_per_call: u32,
}

fn default_true() -> bool {
    true
}

fn default_3000() -> u32 {
    3000
}

fn default_min_target() -> u32 {
    500
}

fn default_max_attempts() -> u32 {
    3
}

fn default_min_ratio() -> f64 {
    0.5
}

fn default_max_ratio() -> f64 {
    1.5
}

fn default_continuity_chars() -> usize {
    2400
}

fn default_ending_chars() -> usize {
    800
}

fn default_max_tokens() -> u32 {
    15_000
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            chapter_mode: default_true(),
            single_shot_threshold: default_3000(),
            ideal_chapter_words: default_3000(),
            min_target_words: default_min_target(),
            max_chapter_attempts: default_max_attempts(),
            min_length_ratio: default_min_ratio(),
            max_length_ratio: default_max_ratio(),
            continuity: ContinuityStrategy::default(),
            continuity_max_chars: default_continuity_chars(),
            ending_excerpt_chars: default_ending_chars(),
            epilogue: false,
            max_tokens_per_call: default_max_tokens(),
        }
    }
}

impl GenerationConfig {
    pub fn to_settings(&self) -> GenerationSettings {
        GenerationSettings {
            chapter_mode: self.chapter_mode,
            length_policy: LengthPolicy::new(self.single_shot_threshold, self.ideal_chapter_words),
            min_target_words: self.min_target_words,
            max_chapter_attempts: self.max_chapter_attempts,
            validation: ValidationPolicy::with_ratios(self.min_length_ratio, self.max_length_ratio),
            continuity: self.continuity,
            continuity_max_chars: self.continuity_max_chars,
            ending_excerpt_chars: self.ending_excerpt_chars,
            epilogue: self.epilogue,
            max_tokens_per_call: self.max_tokens_per_call,
        }
    }
}

/// 重试策略配置
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// 暂时性错误的最大重试次数
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// 首次重试前的等待时间（毫秒）
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_backoff")]
    pub backoff_factor: f64,

    /// 等待时间上限（毫秒）
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    #[serde(default = "default_true")]
    pub jitter: bool,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay() -> u64 {
    15_000
}

fn default_backoff() -> f64 {
    1.5
}

fn default_max_delay() -> u64 {
    120_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay(),
            backoff_factor: default_backoff(),
            max_delay_ms: default_max_delay(),
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            backoff_factor: self.backoff_factor,
            max_delay: Duration::from_millis(self.max_delay_ms),
            jitter: self.jitter,
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否启用 JSON 格式
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.llm.base_url, "https://api.studio.nebius.com/v1");
        assert_eq!(config.llm.model, "microsoft/phi-4");
        assert!(config.llm.api_key.is_none());
        assert_eq!(config.generation.ideal_chapter_words, 3000);
        assert_eq!(config.retry.max_retries, 3);
    }

    #[test]
    fn test_settings_conversion_matches_defaults() {
        let settings = GenerationConfig::default().to_settings();
        let defaults = GenerationSettings::default();
        assert_eq!(settings.length_policy, defaults.length_policy);
        assert_eq!(settings.validation, defaults.validation);
        assert_eq!(settings.max_chapter_attempts, defaults.max_chapter_attempts);
        assert_eq!(settings.continuity, defaults.continuity);
    }

    #[test]
    fn test_retry_policy_conversion() {
        let policy = RetryConfig::default().to_policy();
        assert_eq!(policy, RetryPolicy::default());
    }

    #[test]
    fn test_api_key_is_masked_in_debug() {
        let config = LlmConfig {
            api_key: Some("sk-secret".to_string()),
            ..LlmConfig::default()
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("sk-secret"));
        assert_eq!(config.to_client_config().api_key.as_deref(), Some("sk-secret"));
    }
}
