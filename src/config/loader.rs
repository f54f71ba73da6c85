//! Configuration Loader
//!
//! 实现多源配置加载与合并逻辑
//!
//! 优先级（从高到低）：
//! 1. 环境变量
//! 2. 配置文件（config.toml）
//! 3. 默认值

use config::{Config, ConfigError as ConfigCrateError, Environment, File};
use std::path::Path;
use thiserror::Error;

use super::types::AppConfig;

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigCrateError> for ConfigError {
    fn from(err: ConfigCrateError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

/// 配置文件搜索路径
const CONFIG_FILE_NAMES: &[&str] = &["config", "config.local"];

/// 环境变量前缀
const ENV_PREFIX: &str = "STORYFORGE";

/// 加载应用配置
///
/// 按优先级从高到低合并配置：
/// 1. 环境变量（前缀 `STORYFORGE_`，层级分隔符 `__`）
/// 2. 配置文件（config.toml 或 config.local.toml）
/// 3. 默认值
///
/// # 环境变量示例
/// - `STORYFORGE_LLM__API_KEY=sk-...`
/// - `STORYFORGE_LLM__MODEL=microsoft/phi-4`
/// - `STORYFORGE_GENERATION__EPILOGUE=true`
/// - `STORYFORGE_RETRY__MAX_RETRIES=5`
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from_path(None)
}

/// 从指定路径加载配置
///
/// # 参数
/// - `config_path` - 可选的配置文件路径，如果为 None 则使用默认搜索路径
pub fn load_config_from_path(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder();

    // 1. 默认值（最低优先级）
    builder = builder
        .set_default("llm.base_url", crate::infrastructure::adapters::DEFAULT_BASE_URL)?
        .set_default("llm.model", crate::infrastructure::adapters::DEFAULT_MODEL)?
        .set_default("llm.timeout_secs", crate::infrastructure::adapters::DEFAULT_TIMEOUT_SECS)?
        .set_default("generation.chapter_mode", true)?
        .set_default("generation.single_shot_threshold", 3000)?
        .set_default("generation.ideal_chapter_words", 3000)?
        .set_default("generation.min_target_words", 500)?
        .set_default("generation.max_chapter_attempts", 3)?
        .set_default("generation.min_length_ratio", 0.5)?
        .set_default("generation.max_length_ratio", 1.5)?
        .set_default("generation.continuity", "llm")?
        .set_default("generation.continuity_max_chars", 2400)?
        .set_default("generation.ending_excerpt_chars", 800)?
        .set_default("generation.epilogue", false)?
        .set_default("generation.max_tokens_per_call", 15_000)?
        .set_default("retry.max_retries", 3)?
        .set_default("retry.initial_delay_ms", 15_000)?
        .set_default("retry.backoff_factor", 1.5)?
        .set_default("retry.max_delay_ms", 120_000)?
        .set_default("retry.jitter", true)?
        .set_default("log.level", "info")?
        .set_default("log.json", false)?;

    // 2. 配置文件（如果存在）
    if let Some(path) = config_path {
        builder = builder.add_source(File::from(path).required(true));
    } else {
        for name in CONFIG_FILE_NAMES {
            builder = builder.add_source(File::with_name(name).required(false));
        }
    }

    // 3. 环境变量（最高优先级）
    // 例如: STORYFORGE_LLM__API_KEY=sk-...
    // 注意: 环境变量名会被转换为小写
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;

    let app_config: AppConfig = config.try_deserialize().map_err(|e| {
        ConfigError::ParseError(format!("Failed to deserialize config: {}", e))
    })?;

    validate_config(&app_config)?;

    Ok(app_config)
}

/// 验证配置有效性
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.llm.base_url.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "LLM base URL cannot be empty".to_string(),
        ));
    }

    if config.llm.model.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "LLM model cannot be empty".to_string(),
        ));
    }

    if config.llm.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "LLM timeout cannot be 0".to_string(),
        ));
    }

    let generation = &config.generation;
    if generation.ideal_chapter_words == 0 {
        return Err(ConfigError::ValidationError(
            "Ideal chapter length cannot be 0".to_string(),
        ));
    }

    if generation.max_chapter_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "Max chapter attempts must be at least 1".to_string(),
        ));
    }

    if !(generation.min_length_ratio > 0.0
        && generation.min_length_ratio <= 1.0
        && generation.max_length_ratio >= 1.0)
    {
        return Err(ConfigError::ValidationError(format!(
            "Invalid length ratios: min {} max {} (need 0 < min <= 1 <= max)",
            generation.min_length_ratio, generation.max_length_ratio
        )));
    }

    if generation.continuity_max_chars == 0 || generation.ending_excerpt_chars == 0 {
        return Err(ConfigError::ValidationError(
            "Continuity bounds cannot be 0".to_string(),
        ));
    }

    if generation.max_tokens_per_call == 0 {
        return Err(ConfigError::ValidationError(
            "Max tokens per call cannot be 0".to_string(),
        ));
    }

    if config.retry.backoff_factor.is_nan() || config.retry.backoff_factor < 1.0 {
        return Err(ConfigError::ValidationError(
            "Retry backoff factor must be >= 1.0".to_string(),
        ));
    }

    if config.retry.max_delay_ms < config.retry.initial_delay_ms {
        return Err(ConfigError::ValidationError(
            "Retry max delay cannot be below the initial delay".to_string(),
        ));
    }

    Ok(())
}

/// 打印配置信息（用于启动时日志）
pub fn print_config(config: &AppConfig) {
    let generation = &config.generation;
    tracing::info!("=== Application Configuration ===");
    tracing::info!("LLM URL: {}", config.llm.base_url);
    tracing::info!("LLM Model: {}", config.llm.model);
    tracing::info!(
        "LLM API Key: {}",
        if config.llm.api_key.is_some() { "***" } else { "(not set)" }
    );
    tracing::info!("LLM Timeout: {}s", config.llm.timeout_secs);
    tracing::info!("Chapter Mode: {}", generation.chapter_mode);
    if generation.chapter_mode {
        tracing::info!(
            "Chapters: threshold {} words, ~{} words per chapter",
            generation.single_shot_threshold,
            generation.ideal_chapter_words
        );
    }
    tracing::info!(
        "Validation: {}-{}x target, {} attempts",
        generation.min_length_ratio,
        generation.max_length_ratio,
        generation.max_chapter_attempts
    );
    tracing::info!("Continuity: {:?}", generation.continuity);
    tracing::info!("Epilogue: {}", generation.epilogue);
    tracing::info!(
        "Retry: {} retries, {}ms initial, x{}",
        config.retry.max_retries,
        config.retry.initial_delay_ms,
        config.retry.backoff_factor
    );
    tracing::info!("Log Level: {}", config.log.level);
    tracing::info!("=================================");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::settings::ContinuityStrategy;
    use std::io::Write;

    #[test]
    fn test_validation_passes_for_valid_config() {
        let config = AppConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validation_error_for_zero_attempts() {
        let mut config = AppConfig::default();
        config.generation.max_chapter_attempts = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_error_for_inverted_ratios() {
        let mut config = AppConfig::default();
        config.generation.min_length_ratio = 1.2;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_error_for_empty_model() {
        let mut config = AppConfig::default();
        config.llm.model = String::new();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[llm]
model = "meta-llama/Llama-3.3-70B-Instruct"

[generation]
ideal_chapter_words = 2500
continuity = "heuristic"
epilogue = true

[retry]
max_retries = 5
"#
        )
        .unwrap();

        let config = load_config_from_path(Some(file.path())).unwrap();
        assert_eq!(config.llm.model, "meta-llama/Llama-3.3-70B-Instruct");
        assert_eq!(config.llm.timeout_secs, 300);
        assert_eq!(config.generation.ideal_chapter_words, 2500);
        assert_eq!(config.generation.continuity, ContinuityStrategy::Heuristic);
        assert!(config.generation.epilogue);
        assert_eq!(config.generation.single_shot_threshold, 3000);
        assert_eq!(config.retry.max_retries, 5);
    }

    #[test]
    fn test_invalid_file_fails_validation() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[generation]\nmax_chapter_attempts = 0").unwrap();
        assert!(matches!(
            load_config_from_path(Some(file.path())),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_missing_file_is_load_error() {
        let result = load_config_from_path(Some(Path::new("/nonexistent/storyforge.toml")));
        assert!(matches!(result, Err(ConfigError::LoadError(_))));
    }
}
