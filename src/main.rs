//! Storyforge - 分章长篇故事生成
//!
//! 用法: storyforge [request.json]
//! - 从文件（或 stdin）读取 GenerateStory JSON
//! - 生成的 Markdown 文档输出到 stdout，日志输出到 stderr
//! - Ctrl-C 在下一个章节边界取消运行

use std::sync::Arc;

use anyhow::Context;
use tokio::io::AsyncReadExt;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use storyforge::application::{GenerateStory, GenerateStoryHandler, PipelineEvent};
use storyforge::application::ports::CompletionPort;
use storyforge::config::{load_config, print_config, LogConfig};
use storyforge::infrastructure::{EventPublisher, HttpCompletionClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载配置（优先级：环境变量 > 配置文件 > 默认值）
    let config = load_config().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    init_tracing(&config.log);

    tracing::info!("Storyforge - 分章长篇故事生成");
    print_config(&config);

    let command = read_command(std::env::args().nth(1)).await?;

    // 创建 HTTP 补全客户端
    let client = Arc::new(HttpCompletionClient::new(config.llm.to_client_config())?);
    if !client.health_check().await {
        tracing::warn!("LLM service health check failed, continuing anyway");
    }

    // 创建事件发布器并记录进度
    let events = EventPublisher::new().arc();
    let mut progress = events.subscribe_global();
    tokio::spawn(async move {
        loop {
            match progress.recv().await {
                Ok(event) => log_event(&event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Progress log lagging behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Ctrl-C → 在下一个章节边界取消
    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received interrupt, cancelling at next chapter boundary");
            interrupt.cancel();
        }
    });

    let handler = GenerateStoryHandler::new(
        client,
        events,
        config.generation.to_settings(),
        config.retry.to_policy(),
    );

    match handler.handle(command, cancel).await {
        Ok(response) => {
            if let Some(plan) = &response.plan {
                tracing::info!(
                    "Outline:\n{}",
                    plan.render_outline(response.document.title(), response.document.language())
                );
            }
            println!("{}", response.document.render());
            tracing::info!(
                run_id = %response.run_id,
                words = response.document.word_count(),
                "Done"
            );
            Ok(())
        }
        Err(err) => {
            if let Some(abort) = err.abort() {
                tracing::error!(
                    accepted = abort.accepted.len(),
                    "Run aborted, no document produced"
                );
            }
            Err(err.into())
        }
    }
}

fn init_tracing(log: &LogConfig) {
    let log_filter = format!("{},storyforge={}", log.level, log.level);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn read_command(path: Option<String>) -> anyhow::Result<GenerateStory> {
    let raw = match path {
        Some(path) => tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read request file {}", path))?,
        None => {
            let mut buf = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buf)
                .await
                .context("Failed to read request from stdin")?;
            buf
        }
    };
    serde_json::from_str(&raw).context("Invalid GenerateStory JSON")
}

fn log_event(event: &PipelineEvent) {
    match event {
        PipelineEvent::ModeSelected {
            mode,
            effective_target,
            ..
        } => {
            tracing::info!(mode = ?mode, target = effective_target, "Mode selected");
        }
        PipelineEvent::OutlineReady {
            chapters,
            synthesized,
            ..
        } => {
            tracing::info!(chapters, synthesized, "Outline ready");
        }
        PipelineEvent::ChapterStateChanged {
            state, words, error, ..
        } => {
            tracing::info!(state = %state, words = ?words, error = ?error, "Progress");
        }
        PipelineEvent::Completed {
            sections, words, ..
        } => {
            tracing::info!(sections, words, "Completed");
        }
        PipelineEvent::Aborted {
            reason, accepted, ..
        } => {
            tracing::warn!(reason = %reason, accepted, "Aborted");
        }
    }
}
