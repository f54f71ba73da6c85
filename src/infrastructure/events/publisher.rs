//! Event Publisher Implementation
//!
//! 流水线进度事件推送实现

use crate::application::ports::{PipelineEvent, PipelineEventPort};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

const CHANNEL_CAPACITY: usize = 256;

/// 事件发布器
///
/// 每个事件同时发往全局通道和所属运行的通道（如已注册）。
/// 并发的独立运行可以分别订阅，互不干扰。
pub struct EventPublisher {
    /// run_id -> broadcast sender (for run-specific events)
    run_channels: DashMap<Uuid, broadcast::Sender<PipelineEvent>>,
    /// Global broadcast channel
    global_channel: broadcast::Sender<PipelineEvent>,
}

impl EventPublisher {
    pub fn new() -> Self {
        let (global_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            run_channels: DashMap::new(),
            global_channel: global_tx,
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// 订阅所有运行的事件
    pub fn subscribe_global(&self) -> broadcast::Receiver<PipelineEvent> {
        self.global_channel.subscribe()
    }

    /// 注册运行的事件通道
    pub fn register_run(&self, run_id: Uuid) -> broadcast::Receiver<PipelineEvent> {
        if let Some(sender) = self.run_channels.get(&run_id) {
            return sender.subscribe();
        }

        let (tx, rx) = broadcast::channel(CHANNEL_CAPACITY);
        self.run_channels.insert(run_id, tx);
        rx
    }

    /// 取消注册运行
    pub fn unregister_run(&self, run_id: Uuid) {
        self.run_channels.remove(&run_id);
    }

    /// 获取运行的事件接收器
    pub fn subscribe(&self, run_id: Uuid) -> Option<broadcast::Receiver<PipelineEvent>> {
        self.run_channels.get(&run_id).map(|s| s.subscribe())
    }

    pub fn registered_runs(&self) -> usize {
        self.run_channels.len()
    }
}

impl PipelineEventPort for EventPublisher {
    fn publish(&self, event: PipelineEvent) {
        let run_id = event.run_id();

        if let Some(sender) = self.run_channels.get(&run_id) {
            if let Err(e) = sender.send(event.clone()) {
                tracing::trace!(
                    run_id = %run_id,
                    error = %e,
                    "Failed to publish run event (no receivers)"
                );
            }
        }

        if let Err(e) = self.global_channel.send(event) {
            tracing::trace!(
                run_id = %run_id,
                error = %e,
                "Failed to publish global event (no receivers)"
            );
        }
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}
