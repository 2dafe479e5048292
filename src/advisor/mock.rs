//! Mock 决策服务（测试与离线演示用，无需 API）
//!
//! 按压入顺序弹出脚本化响应；队列空时回落到单个 end_turn 批次。
//! 可配置响应延迟，用于模拟多秒级外部往返与超时场景。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::advisor::{AdvisorClient, ServiceError};

/// 队列空时的兜底响应
const DEFAULT_RESPONSE: &str = r#"{"actions":[{"action":"end_turn"}]}"#;

/// Mock 客户端：脚本化响应 + 可配置延迟 + 调用计数
#[derive(Debug, Default)]
pub struct MockAdvisor {
    responses: Mutex<VecDeque<Result<String, ServiceError>>>,
    latency: Duration,
    calls: AtomicUsize,
}

impl MockAdvisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置每次 decide 的模拟延迟
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// 压入一条成功响应
    pub fn push_response(&self, body: &str) {
        self.lock_queue().push_back(Ok(body.to_string()));
    }

    /// 压入一条失败
    pub fn push_error(&self, error: ServiceError) {
        self.lock_queue().push_back(Err(error));
    }

    /// 累计 decide 调用次数（验证缓存 / 去重不会重复触发外部服务）
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn lock_queue(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<String, ServiceError>>> {
        self.responses
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl AdvisorClient for MockAdvisor {
    async fn decide(&self, _payload: &str) -> Result<String, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        self.lock_queue()
            .pop_front()
            .unwrap_or_else(|| Ok(DEFAULT_RESPONSE.to_string()))
    }
}
