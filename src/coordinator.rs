//! 决策协调器
//!
//! 以（回合，代理）为键编排完整决策生命周期：同键至多一个在途请求、结果按键缓存、
//! 同回合重复轮询永远拿到同一批次。任何失败路径（服务错误、解码失败、超时）都合成
//! 仅含终结意图的批次写入缓存，保证回合一定能推进。超时预算归本层所有：墙钟超限
//! 即取消底层任务。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::advisor::AdvisorClient;
use crate::intent::{decode_batch, IntentBatch};
use crate::task::{DecisionTask, TaskPoll};

/// 缓存键：（回合号，代理 ID）
pub type DecisionKey = (i32, i32);

/// 轮询返回：决策尚未就绪，或就绪的意图批次
#[derive(Debug, Clone, PartialEq)]
pub enum DecisionStatus {
    Waiting,
    Ready(IntentBatch),
}

/// 缓存条目：批次与落定时刻（日志与回放排查用）
#[derive(Debug, Clone)]
struct CachedDecision {
    batch: IntentBatch,
    decided_at: DateTime<Utc>,
}

/// 决策协调器：持有外部服务客户端、单个任务槽与按键缓存
pub struct DecisionCoordinator {
    advisor: Arc<dyn AdvisorClient>,
    task: DecisionTask,
    cache: HashMap<DecisionKey, CachedDecision>,
    inflight: Option<DecisionKey>,
    timeout: Duration,
}

impl DecisionCoordinator {
    pub fn new(advisor: Arc<dyn AdvisorClient>, timeout: Duration) -> Self {
        Self {
            advisor,
            task: DecisionTask::new(),
            cache: HashMap::new(),
            inflight: None,
            timeout,
        }
    }

    /// 发起一次决策请求。键已有缓存或已在途时无副作用返回 false，
    /// 保证同键外部调用至多发出一次
    pub fn request_decision(&mut self, key: DecisionKey, payload: String) -> bool {
        if self.cache.contains_key(&key) {
            tracing::debug!(turn = key.0, agent = key.1, "Decision already cached, not requesting");
            return false;
        }
        // 任务槽是单占的：前一个键占着槽（无论 Pending 还是已完成待轮询）
        // 就不接受新键，否则重启任务会覆盖掉尚未被消费的结果
        if let Some(other) = self.inflight {
            if other == key {
                tracing::debug!(turn = key.0, agent = key.1, "Decision already in flight, not requesting");
            } else {
                tracing::warn!(
                    turn = key.0,
                    agent = key.1,
                    pending_turn = other.0,
                    pending_agent = other.1,
                    "Task slot held by an unsettled key, request deferred"
                );
            }
            return false;
        }

        if !self.task.start(payload, Arc::clone(&self.advisor)) {
            tracing::warn!(turn = key.0, agent = key.1, "Task slot busy, request deferred");
            return false;
        }

        tracing::info!(turn = key.0, agent = key.1, "Decision request started");
        self.inflight = Some(key);
        true
    }

    /// 轮询指定键的决策。缓存命中立即返回；在途请求按完成/失败/超时推进，
    /// 任何终态都先写缓存再返回，之后对同键的轮询只走缓存
    pub fn poll_decision(&mut self, key: DecisionKey) -> DecisionStatus {
        if let Some(cached) = self.cache.get(&key) {
            return DecisionStatus::Ready(cached.batch.clone());
        }

        if self.inflight != Some(key) {
            return DecisionStatus::Waiting;
        }

        // 超时预算归协调器：墙钟超限即取消任务并落定终结批次
        if let Some(elapsed) = self.task.elapsed() {
            if self.task.state() == crate::task::TaskState::Pending && elapsed > self.timeout {
                tracing::warn!(
                    turn = key.0,
                    agent = key.1,
                    elapsed_secs = elapsed.as_secs(),
                    "Decision request timed out, cancelling"
                );
                self.task.cancel();
                return self.settle(key, IntentBatch::terminal_only("Decision timed out"));
            }
        }

        match self.task.poll() {
            TaskPoll::Pending => DecisionStatus::Waiting,
            TaskPoll::Idle => DecisionStatus::Waiting,
            TaskPoll::Ready(body) => match decode_batch(&body) {
                Ok(batch) => {
                    tracing::info!(
                        turn = key.0,
                        agent = key.1,
                        intents = batch.len(),
                        "Decision ready"
                    );
                    self.settle(key, batch)
                }
                Err(e) => {
                    tracing::warn!(turn = key.0, agent = key.1, error = %e, "Decision body undecodable");
                    self.settle(key, IntentBatch::terminal_only("Invalid decision format"))
                }
            },
            TaskPoll::Failed(error) => {
                tracing::warn!(turn = key.0, agent = key.1, error, "Decision request failed");
                self.settle(key, IntentBatch::terminal_only("Decision service unavailable"))
            }
        }
    }

    fn settle(&mut self, key: DecisionKey, batch: IntentBatch) -> DecisionStatus {
        self.inflight = None;
        self.cache.insert(
            key,
            CachedDecision {
                batch: batch.clone(),
                decided_at: Utc::now(),
            },
        );
        DecisionStatus::Ready(batch)
    }

    /// 指定键是否已有缓存决策
    pub fn is_cached(&self, key: DecisionKey) -> bool {
        self.cache.contains_key(&key)
    }

    /// 指定键决策的落定时刻
    pub fn decided_at(&self, key: DecisionKey) -> Option<DateTime<Utc>> {
        self.cache.get(&key).map(|c| c.decided_at)
    }

    /// 新局边界：清空缓存并取消在途请求
    pub fn reset_turn_tracking(&mut self) {
        let cached = self.cache.len();
        self.cache.clear();
        self.task.cancel();
        self.inflight = None;
        tracing::info!(cached, "Turn tracking reset");
    }
}

/// 从不透明负载中提取缓存键字段（turn / playerID），缺失回退为 (0, 0)。
/// 协调器只认这两个字段，不持有负载格式的其余部分
pub fn extract_turn_and_agent(payload: &str) -> DecisionKey {
    let parsed: serde_json::Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(_) => return (0, 0),
    };
    let turn = parsed.get("turn").and_then(|v| v.as_i64()).unwrap_or(0) as i32;
    let agent = parsed.get("playerID").and_then(|v| v.as_i64()).unwrap_or(0) as i32;
    (turn, agent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisor::{MockAdvisor, ServiceError};
    use crate::intent::Intent;

    fn coordinator_with(advisor: Arc<MockAdvisor>, timeout_ms: u64) -> DecisionCoordinator {
        DecisionCoordinator::new(advisor, Duration::from_millis(timeout_ms))
    }

    async fn poll_until_ready(
        coordinator: &mut DecisionCoordinator,
        key: DecisionKey,
    ) -> IntentBatch {
        for _ in 0..50 {
            if let DecisionStatus::Ready(batch) = coordinator.poll_decision(key) {
                return batch;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("decision never became ready");
    }

    #[tokio::test]
    async fn test_duplicate_requests_issue_one_call() {
        let advisor = Arc::new(MockAdvisor::new().with_latency(Duration::from_millis(50)));
        let mut coordinator = coordinator_with(advisor.clone(), 5_000);
        let key = (3, 0);

        assert!(coordinator.request_decision(key, "{}".to_string()));
        assert!(!coordinator.request_decision(key, "{}".to_string()));

        poll_until_ready(&mut coordinator, key).await;
        assert_eq!(advisor.call_count(), 1);

        // 落定后再次请求同键：缓存命中，依旧不发起新调用
        assert!(!coordinator.request_decision(key, "{}".to_string()));
        assert_eq!(advisor.call_count(), 1);
    }

    #[tokio::test]
    async fn test_cached_batch_stable_across_polls() {
        let advisor = Arc::new(MockAdvisor::new().with_latency(Duration::from_millis(10)));
        advisor.push_response(
            r#"{"actions":[{"action":"research","tech":"TECH_SAILING"},{"action":"end_turn"}]}"#,
        );
        let mut coordinator = coordinator_with(advisor, 5_000);
        let key = (3, 0);

        coordinator.request_decision(key, "{}".to_string());
        let first = poll_until_ready(&mut coordinator, key).await;
        assert_eq!(first.len(), 2);

        for _ in 0..3 {
            assert_eq!(coordinator.poll_decision(key), DecisionStatus::Ready(first.clone()));
        }
        assert!(coordinator.decided_at(key).is_some());
    }

    #[tokio::test]
    async fn test_service_failure_yields_terminal_batch() {
        let advisor = Arc::new(MockAdvisor::new().with_latency(Duration::from_millis(10)));
        advisor.push_error(ServiceError::Api("overloaded".to_string()));
        let mut coordinator = coordinator_with(advisor, 5_000);
        let key = (4, 1);

        coordinator.request_decision(key, "{}".to_string());
        let batch = poll_until_ready(&mut coordinator, key).await;

        assert_eq!(batch.len(), 1);
        assert!(batch.intents[0].is_terminal());
    }

    #[tokio::test]
    async fn test_undecodable_body_yields_terminal_batch() {
        let advisor = Arc::new(MockAdvisor::new().with_latency(Duration::from_millis(10)));
        advisor.push_response("certainly! here is my decision in plain prose");
        let mut coordinator = coordinator_with(advisor, 5_000);
        let key = (4, 0);

        coordinator.request_decision(key, "{}".to_string());
        let batch = poll_until_ready(&mut coordinator, key).await;
        assert!(batch.intents[0].is_terminal());
    }

    #[tokio::test]
    async fn test_timeout_cancels_and_settles_terminal() {
        let advisor = Arc::new(MockAdvisor::new().with_latency(Duration::from_secs(10)));
        let mut coordinator = coordinator_with(advisor, 50);
        let key = (5, 0);

        coordinator.request_decision(key, "{}".to_string());
        tokio::time::sleep(Duration::from_millis(100)).await;

        let batch = poll_until_ready(&mut coordinator, key).await;
        assert!(batch.intents[0].is_terminal());
        // 超时落定后缓存稳定，迟到结果不会翻盘
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(coordinator.poll_decision(key), DecisionStatus::Ready(batch));
    }

    #[tokio::test]
    async fn test_reset_turn_tracking_allows_fresh_request() {
        let advisor = Arc::new(MockAdvisor::new().with_latency(Duration::from_millis(10)));
        let mut coordinator = coordinator_with(advisor.clone(), 5_000);
        let key = (1, 0);

        coordinator.request_decision(key, "{}".to_string());
        poll_until_ready(&mut coordinator, key).await;
        assert!(coordinator.is_cached(key));

        coordinator.reset_turn_tracking();
        assert!(!coordinator.is_cached(key));
        assert!(coordinator.request_decision(key, "{}".to_string()));
        poll_until_ready(&mut coordinator, key).await;
        assert_eq!(advisor.call_count(), 2);
    }

    #[tokio::test]
    async fn test_unsettled_completed_key_blocks_new_request() {
        let advisor = Arc::new(MockAdvisor::new().with_latency(Duration::from_millis(10)));
        advisor.push_response(r#"{"actions":[{"action":"research","tech":"TECH_POTTERY"},{"action":"end_turn"}]}"#);
        let mut coordinator = coordinator_with(advisor.clone(), 500);

        assert!(coordinator.request_decision((1, 0), "{}".to_string()));
        // 工作者已完成但 (1,0) 还没被轮询：新键不得抢占任务槽
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!coordinator.request_decision((1, 1), "{}".to_string()));

        // 已完成的结果原样保留
        let batch = poll_until_ready(&mut coordinator, (1, 0)).await;
        assert_eq!(batch.len(), 2);
        assert!(matches!(batch.intents[0], Intent::Research { .. }));

        // 落定之后槽空出，新键正常受理
        assert!(coordinator.request_decision((1, 1), "{}".to_string()));
        poll_until_ready(&mut coordinator, (1, 1)).await;
        assert_eq!(advisor.call_count(), 2);
    }

    #[tokio::test]
    async fn test_distinct_keys_cached_independently() {
        let advisor = Arc::new(MockAdvisor::new().with_latency(Duration::from_millis(10)));
        advisor.push_response(r#"{"actions":[{"action":"research","tech":"TECH_POTTERY"},{"action":"end_turn"}]}"#);
        advisor.push_response(r#"{"action":"end_turn"}"#);
        let mut coordinator = coordinator_with(advisor, 5_000);

        coordinator.request_decision((1, 0), "{}".to_string());
        let first = poll_until_ready(&mut coordinator, (1, 0)).await;
        coordinator.request_decision((1, 1), "{}".to_string());
        let second = poll_until_ready(&mut coordinator, (1, 1)).await;

        assert_eq!(first.len(), 2);
        assert!(matches!(first.intents[0], Intent::Research { .. }));
        assert_eq!(second.len(), 1);
        assert!(coordinator.is_cached((1, 0)));
        assert!(coordinator.is_cached((1, 1)));
    }

    #[test]
    fn test_extract_turn_and_agent() {
        let key = extract_turn_and_agent(r#"{"turn":42,"playerID":3,"units":[]}"#);
        assert_eq!(key, (42, 3));
        assert_eq!(extract_turn_and_agent("not json"), (0, 0));
        assert_eq!(extract_turn_and_agent(r#"{"units":[]}"#), (0, 0));
    }
}
