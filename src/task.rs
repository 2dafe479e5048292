//! 异步决策请求状态机
//!
//! 单一所有者（DecisionCoordinator）持有一个 DecisionTask，包装对外部决策服务的
//! 一次在途调用：Idle -> Pending（start）-> Ready / Failed（工作者完成）-> Idle（结果被
//! 消费恰好一次）。取消是协作式的：cancel 令牌 + 纪元守卫，迟到的工作者结果会被丢弃，
//! 绝不会经 poll 浮出。超时策略归调用方（协调器），不在本原语内。

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::advisor::AdvisorClient;

/// 请求状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// 无在途请求
    Idle,
    /// 请求进行中
    Pending,
    /// 结果就绪，等待消费
    Ready,
    /// 请求失败（含中途取消）
    Failed,
}

/// poll 的非阻塞返回：Ready / Failed 携带的值消费后状态即复位为 Idle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskPoll {
    Idle,
    Pending,
    Ready(String),
    Failed(String),
}

/// 跨线程共享槽：状态、结果、错误与纪元必须在同一把锁下读改写，
/// 轮询侧才不会观察到 Ready 配半写的结果
struct TaskShared {
    state: TaskState,
    result: Option<String>,
    error: Option<String>,
    /// 每次 start / cancel 递增；工作者只在纪元仍匹配时写入
    epoch: u64,
}

/// 一个在途外部决策请求的状态机
pub struct DecisionTask {
    shared: Arc<Mutex<TaskShared>>,
    cancel: CancellationToken,
    started_at: Option<Instant>,
}

impl Default for DecisionTask {
    fn default() -> Self {
        Self::new()
    }
}

impl DecisionTask {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(TaskShared {
                state: TaskState::Idle,
                result: None,
                error: None,
                epoch: 0,
            })),
            cancel: CancellationToken::new(),
            started_at: None,
        }
    }

    // 锁内从不 panic，毒化不可达；万一毒化则取回内层数据继续
    fn lock(&self) -> MutexGuard<'_, TaskShared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 启动一次请求：已有 Pending 请求时无副作用返回 false，
    /// 否则恰好派生一个后台工作者并转入 Pending
    pub fn start(&mut self, payload: String, advisor: Arc<dyn AdvisorClient>) -> bool {
        let (epoch, request_id) = {
            let mut shared = self.lock();
            if shared.state == TaskState::Pending {
                tracing::debug!("Request already pending, ignoring start");
                return false;
            }
            shared.epoch += 1;
            shared.state = TaskState::Pending;
            shared.result = None;
            shared.error = None;
            (shared.epoch, uuid::Uuid::new_v4())
        };

        self.cancel = CancellationToken::new();
        self.started_at = Some(Instant::now());

        let shared = Arc::clone(&self.shared);
        let token = self.cancel.clone();
        tracing::info!(%request_id, "Starting decision request worker");

        tokio::spawn(async move {
            let outcome = tokio::select! {
                _ = token.cancelled() => None,
                result = advisor.decide(&payload) => Some(result),
            };

            let mut shared = shared.lock().unwrap_or_else(PoisonError::into_inner);
            if shared.epoch != epoch {
                tracing::debug!(%request_id, "Discarding stale worker result");
                return;
            }

            match outcome {
                None => {
                    tracing::info!(%request_id, "Worker observed cancellation");
                    shared.state = TaskState::Idle;
                }
                Some(Ok(body)) => {
                    tracing::info!(%request_id, bytes = body.len(), "Decision request completed");
                    shared.result = Some(body);
                    shared.state = TaskState::Ready;
                }
                Some(Err(e)) => {
                    tracing::warn!(%request_id, error = %e, "Decision request failed");
                    shared.error = Some(e.to_string());
                    shared.state = TaskState::Failed;
                }
            }
        });

        true
    }

    /// 非阻塞轮询；Ready / Failed 的值恰好被消费一次，随后复位为 Idle
    pub fn poll(&self) -> TaskPoll {
        let mut shared = self.lock();
        match shared.state {
            TaskState::Idle => TaskPoll::Idle,
            TaskState::Pending => TaskPoll::Pending,
            TaskState::Ready => {
                let result = shared.result.take().unwrap_or_default();
                shared.state = TaskState::Idle;
                TaskPoll::Ready(result)
            }
            TaskState::Failed => {
                let error = shared
                    .error
                    .take()
                    .unwrap_or_else(|| "unknown error".to_string());
                shared.state = TaskState::Idle;
                TaskPoll::Failed(error)
            }
        }
    }

    /// 当前状态（不消费结果）
    pub fn state(&self) -> TaskState {
        self.lock().state
    }

    /// 自 start 起经过的墙钟时间（协调器据此执行超时策略）
    pub fn elapsed(&self) -> Option<Duration> {
        self.started_at.map(|t| t.elapsed())
    }

    /// 取消在途请求：递增纪元后工作者的任何迟到写入都会被丢弃，状态复位为 Idle
    pub fn cancel(&mut self) {
        self.cancel.cancel();

        let mut shared = self.lock();
        shared.epoch += 1;
        shared.state = TaskState::Idle;
        shared.result = None;
        shared.error = None;
        tracing::info!("Request cancelled, state reset to idle");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisor::{MockAdvisor, ServiceError};

    fn advisor_with_latency(ms: u64) -> Arc<MockAdvisor> {
        Arc::new(MockAdvisor::new().with_latency(Duration::from_millis(ms)))
    }

    #[tokio::test]
    async fn test_start_twice_returns_false() {
        let advisor = advisor_with_latency(200);
        let mut task = DecisionTask::new();

        assert!(task.start("{}".to_string(), advisor.clone()));
        assert!(!task.start("{}".to_string(), advisor.clone()));

        // 第二次 start 无副作用：只发出一次外部调用
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(advisor.call_count(), 1);
    }

    #[tokio::test]
    async fn test_pending_then_ready_with_terminal_batch() {
        let advisor = advisor_with_latency(100);
        advisor.push_response(r#"{"actions":[{"action":"end_turn"}]}"#);
        let mut task = DecisionTask::new();

        assert!(task.start("{}".to_string(), advisor));
        assert_eq!(task.poll(), TaskPoll::Pending);

        tokio::time::sleep(Duration::from_millis(200)).await;
        match task.poll() {
            TaskPoll::Ready(body) => {
                let batch = crate::intent::decode_batch(&body).unwrap();
                assert_eq!(batch.len(), 1);
                assert!(batch.intents[0].is_terminal());
            }
            other => panic!("expected Ready, got {other:?}"),
        }

        // 消费恰好一次：再次 poll 回到 Idle
        assert_eq!(task.poll(), TaskPoll::Idle);
    }

    #[tokio::test]
    async fn test_failed_request_surfaces_error_once() {
        let advisor = advisor_with_latency(10);
        advisor.push_error(ServiceError::Transport("connection refused".to_string()));
        let mut task = DecisionTask::new();

        assert!(task.start("{}".to_string(), advisor));
        tokio::time::sleep(Duration::from_millis(100)).await;

        match task.poll() {
            TaskPoll::Failed(error) => assert!(error.contains("connection refused")),
            other => panic!("expected Failed, got {other:?}"),
        }
        assert_eq!(task.poll(), TaskPoll::Idle);
    }

    #[tokio::test]
    async fn test_cancel_discards_late_result() {
        let advisor = advisor_with_latency(50);
        advisor.push_response(r#"{"actions":[{"action":"research","tech":"TECH_SAILING"}]}"#);
        let mut task = DecisionTask::new();

        assert!(task.start("{}".to_string(), advisor));
        tokio::time::sleep(Duration::from_millis(10)).await;
        task.cancel();
        assert_eq!(task.state(), TaskState::Idle);

        // 模拟迟到完成：工作者若已完成写入也必须被纪元守卫丢弃
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(task.poll(), TaskPoll::Idle);
    }

    #[tokio::test]
    async fn test_restart_after_cancel() {
        let advisor = advisor_with_latency(20);
        let mut task = DecisionTask::new();

        assert!(task.start("{}".to_string(), advisor.clone()));
        task.cancel();
        assert!(task.start("{}".to_string(), advisor));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(matches!(task.poll(), TaskPoll::Ready(_)));
    }
}
