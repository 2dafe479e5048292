//! Hegemon - 回合制模拟的外部决策请求协调器
//!
//! 模块划分：
//! - **advisor**: 外部决策服务客户端抽象与实现（Claude / Mock）
//! - **bridge**: 跨上下文同步总线（槽位表、边沿触发路由器、请求编解码）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **coordinator**: 决策生命周期编排（按键去重、缓存、超时、失败兜底）
//! - **intent**: 类型化意图与批次的线上格式
//! - **pipeline**: 意图执行管线（依赖重排 + 按序执行 + 跨上下文转发）
//! - **task**: 单个在途异步决策请求的状态机

pub mod advisor;
pub mod bridge;
pub mod config;
pub mod coordinator;
pub mod intent;
pub mod observability;
pub mod pipeline;
pub mod task;

pub use coordinator::{DecisionCoordinator, DecisionKey, DecisionStatus};
pub use intent::{Intent, IntentBatch};
