//! 外部决策服务抽象
//!
//! 所有后端（Claude API / Mock）实现 AdvisorClient：decide 一次完整往返，
//! 只由 DecisionTask 的后台工作者调用，失败不重试（下个决策周期自然重来）。

use async_trait::async_trait;
use thiserror::Error;

/// 决策服务错误（传输层 / API 层 / 响应形状）
#[derive(Error, Debug, Clone)]
pub enum ServiceError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Empty response from decision service")]
    EmptyResponse,

    #[error("Unexpected response format: {0}")]
    BadFormat(String),
}

/// 决策服务客户端 trait
///
/// decide 的输入是不透明的局面快照（序列化格式归外部协作者所有），
/// 输出是意图批次的 JSON 文本（由 intent::decode_batch 解码）。
#[async_trait]
pub trait AdvisorClient: Send + Sync {
    /// 一次完整的决策往返（阻塞数秒属正常），仅由后台工作者调用
    async fn decide(&self, payload: &str) -> Result<String, ServiceError>;

    /// 连通性自检（可选实现）
    async fn test_connection(&self) -> Result<(), ServiceError> {
        Ok(())
    }
}
