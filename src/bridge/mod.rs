//! 跨上下文同步总线
//!
//! 两个脚本执行上下文无法互相调用函数、也不共享堆引用；它们之间唯一的契约是一张
//! 共享的命名槽位表，双方轮询读写。本模块提供：
//!
//! - **slot**：槽位表本体，含长值二级存储绕行通道
//! - **router**：边沿触发的注册/轮询路由器（同一请求恰好处理一次）
//! - **codec**：请求的逗号分隔线上形状与类型化 Intent 之间的边界转换

pub mod codec;
pub mod router;
pub mod slot;

pub use codec::{decode_slot, encode_intent, CodecError};
pub use router::{reset_request_slots, SlotHandler, SlotRouter};
pub use slot::{SlotTable, SlotValue, OVERFLOW_MARKER};
