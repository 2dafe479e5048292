//! 命名槽位共享表
//!
//! 两个脚本上下文之间唯一的契约：一张命名、独立类型的值槽表，双方都能读写，
//! 靠轮询观察。值通道对单值长度有上限，超限的负载写入二级无界存储，
//! 主槽只放「值在二级存储」的标记（保持同样的边沿触发语义）。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// 标记值：真实负载在二级存储中，读取方取走后需清除
pub const OVERFLOW_MARKER: &str = "@overflow";

/// 槽位值：数值旗标或结构化字符串
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotValue {
    Number(i64),
    Text(String),
}

impl SlotValue {
    pub fn is_overflow_marker(&self) -> bool {
        matches!(self, SlotValue::Text(t) if t == OVERFLOW_MARKER)
    }
}

impl std::fmt::Display for SlotValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SlotValue::Number(n) => write!(f, "{n}"),
            SlotValue::Text(t) => write!(f, "{t}"),
        }
    }
}

struct TableInner {
    slots: HashMap<String, SlotValue>,
    /// 二级无界存储（长值绕行通道）
    overflow: HashMap<String, String>,
}

/// 共享槽位表的可克隆句柄
///
/// 槽位只被两个单线程轮询方触碰，从不与后台工作者并发；锁只为跨 tick 的
/// 任意交错提供原子读写，从不跨 await 持有。
#[derive(Clone)]
pub struct SlotTable {
    inner: Arc<Mutex<TableInner>>,
    /// 单值长度上限，超过则走二级存储
    long_value_threshold: usize,
}

impl SlotTable {
    pub fn new(long_value_threshold: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TableInner {
                slots: HashMap::new(),
                overflow: HashMap::new(),
            })),
            long_value_threshold,
        }
    }

    fn lock(&self) -> MutexGuard<'_, TableInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 写入槽位值（不经过长值检查；数值旗标与短文本用这个）
    pub fn publish(&self, key: &str, value: SlotValue) {
        self.lock().slots.insert(key.to_string(), value);
    }

    /// 写入数值旗标
    pub fn publish_number(&self, key: &str, value: i64) {
        self.publish(key, SlotValue::Number(value));
    }

    /// 写入文本；超过长度上限时负载进二级存储，主槽放标记
    pub fn publish_text(&self, key: &str, text: &str) {
        let mut inner = self.lock();
        if text.len() > self.long_value_threshold {
            tracing::debug!(key, bytes = text.len(), "Routing long value through overflow store");
            inner.overflow.insert(key.to_string(), text.to_string());
            inner
                .slots
                .insert(key.to_string(), SlotValue::Text(OVERFLOW_MARKER.to_string()));
        } else {
            inner
                .slots
                .insert(key.to_string(), SlotValue::Text(text.to_string()));
        }
    }

    /// 读取当前槽位值
    pub fn read(&self, key: &str) -> Option<SlotValue> {
        self.lock().slots.get(key).cloned()
    }

    /// 取走二级存储中的负载（取走即清除）
    pub fn take_overflow(&self, key: &str) -> Option<String> {
        self.lock().overflow.remove(key)
    }

    /// 解析读到的值：若是溢出标记则取回完整负载
    pub fn resolve(&self, key: &str, value: SlotValue) -> SlotValue {
        if value.is_overflow_marker() {
            if let Some(full) = self.take_overflow(key) {
                return SlotValue::Text(full);
            }
            tracing::warn!(key, "Overflow marker present but secondary store is empty");
        }
        value
    }

    /// 写回复位值（回合边界由写入方对请求槽统一调用）
    pub fn reset(&self, key: &str, reset_value: SlotValue) {
        self.lock().slots.insert(key.to_string(), reset_value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_and_read() {
        let table = SlotTable::new(400);
        table.publish_number("REQUEST_END_TURN", 1);
        assert_eq!(table.read("REQUEST_END_TURN"), Some(SlotValue::Number(1)));
        assert_eq!(table.read("MISSING"), None);
    }

    #[test]
    fn test_short_text_stays_in_primary_slot() {
        let table = SlotTable::new(400);
        table.publish_text("REQUEST_MOVE_UNIT", "7,3,5");
        assert_eq!(
            table.read("REQUEST_MOVE_UNIT"),
            Some(SlotValue::Text("7,3,5".to_string()))
        );
        assert_eq!(table.take_overflow("REQUEST_MOVE_UNIT"), None);
    }

    #[test]
    fn test_long_text_routes_through_overflow() {
        let table = SlotTable::new(16);
        let long = "x".repeat(64);
        table.publish_text("RESPONSE", &long);

        let value = table.read("RESPONSE").unwrap();
        assert!(value.is_overflow_marker());

        let resolved = table.resolve("RESPONSE", value);
        assert_eq!(resolved, SlotValue::Text(long));

        // 取走即清除
        assert_eq!(table.take_overflow("RESPONSE"), None);
    }

    #[test]
    fn test_reset_writes_reset_value() {
        let table = SlotTable::new(400);
        table.publish_number("REQUEST_END_TURN", 1);
        table.reset("REQUEST_END_TURN", SlotValue::Number(0));
        assert_eq!(table.read("REQUEST_END_TURN"), Some(SlotValue::Number(0)));
    }

    #[test]
    fn test_handles_shared_between_clones() {
        let table = SlotTable::new(400);
        let other = table.clone();
        table.publish_number("FLAG", 1);
        assert_eq!(other.read("FLAG"), Some(SlotValue::Number(1)));
    }
}
