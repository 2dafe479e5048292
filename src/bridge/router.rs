//! 边沿触发的槽位路由器
//!
//! 每个注册槽记录本地「上次已处理值」。每个轮询 tick：值未变则不动；值回到复位
//! 哨兵则把本地记录清回复位值（重新上膛，下次非复位值再次触发）；否则解析溢出
//! 标记后恰好调用一次处理器。这套不对称复位规则保证单次写入不会触发多次，
//! 同一请求在后续周期仍可重复发出。

use crate::bridge::codec;
use crate::bridge::slot::{SlotTable, SlotValue};

/// 槽位处理器：在读取方上下文内同步执行（协作式单线程，不允许挂起）
pub type SlotHandler = Box<dyn FnMut(SlotValue) + Send>;

struct SlotRegistration {
    key: String,
    reset: SlotValue,
    last_observed: SlotValue,
    handler: SlotHandler,
}

/// 一侧上下文的槽位注册表与轮询入口
pub struct SlotRouter {
    table: SlotTable,
    slots: Vec<SlotRegistration>,
}

impl SlotRouter {
    pub fn new(table: SlotTable) -> Self {
        Self {
            table,
            slots: Vec::new(),
        }
    }

    /// 注册一个槽：键、复位值与处理器；槽在进程生命周期内一直存活
    pub fn register(&mut self, key: &str, reset: SlotValue, handler: SlotHandler) {
        tracing::debug!(key, "Registered slot handler");
        self.slots.push(SlotRegistration {
            key: key.to_string(),
            last_observed: reset.clone(),
            reset,
            handler,
        });
    }

    /// 一个轮询 tick：按注册顺序检查每个槽，返回本次触发的处理器数量
    pub fn tick(&mut self) -> usize {
        let mut fired = 0;

        for reg in &mut self.slots {
            let current = match self.table.read(&reg.key) {
                Some(value) => value,
                None => continue,
            };

            if current == reg.last_observed {
                continue;
            }

            if current == reg.reset {
                // 值回到复位哨兵：清掉本地记录，下一次非复位值重新触发
                reg.last_observed = reg.reset.clone();
                continue;
            }

            let resolved = self.table.resolve(&reg.key, current.clone());
            tracing::debug!(key = %reg.key, value = %resolved, "Slot edge detected, invoking handler");
            (reg.handler)(resolved);
            reg.last_observed = current;
            fired += 1;
        }

        fired
    }

    /// 已注册槽位数
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }
}

/// 写入方在每个决策周期开始时把全部请求槽强制回复位值，
/// 防止慢轮询的读取方观察到上个周期遗留的请求
pub fn reset_request_slots(table: &SlotTable) {
    for (key, reset) in codec::request_slots() {
        table.reset(key, reset);
    }
}
