//! 意图批次依赖重排
//!
//! 决策服务偶尔会在同一批次里既移动又消耗同一个单位（如先 move_unit 再用同一单位
//! found_city）。重排规则基于意图自声明的依赖契约（consumed_unit / required_unit），
//! 与具体意图种类解耦：
//!
//! 1. 同一实体的重复消耗意图，只保留第一个；
//! 2. 被消耗实体的「要求仍存在」意图全部丢弃（消耗后实体已不存在）；
//! 3. 消耗意图被提前到该实体第一个被丢弃意图的位置，其余相对顺序不变。

use std::collections::HashMap;

use crate::intent::{EntityId, Intent};

/// 对批次执行依赖重排；返回重排后（可能更短）的序列
pub fn reorder(intents: Vec<Intent>) -> Vec<Intent> {
    let mut dropped = vec![false; intents.len()];
    let mut first_consumer: HashMap<EntityId, usize> = HashMap::new();

    for (index, intent) in intents.iter().enumerate() {
        if let Some(entity) = intent.consumed_unit() {
            if first_consumer.contains_key(&entity) {
                tracing::warn!(
                    entity,
                    kind = intent.wire_name(),
                    "Dropping duplicate consuming intent for entity"
                );
                dropped[index] = true;
            } else {
                first_consumer.insert(entity, index);
            }
        }
    }

    // 被消耗实体的 required 意图全部冗余；记下最早一个的位置作为提升目标
    let mut hoist_target: HashMap<EntityId, usize> = HashMap::new();
    for (index, intent) in intents.iter().enumerate() {
        if dropped[index] {
            continue;
        }
        if let Some(entity) = intent.required_unit() {
            if first_consumer.contains_key(&entity) {
                tracing::info!(
                    entity,
                    kind = intent.wire_name(),
                    "Dropping intent for entity consumed in the same batch"
                );
                dropped[index] = true;
                hoist_target.entry(entity).or_insert(index);
            }
        }
    }

    let mut keyed: Vec<(usize, Intent)> = Vec::with_capacity(intents.len());
    for (index, intent) in intents.into_iter().enumerate() {
        if dropped[index] {
            continue;
        }
        let key = match intent.consumed_unit().and_then(|e| hoist_target.get(&e)) {
            Some(&target) if target < index => target,
            _ => index,
        };
        keyed.push((key, intent));
    }

    keyed.sort_by_key(|(key, _)| *key);
    keyed.into_iter().map(|(_, intent)| intent).collect()
}
