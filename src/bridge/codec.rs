//! 跨上下文请求编解码
//!
//! 为兼容值通道的线上形状，多字段请求编码为单个逗号分隔字符串、无参请求编码为
//! 数值旗标；读取侧在路由器边界立即解码回类型化的 Intent，原始字符串不外传。

use thiserror::Error;

use crate::bridge::slot::SlotValue;
use crate::intent::Intent;

pub const SLOT_MOVE_UNIT: &str = "REQUEST_MOVE_UNIT";
pub const SLOT_ATTACK: &str = "REQUEST_ATTACK";
pub const SLOT_FOUND_CITY: &str = "REQUEST_FOUND_CITY";
pub const SLOT_BUILD: &str = "REQUEST_BUILD";
pub const SLOT_RESEARCH: &str = "REQUEST_RESEARCH";
pub const SLOT_CIVIC: &str = "REQUEST_CIVIC";
pub const SLOT_CHANGE_GOVERNMENT: &str = "REQUEST_CHANGE_GOVERNMENT";
pub const SLOT_SET_POLICIES: &str = "REQUEST_SET_POLICIES";
pub const SLOT_DIPLOMACY: &str = "REQUEST_DIPLOMACY";
pub const SLOT_END_TURN: &str = "REQUEST_END_TURN";

/// 编解码错误
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Unknown request slot: {0}")]
    UnknownSlot(String),

    #[error("Slot {key} holds wrong value type")]
    WrongType { key: String },

    #[error("Bad payload in slot {key}: {message}")]
    BadPayload { key: String, message: String },
}

/// 指定请求槽的复位值（写入与该值相等的内容对读取方不可见）
pub fn reset_value(key: &str) -> SlotValue {
    match key {
        SLOT_END_TURN => SlotValue::Number(0),
        _ => SlotValue::Text(String::new()),
    }
}

/// 全部请求槽及各自的复位值（读取方启动时据此注册）
pub fn request_slots() -> Vec<(&'static str, SlotValue)> {
    [
        SLOT_MOVE_UNIT,
        SLOT_ATTACK,
        SLOT_FOUND_CITY,
        SLOT_BUILD,
        SLOT_RESEARCH,
        SLOT_CIVIC,
        SLOT_CHANGE_GOVERNMENT,
        SLOT_SET_POLICIES,
        SLOT_DIPLOMACY,
        SLOT_END_TURN,
    ]
    .into_iter()
    .map(|key| (key, reset_value(key)))
    .collect()
}

/// 意图编码为（槽位键，槽位值）
pub fn encode_intent(intent: &Intent) -> (&'static str, SlotValue) {
    match intent {
        Intent::MoveUnit { unit_id, x, y } => {
            (SLOT_MOVE_UNIT, SlotValue::Text(format!("{unit_id},{x},{y}")))
        }
        Intent::Attack {
            unit_id,
            target_x,
            target_y,
        } => (
            SLOT_ATTACK,
            SlotValue::Text(format!("{unit_id},{target_x},{target_y}")),
        ),
        Intent::FoundCity { unit_id, name } => {
            let payload = match name {
                Some(name) => format!("{unit_id},{name}"),
                None => unit_id.to_string(),
            };
            (SLOT_FOUND_CITY, SlotValue::Text(payload))
        }
        Intent::Build { city_id, item } => {
            (SLOT_BUILD, SlotValue::Text(format!("{city_id},{item}")))
        }
        Intent::Research { tech } => (SLOT_RESEARCH, SlotValue::Text(tech.clone())),
        Intent::Civic { civic } => (SLOT_CIVIC, SlotValue::Text(civic.clone())),
        Intent::ChangeGovernment { government } => {
            (SLOT_CHANGE_GOVERNMENT, SlotValue::Text(government.clone()))
        }
        Intent::SetPolicies { policies } => {
            (SLOT_SET_POLICIES, SlotValue::Text(policies.join(",")))
        }
        Intent::Diplomacy {
            action_type,
            target_player,
        } => (
            SLOT_DIPLOMACY,
            SlotValue::Text(format!("{action_type},{target_player}")),
        ),
        Intent::EndTurn { .. } => (SLOT_END_TURN, SlotValue::Number(1)),
    }
}

/// 槽位值解码回类型化意图（路由器边界调用）
pub fn decode_slot(key: &str, value: &SlotValue) -> Result<Intent, CodecError> {
    match key {
        SLOT_END_TURN => match value {
            SlotValue::Number(_) => Ok(Intent::EndTurn { reason: None }),
            _ => Err(CodecError::WrongType {
                key: key.to_string(),
            }),
        },
        _ => {
            let text = match value {
                SlotValue::Text(t) => t.as_str(),
                _ => {
                    return Err(CodecError::WrongType {
                        key: key.to_string(),
                    })
                }
            };
            decode_text_slot(key, text)
        }
    }
}

fn decode_text_slot(key: &str, text: &str) -> Result<Intent, CodecError> {
    let bad = |message: &str| CodecError::BadPayload {
        key: key.to_string(),
        message: message.to_string(),
    };
    let fields: Vec<&str> = text.split(',').collect();

    match key {
        SLOT_MOVE_UNIT => {
            let [unit_id, x, y] = fields[..] else {
                return Err(bad("expected unit_id,x,y"));
            };
            Ok(Intent::MoveUnit {
                unit_id: unit_id.parse().map_err(|_| bad("unit_id not a number"))?,
                x: x.parse().map_err(|_| bad("x not a number"))?,
                y: y.parse().map_err(|_| bad("y not a number"))?,
            })
        }
        SLOT_ATTACK => {
            let [unit_id, target_x, target_y] = fields[..] else {
                return Err(bad("expected unit_id,target_x,target_y"));
            };
            Ok(Intent::Attack {
                unit_id: unit_id.parse().map_err(|_| bad("unit_id not a number"))?,
                target_x: target_x.parse().map_err(|_| bad("target_x not a number"))?,
                target_y: target_y.parse().map_err(|_| bad("target_y not a number"))?,
            })
        }
        SLOT_FOUND_CITY => {
            let (unit_id, name) = match fields[..] {
                [unit_id] => (unit_id, None),
                [unit_id, ..] => (unit_id, Some(fields[1..].join(","))),
                [] => return Err(bad("expected unit_id[,name]")),
            };
            Ok(Intent::FoundCity {
                unit_id: unit_id.parse().map_err(|_| bad("unit_id not a number"))?,
                name,
            })
        }
        SLOT_BUILD => {
            let [city_id, item] = fields[..] else {
                return Err(bad("expected city_id,item"));
            };
            Ok(Intent::Build {
                city_id: city_id.parse().map_err(|_| bad("city_id not a number"))?,
                item: item.to_string(),
            })
        }
        SLOT_RESEARCH => Ok(Intent::Research {
            tech: text.to_string(),
        }),
        SLOT_CIVIC => Ok(Intent::Civic {
            civic: text.to_string(),
        }),
        SLOT_CHANGE_GOVERNMENT => Ok(Intent::ChangeGovernment {
            government: text.to_string(),
        }),
        SLOT_SET_POLICIES => Ok(Intent::SetPolicies {
            policies: fields
                .iter()
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .collect(),
        }),
        SLOT_DIPLOMACY => {
            let [action_type, target_player] = fields[..] else {
                return Err(bad("expected action_type,target_player"));
            };
            Ok(Intent::Diplomacy {
                action_type: action_type.to_string(),
                target_player: target_player
                    .parse()
                    .map_err(|_| bad("target_player not a number"))?,
            })
        }
        _ => Err(CodecError::UnknownSlot(key.to_string())),
    }
}
