//! 意图数据模型
//!
//! 外部决策服务一次返回一个有序意图批次（`{"actions":[...]}`）；每个意图是封闭集合上的
//! 带标签变体，只携带自身所需参数，不持有实体引用（执行时按 ID 查找）。

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 实体标识（单位 / 城市均为数值 ID）
pub type EntityId = i64;

/// 一个原子指令（意图）
///
/// 线上格式为内嵌标签 JSON：`{"action": "move_unit", "unit_id": 7, "x": 3, "y": 5}`。
/// 意图一旦解码即不可变。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Intent {
    /// 移动单位到目标格
    MoveUnit {
        unit_id: EntityId,
        x: i32,
        y: i32,
    },
    /// 单位攻击目标格
    Attack {
        unit_id: EntityId,
        target_x: i32,
        target_y: i32,
    },
    /// 用单位建城（消耗该单位）
    FoundCity {
        unit_id: EntityId,
        #[serde(default)]
        name: Option<String>,
    },
    /// 城市生产
    Build {
        city_id: EntityId,
        item: String,
    },
    /// 选择科技
    Research {
        tech: String,
    },
    /// 选择市政
    Civic {
        civic: String,
    },
    /// 更换政体
    ChangeGovernment {
        government: String,
    },
    /// 设置政策卡槽位
    SetPolicies {
        policies: Vec<String>,
    },
    /// 外交动作
    Diplomacy {
        action_type: String,
        target_player: EntityId,
    },
    /// 结束回合（终结意图：到达后批次立即停止）
    EndTurn {
        #[serde(default)]
        reason: Option<String>,
    },
}

impl Intent {
    /// 线上名称（与决策服务约定的 action 字段值）
    pub fn wire_name(&self) -> &'static str {
        match self {
            Intent::MoveUnit { .. } => "move_unit",
            Intent::Attack { .. } => "attack",
            Intent::FoundCity { .. } => "found_city",
            Intent::Build { .. } => "build",
            Intent::Research { .. } => "research",
            Intent::Civic { .. } => "civic",
            Intent::ChangeGovernment { .. } => "change_government",
            Intent::SetPolicies { .. } => "set_policies",
            Intent::Diplomacy { .. } => "diplomacy",
            Intent::EndTurn { .. } => "end_turn",
        }
    }

    /// 是否为终结意图
    pub fn is_terminal(&self) -> bool {
        matches!(self, Intent::EndTurn { .. })
    }

    /// 本意图消耗的单位（执行后该单位不复存在），用于重排依赖判定
    pub fn consumed_unit(&self) -> Option<EntityId> {
        match self {
            Intent::FoundCity { unit_id, .. } => Some(*unit_id),
            _ => None,
        }
    }

    /// 本意图要求仍然存在的单位，用于重排依赖判定
    pub fn required_unit(&self) -> Option<EntityId> {
        match self {
            Intent::MoveUnit { unit_id, .. } => Some(*unit_id),
            _ => None,
        }
    }

    /// 是否只能在模拟（规则）上下文中执行；交互上下文遇到此类意图需经同步总线转发
    pub fn needs_simulation_context(&self) -> bool {
        !matches!(self, Intent::EndTurn { .. })
    }
}

/// 一次决策产生的有序意图批次
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentBatch {
    pub intents: Vec<Intent>,
}

impl IntentBatch {
    pub fn new(intents: Vec<Intent>) -> Self {
        Self { intents }
    }

    pub fn len(&self) -> usize {
        self.intents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }

    /// 兜底批次：仅含一个 end_turn（服务失败 / 解码失败 / 超时都返回它，回合永不卡死）
    pub fn terminal_only(reason: &str) -> Self {
        Self {
            intents: vec![Intent::EndTurn {
                reason: Some(reason.to_string()),
            }],
        }
    }
}

/// 意图批次解码错误
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Response has neither 'actions' array nor single 'action' object")]
    MissingActions,

    #[error("Invalid intent at index {index}: {message}")]
    InvalidIntent { index: usize, message: String },
}

/// 解码决策服务返回的意图批次
///
/// 接受两种形状：`{"actions":[{...},{...}]}` 与裸的单意图对象 `{"action":"end_turn"}`
/// （服务在兜底场景下会返回后者）。未知 action 名是解码错误。
pub fn decode_batch(blob: &str) -> Result<IntentBatch, DecodeError> {
    let value: serde_json::Value = serde_json::from_str(blob)?;

    if let Some(actions) = value.get("actions").and_then(|a| a.as_array()) {
        let mut intents = Vec::with_capacity(actions.len());
        for (index, action) in actions.iter().enumerate() {
            let intent = serde_json::from_value(action.clone()).map_err(|e| {
                DecodeError::InvalidIntent {
                    index,
                    message: e.to_string(),
                }
            })?;
            intents.push(intent);
        }
        return Ok(IntentBatch::new(intents));
    }

    if value.get("action").is_some() {
        let intent = serde_json::from_value(value).map_err(|e| DecodeError::InvalidIntent {
            index: 0,
            message: e.to_string(),
        })?;
        return Ok(IntentBatch::new(vec![intent]));
    }

    Err(DecodeError::MissingActions)
}
