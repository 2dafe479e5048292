//! 意图批次执行器
//!
//! 重排后严格按序执行：每个意图独立上报成败，失败记日志计数、不中止批次；
//! 到达终结意图立即永久停止，其后意图绝不执行。合法性校验与实际落地由可插拔的
//! RulesEngine 协作者负责；当前上下文无法执行的意图经同步总线转发到另一上下文。

use std::sync::Arc;

use async_trait::async_trait;

use crate::bridge::{codec, SlotTable, SlotValue};
use crate::intent::{Intent, IntentBatch};
use crate::pipeline::reorder::reorder;

/// 执行上下文：意图以哪个代理、哪个回合、在哪类上下文中执行
#[derive(Debug, Clone)]
pub struct ActorContext {
    pub turn: i32,
    pub agent_id: i32,
    /// true = 交互（UI）上下文；false = 模拟（规则）上下文
    pub primary: bool,
}

/// 游戏规则协作者：校验意图前置条件并落地执行
///
/// validate_and_execute 负责确认被引用实体存在、动作当前合法，任何可恢复失败
/// 返回 false 而不是抛错。has_simulation_access 是能力旗标：告知管线当前上下文
/// 能否直接执行模拟侧动作（按调用逐次判定，而非编译期类型）。
#[async_trait]
pub trait RulesEngine: Send + Sync {
    async fn validate_and_execute(&self, ctx: &ActorContext, intent: &Intent) -> bool;

    fn has_simulation_access(&self, ctx: &ActorContext) -> bool {
        !ctx.primary
    }
}

/// 批次执行汇总（可观测性：成败计数 + 是否正常终结）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// 实际执行（或转发）的意图数
    pub executed: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// 经总线转发到另一上下文的意图数（计入 succeeded）
    pub redirected: usize,
    /// 是否由终结意图收尾
    pub terminated: bool,
}

/// 执行管线：持有规则协作者与总线句柄
pub struct ExecutionPipeline {
    rules: Arc<dyn RulesEngine>,
    table: SlotTable,
}

impl ExecutionPipeline {
    pub fn new(rules: Arc<dyn RulesEngine>, table: SlotTable) -> Self {
        Self { rules, table }
    }

    /// 执行一个批次：重排 -> 按序执行 -> 终结意图停止
    pub async fn execute_batch(&self, batch: IntentBatch, ctx: &ActorContext) -> BatchReport {
        let intents = reorder(batch.intents);
        let mut report = BatchReport::default();

        for intent in &intents {
            let redirect =
                intent.needs_simulation_context() && !self.rules.has_simulation_access(ctx);

            let ok = if redirect {
                self.redirect(intent)
            } else {
                self.rules.validate_and_execute(ctx, intent).await
            };

            report.executed += 1;
            if ok {
                report.succeeded += 1;
                if redirect {
                    report.redirected += 1;
                }
            } else {
                report.failed += 1;
                tracing::warn!(
                    kind = intent.wire_name(),
                    turn = ctx.turn,
                    agent = ctx.agent_id,
                    "Intent execution failed, continuing batch"
                );
            }

            if intent.is_terminal() {
                report.terminated = true;
                break;
            }
        }

        tracing::info!(
            turn = ctx.turn,
            agent = ctx.agent_id,
            executed = report.executed,
            succeeded = report.succeeded,
            failed = report.failed,
            redirected = report.redirected,
            terminated = report.terminated,
            "Batch execution finished"
        );
        report
    }

    /// 经同步总线把意图转发到另一上下文（写槽即成功，处理在对方的轮询 tick 中发生）
    fn redirect(&self, intent: &Intent) -> bool {
        let (key, value) = codec::encode_intent(intent);

        // 编码结果与复位哨兵相同的意图（如空政策列表）对读取方不可见，按失败计
        if value == codec::reset_value(key) {
            tracing::warn!(
                key,
                kind = intent.wire_name(),
                "Intent encodes to the reset sentinel, not publishing"
            );
            return false;
        }

        tracing::debug!(key, kind = intent.wire_name(), "Redirecting intent through sync bus");

        match value {
            SlotValue::Number(n) => self.table.publish_number(key, n),
            SlotValue::Text(text) => self.table.publish_text(key, &text),
        }
        true
    }
}
