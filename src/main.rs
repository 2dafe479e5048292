//! Hegemon - 决策请求协调器演示入口
//!
//! 模拟两个回合的完整决策周期：交互上下文发起请求并执行批次，
//! 模拟上下文经同步总线轮询收取被转发的意图。离线默认用 Mock 后端，
//! `HEGEMON__ADVISOR__PROVIDER=claude` 切换到真实服务。

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use hegemon::advisor::{AdvisorClient, ClaudeAdvisor, MockAdvisor};
use hegemon::bridge::{codec, reset_request_slots, SlotRouter, SlotTable, SlotValue};
use hegemon::coordinator::{DecisionCoordinator, DecisionStatus};
use hegemon::intent::Intent;
use hegemon::pipeline::{ActorContext, ExecutionPipeline, RulesEngine};

/// 演示用规则引擎：所有意图直接视为成功
struct DemoRules;

#[async_trait]
impl RulesEngine for DemoRules {
    async fn validate_and_execute(&self, ctx: &ActorContext, intent: &Intent) -> bool {
        tracing::info!(
            turn = ctx.turn,
            agent = ctx.agent_id,
            kind = intent.wire_name(),
            "Executing intent"
        );
        true
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    hegemon::observability::init();

    let config = hegemon::config::load_config(None).context("Failed to load config")?;

    let advisor: Arc<dyn AdvisorClient> = match config.advisor.provider.as_str() {
        "claude" => {
            let client = ClaudeAdvisor::new(
                &config.advisor.base_url,
                &config.advisor.model,
                config.advisor.max_tokens,
                Duration::from_secs(config.advisor.request_timeout_secs),
                config.advisor.system_prompt_path.clone(),
            )
            .context("Failed to create decision service client")?;
            client.test_connection().await.context("Connection self-test failed")?;
            Arc::new(client)
        }
        _ => {
            let mock = MockAdvisor::new().with_latency(Duration::from_millis(300));
            mock.push_response(
                r#"{"actions":[
                    {"action":"move_unit","unit_id":7,"x":3,"y":5},
                    {"action":"found_city","unit_id":7,"name":"Roma"},
                    {"action":"research","tech":"TECH_POTTERY"},
                    {"action":"end_turn"}
                ]}"#,
            );
            mock.push_response(r#"{"action":"end_turn","reason":"Consolidating position"}"#);
            Arc::new(mock)
        }
    };

    let table = SlotTable::new(config.bridge.long_value_threshold);
    let mut coordinator = DecisionCoordinator::new(
        advisor,
        Duration::from_secs(config.coordinator.decision_timeout_secs),
    );
    let pipeline = ExecutionPipeline::new(Arc::new(DemoRules), table.clone());

    // 模拟上下文侧：注册全部请求槽，解码后直接落地
    let mut simulation_router = SlotRouter::new(table.clone());
    for (key, reset) in codec::request_slots() {
        simulation_router.register(
            key,
            reset,
            Box::new(move |value: SlotValue| match codec::decode_slot(key, &value) {
                Ok(intent) => tracing::info!(
                    kind = intent.wire_name(),
                    "Simulation context received redirected intent"
                ),
                Err(e) => tracing::warn!(key, error = %e, "Undecodable slot value"),
            }),
        );
    }

    for turn in 1..=2 {
        let key = (turn, 0);
        let ctx = ActorContext {
            turn,
            agent_id: 0,
            primary: true,
        };
        let payload = format!(r#"{{"turn":{turn},"playerID":0,"units":[{{"id":7}}]}}"#);

        // 周期开始：请求槽全部回复位，防止慢轮询观察到上周期遗留
        reset_request_slots(&table);
        coordinator.request_decision(key, payload);

        let batch = loop {
            simulation_router.tick();
            match coordinator.poll_decision(key) {
                DecisionStatus::Ready(batch) => break batch,
                DecisionStatus::Waiting => tokio::time::sleep(Duration::from_millis(50)).await,
            }
        };

        let report = pipeline.execute_batch(batch, &ctx).await;
        // 转发的意图落在总线上，模拟上下文下个 tick 收取
        simulation_router.tick();
        tracing::info!(
            turn,
            succeeded = report.succeeded,
            failed = report.failed,
            redirected = report.redirected,
            "Turn complete"
        );
    }

    Ok(())
}
