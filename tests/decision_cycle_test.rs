//! 集成测试：跨两个模拟上下文驱动一个完整决策周期
//!
//! 交互上下文发起请求、执行批次并把模拟侧意图转发上总线；
//! 模拟上下文用边沿触发路由器轮询收取。覆盖依赖重排、终结停止与恰好一次收取。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hegemon::advisor::MockAdvisor;
use hegemon::bridge::{codec, reset_request_slots, SlotRouter, SlotTable, SlotValue};
use hegemon::coordinator::{DecisionCoordinator, DecisionStatus};
use hegemon::intent::Intent;
use hegemon::pipeline::{ActorContext, ExecutionPipeline, RulesEngine};

/// 计数规则引擎：记录在本上下文直接执行的意图
struct CountingRules {
    executed: AtomicUsize,
}

#[async_trait]
impl RulesEngine for CountingRules {
    async fn validate_and_execute(&self, _ctx: &ActorContext, _intent: &Intent) -> bool {
        self.executed.fetch_add(1, Ordering::SeqCst);
        true
    }
}

#[tokio::test]
async fn test_full_decision_cycle_across_contexts() {
    let advisor = Arc::new(MockAdvisor::new().with_latency(Duration::from_millis(50)));
    // move 和 found_city 争用同一单位：重排应丢弃 move、提升 found_city；
    // end_turn 之后的 build 绝不执行
    advisor.push_response(
        r#"{"actions":[
            {"action":"move_unit","unit_id":7,"x":3,"y":5},
            {"action":"found_city","unit_id":7,"name":"Roma"},
            {"action":"build","city_id":1,"item":"UNIT_WARRIOR"},
            {"action":"end_turn"},
            {"action":"research","tech":"TECH_POTTERY"}
        ]}"#,
    );

    let table = SlotTable::new(400);
    let mut coordinator = DecisionCoordinator::new(advisor.clone(), Duration::from_secs(5));
    let rules = Arc::new(CountingRules {
        executed: AtomicUsize::new(0),
    });
    let pipeline = ExecutionPipeline::new(rules.clone(), table.clone());

    // 模拟上下文：注册全部请求槽并收集解码出的意图
    let received = Arc::new(Mutex::new(Vec::new()));
    let mut simulation_router = SlotRouter::new(table.clone());
    for (key, reset) in codec::request_slots() {
        let received = Arc::clone(&received);
        simulation_router.register(
            key,
            reset,
            Box::new(move |value: SlotValue| {
                let intent = codec::decode_slot(key, &value).unwrap();
                received.lock().unwrap().push(intent);
            }),
        );
    }

    // 交互上下文：发起请求并轮询至就绪
    let key = (10, 0);
    reset_request_slots(&table);
    assert!(coordinator.request_decision(key, r#"{"turn":10,"playerID":0}"#.to_string()));
    assert!(!coordinator.request_decision(key, r#"{"turn":10,"playerID":0}"#.to_string()));

    let batch = loop {
        simulation_router.tick();
        match coordinator.poll_decision(key) {
            DecisionStatus::Ready(batch) => break batch,
            DecisionStatus::Waiting => tokio::time::sleep(Duration::from_millis(20)).await,
        }
    };
    assert_eq!(advisor.call_count(), 1);

    let ctx = ActorContext {
        turn: 10,
        agent_id: 0,
        primary: true,
    };
    let report = pipeline.execute_batch(batch, &ctx).await;

    // 重排丢弃 move；end_turn 终结批次，research 不执行
    assert_eq!(report.executed, 3);
    assert!(report.terminated);
    // found_city 与 build 需要模拟上下文，经总线转发；end_turn 在本地执行
    assert_eq!(report.redirected, 2);
    assert_eq!(rules.executed.load(Ordering::SeqCst), 1);

    // 模拟上下文 tick 恰好收取一次；重复 tick 不重放
    simulation_router.tick();
    simulation_router.tick();
    let intents = received.lock().unwrap().clone();
    assert_eq!(
        intents,
        vec![
            Intent::FoundCity {
                unit_id: 7,
                name: Some("Roma".to_string()),
            },
            Intent::Build {
                city_id: 1,
                item: "UNIT_WARRIOR".to_string(),
            },
        ]
    );

    // 同键再轮询：缓存命中，同一批次
    assert!(matches!(coordinator.poll_decision(key), DecisionStatus::Ready(_)));
    assert_eq!(advisor.call_count(), 1);
}

#[tokio::test]
async fn test_turn_boundary_reset_suppresses_stale_requests() {
    let table = SlotTable::new(400);
    let fired = Arc::new(AtomicUsize::new(0));
    let fired_clone = Arc::clone(&fired);

    let mut router = SlotRouter::new(table.clone());
    router.register(
        codec::SLOT_RESEARCH,
        SlotValue::Text(String::new()),
        Box::new(move |_| {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        }),
    );

    // 上一周期的请求被收取
    table.publish_text(codec::SLOT_RESEARCH, "TECH_POTTERY");
    router.tick();
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    // 新周期写入方先复位：慢轮询读取方不会重放旧请求
    reset_request_slots(&table);
    router.tick();
    router.tick();
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    // 复位后同一个值可以再次发出
    table.publish_text(codec::SLOT_RESEARCH, "TECH_POTTERY");
    router.tick();
    assert_eq!(fired.load(Ordering::SeqCst), 2);
}
