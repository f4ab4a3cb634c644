//! 条件评估热路径基准
//!
//! 评估在每个订单事件上同步执行，这里度量单规则评估与整库扫描两个
//! 粒度的开销。

use chrono::Utc;
use criterion::{Criterion, criterion_group, criterion_main};
use routing_engine::evaluator::ConditionEvaluator;
use routing_engine::extractor::FieldExtractor;
use routing_engine::models::ActionType;
use routing_engine::order::{InMemoryMenuCatalog, MenuItemMeta, OrderItem, OrderSnapshot};
use routing_engine::{
    Operator, OrderContext, RoutingEngine, RoutingRule, RuleAction, RuleCondition,
    StaticDefaultRouter, TargetType,
};
use serde_json::json;
use std::hint::black_box;
use std::sync::Arc;

fn catalog() -> InMemoryMenuCatalog {
    let mut catalog = InMemoryMenuCatalog::new();
    catalog.insert(
        "m-1",
        MenuItemMeta {
            category: "dessert".to_string(),
            contains_alcohol: false,
        },
    );
    catalog
}

fn sample_ctx() -> OrderContext {
    OrderContext::new(OrderSnapshot {
        id: "order-bench".to_string(),
        status: "pending".to_string(),
        total: 150.0,
        table_number: Some(4),
        delivery_address: None,
        items: vec![OrderItem {
            menu_item_id: "m-1".to_string(),
            name: "tiramisu".to_string(),
            quantity: 2,
            price: 75.0,
        }],
        customer_id: None,
        created_at: Utc::now(),
        scheduled_at: None,
    })
}

fn multi_condition_rule(priority: i32) -> RoutingRule {
    RoutingRule::new(format!("bench_rule_{priority}"), priority, TargetType::Station, "station-1")
        .with_condition(RuleCondition::new("order.type", Operator::Equals, "dine_in"))
        .with_condition(RuleCondition::new("order.total", Operator::GreaterThan, 100))
        .with_condition(RuleCondition::new(
            "item.categories",
            Operator::Contains,
            "dessert",
        ))
        .with_action(RuleAction::new(
            ActionType::Route,
            json!({"target_id": "station-1"}),
        ))
}

fn bench_single_rule(c: &mut Criterion) {
    let evaluator = ConditionEvaluator::new(FieldExtractor::new(Arc::new(catalog())));
    let rule = multi_condition_rule(50);
    let ctx = sample_ctx();

    c.bench_function("evaluate_rule_3_conditions", |b| {
        b.iter(|| {
            let result = evaluator.evaluate_rule(black_box(&rule), black_box(&ctx));
            black_box(result)
        })
    });
}

fn bench_full_scan(c: &mut Criterion) {
    let engine = RoutingEngine::new(
        Arc::new(catalog()),
        Arc::new(StaticDefaultRouter::new("main_kitchen")),
    );
    for priority in 0..100 {
        engine.create_rule(multi_condition_rule(priority)).unwrap();
    }
    let ctx = sample_ctx();

    c.bench_function("evaluate_test_100_rules", |b| {
        b.iter(|| black_box(engine.evaluate_test(black_box(&ctx), false)))
    });
}

criterion_group!(benches, bench_single_rule, bench_full_scan);
criterion_main!(benches);
