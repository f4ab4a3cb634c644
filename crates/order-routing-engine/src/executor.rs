//! 动作执行器
//!
//! 解释胜出规则的动作序列并产出最终路由决策。route 动作可以用更具体的
//! 目标覆盖规则的静态目标；priority/split 只把配置附到决策上，解释权在
//! 订单子系统；notify/webhook 进入决策级通知队列，派发由外部协作方负责。

use crate::error::Result;
use crate::evaluator::ConditionEvaluator;
use crate::extractor::FieldExtractor;
use crate::models::{
    ActionType, DecisionType, Notification, RoutingDecision, RoutingRule, RuleAction, TargetType,
};
use crate::balancer::TeamDirectory;
use crate::order::OrderContext;
use serde_json::Value;
use tracing::{debug, info};

/// 动作执行器
#[derive(Clone)]
pub struct ActionExecutor {
    evaluator: ConditionEvaluator,
    extractor: FieldExtractor,
    teams: TeamDirectory,
}

impl ActionExecutor {
    pub fn new(
        evaluator: ConditionEvaluator,
        extractor: FieldExtractor,
        teams: TeamDirectory,
    ) -> Self {
        Self {
            evaluator,
            extractor,
            teams,
        }
    }

    /// 由胜出规则构建路由决策
    ///
    /// 动作按 execution_order 升序执行；若最终目标是团队，则经负载均衡
    /// 解析出具体员工后决策才算完成。团队解析失败向上返回错误，由引擎
    /// 回退到默认路由。
    ///
    /// `dry_run` 时团队解析走只读试选，不递增负载也不推进轮询游标。
    pub fn build_decision(
        &self,
        rule: &RoutingRule,
        ctx: &OrderContext,
        dry_run: bool,
    ) -> Result<(RoutingDecision, Vec<String>)> {
        let mut decision = RoutingDecision {
            decision_type: DecisionType::Rule,
            rule_id: Some(rule.id.clone()),
            rule_name: Some(rule.name.clone()),
            target_type: rule.target_type,
            target_id: rule.target_id.clone(),
            target_config: rule.target_config.clone(),
            assigned_staff_id: None,
            priority_adjustment: None,
            split_config: None,
            notifications: Vec::new(),
            tags: Vec::new(),
        };

        let mut actions: Vec<&RuleAction> = rule.actions.iter().collect();
        actions.sort_by_key(|a| a.execution_order);

        let mut executed = Vec::with_capacity(actions.len());

        for action in actions {
            if let Some(gate) = &action.condition {
                let (gate_matched, _) = self.evaluator.evaluate_condition(gate, ctx)?;
                if !gate_matched {
                    debug!(
                        rule_id = %rule.id,
                        action = %action.action_type,
                        "动作门控条件未满足，跳过"
                    );
                    continue;
                }
            }

            self.apply_action(action, &mut decision, ctx);
            executed.push(action.action_type.to_string());
        }

        if decision.target_type == TargetType::Team {
            let requirements = self.infer_requirements(ctx);
            let staff_id = if dry_run {
                self.teams.peek_member(&decision.target_id, &requirements)?
            } else {
                self.teams.select_member(&decision.target_id, &requirements)?
            };
            decision.assigned_staff_id = Some(staff_id);
        }

        Ok((decision, executed))
    }

    fn apply_action(&self, action: &RuleAction, decision: &mut RoutingDecision, ctx: &OrderContext) {
        let config = &action.config;
        match action.action_type {
            ActionType::Route => {
                if let Some(target_type) = config
                    .get("target_type")
                    .and_then(|v| serde_json::from_value::<TargetType>(v.clone()).ok())
                {
                    decision.target_type = target_type;
                }
                if let Some(target_id) = config.get("target_id").and_then(Value::as_str) {
                    decision.target_id = target_id.to_string();
                }
                if let Some(target_config) = config.get("target_config") {
                    decision.target_config = target_config.clone();
                }
            }
            ActionType::Priority => {
                let adjustment = config
                    .get("adjustment")
                    .and_then(Value::as_i64)
                    .or_else(|| config.as_i64());
                if adjustment.is_some() {
                    decision.priority_adjustment = adjustment;
                }
            }
            ActionType::Split => {
                decision.split_config = Some(config.clone());
            }
            ActionType::Notify => {
                let channel = config
                    .get("channel")
                    .and_then(Value::as_str)
                    .unwrap_or("default")
                    .to_string();
                decision.notifications.push(Notification {
                    channel,
                    config: config.clone(),
                });
            }
            ActionType::Webhook => {
                decision.notifications.push(Notification {
                    channel: "webhook".to_string(),
                    config: config.clone(),
                });
            }
            ActionType::Tag => {
                if let Some(tag) = config.get("tag").and_then(Value::as_str) {
                    decision.tags.push(tag.to_string());
                }
                if let Some(tags) = config.get("tags").and_then(Value::as_array) {
                    decision
                        .tags
                        .extend(tags.iter().filter_map(Value::as_str).map(String::from));
                }
            }
            ActionType::Log => {
                info!(
                    order_id = %ctx.order.id,
                    config = %config,
                    "规则动作日志"
                );
            }
        }
    }

    /// 从订单推导能力需求：行项目分类 + 含酒精时的 alcohol_service
    fn infer_requirements(&self, ctx: &OrderContext) -> Vec<String> {
        let mut requirements: Vec<String> = Vec::new();

        if let Ok(Value::Array(categories)) = self.extractor.extract("item.categories", ctx) {
            requirements.extend(
                categories
                    .iter()
                    .filter_map(Value::as_str)
                    .map(String::from),
            );
        }

        if let Ok(Value::Bool(true)) = self.extractor.extract("item.has_alcohol", ctx) {
            requirements.push("alcohol_service".to_string());
        }

        requirements
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balancer::{RoutingStrategy, TeamMember, TeamRoutingConfig};
    use crate::models::{RuleCondition, RuleStatus};
    use crate::operators::Operator;
    use crate::order::{InMemoryMenuCatalog, MenuItemMeta, OrderItem, OrderSnapshot};
    use serde_json::json;
    use std::sync::Arc;

    fn executor_with_team() -> (ActionExecutor, TeamDirectory) {
        let mut catalog = InMemoryMenuCatalog::new();
        catalog.insert(
            "m-1",
            MenuItemMeta {
                category: "dessert".to_string(),
                contains_alcohol: false,
            },
        );
        let extractor = FieldExtractor::new(Arc::new(catalog));

        let teams = TeamDirectory::new();
        teams.upsert_team(
            TeamRoutingConfig {
                team_id: "team-a".to_string(),
                name: "pastry".to_string(),
                strategy: RoutingStrategy::LeastLoaded,
                capacity: None,
            },
            vec![TeamMember {
                staff_id: "s1".to_string(),
                active: true,
                weight: 0,
                current_load: 0,
            }],
        );

        let executor = ActionExecutor::new(
            ConditionEvaluator::new(extractor.clone()),
            extractor,
            teams.clone(),
        );
        (executor, teams)
    }

    fn sample_ctx() -> OrderContext {
        OrderContext::new(OrderSnapshot {
            id: "order-001".to_string(),
            status: "pending".to_string(),
            total: 150.0,
            table_number: Some(4),
            delivery_address: None,
            items: vec![OrderItem {
                menu_item_id: "m-1".to_string(),
                name: "tiramisu".to_string(),
                quantity: 1,
                price: 150.0,
            }],
            customer_id: None,
            created_at: chrono::Utc::now(),
            scheduled_at: None,
        })
    }

    fn base_rule() -> RoutingRule {
        RoutingRule::new("r1", 50, TargetType::Station, "station-1")
            .with_condition(RuleCondition::new("order.total", Operator::GreaterThan, 0))
            .with_status(RuleStatus::Active)
    }

    #[test]
    fn test_actions_run_in_execution_order() {
        let rule = base_rule()
            .with_action(
                RuleAction::new(
                    ActionType::Route,
                    json!({"target_type": "station", "target_id": "station-9"}),
                )
                .at_order(2),
            )
            .with_action(
                RuleAction::new(
                    ActionType::Route,
                    json!({"target_type": "station", "target_id": "station-5"}),
                )
                .at_order(1),
            );

        let (executor, _) = executor_with_team();
        let (decision, executed) = executor.build_decision(&rule, &sample_ctx(), false).unwrap();
        // order=2 的动作后执行，最终目标应为 station-9
        assert_eq!(decision.target_id, "station-9");
        assert_eq!(executed, vec!["route", "route"]);
    }

    #[test]
    fn test_route_action_overrides_static_target() {
        let rule = base_rule().with_action(RuleAction::new(
            ActionType::Route,
            json!({"target_type": "queue", "target_id": "vip-queue"}),
        ));

        let (executor, _) = executor_with_team();
        let (decision, _) = executor.build_decision(&rule, &sample_ctx(), false).unwrap();
        assert_eq!(decision.target_type, TargetType::Queue);
        assert_eq!(decision.target_id, "vip-queue");
    }

    #[test]
    fn test_priority_split_notify_tag_actions() {
        let rule = base_rule()
            .with_action(RuleAction::new(ActionType::Priority, json!({"adjustment": 5})))
            .with_action(RuleAction::new(ActionType::Split, json!({"by": "category"})))
            .with_action(RuleAction::new(
                ActionType::Notify,
                json!({"channel": "kds", "message": "rush order"}),
            ))
            .with_action(RuleAction::new(ActionType::Tag, json!({"tags": ["vip", "rush"]})))
            .with_action(RuleAction::new(ActionType::Webhook, json!({"url": "http://x"})));

        let (executor, _) = executor_with_team();
        let (decision, executed) = executor.build_decision(&rule, &sample_ctx(), false).unwrap();

        assert_eq!(decision.priority_adjustment, Some(5));
        assert_eq!(decision.split_config, Some(json!({"by": "category"})));
        assert_eq!(decision.notifications.len(), 2);
        assert_eq!(decision.notifications[0].channel, "kds");
        assert_eq!(decision.notifications[1].channel, "webhook");
        assert_eq!(decision.tags, vec!["vip", "rush"]);
        assert_eq!(executed.len(), 5);
    }

    #[test]
    fn test_action_gate_skips_action() {
        let rule = base_rule()
            .with_action(RuleAction::new(ActionType::Route, json!({"target_id": "a"})))
            .with_action(
                RuleAction::new(
                    ActionType::Notify,
                    json!({"channel": "sms"}),
                )
                .gated_by(RuleCondition::new("order.total", Operator::GreaterThan, 1000)),
            );

        let (executor, _) = executor_with_team();
        let (decision, executed) = executor.build_decision(&rule, &sample_ctx(), false).unwrap();
        assert!(decision.notifications.is_empty());
        assert_eq!(executed, vec!["route"]);
    }

    #[test]
    fn test_team_target_resolves_member() {
        let rule = base_rule().with_action(RuleAction::new(
            ActionType::Route,
            json!({"target_type": "team", "target_id": "team-a"}),
        ));

        let (executor, teams) = executor_with_team();
        let (decision, _) = executor.build_decision(&rule, &sample_ctx(), false).unwrap();
        assert_eq!(decision.target_type, TargetType::Team);
        assert_eq!(decision.assigned_staff_id.as_deref(), Some("s1"));
        assert_eq!(teams.team_load("team-a"), Some(1));
    }

    #[test]
    fn test_dry_run_resolves_member_without_load() {
        let rule = base_rule().with_action(RuleAction::new(
            ActionType::Route,
            json!({"target_type": "team", "target_id": "team-a"}),
        ));

        let (executor, teams) = executor_with_team();
        let (decision, _) = executor.build_decision(&rule, &sample_ctx(), true).unwrap();
        // 干跑同样给出将被指派的成员，但负载保持不变
        assert_eq!(decision.assigned_staff_id.as_deref(), Some("s1"));
        assert_eq!(teams.team_load("team-a"), Some(0));
        assert_eq!(teams.member_load("team-a", "s1"), Some(0));
    }

    #[test]
    fn test_unknown_team_surfaces_error() {
        let rule = base_rule().with_action(RuleAction::new(
            ActionType::Route,
            json!({"target_type": "team", "target_id": "team-missing"}),
        ));

        let (executor, _) = executor_with_team();
        assert!(executor.build_decision(&rule, &sample_ctx(), false).is_err());
    }
}
