//! 规则评估引擎
//!
//! 完整管线：覆盖门控 → 候选规则获取（状态 + 生效窗口 + 周计划，优先级
//! 降序）→ 逐规则评估（单规则错误不致整体失败）→ 最高优先级胜出（平级
//! 冲突告警并取获取顺序首个）→ 动作执行 → 兜底默认路由 → 计数与审计。
//!
//! 测试模式只走评估与决策，不碰计数器也不写审计日志。

use crate::balancer::TeamDirectory;
use crate::error::{Result, RoutingError};
use crate::evaluator::ConditionEvaluator;
use crate::executor::ActionExecutor;
use crate::extractor::FieldExtractor;
use crate::models::{
    EvaluationOutcome, PriorityConflict, RoutingDecision, RoutingLog, RoutingRule, RuleEvaluation,
    RuleStats,
};
use crate::order::{MenuCatalog, OrderContext};
use crate::store::{AuditLog, OverrideStore, RuleStore};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// 默认路由协作方（外部出餐工位路由系统的接缝）
///
/// 无规则命中时由它给出兜底决策。
pub trait DefaultRouter: Send + Sync {
    fn default_decision(&self, ctx: &OrderContext) -> RoutingDecision;
}

/// 固定工位的默认路由实现
pub struct StaticDefaultRouter {
    station_id: String,
}

impl StaticDefaultRouter {
    pub fn new(station_id: impl Into<String>) -> Self {
        Self {
            station_id: station_id.into(),
        }
    }
}

impl DefaultRouter for StaticDefaultRouter {
    fn default_decision(&self, _ctx: &OrderContext) -> RoutingDecision {
        RoutingDecision::default_routing(self.station_id.clone())
    }
}

#[derive(Debug, Clone, Copy)]
enum EvaluationMode {
    Production,
    Test { include_testing: bool },
}

impl EvaluationMode {
    fn is_test(&self) -> bool {
        matches!(self, Self::Test { .. })
    }

    fn include_testing(&self) -> bool {
        match self {
            Self::Production => false,
            Self::Test { include_testing } => *include_testing,
        }
    }
}

/// 路由规则引擎
#[derive(Clone)]
pub struct RoutingEngine {
    rules: RuleStore,
    overrides: OverrideStore,
    audit: AuditLog,
    teams: TeamDirectory,
    evaluator: ConditionEvaluator,
    executor: ActionExecutor,
    default_router: Arc<dyn DefaultRouter>,
}

impl RoutingEngine {
    pub fn new(menu: Arc<dyn MenuCatalog>, default_router: Arc<dyn DefaultRouter>) -> Self {
        let extractor = FieldExtractor::new(menu);
        let evaluator = ConditionEvaluator::new(extractor.clone());
        let teams = TeamDirectory::new();
        let executor = ActionExecutor::new(evaluator.clone(), extractor, teams.clone());

        Self {
            rules: RuleStore::new(),
            overrides: OverrideStore::new(),
            audit: AuditLog::new(),
            teams,
            evaluator,
            executor,
            default_router,
        }
    }

    pub fn rules(&self) -> &RuleStore {
        &self.rules
    }

    pub fn overrides(&self) -> &OverrideStore {
        &self.overrides
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn teams(&self) -> &TeamDirectory {
        &self.teams
    }

    // ==================== 规则管理 ====================

    pub fn create_rule(&self, rule: RoutingRule) -> Result<String> {
        self.rules.create(rule)
    }

    pub fn update_rule(&self, rule: RoutingRule) -> Result<()> {
        self.rules.update(rule)
    }

    pub fn deactivate_rule(&self, rule_id: &str) -> Result<()> {
        self.rules.deactivate(rule_id)
    }

    /// 删除规则；仍被审计日志引用时拒绝，此时应改用 deactivate
    pub fn delete_rule(&self, rule_id: &str) -> Result<RoutingRule> {
        let log_count = self.audit.references_rule(rule_id);
        if log_count > 0 {
            return Err(RoutingError::RuleReferencedByAudit {
                rule_id: rule_id.to_string(),
                log_count,
            });
        }
        self.rules.remove(rule_id)
    }

    /// 规则性能视图：评估/命中计数与最近命中时间
    pub fn rule_stats(&self, rule_id: &str) -> Option<RuleStats> {
        self.rules.stats(rule_id)
    }

    // ==================== 评估 ====================

    /// 生产评估：完整管线，更新计数并写审计日志
    pub fn evaluate(&self, ctx: &OrderContext) -> EvaluationOutcome {
        self.run(ctx, EvaluationMode::Production)
    }

    /// 测试评估：返回与生产相同的追踪结构，但不产生任何副作用
    ///
    /// `include_testing` 为 true 时 testing 状态的规则也参与评估。
    pub fn evaluate_test(&self, ctx: &OrderContext, include_testing: bool) -> EvaluationOutcome {
        self.run(ctx, EvaluationMode::Test { include_testing })
    }

    #[instrument(skip(self, ctx), fields(order_id = %ctx.order.id))]
    fn run(&self, ctx: &OrderContext, mode: EvaluationMode) -> EvaluationOutcome {
        // 覆盖门控：有效覆盖完全抢占规则评估
        if let Some(o) = self.overrides.active_for(&ctx.order.id, ctx.now) {
            info!(target_id = %o.target_id, reason = %o.reason, "订单存在手动覆盖，跳过规则评估");
            return EvaluationOutcome {
                order_id: ctx.order.id.clone(),
                decision: RoutingDecision::from_override(&o),
                evaluations: Vec::new(),
                matched_rule_ids: Vec::new(),
                conflict: None,
                test_mode: mode.is_test(),
                evaluated_at: ctx.now,
            };
        }

        let candidates = self.rules.candidates(ctx.now, mode.include_testing());
        let mut evaluations: Vec<RuleEvaluation> = Vec::with_capacity(candidates.len());

        for rule in &candidates {
            evaluations.push(self.evaluate_rule(rule, ctx));
        }

        let matched_rule_ids: Vec<String> = evaluations
            .iter()
            .filter(|e| e.matched)
            .map(|e| e.rule_id.clone())
            .collect();

        // 胜出规则：匹配规则中优先级最高者；候选已按优先级降序、id 升序
        // 排列，直接取获取顺序中的首个匹配即可
        let winner = candidates
            .iter()
            .zip(evaluations.iter())
            .find(|(_, e)| e.matched)
            .map(|(r, _)| r);

        let conflict = winner.and_then(|w| self.detect_priority_conflict(w, &candidates, &evaluations));

        let (decision, executed_actions) = match winner {
            Some(rule) => match self.executor.build_decision(rule, ctx, mode.is_test()) {
                Ok((decision, executed)) => (decision, executed),
                Err(e) => {
                    // 团队解析等失败不抛出，回退默认路由
                    warn!(rule_id = %rule.id, error = %e, "动作执行失败，回退默认路由");
                    (self.default_router.default_decision(ctx), Vec::new())
                }
            },
            None => (self.default_router.default_decision(ctx), Vec::new()),
        };

        if !mode.is_test() {
            self.persist_side_effects(ctx, &evaluations, winner, &decision, &executed_actions);
        }

        EvaluationOutcome {
            order_id: ctx.order.id.clone(),
            decision,
            evaluations,
            matched_rule_ids,
            conflict,
            test_mode: mode.is_test(),
            evaluated_at: ctx.now,
        }
    }

    /// 评估单条规则；结构性错误（如未知命名空间）捕获为该规则的错误记录
    fn evaluate_rule(&self, rule: &RoutingRule, ctx: &OrderContext) -> RuleEvaluation {
        let start = Instant::now();
        let (matched, groups, error) = match self.evaluator.evaluate_rule(rule, ctx) {
            Ok((matched, groups)) => (matched, groups, None),
            Err(e) => {
                warn!(rule_id = %rule.id, error = %e, "规则评估出错，按不匹配处理");
                (false, Vec::new(), Some(e.to_string()))
            }
        };

        RuleEvaluation {
            rule_id: rule.id.clone(),
            rule_name: rule.name.clone(),
            priority: rule.priority,
            matched,
            groups,
            error,
            duration_ms: start.elapsed().as_millis() as i64,
        }
    }

    /// 平级冲突检测：多条匹配规则共享最高优先级时告警
    fn detect_priority_conflict(
        &self,
        winner: &RoutingRule,
        candidates: &[RoutingRule],
        evaluations: &[RuleEvaluation],
    ) -> Option<PriorityConflict> {
        let tied: Vec<String> = candidates
            .iter()
            .zip(evaluations.iter())
            .filter(|(r, e)| e.matched && r.priority == winner.priority)
            .map(|(r, _)| r.name.clone())
            .collect();

        if tied.len() > 1 {
            warn!(
                priority = winner.priority,
                rules = ?tied,
                "同优先级规则冲突，按获取顺序取首个"
            );
            Some(PriorityConflict {
                detected: true,
                priority: winner.priority,
                rule_names: tied,
            })
        } else {
            None
        }
    }

    /// 生产模式副作用：推进计数器并为每条已评估规则写一行审计日志
    fn persist_side_effects(
        &self,
        ctx: &OrderContext,
        evaluations: &[RuleEvaluation],
        winner: Option<&RoutingRule>,
        decision: &RoutingDecision,
        executed_actions: &[String],
    ) {
        let order_context = serde_json::to_value(&ctx.order).unwrap_or(Value::Null);
        let winner_id = winner.map(|r| r.id.as_str());

        for eval in evaluations {
            self.rules
                .record_evaluation(&eval.rule_id, eval.matched, ctx.now);

            let selected = Some(eval.rule_id.as_str()) == winner_id;
            self.audit.append(RoutingLog {
                id: Uuid::new_v4().to_string(),
                rule_id: eval.rule_id.clone(),
                rule_name: eval.rule_name.clone(),
                order_id: ctx.order.id.clone(),
                matched: eval.matched,
                selected,
                duration_ms: eval.duration_ms,
                order_context: order_context.clone(),
                condition_results: eval.groups.clone(),
                actions_executed: if selected {
                    executed_actions.to_vec()
                } else {
                    Vec::new()
                },
                routing_result: selected.then(|| decision.clone()),
                error: eval.error.clone(),
                created_at: ctx.now,
            });
        }
    }
}
