//! 规则冲突诊断
//!
//! 离线扫描活跃规则，找出可能互相竞争的规则对。这是给运营人员的诊断
//! 工具，不参与评估管线；评估期的平级冲突由引擎在命中时单独告警。

use crate::models::{RoutingRule, RuleCondition, RuleStatus};
use crate::store::RuleStore;
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// 冲突严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictSeverity {
    /// 同优先级：命中时只能靠获取顺序裁决
    High,
    /// 条件字段重叠且无法证明互斥：可能对同一订单竞争
    Medium,
}

/// 一对规则之间的冲突
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConflict {
    pub rule_a_id: String,
    pub rule_a_name: String,
    pub rule_b_id: String,
    pub rule_b_name: String,
    pub severity: ConflictSeverity,
    pub reason: String,
}

/// 冲突检测器
pub struct ConflictDetector {
    rules: RuleStore,
}

impl ConflictDetector {
    pub fn new(rules: RuleStore) -> Self {
        Self { rules }
    }

    /// 检测冲突；给定 rule_id 时只报告涉及该规则的冲突对
    #[instrument(skip(self))]
    pub fn detect_conflicts(&self, rule_id: Option<&str>) -> Vec<RuleConflict> {
        let mut active: Vec<RoutingRule> = self
            .rules
            .list_all()
            .into_iter()
            .filter(|r| r.status == RuleStatus::Active)
            .collect();
        active.sort_by(|a, b| a.id.cmp(&b.id));

        let mut conflicts = Vec::new();
        for (i, a) in active.iter().enumerate() {
            for b in &active[i + 1..] {
                if let Some(filter) = rule_id {
                    if a.id != filter && b.id != filter {
                        continue;
                    }
                }
                if let Some(conflict) = Self::check_pair(a, b) {
                    conflicts.push(conflict);
                }
            }
        }
        conflicts
    }

    fn check_pair(a: &RoutingRule, b: &RoutingRule) -> Option<RuleConflict> {
        if a.priority == b.priority {
            return Some(Self::conflict(
                a,
                b,
                ConflictSeverity::High,
                format!("两条规则共享优先级 {}，命中时裁决依赖规则 id 顺序", a.priority),
            ));
        }

        let shared: Vec<&str> = a
            .conditions
            .iter()
            .map(|c| c.field_path.as_str())
            .filter(|p| b.conditions.iter().any(|c| c.field_path == *p))
            .collect();
        if shared.is_empty() {
            return None;
        }

        // 任一共享字段上存在一对可证互斥的条件即视为不冲突
        let exclusive = a.conditions.iter().any(|ca| {
            b.conditions
                .iter()
                .any(|cb| cb.field_path == ca.field_path && Self::mutually_exclusive(ca, cb))
        });
        if exclusive {
            return None;
        }

        Some(Self::conflict(
            a,
            b,
            ConflictSeverity::Medium,
            format!("条件字段重叠（{}）且无法证明互斥", shared.join(", ")),
        ))
    }

    /// 同字段上的一对条件能否证明互斥
    ///
    /// 仅识别保守模式：同值的相反算子（equals/not_equals 等），以及
    /// equals 对不同字面值。识别不了的情况一律按可能重叠处理。
    fn mutually_exclusive(a: &RuleCondition, b: &RuleCondition) -> bool {
        if a.negated || b.negated {
            return false;
        }
        if a.operator.opposite() == Some(b.operator) && a.value == b.value {
            return true;
        }
        a.operator == crate::operators::Operator::Equals
            && b.operator == crate::operators::Operator::Equals
            && a.value != b.value
    }

    fn conflict(
        a: &RoutingRule,
        b: &RoutingRule,
        severity: ConflictSeverity,
        reason: String,
    ) -> RuleConflict {
        RuleConflict {
            rule_a_id: a.id.clone(),
            rule_a_name: a.name.clone(),
            rule_b_id: b.id.clone(),
            rule_b_name: b.name.clone(),
            severity,
            reason,
        }
    }
}
