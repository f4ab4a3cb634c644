//! 路由规则领域模型
//!
//! 规则、条件、动作为父子所有关系：条件与动作以有序 Vec 的形式归属于规则，
//! 除 rule_id 外不持有任何反向引用。

use crate::error::{Result, RoutingError};
use crate::evaluator;
use crate::extractor;
use crate::operators::Operator;
use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// 规则优先级上限（含）
pub const MAX_PRIORITY: i32 = 1000;

/// 规则状态
///
/// 生命周期：scheduled → active ⇄ inactive；testing 为并行分支，
/// 参与评估但默认不产生真实路由副作用。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    Active,
    Inactive,
    Testing,
    Scheduled,
}

/// 路由目标类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Station,
    Staff,
    Team,
    Queue,
}

/// 周计划配置：允许的星期 + 小时窗口
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// 允许的星期（小写英文名，如 "monday"），空表示不限
    #[serde(default)]
    pub days_of_week: Vec<String>,
    /// 窗口起始小时（含）
    pub start_hour: u32,
    /// 窗口结束小时（不含）；start == end 表示全天，start > end 表示跨午夜
    pub end_hour: u32,
}

impl ScheduleConfig {
    pub fn allows(&self, now: DateTime<Utc>) -> bool {
        if !self.days_of_week.is_empty() {
            let day = weekday_name(now.weekday());
            if !self.days_of_week.iter().any(|d| d == day) {
                return false;
            }
        }

        let hour = now.hour();
        if self.start_hour == self.end_hour {
            true
        } else if self.start_hour < self.end_hour {
            hour >= self.start_hour && hour < self.end_hour
        } else {
            // 跨午夜窗口，如 22 点到次日 6 点
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

pub(crate) fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

/// 规则条件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleCondition {
    pub field_path: String,
    pub operator: Operator,
    pub value: Value,
    /// 同组条件 AND 组合，不同组之间 OR 组合
    #[serde(default)]
    pub condition_group: i32,
    #[serde(default)]
    pub negated: bool,
}

impl RuleCondition {
    pub fn new(field_path: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            field_path: field_path.into(),
            operator,
            value: value.into(),
            condition_group: 0,
            negated: false,
        }
    }

    pub fn in_group(mut self, group: i32) -> Self {
        self.condition_group = group;
        self
    }

    pub fn negated(mut self) -> Self {
        self.negated = true;
        self
    }
}

/// 动作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Route,
    Notify,
    Tag,
    Priority,
    Split,
    Log,
    Webhook,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Route => "route",
            Self::Notify => "notify",
            Self::Tag => "tag",
            Self::Priority => "priority",
            Self::Split => "split",
            Self::Log => "log",
            Self::Webhook => "webhook",
        };
        write!(f, "{}", s)
    }
}

/// 规则动作，按 execution_order 升序执行
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleAction {
    pub action_type: ActionType,
    #[serde(default)]
    pub execution_order: i32,
    /// 动作配置，语义随 action_type 而定
    #[serde(default)]
    pub config: Value,
    /// 可选的动作级门控条件，不满足时跳过该动作
    #[serde(default)]
    pub condition: Option<RuleCondition>,
}

impl RuleAction {
    pub fn new(action_type: ActionType, config: Value) -> Self {
        Self {
            action_type,
            execution_order: 0,
            config,
            condition: None,
        }
    }

    pub fn at_order(mut self, order: i32) -> Self {
        self.execution_order = order;
        self
    }

    pub fn gated_by(mut self, condition: RuleCondition) -> Self {
        self.condition = Some(condition);
        self
    }
}

/// 路由规则
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingRule {
    #[serde(default = "new_rule_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// 0-1000，数值越大越先评估
    pub priority: i32,
    pub status: RuleStatus,
    pub target_type: TargetType,
    pub target_id: String,
    #[serde(default)]
    pub target_config: Value,
    #[serde(default)]
    pub active_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub active_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub schedule: Option<ScheduleConfig>,
    pub conditions: Vec<RuleCondition>,
    pub actions: Vec<RuleAction>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn new_rule_id() -> String {
    Uuid::new_v4().to_string()
}

impl RoutingRule {
    pub fn new(
        name: impl Into<String>,
        priority: i32,
        target_type: TargetType,
        target_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: String::new(),
            priority,
            status: RuleStatus::Active,
            target_type,
            target_id: target_id.into(),
            target_config: Value::Null,
            active_from: None,
            active_until: None,
            schedule: None,
            conditions: Vec::new(),
            actions: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    pub fn with_condition(mut self, condition: RuleCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_action(mut self, action: RuleAction) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_status(mut self, status: RuleStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_schedule(mut self, schedule: ScheduleConfig) -> Self {
        self.schedule = Some(schedule);
        self
    }

    pub fn with_active_window(
        mut self,
        from: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Self {
        self.active_from = from;
        self.active_until = until;
        self
    }

    /// 校验规则结构
    ///
    /// 零条件或零动作的规则无效；字段路径必须落在已知命名空间；
    /// 操作符与期望值类型必须兼容，regex 模式在此预编译验证。
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(RoutingError::Validation("规则名称不能为空".to_string()));
        }

        if !(0..=MAX_PRIORITY).contains(&self.priority) {
            return Err(RoutingError::Validation(format!(
                "规则 '{}' 的优先级 {} 超出 0-{} 范围",
                self.name, self.priority, MAX_PRIORITY
            )));
        }

        if self.conditions.is_empty() {
            return Err(RoutingError::Validation(format!(
                "规则 '{}' 不包含任何条件",
                self.name
            )));
        }

        if self.actions.is_empty() {
            return Err(RoutingError::Validation(format!(
                "规则 '{}' 不包含任何动作",
                self.name
            )));
        }

        for (i, cond) in self.conditions.iter().enumerate() {
            validate_condition(cond).map_err(|e| {
                RoutingError::Validation(format!("规则 '{}' 条件[{}]: {}", self.name, i, e))
            })?;
        }

        for (i, action) in self.actions.iter().enumerate() {
            if let Some(gate) = &action.condition {
                validate_condition(gate).map_err(|e| {
                    RoutingError::Validation(format!(
                        "规则 '{}' 动作[{}]的门控条件: {}",
                        self.name, i, e
                    ))
                })?;
            }
        }

        Ok(())
    }

    /// 规则在给定时刻是否参与评估
    pub fn is_eligible(&self, now: DateTime<Utc>, include_testing: bool) -> bool {
        let status_ok = match self.status {
            RuleStatus::Active => true,
            RuleStatus::Testing => include_testing,
            // scheduled 规则在生效时间到达后自动进入候选
            RuleStatus::Scheduled => self.active_from.is_some_and(|from| now >= from),
            RuleStatus::Inactive => false,
        };
        if !status_ok {
            return false;
        }

        if let Some(from) = self.active_from {
            if now < from {
                return false;
            }
        }
        if let Some(until) = self.active_until {
            if now > until {
                return false;
            }
        }

        self.schedule.as_ref().is_none_or(|s| s.allows(now))
    }
}

/// 校验单个条件的字段路径与操作符/值兼容性
fn validate_condition(cond: &RuleCondition) -> Result<()> {
    extractor::validate_path(&cond.field_path)?;

    if cond.operator.expects_list() && !cond.value.is_array() {
        return Err(RoutingError::Validation(format!(
            "{} 操作符需要数组值",
            cond.operator
        )));
    }

    match cond.operator {
        Operator::Between => {
            // expects_list 已保证这里是数组
            let len = cond.value.as_array().map_or(0, Vec::len);
            if len != 2 {
                return Err(RoutingError::Validation(format!(
                    "between 操作符需要 [min, max] 数组，当前有 {} 个元素",
                    len
                )));
            }
        }
        Operator::Regex => {
            let pattern = cond.value.as_str().ok_or_else(|| {
                RoutingError::Validation("regex 操作符需要字符串值".to_string())
            })?;
            evaluator::compile_pattern(pattern, evaluator::DEFAULT_REGEX_SIZE_LIMIT)
                .map_err(|e| RoutingError::Validation(format!("正则表达式无效: {}", e)))?;
        }
        _ => {}
    }

    Ok(())
}

/// 规则评估/命中计数
#[derive(Debug, Clone, Default, Serialize)]
pub struct RuleStats {
    pub evaluation_count: u64,
    pub match_count: u64,
    pub last_matched_at: Option<DateTime<Utc>>,
}

/// 手动路由覆盖
///
/// 每订单至多一条有效覆盖；未过期时完全抢占规则评估。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteOverride {
    pub order_id: String,
    pub target_type: TargetType,
    pub target_id: String,
    #[serde(default)]
    pub target_config: Value,
    pub reason: String,
    pub created_by: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl RouteOverride {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|t| now >= t)
    }
}

/// 决策类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionType {
    Override,
    Rule,
    Default,
}

/// 待派发通知（派发由外部协作方负责）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub channel: String,
    pub config: Value,
}

/// 路由决策 — 评估管线的最终输出
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub decision_type: DecisionType,
    pub rule_id: Option<String>,
    pub rule_name: Option<String>,
    pub target_type: TargetType,
    pub target_id: String,
    #[serde(default)]
    pub target_config: Value,
    /// 团队目标经负载均衡解析出的具体员工
    #[serde(default)]
    pub assigned_staff_id: Option<String>,
    #[serde(default)]
    pub priority_adjustment: Option<i64>,
    #[serde(default)]
    pub split_config: Option<Value>,
    #[serde(default)]
    pub notifications: Vec<Notification>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl RoutingDecision {
    pub fn default_routing(station_id: impl Into<String>) -> Self {
        Self {
            decision_type: DecisionType::Default,
            rule_id: None,
            rule_name: None,
            target_type: TargetType::Station,
            target_id: station_id.into(),
            target_config: Value::Null,
            assigned_staff_id: None,
            priority_adjustment: None,
            split_config: None,
            notifications: Vec::new(),
            tags: Vec::new(),
        }
    }

    pub fn from_override(o: &RouteOverride) -> Self {
        Self {
            decision_type: DecisionType::Override,
            rule_id: None,
            rule_name: None,
            target_type: o.target_type,
            target_id: o.target_id.clone(),
            target_config: o.target_config.clone(),
            assigned_staff_id: None,
            priority_adjustment: None,
            split_config: None,
            notifications: Vec::new(),
            tags: Vec::new(),
        }
    }
}

/// 单条件评估记录
#[derive(Debug, Clone, Serialize)]
pub struct ConditionTrace {
    pub condition_group: i32,
    pub field_path: String,
    pub operator: Operator,
    pub expected: Value,
    pub extracted: Value,
    pub negated: bool,
    pub matched: bool,
}

/// 条件组评估记录
#[derive(Debug, Clone, Serialize)]
pub struct GroupTrace {
    pub group: i32,
    pub matched: bool,
    pub conditions: Vec<ConditionTrace>,
}

/// 单规则评估记录
#[derive(Debug, Clone, Serialize)]
pub struct RuleEvaluation {
    pub rule_id: String,
    pub rule_name: String,
    pub priority: i32,
    pub matched: bool,
    pub groups: Vec<GroupTrace>,
    pub error: Option<String>,
    pub duration_ms: i64,
}

/// 同优先级冲突信息
#[derive(Debug, Clone, Serialize)]
pub struct PriorityConflict {
    pub detected: bool,
    pub priority: i32,
    pub rule_names: Vec<String>,
}

/// 一次完整评估的结果
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationOutcome {
    pub order_id: String,
    pub decision: RoutingDecision,
    pub evaluations: Vec<RuleEvaluation>,
    pub matched_rule_ids: Vec<String>,
    pub conflict: Option<PriorityConflict>,
    pub test_mode: bool,
    pub evaluated_at: DateTime<Utc>,
}

/// 审计日志行 — 每条 (规则, 订单) 评估一条，创建后不再修改
#[derive(Debug, Clone, Serialize)]
pub struct RoutingLog {
    pub id: String,
    pub rule_id: String,
    pub rule_name: String,
    pub order_id: String,
    pub matched: bool,
    /// 该规则是否为最终胜出规则
    pub selected: bool,
    pub duration_ms: i64,
    pub order_context: Value,
    pub condition_results: Vec<GroupTrace>,
    pub actions_executed: Vec<String>,
    pub routing_result: Option<RoutingDecision>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}
