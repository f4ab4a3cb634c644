//! 规则、覆盖与审计存储
//!
//! 使用 DashMap 提供线程安全的内存 arena：规则按 id 索引，条件与动作作为
//! 规则自有的有序 Vec 存储。评估/命中计数通过 DashMap 的按键独占访问更新，
//! 避免并发评估下的丢失更新。

use crate::error::{Result, RoutingError};
use crate::models::{RouteOverride, RoutingLog, RoutingRule, RuleStats, RuleStatus};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// 规则存储
#[derive(Clone)]
pub struct RuleStore {
    rules: Arc<DashMap<String, RoutingRule>>,
    stats: Arc<DashMap<String, RuleStats>>,
}

impl RuleStore {
    pub fn new() -> Self {
        Self {
            rules: Arc::new(DashMap::new()),
            stats: Arc::new(DashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// 创建规则：校验后入库
    #[instrument(skip(self, rule), fields(rule_name = %rule.name))]
    pub fn create(&self, rule: RoutingRule) -> Result<String> {
        rule.validate()?;
        let rule_id = rule.id.clone();
        self.rules.insert(rule_id.clone(), rule);
        info!(rule_id = %rule_id, "规则已创建");
        Ok(rule_id)
    }

    /// 更新规则：必须已存在且通过校验
    #[instrument(skip(self, rule), fields(rule_id = %rule.id))]
    pub fn update(&self, mut rule: RoutingRule) -> Result<()> {
        if !self.rules.contains_key(&rule.id) {
            warn!(rule_id = %rule.id, "更新不存在的规则");
            return Err(RoutingError::RuleNotFound(rule.id));
        }
        rule.validate()?;
        rule.updated_at = Utc::now();
        let rule_id = rule.id.clone();
        self.rules.insert(rule_id.clone(), rule);
        info!(rule_id = %rule_id, "规则已更新");
        Ok(())
    }

    pub fn get(&self, rule_id: &str) -> Option<RoutingRule> {
        self.rules.get(rule_id).map(|r| r.clone())
    }

    pub fn contains(&self, rule_id: &str) -> bool {
        self.rules.contains_key(rule_id)
    }

    pub fn list_all(&self) -> Vec<RoutingRule> {
        self.rules.iter().map(|r| r.value().clone()).collect()
    }

    /// 软停用：状态置为 inactive，规则与其审计引用保持可查
    #[instrument(skip(self))]
    pub fn deactivate(&self, rule_id: &str) -> Result<()> {
        let mut entry = self
            .rules
            .get_mut(rule_id)
            .ok_or_else(|| RoutingError::RuleNotFound(rule_id.to_string()))?;
        entry.status = RuleStatus::Inactive;
        entry.updated_at = Utc::now();
        info!(rule_id = %rule_id, "规则已停用");
        Ok(())
    }

    /// 物理删除，仅供上层在确认无审计引用后调用
    pub(crate) fn remove(&self, rule_id: &str) -> Result<RoutingRule> {
        let (_, rule) = self
            .rules
            .remove(rule_id)
            .ok_or_else(|| RoutingError::RuleNotFound(rule_id.to_string()))?;
        self.stats.remove(rule_id);
        info!(rule_id = %rule_id, "规则已删除");
        Ok(rule)
    }

    /// 批量创建，单条失败不中断
    #[instrument(skip(self, rules))]
    pub fn load_batch(&self, rules: Vec<RoutingRule>) -> Vec<String> {
        let mut loaded = Vec::with_capacity(rules.len());
        let mut failed = 0usize;

        for rule in rules {
            let rule_name = rule.name.clone();
            match self.create(rule) {
                Ok(id) => loaded.push(id),
                Err(e) => {
                    failed += 1;
                    warn!(rule_name = %rule_name, error = %e, "规则加载失败，已跳过");
                }
            }
        }

        info!("批量加载完成: {} 成功, {} 失败", loaded.len(), failed);
        loaded
    }

    /// 取候选规则：按资格过滤，优先级降序排序
    ///
    /// 同优先级按规则 id 升序排列，保证"取首个"的平级裁决在多次运行间稳定。
    pub fn candidates(&self, now: DateTime<Utc>, include_testing: bool) -> Vec<RoutingRule> {
        let mut rules: Vec<RoutingRule> = self
            .rules
            .iter()
            .filter(|r| r.is_eligible(now, include_testing))
            .map(|r| r.clone())
            .collect();

        rules.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));
        rules
    }

    /// 记录一次评估（命中时同时推进命中计数与时间）
    ///
    /// DashMap entry 提供按键独占访问，计数更新不会在并发评估下互相覆盖。
    pub fn record_evaluation(&self, rule_id: &str, matched: bool, now: DateTime<Utc>) {
        let mut entry = self.stats.entry(rule_id.to_string()).or_default();
        entry.evaluation_count += 1;
        if matched {
            entry.match_count += 1;
            entry.last_matched_at = Some(now);
        }
    }

    pub fn stats(&self, rule_id: &str) -> Option<RuleStats> {
        self.stats.get(rule_id).map(|s| s.clone())
    }
}

impl Default for RuleStore {
    fn default() -> Self {
        Self::new()
    }
}

/// 手动覆盖存储
///
/// 每订单至多一条覆盖，写入即替换旧值；过期在读取时判定，过期条目视同不存在。
#[derive(Clone)]
pub struct OverrideStore {
    overrides: Arc<DashMap<String, RouteOverride>>,
}

impl OverrideStore {
    pub fn new() -> Self {
        Self {
            overrides: Arc::new(DashMap::new()),
        }
    }

    /// 设置覆盖，返回被替换的旧覆盖
    #[instrument(skip(self, o), fields(order_id = %o.order_id, target_id = %o.target_id))]
    pub fn set(&self, o: RouteOverride) -> Option<RouteOverride> {
        let prior = self.overrides.insert(o.order_id.clone(), o);
        if prior.is_some() {
            info!("已替换该订单的既有覆盖");
        }
        prior
    }

    /// 查询订单的有效覆盖；过期条目惰性清除
    pub fn active_for(&self, order_id: &str, now: DateTime<Utc>) -> Option<RouteOverride> {
        let expired = match self.overrides.get(order_id) {
            Some(o) if o.is_expired(now) => true,
            Some(o) => return Some(o.clone()),
            None => return None,
        };
        if expired {
            self.overrides.remove(order_id);
        }
        None
    }

    pub fn clear(&self, order_id: &str) -> Option<RouteOverride> {
        self.overrides.remove(order_id).map(|(_, o)| o)
    }
}

impl Default for OverrideStore {
    fn default() -> Self {
        Self::new()
    }
}

/// 审计日志 — 追加写，创建后不修改
#[derive(Clone)]
pub struct AuditLog {
    entries: Arc<RwLock<Vec<RoutingLog>>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn append(&self, log: RoutingLog) {
        self.entries.write().push(log);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn for_order(&self, order_id: &str) -> Vec<RoutingLog> {
        self.entries
            .read()
            .iter()
            .filter(|l| l.order_id == order_id)
            .cloned()
            .collect()
    }

    pub fn for_rule(&self, rule_id: &str) -> Vec<RoutingLog> {
        self.entries
            .read()
            .iter()
            .filter(|l| l.rule_id == rule_id)
            .cloned()
            .collect()
    }

    /// 规则是否仍被日志引用（删除守卫依据）
    pub fn references_rule(&self, rule_id: &str) -> usize {
        self.entries
            .read()
            .iter()
            .filter(|l| l.rule_id == rule_id)
            .count()
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}
