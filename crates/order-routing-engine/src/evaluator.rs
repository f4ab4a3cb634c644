//! 条件评估器
//!
//! 操作符语义：equals/contains 按大小写不敏感的字符串形态比较（两侧均可转
//! 数值时按浮点比较）；greater_than/less_than 强制转浮点，失败返回 false；
//! between 为含边界的二元区间；regex 为从头匹配语义。提取值为 Null 时一律
//! 返回 false，包括 not_equals —— 这是有意的默认拒绝策略。

use crate::error::Result;
use crate::extractor::FieldExtractor;
use crate::models::{ConditionTrace, GroupTrace, RoutingRule, RuleCondition};
use crate::operators::Operator;
use crate::order::OrderContext;
use regex::{Regex, RegexBuilder};
use serde_json::Value;
use std::collections::BTreeMap;

/// regex 条件的默认编译大小上限，限制病态表达式的代价
pub const DEFAULT_REGEX_SIZE_LIMIT: usize = 1 << 16;

/// 编译从头匹配语义的正则
///
/// 未以 `^` 开头的模式会被包进 `^(?:...)`，与源系统的 match-from-start
/// 行为一致。
pub(crate) fn compile_pattern(
    pattern: &str,
    size_limit: usize,
) -> std::result::Result<Regex, regex::Error> {
    let anchored = if pattern.starts_with('^') {
        pattern.to_string()
    } else {
        format!("^(?:{})", pattern)
    };
    RegexBuilder::new(&anchored).size_limit(size_limit).build()
}

/// 操作符评估器
pub struct OperatorEvaluator;

impl OperatorEvaluator {
    /// 应用操作符，永不失败：类型不兼容即判 false
    pub fn apply(value: &Value, operator: Operator, expected: &Value) -> bool {
        if value.is_null() {
            return false;
        }

        match operator {
            Operator::Equals => Self::loose_eq(value, expected),
            Operator::NotEquals => !Self::loose_eq(value, expected),
            Operator::Contains => Self::contains(value, expected),
            Operator::NotContains => !Self::contains(value, expected),
            Operator::In => Self::in_list(value, expected),
            Operator::NotIn => match expected.as_array() {
                Some(_) => !Self::in_list(value, expected),
                None => false,
            },
            Operator::GreaterThan => Self::compare(value, expected, |a, b| a > b),
            Operator::LessThan => Self::compare(value, expected, |a, b| a < b),
            Operator::Between => Self::between(value, expected),
            Operator::Regex => Self::regex_match(value, expected),
        }
    }

    /// 宽松相等：两侧均可转数值时按浮点比较，否则比较小写字符串形态
    fn loose_eq(a: &Value, b: &Value) -> bool {
        if let (Some(x), Some(y)) = (Self::as_f64(a), Self::as_f64(b)) {
            return (x - y).abs() < f64::EPSILON;
        }
        Self::string_form(a).to_lowercase() == Self::string_form(b).to_lowercase()
    }

    fn contains(value: &Value, expected: &Value) -> bool {
        match value {
            // 列表值做成员检查（如 item.categories）
            Value::Array(arr) => arr.iter().any(|item| Self::loose_eq(item, expected)),
            _ => Self::string_form(value)
                .to_lowercase()
                .contains(&Self::string_form(expected).to_lowercase()),
        }
    }

    fn in_list(value: &Value, expected: &Value) -> bool {
        match expected.as_array() {
            Some(arr) => arr.iter().any(|item| Self::loose_eq(value, item)),
            None => false,
        }
    }

    fn compare<F>(value: &Value, expected: &Value, cmp: F) -> bool
    where
        F: Fn(f64, f64) -> bool,
    {
        match (Self::as_f64(value), Self::as_f64(expected)) {
            (Some(a), Some(b)) => cmp(a, b),
            _ => false,
        }
    }

    fn between(value: &Value, expected: &Value) -> bool {
        let Some(arr) = expected.as_array() else {
            return false;
        };
        if arr.len() != 2 {
            return false;
        }
        match (
            Self::as_f64(value),
            Self::as_f64(&arr[0]),
            Self::as_f64(&arr[1]),
        ) {
            (Some(v), Some(min), Some(max)) => v >= min && v <= max,
            _ => false,
        }
    }

    fn regex_match(value: &Value, expected: &Value) -> bool {
        let Some(pattern) = expected.as_str() else {
            return false;
        };
        match compile_pattern(pattern, DEFAULT_REGEX_SIZE_LIMIT) {
            Ok(re) => re.is_match(&Self::string_form(value)),
            Err(_) => false,
        }
    }

    fn as_f64(value: &Value) -> Option<f64> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// 取值的字符串形态：字符串原样，其余用 JSON 文本
    fn string_form(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// 条件评估器
///
/// 按 condition_group 分组：组内 AND（短路），组间 OR（命中任一组即匹配，
/// 后续组不再评估）。
#[derive(Clone)]
pub struct ConditionEvaluator {
    extractor: FieldExtractor,
}

impl ConditionEvaluator {
    pub fn new(extractor: FieldExtractor) -> Self {
        Self { extractor }
    }

    /// 评估整条规则的条件集，返回匹配结果与分组追踪
    pub fn evaluate_rule(
        &self,
        rule: &RoutingRule,
        ctx: &OrderContext,
    ) -> Result<(bool, Vec<GroupTrace>)> {
        let mut groups: BTreeMap<i32, Vec<&RuleCondition>> = BTreeMap::new();
        for cond in &rule.conditions {
            groups.entry(cond.condition_group).or_default().push(cond);
        }

        let mut traces = Vec::with_capacity(groups.len());
        let mut rule_matched = false;

        for (group_id, conditions) in groups {
            let mut group_matched = true;
            let mut condition_traces = Vec::with_capacity(conditions.len());

            for cond in conditions {
                let (matched, trace) = self.evaluate_condition(cond, ctx)?;
                condition_traces.push(trace);
                if !matched {
                    group_matched = false;
                    // AND 短路：组内后续条件不再评估
                    break;
                }
            }

            traces.push(GroupTrace {
                group: group_id,
                matched: group_matched,
                conditions: condition_traces,
            });

            if group_matched {
                rule_matched = true;
                // OR 短路：后续组不再评估
                break;
            }
        }

        Ok((rule_matched, traces))
    }

    /// 评估单个条件
    ///
    /// 取反通过 XOR 实现；提取值为 Null 时无论是否取反一律为 false。
    pub fn evaluate_condition(
        &self,
        cond: &RuleCondition,
        ctx: &OrderContext,
    ) -> Result<(bool, ConditionTrace)> {
        let extracted = self.extractor.extract(&cond.field_path, ctx)?;

        let matched = if extracted.is_null() {
            false
        } else {
            OperatorEvaluator::apply(&extracted, cond.operator, &cond.value) ^ cond.negated
        };

        let trace = ConditionTrace {
            condition_group: cond.condition_group,
            field_path: cond.field_path.clone(),
            operator: cond.operator,
            expected: cond.value.clone(),
            extracted,
            negated: cond.negated,
            matched,
        };

        Ok((matched, trace))
    }
}
