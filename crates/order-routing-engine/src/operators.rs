//! 条件操作符定义

use serde::{Deserialize, Serialize};
use std::fmt;

/// 条件操作符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    // 通用比较
    Equals,
    NotEquals,

    // 子串/成员包含
    Contains,
    NotContains,
    In,
    NotIn,

    // 数值比较
    GreaterThan,
    LessThan,
    Between,

    // 字符串匹配（从头匹配语义）
    Regex,
}

impl Operator {
    /// 返回语义相反的操作符
    ///
    /// 冲突检测器据此判断"可证明不重叠"的条件对：同字段、同值、
    /// 操作符互为相反即不可能同时命中。
    pub fn opposite(&self) -> Option<Operator> {
        match self {
            Self::Equals => Some(Self::NotEquals),
            Self::NotEquals => Some(Self::Equals),
            Self::Contains => Some(Self::NotContains),
            Self::NotContains => Some(Self::Contains),
            Self::In => Some(Self::NotIn),
            Self::NotIn => Some(Self::In),
            _ => None,
        }
    }

    /// 该操作符是否要求期望值为数组
    pub fn expects_list(&self) -> bool {
        matches!(self, Self::In | Self::NotIn | Self::Between)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Equals => "equals",
            Self::NotEquals => "not_equals",
            Self::Contains => "contains",
            Self::NotContains => "not_contains",
            Self::In => "in",
            Self::NotIn => "not_in",
            Self::GreaterThan => "greater_than",
            Self::LessThan => "less_than",
            Self::Between => "between",
            Self::Regex => "regex",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_snake_case() {
        let op: Operator = serde_json::from_str("\"greater_than\"").unwrap();
        assert_eq!(op, Operator::GreaterThan);
        assert_eq!(serde_json::to_string(&op).unwrap(), "\"greater_than\"");
    }

    #[test]
    fn test_opposite_pairs() {
        assert_eq!(Operator::Equals.opposite(), Some(Operator::NotEquals));
        assert_eq!(Operator::NotIn.opposite(), Some(Operator::In));
        assert_eq!(Operator::Between.opposite(), None);
        assert_eq!(Operator::Regex.opposite(), None);
    }

    #[test]
    fn test_display_matches_serde() {
        for op in [
            Operator::Equals,
            Operator::NotEquals,
            Operator::Contains,
            Operator::NotContains,
            Operator::In,
            Operator::NotIn,
            Operator::GreaterThan,
            Operator::LessThan,
            Operator::Between,
            Operator::Regex,
        ] {
            let serialized = serde_json::to_string(&op).unwrap();
            assert_eq!(serialized, format!("\"{}\"", op));
        }
    }
}
