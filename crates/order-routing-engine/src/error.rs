//! 路由引擎错误类型

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("规则校验失败: {0}")]
    Validation(String),

    #[error("未知的字段命名空间: {0}")]
    UnknownNamespace(String),

    #[error("规则未找到: {0}")]
    RuleNotFound(String),

    #[error("团队未找到: {0}")]
    TeamNotFound(String),

    #[error("团队无可用成员: team_id={team_id}")]
    NoAvailableMember { team_id: String },

    #[error("规则仍被审计日志引用，无法删除: {rule_id} ({log_count} 条)")]
    RuleReferencedByAudit { rule_id: String, log_count: usize },

    #[error("JSON 序列化错误: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl RoutingError {
    /// 获取错误码，用于日志与上层 API 响应
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::UnknownNamespace(_) => "UNKNOWN_NAMESPACE",
            Self::RuleNotFound(_) => "RULE_NOT_FOUND",
            Self::TeamNotFound(_) => "TEAM_NOT_FOUND",
            Self::NoAvailableMember { .. } => "NO_AVAILABLE_MEMBER",
            Self::RuleReferencedByAudit { .. } => "RULE_REFERENCED_BY_AUDIT",
            Self::JsonError(_) => "JSON_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, RoutingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        let err = RoutingError::RuleNotFound("rule-001".to_string());
        assert_eq!(err.code(), "RULE_NOT_FOUND");

        let err = RoutingError::NoAvailableMember {
            team_id: "team-a".to_string(),
        };
        assert_eq!(err.code(), "NO_AVAILABLE_MEMBER");
    }
}
