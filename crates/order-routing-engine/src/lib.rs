//! 订单路由规则引擎
//!
//! 为餐厅运营后端提供可配置的订单路由能力，支持：
//! - 点分字段路径提取（order/customer/item/metadata/context 五个命名空间）
//! - 条件分组短路求值（组内 AND，组间 OR）
//! - 优先级裁决与平级冲突告警
//! - 动作序列执行（route/notify/priority/split/tag/log/webhook）
//! - 团队负载均衡（轮询/最小负载/技能/权重/随机）
//! - 手动覆盖门控与评估审计日志

pub mod balancer;
pub mod conflict;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod extractor;
pub mod models;
pub mod operators;
pub mod order;
pub mod store;

pub use engine::{DefaultRouter, RoutingEngine, StaticDefaultRouter};
pub use error::{Result, RoutingError};
pub use models::{
    EvaluationOutcome, RouteOverride, RoutingDecision, RoutingRule, RuleAction, RuleCondition,
    RuleStatus, TargetType,
};
pub use operators::Operator;
pub use order::{MenuCatalog, OrderContext, OrderSnapshot};
