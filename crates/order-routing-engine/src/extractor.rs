//! 字段提取器
//!
//! 将点号路径（如 `order.total`、`context.time_of_day`）在订单上下文中解析为
//! 具体值。纯函数，无副作用。
//!
//! 契约：未知的顶层命名空间是硬错误；已知命名空间下的未知子字段返回 Null，
//! 使对应条件自然评估为 false。

use crate::error::{Result, RoutingError};
use crate::order::OrderContext;
use crate::order::MenuCatalog;
use chrono::{Datelike, Timelike, Weekday};
use serde_json::{Value, json};
use std::sync::Arc;

/// 字段命名空间 — 封闭集合，按命名空间分派提取逻辑
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldNamespace {
    Order,
    Customer,
    Item,
    Metadata,
    Context,
}

impl FieldNamespace {
    pub fn parse(segment: &str) -> Result<Self> {
        match segment {
            "order" => Ok(Self::Order),
            "customer" => Ok(Self::Customer),
            "item" => Ok(Self::Item),
            "metadata" => Ok(Self::Metadata),
            "context" => Ok(Self::Context),
            other => Err(RoutingError::UnknownNamespace(other.to_string())),
        }
    }
}

/// 校验字段路径的结构合法性，供规则创建时同步拒绝坏路径
pub fn validate_path(path: &str) -> Result<()> {
    let mut segments = path.split('.');
    let namespace = segments.next().unwrap_or("");
    FieldNamespace::parse(namespace)?;

    let rest: Vec<&str> = segments.collect();
    if rest.is_empty() || rest.iter().any(|s| s.is_empty()) {
        return Err(RoutingError::Validation(format!(
            "字段路径 '{}' 缺少子字段",
            path
        )));
    }
    Ok(())
}

/// 字段提取器
#[derive(Clone)]
pub struct FieldExtractor {
    menu: Arc<dyn MenuCatalog>,
}

impl FieldExtractor {
    pub fn new(menu: Arc<dyn MenuCatalog>) -> Self {
        Self { menu }
    }

    /// 提取字段值
    pub fn extract(&self, path: &str, ctx: &OrderContext) -> Result<Value> {
        let mut segments = path.split('.');
        let namespace = FieldNamespace::parse(segments.next().unwrap_or(""))?;
        let rest: Vec<&str> = segments.collect();
        let field = rest.first().copied().unwrap_or("");

        let value = match namespace {
            FieldNamespace::Order => self.extract_order(field, ctx),
            FieldNamespace::Customer => self.extract_customer(field, ctx),
            FieldNamespace::Item => self.extract_item(field, ctx),
            FieldNamespace::Metadata => extract_json_path(&ctx.metadata, &rest),
            FieldNamespace::Context => self.extract_context(field, ctx),
        };

        Ok(value)
    }

    fn extract_order(&self, field: &str, ctx: &OrderContext) -> Value {
        let order = &ctx.order;
        match field {
            "id" => json!(order.id),
            "status" => json!(order.status),
            "total" => json!(order.total),
            // 订单类型由订单形态推导，而非存储列
            "type" => json!(order.order_type()),
            "item_count" => json!(order.item_count()),
            "table_number" => order
                .table_number
                .map(|n| json!(n))
                .unwrap_or(Value::Null),
            "customer_id" => order
                .customer_id
                .as_ref()
                .map(|id| json!(id))
                .unwrap_or(Value::Null),
            "is_scheduled" => json!(order.scheduled_at.is_some()),
            _ => Value::Null,
        }
    }

    fn extract_customer(&self, field: &str, ctx: &OrderContext) -> Value {
        let Some(customer) = &ctx.customer else {
            return Value::Null;
        };
        match field {
            "id" => json!(customer.id),
            "name" => json!(customer.name),
            "vip_status" => json!(customer.vip_status),
            "visit_count" => json!(customer.visit_count),
            "tags" => json!(customer.tags),
            _ => Value::Null,
        }
    }

    fn extract_item(&self, field: &str, ctx: &OrderContext) -> Value {
        let items = &ctx.order.items;
        match field {
            // 全部行项目的去重分类集合
            "categories" => {
                let mut categories: Vec<String> = Vec::new();
                for item in items {
                    if let Some(meta) = self.menu.item_meta(&item.menu_item_id) {
                        if !categories.contains(&meta.category) {
                            categories.push(meta.category);
                        }
                    }
                }
                json!(categories)
            }
            "names" => json!(items.iter().map(|i| i.name.clone()).collect::<Vec<_>>()),
            "quantity" => json!(ctx.order.item_count()),
            "has_alcohol" => {
                let has = items.iter().any(|i| {
                    self.menu
                        .item_meta(&i.menu_item_id)
                        .is_some_and(|m| m.contains_alcohol)
                });
                json!(has)
            }
            _ => Value::Null,
        }
    }

    fn extract_context(&self, field: &str, ctx: &OrderContext) -> Value {
        match field {
            "hour" => json!(ctx.now.hour()),
            "time_of_day" => json!(time_of_day_bucket(ctx.now.hour())),
            "day_of_week" => json!(crate::models::weekday_name(ctx.now.weekday())),
            "is_weekend" => json!(matches!(
                ctx.now.weekday(),
                Weekday::Sat | Weekday::Sun
            )),
            _ => Value::Null,
        }
    }
}

/// 按墙钟小时划分时段桶
fn time_of_day_bucket(hour: u32) -> &'static str {
    match hour {
        5..=10 => "morning",
        11..=16 => "afternoon",
        17..=21 => "evening",
        _ => "night",
    }
}

/// 在自由 JSON 上按剩余路径段逐层下钻，支持数组索引
fn extract_json_path(root: &Value, segments: &[&str]) -> Value {
    let mut current = root;
    for segment in segments {
        match current {
            Value::Object(map) => match map.get(*segment) {
                Some(v) => current = v,
                None => return Value::Null,
            },
            Value::Array(arr) => match segment.parse::<usize>().ok().and_then(|i| arr.get(i)) {
                Some(v) => current = v,
                None => return Value::Null,
            },
            _ => return Value::Null,
        }
    }
    current.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{
        CustomerSnapshot, InMemoryMenuCatalog, MenuItemMeta, MockMenuCatalog, OrderItem,
        OrderSnapshot,
    };
    use chrono::{TimeZone, Utc};

    fn catalog() -> Arc<InMemoryMenuCatalog> {
        let mut catalog = InMemoryMenuCatalog::new();
        catalog.insert(
            "m-1",
            MenuItemMeta {
                category: "dessert".to_string(),
                contains_alcohol: false,
            },
        );
        catalog.insert(
            "m-2",
            MenuItemMeta {
                category: "dessert".to_string(),
                contains_alcohol: false,
            },
        );
        catalog.insert(
            "m-3",
            MenuItemMeta {
                category: "cocktail".to_string(),
                contains_alcohol: true,
            },
        );
        Arc::new(catalog)
    }

    fn sample_context() -> OrderContext {
        let order = OrderSnapshot {
            id: "order-001".to_string(),
            status: "pending".to_string(),
            total: 150.0,
            table_number: Some(7),
            delivery_address: None,
            items: vec![
                OrderItem {
                    menu_item_id: "m-1".to_string(),
                    name: "tiramisu".to_string(),
                    quantity: 1,
                    price: 45.0,
                },
                OrderItem {
                    menu_item_id: "m-2".to_string(),
                    name: "cheesecake".to_string(),
                    quantity: 2,
                    price: 40.0,
                },
                OrderItem {
                    menu_item_id: "m-3".to_string(),
                    name: "negroni".to_string(),
                    quantity: 1,
                    price: 25.0,
                },
            ],
            customer_id: Some("cust-1".to_string()),
            created_at: Utc::now(),
            scheduled_at: None,
        };

        OrderContext::new(order)
            .with_customer(CustomerSnapshot {
                id: "cust-1".to_string(),
                name: "Wang".to_string(),
                vip_status: true,
                visit_count: 12,
                tags: vec!["regular".to_string()],
            })
            .with_metadata(serde_json::json!({
                "source": "app",
                "promo": {"code": "SUMMER", "tier": 2}
            }))
            // 2025-06-07 周六 12:30 UTC
            .at(Utc.with_ymd_and_hms(2025, 6, 7, 12, 30, 0).unwrap())
    }

    #[test]
    fn test_order_namespace() {
        let extractor = FieldExtractor::new(catalog());
        let ctx = sample_context();

        assert_eq!(
            extractor.extract("order.total", &ctx).unwrap(),
            serde_json::json!(150.0)
        );
        assert_eq!(
            extractor.extract("order.type", &ctx).unwrap(),
            serde_json::json!("dine_in")
        );
        assert_eq!(
            extractor.extract("order.item_count", &ctx).unwrap(),
            serde_json::json!(4)
        );
    }

    #[test]
    fn test_unknown_namespace_is_hard_error() {
        let extractor = FieldExtractor::new(catalog());
        let ctx = sample_context();

        let err = extractor.extract("invoice.total", &ctx).unwrap_err();
        assert!(matches!(err, RoutingError::UnknownNamespace(_)));
    }

    #[test]
    fn test_unknown_subfield_is_null() {
        let extractor = FieldExtractor::new(catalog());
        let ctx = sample_context();

        assert_eq!(
            extractor.extract("order.nonexistent", &ctx).unwrap(),
            Value::Null
        );
        assert_eq!(
            extractor.extract("customer.shoe_size", &ctx).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_item_categories_deduplicated() {
        let extractor = FieldExtractor::new(catalog());
        let ctx = sample_context();

        let categories = extractor.extract("item.categories", &ctx).unwrap();
        assert_eq!(categories, serde_json::json!(["dessert", "cocktail"]));
    }

    #[test]
    fn test_item_has_alcohol() {
        let extractor = FieldExtractor::new(catalog());
        let ctx = sample_context();

        assert_eq!(
            extractor.extract("item.has_alcohol", &ctx).unwrap(),
            serde_json::json!(true)
        );
    }

    #[test]
    fn test_customer_namespace_without_customer() {
        let extractor = FieldExtractor::new(catalog());
        let mut ctx = sample_context();
        ctx.customer = None;

        assert_eq!(
            extractor.extract("customer.vip_status", &ctx).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_metadata_deep_path() {
        let extractor = FieldExtractor::new(catalog());
        let ctx = sample_context();

        assert_eq!(
            extractor.extract("metadata.promo.code", &ctx).unwrap(),
            serde_json::json!("SUMMER")
        );
        assert_eq!(
            extractor.extract("metadata.promo.missing", &ctx).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_context_time_fields() {
        let extractor = FieldExtractor::new(catalog());
        let ctx = sample_context();

        assert_eq!(
            extractor.extract("context.time_of_day", &ctx).unwrap(),
            serde_json::json!("afternoon")
        );
        assert_eq!(
            extractor.extract("context.day_of_week", &ctx).unwrap(),
            serde_json::json!("saturday")
        );
        assert_eq!(
            extractor.extract("context.is_weekend", &ctx).unwrap(),
            serde_json::json!(true)
        );
    }

    #[test]
    fn test_time_of_day_buckets() {
        assert_eq!(time_of_day_bucket(6), "morning");
        assert_eq!(time_of_day_bucket(12), "afternoon");
        assert_eq!(time_of_day_bucket(19), "evening");
        assert_eq!(time_of_day_bucket(2), "night");
        assert_eq!(time_of_day_bucket(23), "night");
    }

    #[test]
    fn test_menu_catalog_mock_seam() {
        let mut mock = MockMenuCatalog::new();
        mock.expect_item_meta().returning(|_| {
            Some(MenuItemMeta {
                category: "pizza".to_string(),
                contains_alcohol: false,
            })
        });

        let extractor = FieldExtractor::new(Arc::new(mock));
        let ctx = sample_context();
        let categories = extractor.extract("item.categories", &ctx).unwrap();
        assert_eq!(categories, serde_json::json!(["pizza"]));
    }

    #[test]
    fn test_validate_path() {
        assert!(validate_path("order.total").is_ok());
        assert!(validate_path("metadata.promo.code").is_ok());
        assert!(validate_path("order").is_err());
        assert!(validate_path("order..total").is_err());
        assert!(validate_path("invoice.total").is_err());
    }
}
