//! 订单快照与评估上下文
//!
//! 订单、顾客、菜品元数据均由外部子系统提供，这里只定义引擎消费的快照形态。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// 订单行项目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub menu_item_id: String,
    pub name: String,
    pub quantity: u32,
    pub price: f64,
}

/// 订单快照
///
/// 由外部订单子系统在评估时提供，引擎不持有也不回写订单状态。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub id: String,
    pub status: String,
    pub total: f64,
    /// 堂食桌号，None 表示非堂食
    #[serde(default)]
    pub table_number: Option<u32>,
    /// 配送地址，None 表示非外送
    #[serde(default)]
    pub delivery_address: Option<String>,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl OrderSnapshot {
    /// 从订单形态推导订单类型：桌号 => dine_in，配送地址 => delivery，否则 takeout
    pub fn order_type(&self) -> &'static str {
        if self.table_number.is_some() {
            "dine_in"
        } else if self.delivery_address.is_some() {
            "delivery"
        } else {
            "takeout"
        }
    }

    /// 行项目总件数
    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|i| i.quantity).sum()
    }
}

/// 顾客快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerSnapshot {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub vip_status: bool,
    #[serde(default)]
    pub visit_count: u32,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// 菜品元数据（由外部菜单子系统按 id 提供）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MenuItemMeta {
    pub category: String,
    #[serde(default)]
    pub contains_alcohol: bool,
}

/// 菜单元数据查询接口
///
/// `item.*` 字段提取时按菜品 id 查询分类与酒精标记。
#[cfg_attr(test, mockall::automock)]
pub trait MenuCatalog: Send + Sync {
    fn item_meta(&self, menu_item_id: &str) -> Option<MenuItemMeta>;
}

/// 基于 HashMap 的菜单目录实现，用于测试与独立运行
#[derive(Debug, Clone, Default)]
pub struct InMemoryMenuCatalog {
    items: HashMap<String, MenuItemMeta>,
}

impl InMemoryMenuCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, menu_item_id: impl Into<String>, meta: MenuItemMeta) {
        self.items.insert(menu_item_id.into(), meta);
    }
}

impl MenuCatalog for InMemoryMenuCatalog {
    fn item_meta(&self, menu_item_id: &str) -> Option<MenuItemMeta> {
        self.items.get(menu_item_id).cloned()
    }
}

/// 评估上下文
///
/// 一次规则评估的全部输入：订单快照、顾客快照、自由元数据，以及固定的
/// 评估时刻（`context.*` 字段由该时刻推导，保证评估可复现）。
#[derive(Debug, Clone)]
pub struct OrderContext {
    pub order: OrderSnapshot,
    pub customer: Option<CustomerSnapshot>,
    pub metadata: Value,
    pub now: DateTime<Utc>,
}

impl OrderContext {
    pub fn new(order: OrderSnapshot) -> Self {
        Self {
            order,
            customer: None,
            metadata: Value::Null,
            now: Utc::now(),
        }
    }

    pub fn with_customer(mut self, customer: CustomerSnapshot) -> Self {
        self.customer = Some(customer);
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// 固定评估时刻，用于测试与回放
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base_order() -> OrderSnapshot {
        OrderSnapshot {
            id: "order-001".to_string(),
            status: "pending".to_string(),
            total: 150.0,
            table_number: None,
            delivery_address: None,
            items: vec![
                OrderItem {
                    menu_item_id: "m-1".to_string(),
                    name: "tiramisu".to_string(),
                    quantity: 2,
                    price: 45.0,
                },
                OrderItem {
                    menu_item_id: "m-2".to_string(),
                    name: "espresso".to_string(),
                    quantity: 1,
                    price: 60.0,
                },
            ],
            customer_id: None,
            created_at: Utc::now(),
            scheduled_at: None,
        }
    }

    #[test]
    fn test_order_type_derivation() {
        let mut order = base_order();
        assert_eq!(order.order_type(), "takeout");

        order.table_number = Some(12);
        assert_eq!(order.order_type(), "dine_in");

        // 桌号优先于配送地址
        order.delivery_address = Some("somewhere".to_string());
        assert_eq!(order.order_type(), "dine_in");

        order.table_number = None;
        assert_eq!(order.order_type(), "delivery");
    }

    #[test]
    fn test_item_count() {
        assert_eq!(base_order().item_count(), 3);
    }

    #[test]
    fn test_order_snapshot_deserialization_defaults() {
        let order: OrderSnapshot = serde_json::from_value(json!({
            "id": "order-002",
            "status": "pending",
            "total": 88.5
        }))
        .unwrap();
        assert!(order.items.is_empty());
        assert_eq!(order.order_type(), "takeout");
    }

    #[test]
    fn test_in_memory_menu_catalog() {
        let mut catalog = InMemoryMenuCatalog::new();
        catalog.insert(
            "m-1",
            MenuItemMeta {
                category: "dessert".to_string(),
                contains_alcohol: false,
            },
        );

        assert_eq!(catalog.item_meta("m-1").unwrap().category, "dessert");
        assert!(catalog.item_meta("m-404").is_none());
    }
}
