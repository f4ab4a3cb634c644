//! 订单路由规则引擎 — 规则试算工具
//!
//! 从配置指定的规则文件加载规则，对给定的订单快照做测试模式评估，
//! 输出完整的决策与逐规则追踪 JSON。不产生计数与审计副作用，可在
//! 规则上线前验证其行为。
//!
//! 可选的第二个参数提供菜单元数据（菜品 id → 分类/酒精标记），供
//! `item.*` 类条件的试算使用。

use anyhow::{Context, Result};
use resto_shared::config::AppConfig;
use resto_shared::observability;
use routing_engine::order::{InMemoryMenuCatalog, MenuItemMeta};
use routing_engine::{OrderContext, OrderSnapshot, RoutingEngine, RoutingRule, StaticDefaultRouter};
use std::collections::HashMap;
use std::fs;
use std::sync::Arc;
use tracing::info;

fn main() -> Result<()> {
    let config = AppConfig::load("order-routing-engine").unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {}", e);
        AppConfig::default()
    });

    let _guard = observability::init(&config.observability)?;

    let mut args = std::env::args().skip(1);
    let order_path = args
        .next()
        .context("用法: routing-engine <订单快照 JSON 文件> [菜单元数据 JSON 文件]")?;
    let catalog = match args.next() {
        Some(menu_path) => load_menu_from_file(&menu_path)?,
        None => InMemoryMenuCatalog::new(),
    };

    let engine = RoutingEngine::new(
        Arc::new(catalog),
        Arc::new(StaticDefaultRouter::new(config.engine.default_station.clone())),
    );

    let loaded = load_rules_from_file(&config.engine.rules_file, &engine)?;
    info!("已加载 {} 条规则: {}", loaded, config.engine.rules_file);

    let order: OrderSnapshot = serde_json::from_str(
        &fs::read_to_string(&order_path)
            .with_context(|| format!("读取订单快照失败: {}", order_path))?,
    )
    .context("订单快照 JSON 解析失败")?;

    let outcome = engine.evaluate_test(&OrderContext::new(order), true);
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

/// 从 JSON 数组文件加载规则，单条校验失败跳过不中断
fn load_rules_from_file(path: &str, engine: &RoutingEngine) -> Result<usize> {
    let raw = fs::read_to_string(path).with_context(|| format!("读取规则文件失败: {}", path))?;
    let rules: Vec<RoutingRule> =
        serde_json::from_str(&raw).context("规则文件 JSON 解析失败")?;
    Ok(engine.rules().load_batch(rules).len())
}

/// 加载菜单元数据：JSON 对象，菜品 id 映射到分类与酒精标记
fn load_menu_from_file(path: &str) -> Result<InMemoryMenuCatalog> {
    let raw = fs::read_to_string(path).with_context(|| format!("读取菜单文件失败: {}", path))?;
    let entries: HashMap<String, MenuItemMeta> =
        serde_json::from_str(&raw).context("菜单文件 JSON 解析失败")?;

    let mut catalog = InMemoryMenuCatalog::new();
    for (menu_item_id, meta) in entries {
        catalog.insert(menu_item_id, meta);
    }
    Ok(catalog)
}
