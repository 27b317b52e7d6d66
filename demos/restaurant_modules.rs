//! 餐厅模块示例
//!
//! 本示例展示了模块内核的基本使用方法，包括：
//!
//! - 按依赖顺序注册库存、销售、厨房模块
//! - 模块激活时通过上下文发布事件
//! - 事件经执行守卫分发，失败的订阅者被熔断
//! - 级联停用与优雅关闭
//!
//! # 运行示例
//!
//! ```bash
//! cargo run --example restaurant_modules
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use module_kernel::{
    EventSubscription, KernelConfig, Logger, LoggerConfig, ModuleContext, ModuleDescriptor,
    ModuleHealth, ModuleHooks, ModuleKernel, ModuleMetrics, RegistryEventKind,
};

/// 库存模块
struct Inventory {
    stock_checks: AtomicU64,
}

#[async_trait]
impl ModuleHooks for Inventory {
    async fn on_activate(&self, ctx: ModuleContext) -> anyhow::Result<()> {
        ctx.emit("inventory.ready", json!({ "items": 128 })).await?;
        Ok(())
    }

    async fn health_check(&self) -> anyhow::Result<ModuleHealth> {
        Ok(ModuleHealth::healthy().with_metrics(ModuleMetrics {
            events_processed: self.stock_checks.load(Ordering::Relaxed),
            ..Default::default()
        }))
    }
}

/// 销售模块
struct Sales;

#[async_trait]
impl ModuleHooks for Sales {
    async fn on_deactivate(&self) -> anyhow::Result<()> {
        println!("   [sales] 结算未完成的订单");
        Ok(())
    }

    async fn health_check(&self) -> anyhow::Result<ModuleHealth> {
        Ok(ModuleHealth::healthy())
    }
}

/// 小票打印模块，打印机离线
struct Printer;

#[async_trait]
impl ModuleHooks for Printer {
    async fn health_check(&self) -> anyhow::Result<ModuleHealth> {
        Ok(ModuleHealth::degraded("打印机离线"))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _log_guard = Logger::try_init(LoggerConfig::builder().level("warn").build());

    println!("=== 模块内核餐厅示例 ===\n");

    // -------------------------------------------------------------------------
    // 1. 创建内核
    // -------------------------------------------------------------------------
    let config = KernelConfig::builder()
        .handler_timeout_ms(200)
        .circuit_reset_timeout_ms(5_000)
        .build();
    let mut kernel = ModuleKernel::new(config).await?;

    kernel
        .registry()
        .on(RegistryEventKind::ModuleActivated, |event| {
            if let Some(id) = event.module_id() {
                println!("   [registry] 模块已激活: {}", id);
            }
        });

    // -------------------------------------------------------------------------
    // 2. 按依赖顺序注册模块
    // -------------------------------------------------------------------------
    println!("1. 注册模块...");
    let inventory = Arc::new(Inventory {
        stock_checks: AtomicU64::new(0),
    });
    let counter = inventory.clone();
    kernel
        .register_module(
            ModuleDescriptor::new("inventory", "库存", "1.0.0", inventory).subscribe(
                EventSubscription::new("order.*", move |event| {
                    let counter = counter.clone();
                    async move {
                        counter.stock_checks.fetch_add(1, Ordering::Relaxed);
                        println!("   [inventory] 扣减库存: {}", event.data);
                        Ok(())
                    }
                }),
            ),
        )
        .await?;

    kernel
        .register_module(
            ModuleDescriptor::new("sales", "销售", "1.0.0", Arc::new(Sales)).depends_on("inventory"),
        )
        .await?;

    kernel
        .register_module(
            ModuleDescriptor::new("printer", "小票打印", "0.3.0", Arc::new(Printer))
                .depends_on("sales")
                .subscribe(EventSubscription::new("order.*", |_event| async {
                    Err::<(), _>(anyhow::anyhow!("打印机无响应"))
                })),
        )
        .await?;

    println!(
        "   激活顺序: {:?}\n",
        kernel.registry().get_activation_order().await
    );

    kernel.start().await?;

    // -------------------------------------------------------------------------
    // 3. 发布订单事件
    // -------------------------------------------------------------------------
    println!("2. 发布订单事件...");
    for table in 1..=4 {
        let summary = kernel
            .publish("order.created", "sales", json!({ "table": table }))
            .await?;
        println!(
            "   订单 #{}: 成功 {}，失败 {}，熔断拒绝 {}",
            table, summary.successful, summary.failed, summary.rejected
        );
    }
    let status = kernel.guard().get_security_status();
    println!(
        "   守卫状态: {} 个处理器，{} 个熔断\n",
        status.total_handlers, status.open_breakers
    );

    // -------------------------------------------------------------------------
    // 4. 健康检查
    // -------------------------------------------------------------------------
    println!("3. 健康检查...");
    for (id, health) in kernel.registry().check_all_health().await {
        println!(
            "   {}: {:?} {}",
            id,
            health.status,
            health.message.unwrap_or_default()
        );
    }
    println!();

    // -------------------------------------------------------------------------
    // 5. 级联停用与关闭
    // -------------------------------------------------------------------------
    println!("4. 停用库存模块（依赖者先停用）...");
    kernel.registry().deactivate_module("inventory").await?;
    println!(
        "   仍在运行的模块: {:?}\n",
        kernel.registry().get_active_modules().await
    );

    println!("5. 重新激活库存模块（依赖者自动恢复）...");
    kernel.registry().activate_module("inventory").await?;
    println!(
        "   仍在运行的模块: {:?}\n",
        kernel.registry().get_active_modules().await
    );

    println!("6. 优雅关闭...");
    if let Some(report) = kernel.shutdown().await? {
        println!(
            "   停用顺序: {:?}，耗时 {} ms",
            report.deactivated, report.elapsed_ms
        );
    }

    println!("\n=== 示例结束 ===");
    Ok(())
}
