//! Module Kernel 命令行入口
//!
//! # 命令概览
//!
//! - `start` - 启动内核
//! - `version` - 显示版本信息
//! - `check-config` - 验证配置文件
//!
//! # 使用示例
//!
//! ```bash
//! # 启动内核
//! module-kernel start
//!
//! # 使用自定义配置文件启动
//! module-kernel -c my-config.yaml start
//!
//! # 检查配置文件
//! module-kernel check-config -c config.yaml
//! ```

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{info, warn};

use module_kernel::{KernelConfig, Logger, LoggerConfig, ModuleKernel};

/// Module Kernel - 模块化运行时内核
///
/// 提供模块注册表、依赖排序、事件处理器执行守卫和事件总线。
#[derive(Parser)]
#[command(name = "module-kernel")]
#[command(version, about = "模块化运行时内核", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, default_value = "config.yaml", global = true)]
    config: PathBuf,

    /// 日志级别 (trace, debug, info, warn, error)，覆盖配置文件
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// 开发模式（显示线程 ID 和源码位置）
    #[arg(long, global = true)]
    dev: bool,

    /// 子命令
    #[command(subcommand)]
    command: Option<Commands>,
}

/// 可用的子命令
#[derive(Subcommand)]
enum Commands {
    /// 启动内核
    ///
    /// 按 Ctrl+C 可优雅关闭内核。
    Start,

    /// 查看版本信息
    Version,

    /// 验证配置文件
    ///
    /// 检查配置文件是否有效，并显示解析后的配置内容。
    CheckConfig {
        /// 配置文件路径（不指定则使用全局 -c 选项）
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

/// 启动内核
async fn run_start(config: KernelConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut kernel = ModuleKernel::new(config).await?;
    kernel.start().await?;

    println!();
    println!("模块内核已启动 (v{})，按 Ctrl+C 优雅关闭", module_kernel::VERSION);
    println!();

    signal::ctrl_c().await?;

    info!("收到关闭信号，正在优雅关闭...");
    if let Some(report) = kernel.shutdown().await? {
        if !report.failed.is_empty() {
            warn!(failed = ?report.failed, "部分模块停用失败");
        }
    }
    Ok(())
}

/// 检查配置文件
async fn check_config(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("检查配置文件: {}", path.display());
    println!();

    if !path.exists() {
        println!("⚠️  警告: 配置文件不存在，将使用默认配置");
        println!();
        print_config(&KernelConfig::default());
        return Ok(());
    }

    match KernelConfig::from_file(path).await {
        Ok(config) => {
            println!("✅ 配置文件有效！");
            println!();
            print_config(&config);
            Ok(())
        }
        Err(e) => {
            println!("❌ 配置文件无效: {}", e);
            Err(Box::new(e))
        }
    }
}

fn print_config(config: &KernelConfig) {
    let on_off = |b: bool| if b { "启用" } else { "禁用" };
    println!("────────────────────────────────────────");
    println!("  [注册表配置]");
    println!("    健康检查间隔:   {} ms", config.registry.health_check_interval_ms);
    println!("    健康检查超时:   {} ms", config.registry.health_check_timeout_ms);
    println!("    优雅关闭超时:   {} ms", config.registry.graceful_shutdown_timeout_ms);
    match config.registry.activation_timeout_ms {
        Some(ms) => println!("    激活超时:       {} ms", ms),
        None => println!("    激活超时:       不限"),
    }
    println!();
    println!("  [执行守卫配置]");
    println!("    默认超时:       {} ms", config.guard.default_timeout_ms);
    println!("    最大超时:       {} ms", config.guard.max_timeout_ms);
    println!("    生命周期超时:   {} ms", config.guard.lifecycle_timeout_ms);
    println!("    熔断器:         {}", on_off(config.guard.circuit_breaker_enabled));
    println!("    连续失败阈值:   {}", config.guard.failure_threshold);
    println!("    熔断恢复时间:   {} ms", config.guard.circuit_reset_timeout_ms);
    println!();
    println!("  [日志配置]");
    println!("    日志级别:       {}", config.logging.level);
    println!("    文件输出:       {}", on_off(config.logging.file_output));
    println!("    JSON 格式:      {}", on_off(config.logging.json_format));
    println!("────────────────────────────────────────");
}

/// 打印版本信息
fn print_version() {
    println!();
    println!("Module Kernel - 模块化运行时内核");
    println!("═══════════════════════════════════════");
    println!("  版本:             {}", module_kernel::VERSION);
    println!("  目标平台:         {}", std::env::consts::ARCH);
    println!("  操作系统:         {}", std::env::consts::OS);
    println!("═══════════════════════════════════════");
    println!();
}

/// 加载配置文件，不存在时使用默认配置
async fn load_config(config_path: &Path) -> Result<KernelConfig, Box<dyn std::error::Error>> {
    if config_path.exists() {
        Ok(KernelConfig::from_file(config_path).await?)
    } else {
        Ok(KernelConfig::default())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Start) | None => {
            let mut config = load_config(&cli.config).await?;
            if let Some(level) = cli.log_level {
                config.logging.level = level;
            }

            let mut logger_config = LoggerConfig::from_log_config(&config.logging);
            if cli.dev {
                logger_config.show_thread_ids = true;
                logger_config.show_file_line = true;
            }
            let _log_guard = Logger::init(logger_config)?;

            match config.config_path {
                Some(ref path) => info!("已加载配置文件: {}", path.display()),
                None => info!("配置文件不存在 ({})，使用默认配置", cli.config.display()),
            }
            run_start(config).await?;
        }

        Some(Commands::Version) => {
            print_version();
        }

        Some(Commands::CheckConfig { config }) => {
            let config_path = config.unwrap_or(cli.config);
            check_config(&config_path).await?;
        }
    }

    Ok(())
}
