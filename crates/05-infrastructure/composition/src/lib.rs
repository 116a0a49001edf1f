//! # 注册表组合层
//!
//! 这个 crate 负责将后端提供者、组件注册表与目录同步器组合成一个
//! 完整的、可运行的注册表运行时。
//!
//! ## 主要功能
//!
//! - **运行时构建器**: 使用构建者模式组装运行时
//! - **配置加载**: 默认值、配置文件与环境变量分层合并
//! - **日志初始化**: 开发与生产两套预设
//! - **生命周期管理**: 管理同步器的启动和注册表的关闭
//!
//! ## 基本使用
//!
//! ```rust,no_run
//! use registry_composition::RegistryRuntime;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // 创建并配置运行时
//!     let runtime = RegistryRuntime::builder()
//!         .enable_logging()
//!         .build()
//!         .await?;
//!
//!     // 启动运行时
//!     runtime.start().await?;
//!
//!     // 使用注册表
//!     println!("已注册组件: {}", runtime.registry().len());
//!
//!     // 停止运行时
//!     runtime.stop().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod runtime;

// 重新导出主要类型
pub use builder::{LoggingConfig, RegistryRuntimeBuilder};
pub use runtime::{RegistryRuntime, RuntimeMetrics, RuntimeStatus};

// 重新导出错误类型
pub use infrastructure_common::InfrastructureError;
