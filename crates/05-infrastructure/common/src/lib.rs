//! # Infrastructure Common
//!
//! 组件注册表各层共用的基础类型。
//!
//! ## 核心内容
//!
//! - [`ComponentError`] 等错误分类
//! - [`ComponentProperties`] - 组件属性与保留属性键
//! - [`TypeInfo`] - 类型标识
//! - [`RuntimeSettings`] - 运行时配置加载
//! - [`Lifecycle`] - 后台服务生命周期
//! - [`HealthCheckable`] - 健康检查

pub mod configuration;
pub mod errors;
pub mod health;
pub mod lifecycle;
pub mod metadata;
pub mod properties;

pub use configuration::*;
pub use errors::*;
pub use health::*;
pub use lifecycle::*;
pub use metadata::*;
pub use properties::*;
