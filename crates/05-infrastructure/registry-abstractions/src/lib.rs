//! # Registry Abstractions
//!
//! 组件注册表抽象层，定义注册、查找、拦截与目录同步所需的核心接口。
//!
//! ## 核心接口
//!
//! - [`Filter`] - 基于组件属性的过滤表达式
//! - [`Component`] / [`Contract`] - 组件与契约
//! - [`ComponentRegistry`] - 组件注册表接口
//! - [`InvocationInterceptor`] / [`InterceptionChain`] - 调用拦截
//! - [`BackingProvider`] - 承载组件的后端目录

pub mod component;
pub mod contract;
pub mod events;
pub mod filter;
pub mod interceptor;
pub mod provider;
pub mod proxy;
pub mod registry;

pub use component::*;
pub use contract::*;
pub use events::*;
pub use filter::*;
pub use interceptor::*;
pub use provider::*;
pub use proxy::*;
pub use registry::*;
