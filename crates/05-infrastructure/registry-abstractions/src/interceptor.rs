//! 调用拦截器
//!
//! 拦截器本身也是注册到注册表中的组件，通过契约 `dyn InvocationInterceptor` 被发现。
//! 新增横切行为（如审计）只需注册一个新的拦截器组件。

use crate::component::Component;
use crate::contract::Contract;
use infrastructure_common::TypeInfo;
use std::fmt;
use thiserror::Error;

/// 方法签名
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodSignature {
    contract: &'static str,
    method: &'static str,
}

impl MethodSignature {
    /// 创建方法签名
    pub const fn new(contract: &'static str, method: &'static str) -> Self {
        Self { contract, method }
    }

    /// 以契约类型创建方法签名
    pub fn of<C: ?Sized + 'static>(method: &'static str) -> Self {
        Self::new(TypeInfo::of::<C>().short_name(), method)
    }

    /// 契约名
    pub fn contract(&self) -> &'static str {
        self.contract
    }

    /// 方法名
    pub fn method(&self) -> &'static str {
        self.method
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.contract, self.method)
    }
}

/// 一次方法调用
pub struct Invocation<'a> {
    target: &'a dyn Component,
    method: &'a MethodSignature,
    args: &'a [&'a dyn fmt::Debug],
}

impl<'a> Invocation<'a> {
    /// 创建调用描述
    pub fn new(
        target: &'a dyn Component,
        method: &'a MethodSignature,
        args: &'a [&'a dyn fmt::Debug],
    ) -> Self {
        Self {
            target,
            method,
            args,
        }
    }

    /// 目标组件
    pub fn target(&self) -> &'a dyn Component {
        self.target
    }

    /// 方法签名
    pub fn method(&self) -> &'a MethodSignature {
        self.method
    }

    /// 调用参数
    pub fn args(&self) -> &'a [&'a dyn fmt::Debug] {
        self.args
    }
}

impl fmt::Debug for Invocation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("target", &self.target.name())
            .field("method", &self.method.to_string())
            .field("args", &self.args)
            .finish()
    }
}

/// 拦截器返回的错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HookError {
    /// 主动否决调用，目标方法与后续拦截器都不会执行
    #[error("否决调用: {reason}")]
    Veto { reason: String },

    /// 拦截器自身出错，记录日志后视为未执行
    #[error("拦截器出错: {message}")]
    Failed { message: String },
}

impl HookError {
    /// 创建否决
    pub fn veto(reason: impl Into<String>) -> Self {
        Self::Veto {
            reason: reason.into(),
        }
    }

    /// 创建失败
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

/// 调用拦截器
pub trait InvocationInterceptor: Send + Sync {
    /// 拦截器名称
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// 目标方法执行前调用，返回 [`HookError::Veto`] 可阻止调用
    fn before_invoke(&self, invocation: &Invocation<'_>) -> Result<(), HookError> {
        let _ = invocation;
        Ok(())
    }

    /// 目标方法成功返回后调用
    fn after_invoke(
        &self,
        invocation: &Invocation<'_>,
        result: &dyn fmt::Debug,
    ) -> Result<(), HookError> {
        let _ = (invocation, result);
        Ok(())
    }
}

impl Contract for dyn InvocationInterceptor {}
