//! 错误类型定义

use thiserror::Error;

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    #[error("配置解析失败: {source}")]
    ParseError {
        #[from]
        source: config::ConfigError,
    },

    #[error("配置验证失败: {message}")]
    ValidationError { message: String },

    #[error("配置键不存在: {key}")]
    KeyNotFound { key: String },
}

impl ConfigError {
    /// 创建验证错误
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
        }
    }
}

/// 组件错误类型
///
/// 注册表、拦截链与同步器共用的错误分类
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ComponentError {
    #[error("未找到组件: {contract}, 过滤条件: {filter}")]
    NotFound { contract: String, filter: String },

    #[error("组件注册无效: {type_name}, 原因: {message}")]
    InvalidRegistration { type_name: String, message: String },

    #[error("拦截器执行失败: {hook}, 方法: {method}, 原因: {message}")]
    HookFailure {
        hook: String,
        method: String,
        message: String,
    },

    #[error("调用被拦截器否决: {hook}, 方法: {method}, 原因: {reason}")]
    Vetoed {
        hook: String,
        method: String,
        reason: String,
    },

    #[error("目标方法执行失败: {method}, 原因: {message}")]
    TargetFailure { method: String, message: String },

    #[error("后端提供者不可用: {provider}, 原因: {message}")]
    ProviderUnavailable { provider: String, message: String },

    #[error("过滤表达式无效: {expression}, 原因: {message}")]
    InvalidFilter { expression: String, message: String },
}

impl ComponentError {
    /// 创建未找到错误
    pub fn not_found(contract: impl Into<String>, filter: impl Into<String>) -> Self {
        Self::NotFound {
            contract: contract.into(),
            filter: filter.into(),
        }
    }

    /// 创建注册无效错误
    pub fn invalid_registration(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidRegistration {
            type_name: type_name.into(),
            message: message.into(),
        }
    }

    /// 创建目标方法失败错误
    pub fn target_failure(method: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TargetFailure {
            method: method.into(),
            message: message.into(),
        }
    }

    /// 创建提供者不可用错误
    pub fn provider_unavailable(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProviderUnavailable {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// 创建过滤表达式无效错误
    pub fn invalid_filter(expression: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidFilter {
            expression: expression.into(),
            message: message.into(),
        }
    }

    /// 是否为未找到错误
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// 是否为拦截器否决
    pub fn is_vetoed(&self) -> bool {
        matches!(self, Self::Vetoed { .. })
    }
}

/// 生命周期管理错误类型
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("生命周期状态无效: 当前 {current}, 期望 {expected}")]
    InvalidState { current: String, expected: String },

    #[error("启动失败: {message}")]
    StartFailed { message: String },

    #[error("停止失败: {message}")]
    StopFailed { message: String },
}

/// 基础设施错误类型
#[derive(Error, Debug)]
pub enum InfrastructureError {
    #[error("配置错误: {source}")]
    ConfigError {
        #[from]
        source: ConfigError,
    },

    #[error("组件错误: {source}")]
    ComponentError {
        #[from]
        source: ComponentError,
    },

    #[error("生命周期错误: {source}")]
    LifecycleError {
        #[from]
        source: LifecycleError,
    },

    #[error("基础设施启动失败: {message}")]
    BootstrapFailed { message: String },

    #[error("基础设施关闭失败: {message}")]
    ShutdownFailed { message: String },
}

/// 结果类型别名
pub type ConfigResult<T> = Result<T, ConfigError>;
pub type ComponentResult<T> = Result<T, ComponentError>;
pub type LifecycleResult<T> = Result<T, LifecycleError>;
pub type InfrastructureResult<T> = Result<T, InfrastructureError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message_carries_contract_and_filter() {
        let error = ComponentError::not_found("ServiceInterface", "(a=1)");
        assert!(error.is_not_found());
        assert_eq!(
            error.to_string(),
            "未找到组件: ServiceInterface, 过滤条件: (a=1)"
        );
    }

    #[test]
    fn test_component_error_converts_into_infrastructure_error() {
        let error: InfrastructureError =
            ComponentError::provider_unavailable("memory", "已关闭").into();
        assert!(matches!(
            error,
            InfrastructureError::ComponentError {
                source: ComponentError::ProviderUnavailable { .. }
            }
        ));
    }
}
