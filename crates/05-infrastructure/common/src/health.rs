//! 健康检查相关接口定义

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 健康状态
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", content = "data")]
pub enum HealthStatus {
    /// 健康状态
    Healthy,
    /// 降级状态
    Degraded {
        message: String,
        details: Option<BTreeMap<String, String>>,
    },
    /// 不健康状态
    Unhealthy {
        error: String,
        details: Option<BTreeMap<String, String>>,
    },
}

impl HealthStatus {
    /// 创建健康状态
    pub fn healthy() -> Self {
        Self::Healthy
    }

    /// 创建降级状态
    pub fn degraded(message: impl Into<String>) -> Self {
        Self::Degraded {
            message: message.into(),
            details: None,
        }
    }

    /// 创建不健康状态
    pub fn unhealthy(error: impl Into<String>) -> Self {
        Self::Unhealthy {
            error: error.into(),
            details: None,
        }
    }

    /// 附加详情
    pub fn with_details(self, details: BTreeMap<String, String>) -> Self {
        match self {
            Self::Healthy => Self::Healthy,
            Self::Degraded { message, .. } => Self::Degraded {
                message,
                details: Some(details),
            },
            Self::Unhealthy { error, .. } => Self::Unhealthy {
                error,
                details: Some(details),
            },
        }
    }

    /// 检查是否健康
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// 检查是否降级
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }

    /// 检查是否不健康
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy { .. })
    }
}

/// 健康检查 trait
#[async_trait]
pub trait HealthCheckable: Send + Sync {
    /// 执行健康检查
    async fn check_health(&self) -> HealthStatus;

    /// 获取组件名称
    fn name(&self) -> &str;
}
