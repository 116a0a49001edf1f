//! 生命周期管理

use crate::errors::{LifecycleError, LifecycleResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    /// 已创建
    Created,
    /// 启动中
    Starting,
    /// 运行中
    Running,
    /// 停止中
    Stopping,
    /// 已停止
    Stopped,
    /// 失败
    Failed,
}

impl LifecycleState {
    /// 是否可以启动
    pub fn can_start(self) -> bool {
        matches!(self, Self::Created | Self::Stopped | Self::Failed)
    }

    /// 是否可以停止
    pub fn can_stop(self) -> bool {
        matches!(self, Self::Running)
    }

    /// 检查是否可以启动，否则返回状态错误
    pub fn ensure_can_start(self) -> LifecycleResult<()> {
        if self.can_start() {
            Ok(())
        } else {
            Err(LifecycleError::InvalidState {
                current: self.to_string(),
                expected: "Created/Stopped/Failed".to_string(),
            })
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// 可启停的后台服务
#[async_trait]
pub trait Lifecycle: Send + Sync {
    /// 启动
    async fn on_start(&mut self) -> LifecycleResult<()>;

    /// 停止
    async fn on_stop(&mut self) -> LifecycleResult<()>;

    /// 当前状态
    fn lifecycle_state(&self) -> LifecycleState;
}
