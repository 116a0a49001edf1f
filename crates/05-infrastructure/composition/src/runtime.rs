//! 注册表运行时主入口

use crate::builder::RegistryRuntimeBuilder;
use async_trait::async_trait;
use infrastructure_common::{
    HealthCheckable, HealthStatus, InfrastructureError, Lifecycle, LifecycleError, RuntimeSettings,
};
use registry_abstractions::{BackingProvider, ComponentRegistry};
use registry_impl::{
    CatalogSynchronizer, ComponentRegistryImpl, InMemoryServiceCatalog, SynchronizerStats,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

/// 注册表运行时
///
/// 持有后端提供者、注册表与目录同步器，负责它们的启动与关闭
pub struct RegistryRuntime {
    /// 运行时配置
    settings: RuntimeSettings,
    /// 组件注册表
    registry: ComponentRegistryImpl,
    /// 后端提供者
    provider: Arc<dyn BackingProvider>,
    /// 默认的内存目录，使用自定义提供者时为空
    catalog: Option<Arc<InMemoryServiceCatalog>>,
    /// 目录同步器
    synchronizer: Option<Mutex<CatalogSynchronizer>>,
    /// 运行状态
    status: Arc<RwLock<RuntimeStatus>>,
    /// 统计信息
    metrics: Arc<RwLock<RuntimeMetrics>>,
}

impl RegistryRuntime {
    /// 创建运行时构建器
    pub fn builder() -> RegistryRuntimeBuilder {
        RegistryRuntimeBuilder::new()
    }

    /// 内部构造函数
    pub(crate) fn new(
        settings: RuntimeSettings,
        registry: ComponentRegistryImpl,
        provider: Arc<dyn BackingProvider>,
        catalog: Option<Arc<InMemoryServiceCatalog>>,
        synchronizer: Option<CatalogSynchronizer>,
    ) -> Self {
        Self {
            settings,
            registry,
            provider,
            catalog,
            synchronizer: synchronizer.map(Mutex::new),
            status: Arc::new(RwLock::new(RuntimeStatus::Initialized)),
            metrics: Arc::new(RwLock::new(RuntimeMetrics::default())),
        }
    }

    /// 启动运行时
    pub async fn start(&self) -> Result<(), InfrastructureError> {
        info!("启动注册表运行时");

        {
            let mut status = self.status.write().await;
            if !status.can_start() {
                return Err(LifecycleError::InvalidState {
                    current: format!("{:?}", *status),
                    expected: "Initialized/Stopped/Failed".to_string(),
                }
                .into());
            }
            *status = RuntimeStatus::Starting;
        }

        if !self.provider.is_available() {
            error!("后端提供者不可用: {}", self.provider.name());
            self.set_status(RuntimeStatus::Failed).await;
            return Err(InfrastructureError::BootstrapFailed {
                message: format!("后端提供者不可用: {}", self.provider.name()),
            });
        }

        if let Some(synchronizer) = &self.synchronizer {
            if let Err(e) = synchronizer.lock().await.on_start().await {
                error!("目录同步器启动失败: {}", e);
                self.set_status(RuntimeStatus::Failed).await;
                return Err(e.into());
            }
        }

        {
            let mut metrics = self.metrics.write().await;
            metrics.start_time = Some(chrono::Utc::now());
            metrics.stop_time = None;
        }
        self.set_status(RuntimeStatus::Running).await;

        info!("注册表运行时启动完成");
        Ok(())
    }

    /// 停止运行时，按注册的逆序注销全部组件
    pub async fn stop(&self) -> Result<(), InfrastructureError> {
        info!("停止注册表运行时");

        {
            let mut status = self.status.write().await;
            if *status != RuntimeStatus::Running {
                return Err(LifecycleError::InvalidState {
                    current: format!("{:?}", *status),
                    expected: "Running".to_string(),
                }
                .into());
            }
            *status = RuntimeStatus::Stopping;
        }

        if let Some(synchronizer) = &self.synchronizer {
            if let Err(e) = synchronizer.lock().await.on_stop().await {
                warn!("目录同步器停止失败: {}", e);
            }
        }

        let registrations = self.registry.registrations();
        let mut released = 0;
        for registration in registrations.iter().rev() {
            if self.registry.unregister(registration) {
                released += 1;
            }
        }
        info!("已注销 {} 个组件", released);

        {
            let mut status = self.status.write().await;
            *status = RuntimeStatus::Stopped;

            let mut metrics = self.metrics.write().await;
            metrics.stop_time = Some(chrono::Utc::now());
        }

        info!("注册表运行时停止完成");
        Ok(())
    }

    /// 获取运行状态
    pub async fn status(&self) -> RuntimeStatus {
        *self.status.read().await
    }

    /// 获取统计信息
    pub async fn metrics(&self) -> RuntimeMetrics {
        let mut metrics = self.metrics.read().await.clone();
        metrics.registered_components_count = self.registry.len();
        metrics.catalog_entries_count = self.catalog.as_ref().map(|catalog| catalog.len());
        if let Some(synchronizer) = &self.synchronizer {
            metrics.synchronizer = Some(synchronizer.lock().await.stats());
        }
        metrics
    }

    /// 组件注册表
    pub fn registry(&self) -> &ComponentRegistryImpl {
        &self.registry
    }

    /// 后端提供者
    pub fn provider(&self) -> &Arc<dyn BackingProvider> {
        &self.provider
    }

    /// 默认的内存目录
    pub fn catalog(&self) -> Option<&Arc<InMemoryServiceCatalog>> {
        self.catalog.as_ref()
    }

    /// 运行时配置
    pub fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }

    /// 是否启用了目录同步器
    pub fn has_synchronizer(&self) -> bool {
        self.synchronizer.is_some()
    }

    async fn set_status(&self, status: RuntimeStatus) {
        *self.status.write().await = status;
    }
}

#[async_trait]
impl HealthCheckable for RegistryRuntime {
    async fn check_health(&self) -> HealthStatus {
        let status = self.status().await;
        let mut details = BTreeMap::new();
        details.insert("status".to_string(), format!("{status:?}"));
        details.insert("provider".to_string(), self.provider.name().to_string());
        details.insert("registrations".to_string(), self.registry.len().to_string());

        if !self.provider.is_available() {
            return HealthStatus::unhealthy(format!("后端提供者不可用: {}", self.provider.name()))
                .with_details(details);
        }
        if status == RuntimeStatus::Failed {
            return HealthStatus::unhealthy("运行时启动失败").with_details(details);
        }

        if let Some(synchronizer) = &self.synchronizer {
            let synchronizer = synchronizer.lock().await;
            let stats = synchronizer.stats();
            details.insert("synchronizer.adopted".to_string(), stats.adopted.to_string());
            details.insert("synchronizer.failed".to_string(), stats.failed.to_string());
            if status == RuntimeStatus::Running && !synchronizer.is_running() {
                return HealthStatus::degraded("目录同步器未运行").with_details(details);
            }
        }

        if status != RuntimeStatus::Running {
            return HealthStatus::degraded(format!("运行时未运行: {status:?}")).with_details(details);
        }
        HealthStatus::healthy().with_details(details)
    }

    fn name(&self) -> &str {
        "registry-runtime"
    }
}

/// 运行时状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuntimeStatus {
    /// 已初始化
    Initialized,
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

impl RuntimeStatus {
    fn can_start(self) -> bool {
        matches!(self, Self::Initialized | Self::Stopped | Self::Failed)
    }
}

/// 运行时统计信息
#[derive(Debug, Clone, Default, Serialize)]
pub struct RuntimeMetrics {
    /// 启动时间
    pub start_time: Option<chrono::DateTime<chrono::Utc>>,
    /// 停止时间
    pub stop_time: Option<chrono::DateTime<chrono::Utc>>,
    /// 已注册的组件数量
    pub registered_components_count: usize,
    /// 内存目录条目数量
    pub catalog_entries_count: Option<usize>,
    /// 同步器统计
    pub synchronizer: Option<SynchronizerStats>,
}

impl RuntimeMetrics {
    /// 计算运行时间
    pub fn uptime(&self) -> Option<chrono::Duration> {
        match (self.start_time, self.stop_time) {
            (Some(start), Some(stop)) => Some(stop - start),
            (Some(start), None) => Some(chrono::Utc::now() - start),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    async fn default_runtime() -> RegistryRuntime {
        RegistryRuntime::builder()
            .with_settings(RuntimeSettings::default())
            .build()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let runtime = default_runtime().await;
        assert_eq!(runtime.status().await, RuntimeStatus::Initialized);
        assert!(runtime.metrics().await.uptime().is_none());

        runtime.start().await.unwrap();
        assert_eq!(runtime.status().await, RuntimeStatus::Running);
        assert!(runtime.check_health().await.is_healthy());
        assert!(runtime.start().await.is_err());

        runtime.stop().await.unwrap();
        assert_eq!(runtime.status().await, RuntimeStatus::Stopped);
        let metrics = runtime.metrics().await;
        assert!(metrics.uptime().is_some());
        assert!(metrics.stop_time.is_some());
        assert!(runtime.stop().await.is_err());
    }

    #[tokio::test]
    async fn test_start_fails_when_provider_is_closed() {
        let runtime = default_runtime().await;
        runtime.catalog().unwrap().shutdown();

        let error = runtime.start().await.unwrap_err();
        assert!(matches!(error, InfrastructureError::BootstrapFailed { .. }));
        assert_eq!(runtime.status().await, RuntimeStatus::Failed);
        assert!(runtime.check_health().await.is_unhealthy());
    }

    #[tokio::test]
    async fn test_settings_from_config_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[registry]\ndefault_priority = 7\n\n[synchronizer]\nenabled = false"
        )
        .unwrap();

        let runtime = RegistryRuntime::builder()
            .with_config_file(file.path())
            .with_env_prefix("REGRUNTIMETEST")
            .build()
            .await
            .unwrap();

        assert_eq!(runtime.settings().registry.default_priority, 7);
        assert!(!runtime.has_synchronizer());
        assert!(runtime.check_health().await.is_degraded());
    }

    #[tokio::test]
    async fn test_missing_config_file_fails_build() {
        let result = RegistryRuntime::builder()
            .with_config_file("/nonexistent/registry.toml")
            .build()
            .await;
        assert!(matches!(result, Err(InfrastructureError::ConfigError { .. })));
    }
}
