//! 运行时构建器

use crate::runtime::RegistryRuntime;
use infrastructure_common::{
    ConfigResult, InfrastructureError, LoggingSettings, RuntimeSettings, SettingsLoader,
};
use registry_abstractions::{BackingProvider, ComponentRegistry, RegistrationRequest};
use registry_impl::{
    CatalogSynchronizer, ComponentRegistryImpl, InMemoryServiceCatalog, LoggingInterceptor,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// 运行时构建器
///
/// 使用建造者模式组装后端提供者、注册表与目录同步器
pub struct RegistryRuntimeBuilder {
    /// 显式指定的配置，指定后不再加载配置文件与环境变量
    settings: Option<RuntimeSettings>,
    /// 配置文件路径
    config_file: Option<PathBuf>,
    /// 环境变量前缀
    env_prefix: Option<String>,
    /// 自定义后端提供者
    provider: Option<Arc<dyn BackingProvider>>,
    /// 是否启用日志初始化
    logging_enabled: bool,
    /// 日志配置，未指定时由配置中的日志段生成
    logging_config: Option<LoggingConfig>,
    /// 覆盖配置中的同步器开关
    synchronizer_enabled: Option<bool>,
    /// 是否注册调用日志拦截器
    call_logging: bool,
}

impl RegistryRuntimeBuilder {
    /// 创建新的运行时构建器
    pub fn new() -> Self {
        Self {
            settings: None,
            config_file: None,
            env_prefix: None,
            provider: None,
            logging_enabled: false, // 默认不启用日志初始化
            logging_config: None,
            synchronizer_enabled: None,
            call_logging: false,
        }
    }

    /// 使用指定配置
    pub fn with_settings(mut self, settings: RuntimeSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// 从配置文件加载配置
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        info!("添加配置文件: {}", path.display());
        self.config_file = Some(path);
        self
    }

    /// 设置环境变量前缀
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        info!("添加环境变量配置源，前缀: {}", prefix);
        self.env_prefix = Some(prefix);
        self
    }

    /// 使用自定义后端提供者
    pub fn with_provider(mut self, provider: Arc<dyn BackingProvider>) -> Self {
        info!("使用自定义后端提供者: {}", provider.name());
        self.provider = Some(provider);
        self
    }

    /// 配置日志
    pub fn with_logging(mut self, config: LoggingConfig) -> Self {
        self.logging_config = Some(config);
        self.logging_enabled = true; // 启用日志初始化
        self
    }

    /// 按配置中的日志段初始化日志
    pub fn enable_logging(mut self) -> Self {
        self.logging_enabled = true;
        self
    }

    /// 启用或禁用目录同步器
    pub fn enable_synchronizer(mut self, enabled: bool) -> Self {
        self.synchronizer_enabled = Some(enabled);
        self
    }

    /// 注册调用日志拦截器
    pub fn enable_call_logging(mut self, enabled: bool) -> Self {
        self.call_logging = enabled;
        self
    }

    /// 构建运行时
    pub async fn build(self) -> Result<RegistryRuntime, InfrastructureError> {
        info!("开始构建注册表运行时");

        let settings = self.load_settings()?;

        // 只有在明确配置了日志时才初始化日志
        // 避免在测试环境中重复初始化
        if self.logging_enabled {
            let config = match &self.logging_config {
                Some(config) => config.clone(),
                None => LoggingConfig::from_settings(&settings.logging)?,
            };
            initialize_logging(&config)?;
        }

        let (provider, catalog) = match self.provider {
            Some(provider) => (provider, None),
            None => {
                let catalog = Arc::new(InMemoryServiceCatalog::new());
                debug!("使用内存目录作为后端提供者");
                (Arc::clone(&catalog) as Arc<dyn BackingProvider>, Some(catalog))
            }
        };

        let registry = ComponentRegistryImpl::with_settings(Arc::clone(&provider), settings.registry.clone());

        if self.call_logging {
            registry.register(RegistrationRequest::new(Arc::new(LoggingInterceptor::new())))?;
            debug!("已注册调用日志拦截器");
        }

        let synchronizer_enabled = self
            .synchronizer_enabled
            .unwrap_or(settings.synchronizer.enabled);
        let synchronizer = synchronizer_enabled.then(|| {
            CatalogSynchronizer::with_settings(registry.clone(), settings.synchronizer.clone())
        });

        let runtime = RegistryRuntime::new(settings, registry, provider, catalog, synchronizer);
        info!("注册表运行时构建完成");
        Ok(runtime)
    }

    fn load_settings(&self) -> Result<RuntimeSettings, InfrastructureError> {
        if let Some(settings) = &self.settings {
            settings.validate()?;
            return Ok(settings.clone());
        }

        let mut loader = SettingsLoader::new();
        if let Some(path) = &self.config_file {
            loader = loader.with_file(path);
        }
        if let Some(prefix) = &self.env_prefix {
            loader = loader.with_env_prefix(prefix.clone());
        }
        Ok(loader.load()?)
    }
}

impl Default for RegistryRuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// 初始化日志系统
fn initialize_logging(config: &LoggingConfig) -> Result<(), InfrastructureError> {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(config.level)
        .with_target(config.show_target)
        .with_thread_ids(config.show_thread_ids)
        .with_file(config.show_file)
        .with_line_number(config.show_line_number);

    if config.json_format {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    }
    .map_err(|e| InfrastructureError::BootstrapFailed {
        message: format!("日志初始化失败: {}", e),
    })?;

    info!("日志系统初始化完成");
    Ok(())
}

/// 日志配置
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: tracing::Level,
    /// 是否显示目标
    pub show_target: bool,
    /// 是否显示线程ID
    pub show_thread_ids: bool,
    /// 是否显示文件名
    pub show_file: bool,
    /// 是否显示行号
    pub show_line_number: bool,
    /// 是否使用 JSON 格式
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: tracing::Level::INFO,
            show_target: true,
            show_thread_ids: false,
            show_file: false,
            show_line_number: false,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// 创建开发环境日志配置
    pub fn development() -> Self {
        Self {
            level: tracing::Level::DEBUG,
            show_target: true,
            show_thread_ids: true,
            show_file: true,
            show_line_number: true,
            json_format: false,
        }
    }

    /// 创建生产环境日志配置
    pub fn production() -> Self {
        Self {
            level: tracing::Level::INFO,
            show_target: false,
            show_thread_ids: false,
            show_file: false,
            show_line_number: false,
            json_format: true,
        }
    }

    /// 由配置中的日志段生成
    pub fn from_settings(settings: &LoggingSettings) -> ConfigResult<Self> {
        Ok(Self {
            level: settings.max_level()?,
            show_target: settings.show_target,
            json_format: settings.json,
            ..Self::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_config_from_settings() {
        let settings = LoggingSettings {
            level: "debug".to_string(),
            json: true,
            show_target: false,
        };
        let config = LoggingConfig::from_settings(&settings).unwrap();
        assert_eq!(config.level, tracing::Level::DEBUG);
        assert!(config.json_format);
        assert!(!config.show_target);

        let invalid = LoggingSettings {
            level: "loud".to_string(),
            ..LoggingSettings::default()
        };
        assert!(LoggingConfig::from_settings(&invalid).is_err());
    }

    #[test]
    fn test_logging_presets() {
        let development = LoggingConfig::development();
        assert_eq!(development.level, tracing::Level::DEBUG);
        assert!(development.show_file && development.show_line_number);
        assert!(!development.json_format);

        let production = LoggingConfig::production();
        assert_eq!(production.level, tracing::Level::INFO);
        assert!(production.json_format);
        assert!(!production.show_target);
    }

    // 全局订阅者只能安装一次，本模块只有这一个测试初始化日志
    #[tokio::test]
    async fn test_build_with_development_logging() {
        let runtime = RegistryRuntimeBuilder::new()
            .with_settings(RuntimeSettings::default())
            .with_logging(LoggingConfig::development())
            .enable_synchronizer(false)
            .build()
            .await
            .unwrap();

        assert!(tracing::enabled!(tracing::Level::DEBUG));
        assert!(!runtime.has_synchronizer());
    }

    #[tokio::test]
    async fn test_build_with_custom_provider() {
        let catalog = Arc::new(InMemoryServiceCatalog::with_name("custom"));
        let runtime = RegistryRuntimeBuilder::new()
            .with_settings(RuntimeSettings::default())
            .with_provider(Arc::clone(&catalog) as Arc<dyn BackingProvider>)
            .enable_synchronizer(false)
            .build()
            .await
            .unwrap();

        assert_eq!(runtime.provider().name(), "custom");
        assert!(runtime.catalog().is_none());
        assert!(!runtime.has_synchronizer());
    }

    #[tokio::test]
    async fn test_build_rejects_invalid_settings() {
        let mut settings = RuntimeSettings::default();
        settings.logging.level = "loud".to_string();
        let result = RegistryRuntimeBuilder::new()
            .with_settings(settings)
            .build()
            .await;
        assert!(matches!(result, Err(InfrastructureError::ConfigError { .. })));
    }

    #[tokio::test]
    async fn test_build_with_call_logging() {
        let runtime = RegistryRuntimeBuilder::new()
            .with_settings(RuntimeSettings::default())
            .enable_call_logging(true)
            .build()
            .await
            .unwrap();
        assert_eq!(runtime.registry().len(), 1);
    }
}
