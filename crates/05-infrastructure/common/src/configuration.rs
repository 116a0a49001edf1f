//! 运行时配置
//!
//! 配置来源按优先级从低到高依次为：内置默认值、配置文件、环境变量

use crate::errors::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// 默认配置文件名（不含扩展名）
pub const DEFAULT_CONFIG_NAME: &str = "config/registry";

/// 默认环境变量前缀
pub const DEFAULT_ENV_PREFIX: &str = "REGISTRY";

/// 运行时配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    /// 注册表配置
    pub registry: RegistrySettings,
    /// 目录同步器配置
    pub synchronizer: SynchronizerSettings,
    /// 日志配置
    pub logging: LoggingSettings,
}

/// 注册表配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    /// 未指定优先级时使用的默认优先级
    pub default_priority: i32,
    /// 查找时最高优先级出现并列是否输出警告
    pub warn_on_priority_tie: bool,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            default_priority: 1,
            warn_on_priority_tie: true,
        }
    }
}

/// 目录同步器配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynchronizerSettings {
    /// 是否启用同步器
    pub enabled: bool,
    /// 启动时是否扫描已发布的条目
    pub initial_scan: bool,
    /// 是否对其他消费者隐藏未代理的原始发布
    pub hide_raw_entries: bool,
}

impl Default for SynchronizerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_scan: true,
            hide_raw_entries: true,
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// 日志级别
    pub level: String,
    /// 是否使用 JSON 格式
    pub json: bool,
    /// 是否显示目标
    pub show_target: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            show_target: true,
        }
    }
}

impl LoggingSettings {
    /// 解析日志级别
    pub fn max_level(&self) -> ConfigResult<tracing::Level> {
        self.level.trim().parse().map_err(|_| {
            ConfigError::validation(format!("未知的日志级别: {}", self.level))
        })
    }
}

impl RuntimeSettings {
    /// 使用默认来源加载配置
    pub fn load() -> ConfigResult<Self> {
        SettingsLoader::new().load()
    }

    /// 创建配置加载器
    pub fn loader() -> SettingsLoader {
        SettingsLoader::new()
    }

    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        self.logging.max_level()?;
        Ok(())
    }
}

/// 配置加载器
#[derive(Debug, Clone)]
pub struct SettingsLoader {
    file: Option<PathBuf>,
    env_prefix: Option<String>,
}

impl SettingsLoader {
    /// 创建新的加载器，默认读取可选的 `config/registry` 文件与 `REGISTRY` 前缀的环境变量
    pub fn new() -> Self {
        Self {
            file: None,
            env_prefix: Some(DEFAULT_ENV_PREFIX.to_string()),
        }
    }

    /// 指定配置文件，文件必须存在
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self
    }

    /// 指定环境变量前缀
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// 不读取环境变量
    pub fn without_env(mut self) -> Self {
        self.env_prefix = None;
        self
    }

    /// 加载并验证配置
    pub fn load(&self) -> ConfigResult<RuntimeSettings> {
        let mut builder = config::Config::builder();

        builder = match &self.file {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::FileNotFound {
                        path: path.display().to_string(),
                    });
                }
                debug!("加载配置文件: {}", path.display());
                builder.add_source(config::File::from(path.as_path()))
            }
            None => builder.add_source(config::File::with_name(DEFAULT_CONFIG_NAME).required(false)),
        };

        if let Some(prefix) = &self.env_prefix {
            builder = builder.add_source(
                config::Environment::with_prefix(prefix)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let settings: RuntimeSettings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }
}

impl Default for SettingsLoader {
    fn default() -> Self {
        Self::new()
    }
}
