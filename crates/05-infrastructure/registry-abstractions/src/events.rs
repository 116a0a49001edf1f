//! 目录变更事件

use crate::provider::{BackingHandle, CatalogEntry};
use chrono::{DateTime, Utc};
use infrastructure_common::ComponentProperties;
use serde::{Deserialize, Serialize};

/// 目录事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CatalogEventKind {
    /// 新发布
    Registered,
    /// 属性或实例变更
    Modified,
    /// 即将注销
    Unregistering,
}

/// 目录变更事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEvent {
    /// 事件类型
    pub kind: CatalogEventKind,
    /// 契约类型名称
    pub contract_types: Vec<String>,
    /// 条目属性
    pub properties: ComponentProperties,
    /// 条目句柄
    pub backing_handle: BackingHandle,
    /// 条目是否为代理
    pub proxy: bool,
    /// 条目组件是否声明需要拦截
    pub interceptable: bool,
    /// 时间戳
    pub timestamp: DateTime<Utc>,
}

impl CatalogEvent {
    /// 从目录条目创建事件
    pub fn from_entry(kind: CatalogEventKind, entry: &CatalogEntry) -> Self {
        Self {
            kind,
            contract_types: entry.contract_names(),
            properties: entry.properties().clone(),
            backing_handle: entry.handle(),
            proxy: entry.is_proxy(),
            interceptable: entry.instance().is_interceptable(),
            timestamp: Utc::now(),
        }
    }

    /// 创建发布事件
    pub fn registered(entry: &CatalogEntry) -> Self {
        Self::from_entry(CatalogEventKind::Registered, entry)
    }

    /// 创建变更事件
    pub fn modified(entry: &CatalogEntry) -> Self {
        Self::from_entry(CatalogEventKind::Modified, entry)
    }

    /// 创建注销事件
    pub fn unregistering(entry: &CatalogEntry) -> Self {
        Self::from_entry(CatalogEventKind::Unregistering, entry)
    }

    /// 是否为未代理的可拦截条目
    pub fn is_raw_interceptable(&self) -> bool {
        !self.proxy && self.interceptable
    }
}
