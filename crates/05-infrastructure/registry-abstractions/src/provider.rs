//! 后端提供者抽象
//!
//! 后端提供者是实际承载组件实例的外部目录（模块容器或应用上下文）。
//! 注册表通过它发布组件，同步器通过它的订阅接口感知目录的带外变更。

use crate::component::ComponentInstance;
use crate::contract::ContractType;
use crate::events::CatalogEvent;
use infrastructure_common::{ComponentProperties, ComponentResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// 后端发布句柄，用于注销发布
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BackingHandle(u64);

impl BackingHandle {
    /// 创建句柄
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// 句柄值
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BackingHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handle-{}", self.0)
    }
}

/// 订阅者标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// 创建订阅者标识
    pub const fn new(value: u64) -> Self {
        Self(value)
    }
}

/// 目录条目
#[derive(Clone)]
pub struct CatalogEntry {
    handle: BackingHandle,
    instance: ComponentInstance,
    contract_types: Vec<ContractType>,
    properties: ComponentProperties,
}

impl CatalogEntry {
    /// 创建目录条目
    pub fn new(
        handle: BackingHandle,
        instance: ComponentInstance,
        contract_types: Vec<ContractType>,
        properties: ComponentProperties,
    ) -> Self {
        Self {
            handle,
            instance,
            contract_types,
            properties,
        }
    }

    /// 发布句柄
    pub fn handle(&self) -> BackingHandle {
        self.handle
    }

    /// 组件实例
    pub fn instance(&self) -> &ComponentInstance {
        &self.instance
    }

    /// 契约类型
    pub fn contract_types(&self) -> &[ContractType] {
        &self.contract_types
    }

    /// 契约名称
    pub fn contract_names(&self) -> Vec<String> {
        self.contract_types
            .iter()
            .map(|contract| contract.name().to_string())
            .collect()
    }

    /// 是否提供指定契约
    pub fn provides(&self, contract: &ContractType) -> bool {
        self.contract_types.contains(contract)
    }

    /// 属性
    pub fn properties(&self) -> &ComponentProperties {
        &self.properties
    }

    /// 替换属性
    pub fn set_properties(&mut self, properties: ComponentProperties) {
        self.properties = properties;
    }

    /// 是否带有代理标记
    pub fn is_proxy(&self) -> bool {
        self.properties.is_proxy()
    }

    /// 是否为需要拦截但尚未代理的原始发布
    pub fn is_raw_interceptable(&self) -> bool {
        !self.is_proxy() && self.instance.is_interceptable()
    }
}

impl fmt::Debug for CatalogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogEntry")
            .field("handle", &self.handle)
            .field("component", &self.instance.name())
            .field("contract_types", &self.contract_types)
            .field("properties", &self.properties)
            .finish()
    }
}

/// 查询钩子，可从查询结果中移除条目
pub trait FindHook: Send + Sync {
    /// 钩子名称
    fn name(&self) -> &str;

    /// 过滤查询结果
    fn filter_entries(&self, entries: &mut Vec<CatalogEntry>);
}

/// 事件钩子，决定订阅者是否收到某个事件
pub trait EventHook: Send + Sync {
    /// 钩子名称
    fn name(&self) -> &str;

    /// 返回 false 时该订阅者不会收到事件
    fn deliver(&self, event: &CatalogEvent, subscriber: SubscriberId) -> bool;
}

/// 订阅结果
///
/// 快照与事件通道在同一临界区内建立，快照之后的全部变更都会出现在通道中
#[derive(Debug)]
pub struct CatalogSubscription {
    /// 订阅者标识
    pub id: SubscriberId,
    /// 订阅时刻已发布的全部条目
    pub snapshot: Vec<CatalogEntry>,
    /// 后续变更事件
    pub events: mpsc::UnboundedReceiver<CatalogEvent>,
}

/// 后端提供者 trait
pub trait BackingProvider: Send + Sync {
    /// 提供者名称
    fn name(&self) -> &str;

    /// 是否可用
    fn is_available(&self) -> bool;

    /// 以契约类型与属性发布实例
    fn publish(
        &self,
        instance: ComponentInstance,
        contract_types: &[ContractType],
        properties: ComponentProperties,
    ) -> ComponentResult<BackingHandle>;

    /// 注销发布，句柄不存在时返回 false
    fn unpublish(&self, handle: BackingHandle) -> ComponentResult<bool>;

    /// 按句柄读取条目，不经过查询钩子
    fn lookup(&self, handle: BackingHandle) -> ComponentResult<Option<CatalogEntry>>;

    /// 按契约与原生过滤字符串查询，结果经过查询钩子
    fn query(
        &self,
        contract: &ContractType,
        filter: Option<&str>,
    ) -> ComponentResult<Vec<CatalogEntry>>;

    /// 订阅目录变更
    fn subscribe(&self) -> ComponentResult<CatalogSubscription>;

    /// 添加查询钩子
    fn add_find_hook(&self, hook: Arc<dyn FindHook>);

    /// 添加事件钩子
    fn add_event_hook(&self, hook: Arc<dyn EventHook>);
}
