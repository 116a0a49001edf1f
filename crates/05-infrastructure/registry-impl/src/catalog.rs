//! 内存目录后端
//!
//! 模拟模块容器：条目可以由注册表发布，也可以由模块在带外直接发布，
//! 模块停止时其全部条目随之注销。变更事件在目录锁内按顺序分发。

use infrastructure_common::{ComponentError, ComponentProperties, ComponentResult};
use parking_lot::{Mutex, RwLock};
use registry_abstractions::{
    BackingHandle, BackingProvider, CatalogEntry, CatalogEvent, CatalogSubscription,
    ComponentInstance, ContractType, EventHook, Filter, FindHook, SubscriberId,
};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// 默认目录名称
pub const DEFAULT_CATALOG_NAME: &str = "in-memory-catalog";

struct StoredEntry {
    entry: CatalogEntry,
    module: Option<String>,
}

struct Subscriber {
    id: SubscriberId,
    sender: mpsc::UnboundedSender<CatalogEvent>,
}

struct CatalogState {
    open: bool,
    next_handle: u64,
    next_subscriber: u64,
    entries: BTreeMap<BackingHandle, StoredEntry>,
    subscribers: Vec<Subscriber>,
}

/// 内存目录
pub struct InMemoryServiceCatalog {
    name: String,
    state: Mutex<CatalogState>,
    find_hooks: RwLock<Vec<Arc<dyn FindHook>>>,
    event_hooks: RwLock<Vec<Arc<dyn EventHook>>>,
}

impl InMemoryServiceCatalog {
    /// 创建目录
    pub fn new() -> Self {
        Self::with_name(DEFAULT_CATALOG_NAME)
    }

    /// 创建指定名称的目录
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(CatalogState {
                open: true,
                next_handle: 0,
                next_subscriber: 0,
                entries: BTreeMap::new(),
                subscribers: Vec::new(),
            }),
            find_hooks: RwLock::new(Vec::new()),
            event_hooks: RwLock::new(Vec::new()),
        }
    }

    /// 以模块身份在带外发布实例，模块停止时一并注销
    pub fn publish_from_module(
        &self,
        module: &str,
        instance: ComponentInstance,
        contract_types: &[ContractType],
        properties: ComponentProperties,
    ) -> ComponentResult<BackingHandle> {
        self.publish_entry(Some(module.to_string()), instance, contract_types, properties)
    }

    /// 停止模块，注销其发布的全部条目，返回注销数量
    pub fn stop_module(&self, module: &str) -> ComponentResult<usize> {
        let handles = self.module_entries(module);
        let mut stopped = 0;
        for handle in handles {
            if self.unpublish(handle)? {
                stopped += 1;
            }
        }
        info!("停止模块 {}: 注销 {} 个条目", module, stopped);
        Ok(stopped)
    }

    /// 模块发布的全部句柄
    pub fn module_entries(&self, module: &str) -> Vec<BackingHandle> {
        self.state
            .lock()
            .entries
            .iter()
            .filter(|(_, stored)| stored.module.as_deref() == Some(module))
            .map(|(handle, _)| *handle)
            .collect()
    }

    /// 替换条目属性并分发变更事件，句柄不存在时返回 false
    pub fn update_properties(
        &self,
        handle: BackingHandle,
        properties: ComponentProperties,
    ) -> ComponentResult<bool> {
        let mut state = self.state.lock();
        self.ensure_open(&state)?;
        let Some(stored) = state.entries.get_mut(&handle) else {
            return Ok(false);
        };
        stored.entry.set_properties(properties);
        let event = CatalogEvent::modified(&stored.entry);
        self.dispatch(&mut state, &event);
        debug!("目录条目 {} 属性已变更", handle);
        Ok(true)
    }

    /// 全部条目，不经过查询钩子
    pub fn entries(&self) -> Vec<CatalogEntry> {
        self.state
            .lock()
            .entries
            .values()
            .map(|stored| stored.entry.clone())
            .collect()
    }

    /// 条目数量
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// 订阅者数量
    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }

    /// 关闭目录，清空条目并断开全部订阅
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        if !state.open {
            return;
        }
        state.open = false;
        let entries = std::mem::take(&mut state.entries);
        state.subscribers.clear();
        info!("关闭目录 {}: 丢弃 {} 个条目", self.name, entries.len());
    }

    fn ensure_open(&self, state: &CatalogState) -> ComponentResult<()> {
        if state.open {
            Ok(())
        } else {
            Err(ComponentError::provider_unavailable(&self.name, "目录已关闭"))
        }
    }

    fn publish_entry(
        &self,
        module: Option<String>,
        instance: ComponentInstance,
        contract_types: &[ContractType],
        properties: ComponentProperties,
    ) -> ComponentResult<BackingHandle> {
        if contract_types.is_empty() {
            return Err(ComponentError::invalid_registration(
                instance.concrete_type().short_name(),
                "发布时必须指定至少一个契约",
            ));
        }

        let mut state = self.state.lock();
        self.ensure_open(&state)?;

        state.next_handle += 1;
        let handle = BackingHandle::new(state.next_handle);
        let entry = CatalogEntry::new(handle, instance, contract_types.to_vec(), properties);
        let event = CatalogEvent::registered(&entry);
        debug!(
            "发布目录条目 {}: {} ({:?})",
            handle,
            entry.instance().name(),
            module
        );
        state.entries.insert(handle, StoredEntry { entry, module });
        self.dispatch(&mut state, &event);
        Ok(handle)
    }

    /// 在目录锁内分发事件，同时清理已关闭的订阅
    fn dispatch(&self, state: &mut CatalogState, event: &CatalogEvent) {
        let hooks = self.event_hooks.read();
        state.subscribers.retain(|subscriber| {
            if !hooks.iter().all(|hook| hook.deliver(event, subscriber.id)) {
                return true;
            }
            let delivered = subscriber.sender.send(event.clone()).is_ok();
            if !delivered {
                debug!("订阅者 {:?} 已断开", subscriber.id);
            }
            delivered
        });
    }
}

impl Default for InMemoryServiceCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl BackingProvider for InMemoryServiceCatalog {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_available(&self) -> bool {
        self.state.lock().open
    }

    fn publish(
        &self,
        instance: ComponentInstance,
        contract_types: &[ContractType],
        properties: ComponentProperties,
    ) -> ComponentResult<BackingHandle> {
        self.publish_entry(None, instance, contract_types, properties)
    }

    fn unpublish(&self, handle: BackingHandle) -> ComponentResult<bool> {
        let mut state = self.state.lock();
        self.ensure_open(&state)?;
        let Some(stored) = state.entries.get(&handle) else {
            return Ok(false);
        };
        let event = CatalogEvent::unregistering(&stored.entry);
        self.dispatch(&mut state, &event);
        state.entries.remove(&handle);
        debug!("注销目录条目 {}", handle);
        Ok(true)
    }

    fn lookup(&self, handle: BackingHandle) -> ComponentResult<Option<CatalogEntry>> {
        let state = self.state.lock();
        self.ensure_open(&state)?;
        Ok(state.entries.get(&handle).map(|stored| stored.entry.clone()))
    }

    fn query(
        &self,
        contract: &ContractType,
        filter: Option<&str>,
    ) -> ComponentResult<Vec<CatalogEntry>> {
        let filter = filter.map(Filter::parse).transpose()?;

        let mut entries: Vec<CatalogEntry> = {
            let state = self.state.lock();
            self.ensure_open(&state)?;
            state
                .entries
                .values()
                .map(|stored| &stored.entry)
                .filter(|entry| entry.provides(contract))
                .filter(|entry| filter.as_ref().map_or(true, |f| f.matches(entry.properties())))
                .cloned()
                .collect()
        };

        for hook in self.find_hooks.read().iter() {
            let before = entries.len();
            hook.filter_entries(&mut entries);
            if entries.len() != before {
                debug!(
                    "查询钩子 {} 隐藏了 {} 个条目",
                    hook.name(),
                    before - entries.len()
                );
            }
        }

        entries.sort_by(|a, b| {
            let priority = |entry: &CatalogEntry| entry.properties().priority().unwrap_or(0);
            priority(b)
                .cmp(&priority(a))
                .then_with(|| a.handle().cmp(&b.handle()))
        });
        Ok(entries)
    }

    fn subscribe(&self) -> ComponentResult<CatalogSubscription> {
        let mut state = self.state.lock();
        self.ensure_open(&state)?;

        state.next_subscriber += 1;
        let id = SubscriberId::new(state.next_subscriber);
        let (sender, events) = mpsc::unbounded_channel();
        let snapshot = state
            .entries
            .values()
            .map(|stored| stored.entry.clone())
            .collect();
        state.subscribers.push(Subscriber { id, sender });
        debug!("新增目录订阅者 {:?}", id);

        Ok(CatalogSubscription {
            id,
            snapshot,
            events,
        })
    }

    fn add_find_hook(&self, hook: Arc<dyn FindHook>) {
        debug!("添加查询钩子: {}", hook.name());
        self.find_hooks.write().push(hook);
    }

    fn add_event_hook(&self, hook: Arc<dyn EventHook>) {
        debug!("添加事件钩子: {}", hook.name());
        self.event_hooks.write().push(hook);
    }
}

impl fmt::Debug for InMemoryServiceCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("InMemoryServiceCatalog")
            .field("name", &self.name)
            .field("open", &state.open)
            .field("entries", &state.entries.len())
            .field("subscribers", &state.subscribers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use registry_abstractions::{CatalogEventKind, Component, ContractExposer};

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    impl registry_abstractions::Contract for dyn Greeter {}

    struct English;

    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".to_string()
        }
    }

    impl Component for English {
        fn expose(self: Arc<Self>, exposer: &mut ContractExposer) {
            exposer.provide::<dyn Greeter>(self);
        }
    }

    fn greeter() -> ComponentInstance {
        ComponentInstance::new(Arc::new(English))
    }

    fn contracts() -> Vec<ContractType> {
        vec![ContractType::of::<dyn Greeter>()]
    }

    #[test]
    fn test_publish_and_query() {
        let catalog = InMemoryServiceCatalog::new();
        let low = catalog
            .publish(
                greeter(),
                &contracts(),
                ComponentProperties::new().with("component.priority", 1).with("lang", "en"),
            )
            .unwrap();
        let high = catalog
            .publish(
                greeter(),
                &contracts(),
                ComponentProperties::new().with("component.priority", 5),
            )
            .unwrap();

        let all = catalog.query(&contracts()[0], None).unwrap();
        assert_eq!(
            all.iter().map(CatalogEntry::handle).collect::<Vec<_>>(),
            vec![high, low]
        );

        let filtered = catalog.query(&contracts()[0], Some("(lang=en)")).unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].handle(), low);
    }

    #[test]
    fn test_query_with_invalid_filter() {
        let catalog = InMemoryServiceCatalog::new();
        let error = catalog.query(&contracts()[0], Some("(lang=en")).unwrap_err();
        assert!(matches!(error, ComponentError::InvalidFilter { .. }));
    }

    #[test]
    fn test_publish_requires_contract() {
        let catalog = InMemoryServiceCatalog::new();
        let error = catalog
            .publish(greeter(), &[], ComponentProperties::new())
            .unwrap_err();
        assert!(matches!(error, ComponentError::InvalidRegistration { .. }));
    }

    #[test]
    fn test_subscription_sees_snapshot_then_events() {
        let catalog = InMemoryServiceCatalog::new();
        let first = catalog
            .publish(greeter(), &contracts(), ComponentProperties::new())
            .unwrap();

        let mut subscription = catalog.subscribe().unwrap();
        assert_eq!(subscription.snapshot.len(), 1);
        assert_eq!(subscription.snapshot[0].handle(), first);

        let second = catalog
            .publish_from_module("bundle-a", greeter(), &contracts(), ComponentProperties::new())
            .unwrap();
        catalog
            .update_properties(second, ComponentProperties::new().with("lang", "en"))
            .unwrap();
        assert_eq!(catalog.stop_module("bundle-a").unwrap(), 1);

        let kinds: Vec<(CatalogEventKind, BackingHandle)> = std::iter::from_fn(|| {
            subscription
                .events
                .try_recv()
                .ok()
                .map(|event| (event.kind, event.backing_handle))
        })
        .collect();
        assert_eq!(
            kinds,
            vec![
                (CatalogEventKind::Registered, second),
                (CatalogEventKind::Modified, second),
                (CatalogEventKind::Unregistering, second),
            ]
        );
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_unpublish_unknown_handle() {
        let catalog = InMemoryServiceCatalog::new();
        assert!(!catalog.unpublish(BackingHandle::new(42)).unwrap());
        assert!(!catalog
            .update_properties(BackingHandle::new(42), ComponentProperties::new())
            .unwrap());
    }

    #[test]
    fn test_dropped_subscriber_is_removed() {
        let catalog = InMemoryServiceCatalog::new();
        let subscription = catalog.subscribe().unwrap();
        assert_eq!(catalog.subscriber_count(), 1);
        drop(subscription);

        catalog
            .publish(greeter(), &contracts(), ComponentProperties::new())
            .unwrap();
        assert_eq!(catalog.subscriber_count(), 0);
    }

    #[test]
    fn test_shutdown_makes_catalog_unavailable() {
        let catalog = InMemoryServiceCatalog::new();
        catalog
            .publish(greeter(), &contracts(), ComponentProperties::new())
            .unwrap();
        catalog.shutdown();

        assert!(!catalog.is_available());
        assert!(catalog.is_empty());
        let error = catalog
            .publish(greeter(), &contracts(), ComponentProperties::new())
            .unwrap_err();
        assert!(matches!(error, ComponentError::ProviderUnavailable { .. }));
        assert!(catalog.subscribe().is_err());
    }
}
