//! 目录同步器
//!
//! 监听后端目录的带外变更：模块直接发布的可拦截组件会被收编进注册表并以代理形式重新发布，
//! 原始条目被注销时对应的注册随之移除，条目变更时注册被重建。
//! 事件可能重放，处理过程是幂等的。

use crate::hooks::{ProxyOnlyEventHook, ProxyOnlyFindHook};
use crate::ComponentRegistryImpl;
use async_trait::async_trait;
use infrastructure_common::{
    ComponentProperties, Lifecycle, LifecycleError, LifecycleResult, LifecycleState,
    SynchronizerSettings,
};
use registry_abstractions::{
    BackingHandle, CatalogEntry, CatalogEvent, CatalogEventKind, CatalogSubscription,
    ComponentRegistry, EventHook, RegistrationId, RegistrationRequest, RegistrationState,
    SubscriberId,
};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 事件被忽略的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// 条目本身是代理
    ProxyEntry,
    /// 条目由本注册表发布
    OwnPublication,
    /// 条目已被收编
    AlreadyAdopted,
    /// 组件不需要拦截
    NotInterceptable,
    /// 处理时条目已不存在
    EntryGone,
    /// 没有与句柄关联的注册
    UnknownHandle,
}

/// 单个事件的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// 收编为新的注册
    Adopted(RegistrationId),
    /// 移除了关联的注册
    Removed,
    /// 重建了关联的注册
    Refreshed(RegistrationId),
    /// 忽略
    Ignored(IgnoreReason),
    /// 后端或注册表出错，已记录日志
    Failed,
}

/// 同步器统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SynchronizerStats {
    /// 收编数量
    pub adopted: u64,
    /// 移除数量
    pub removed: u64,
    /// 重建数量
    pub refreshed: u64,
    /// 忽略数量
    pub ignored: u64,
    /// 失败数量
    pub failed: u64,
}

#[derive(Default)]
struct SyncCounters {
    adopted: AtomicU64,
    removed: AtomicU64,
    refreshed: AtomicU64,
    ignored: AtomicU64,
    failed: AtomicU64,
}

struct SyncWorker {
    registry: ComponentRegistryImpl,
    counters: SyncCounters,
}

impl SyncWorker {
    fn process_event(&self, event: &CatalogEvent) -> SyncOutcome {
        let handle = event.backing_handle;
        debug!("处理目录事件 {:?}: {}", event.kind, handle);

        let outcome = match event.kind {
            CatalogEventKind::Registered => self.adopt(handle, event.proxy, &event.properties),
            CatalogEventKind::Unregistering => self.release(handle),
            CatalogEventKind::Modified => self.refresh(handle, event.proxy, &event.properties),
        };
        self.record(outcome);
        outcome
    }

    fn initial_scan(&self, snapshot: &[CatalogEntry]) -> usize {
        snapshot
            .iter()
            .map(|entry| self.process_event(&CatalogEvent::registered(entry)))
            .filter(|outcome| matches!(outcome, SyncOutcome::Adopted(_)))
            .count()
    }

    fn adopt(&self, handle: BackingHandle, proxy: bool, properties: &ComponentProperties) -> SyncOutcome {
        if proxy {
            return SyncOutcome::Ignored(IgnoreReason::ProxyEntry);
        }
        if self.registry.is_own_publication(properties) {
            return SyncOutcome::Ignored(IgnoreReason::OwnPublication);
        }
        if self.registry.registration_by_handle(handle).is_some() {
            return SyncOutcome::Ignored(IgnoreReason::AlreadyAdopted);
        }

        let entry = match self.registry.provider().lookup(handle) {
            Ok(Some(entry)) => entry,
            Ok(None) => return SyncOutcome::Ignored(IgnoreReason::EntryGone),
            Err(e) => {
                warn!("读取目录条目 {} 失败: {}", handle, e);
                return SyncOutcome::Failed;
            }
        };
        if entry.is_proxy() || entry.instance().is_proxy() {
            return SyncOutcome::Ignored(IgnoreReason::ProxyEntry);
        }
        if !entry.instance().is_interceptable() {
            return SyncOutcome::Ignored(IgnoreReason::NotInterceptable);
        }

        let mut request = RegistrationRequest::from_instance(entry.instance().clone())
            .with_properties(entry.properties().without_reserved())
            .with_source_handle(handle);
        for contract in entry.contract_types() {
            request = request.with_contract_type(*contract);
        }
        if let Some(priority) = entry.properties().priority() {
            request = request.with_priority(priority);
        }

        match self.registry.register(request) {
            Ok(registration) => {
                info!(
                    "收编目录条目 {}: {} {}",
                    handle,
                    entry.instance().name(),
                    registration.id()
                );
                SyncOutcome::Adopted(registration.id())
            }
            Err(e) => {
                warn!("收编目录条目 {} 失败: {}", handle, e);
                SyncOutcome::Failed
            }
        }
    }

    fn release(&self, handle: BackingHandle) -> SyncOutcome {
        let Some(registration) = self.registry.registration_by_handle(handle) else {
            return SyncOutcome::Ignored(IgnoreReason::UnknownHandle);
        };
        if self.registry.unregister(&registration) {
            info!("目录条目 {} 已注销, 移除注册 {}", handle, registration.id());
            SyncOutcome::Removed
        } else {
            SyncOutcome::Ignored(IgnoreReason::UnknownHandle)
        }
    }

    fn refresh(&self, handle: BackingHandle, proxy: bool, properties: &ComponentProperties) -> SyncOutcome {
        if proxy {
            return SyncOutcome::Ignored(IgnoreReason::ProxyEntry);
        }
        if self.registry.is_own_publication(properties) {
            return SyncOutcome::Ignored(IgnoreReason::OwnPublication);
        }

        let removed = self.release(handle) == SyncOutcome::Removed;
        match self.adopt(handle, proxy, properties) {
            SyncOutcome::Adopted(id) => {
                if let Some(registration) = self.registry.registration_by_handle(handle) {
                    registration.transition(RegistrationState::Active, RegistrationState::Modified);
                }
                SyncOutcome::Refreshed(id)
            }
            _ if removed => SyncOutcome::Removed,
            other => other,
        }
    }

    fn record(&self, outcome: SyncOutcome) {
        let counter = match outcome {
            SyncOutcome::Adopted(_) => &self.counters.adopted,
            SyncOutcome::Removed => &self.counters.removed,
            SyncOutcome::Refreshed(_) => &self.counters.refreshed,
            SyncOutcome::Ignored(_) => &self.counters.ignored,
            SyncOutcome::Failed => &self.counters.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn stats(&self) -> SynchronizerStats {
        SynchronizerStats {
            adopted: self.counters.adopted.load(Ordering::Relaxed),
            removed: self.counters.removed.load(Ordering::Relaxed),
            refreshed: self.counters.refreshed.load(Ordering::Relaxed),
            ignored: self.counters.ignored.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}

/// 目录同步器
pub struct CatalogSynchronizer {
    worker: Arc<SyncWorker>,
    settings: SynchronizerSettings,
    state: LifecycleState,
    subscriber: Option<SubscriberId>,
    event_hook: Option<Arc<ProxyOnlyEventHook>>,
    task: Option<JoinHandle<()>>,
}

impl CatalogSynchronizer {
    /// 以默认配置创建同步器
    pub fn new(registry: ComponentRegistryImpl) -> Self {
        Self::with_settings(registry, SynchronizerSettings::default())
    }

    /// 以指定配置创建同步器
    pub fn with_settings(registry: ComponentRegistryImpl, settings: SynchronizerSettings) -> Self {
        Self {
            worker: Arc::new(SyncWorker {
                registry,
                counters: SyncCounters::default(),
            }),
            settings,
            state: LifecycleState::Created,
            subscriber: None,
            event_hook: None,
            task: None,
        }
    }

    /// 处理单个目录事件
    pub fn process_event(&self, event: &CatalogEvent) -> SyncOutcome {
        self.worker.process_event(event)
    }

    /// 扫描已发布的条目，返回收编数量
    pub fn initial_scan(&self, snapshot: &[CatalogEntry]) -> usize {
        self.worker.initial_scan(snapshot)
    }

    /// 统计快照
    pub fn stats(&self) -> SynchronizerStats {
        self.worker.stats()
    }

    /// 当前订阅者标识
    pub fn subscriber(&self) -> Option<SubscriberId> {
        self.subscriber
    }

    /// 是否运行中
    pub fn is_running(&self) -> bool {
        self.state == LifecycleState::Running
    }

    /// 所属注册表
    pub fn registry(&self) -> &ComponentRegistryImpl {
        &self.worker.registry
    }

    fn install_hooks(&mut self, subscriber: SubscriberId) {
        if let Some(hook) = &self.event_hook {
            hook.set_exempt(subscriber);
            return;
        }
        let provider = self.worker.registry.provider();
        let hook = Arc::new(ProxyOnlyEventHook::new(subscriber));
        provider.add_find_hook(Arc::new(ProxyOnlyFindHook::new()));
        provider.add_event_hook(Arc::clone(&hook) as Arc<dyn EventHook>);
        self.event_hook = Some(hook);
        debug!("已安装目录钩子, 豁免订阅者 {:?}", subscriber);
    }
}

#[async_trait]
impl Lifecycle for CatalogSynchronizer {
    async fn on_start(&mut self) -> LifecycleResult<()> {
        self.state.ensure_can_start()?;
        self.state = LifecycleState::Starting;
        info!("启动目录同步器");

        let subscription = match self.worker.registry.provider().subscribe() {
            Ok(subscription) => subscription,
            Err(e) => {
                self.state = LifecycleState::Failed;
                return Err(LifecycleError::StartFailed {
                    message: format!("订阅目录失败: {e}"),
                });
            }
        };

        if self.settings.hide_raw_entries {
            self.install_hooks(subscription.id);
        }
        self.subscriber = Some(subscription.id);

        let CatalogSubscription {
            snapshot,
            mut events,
            ..
        } = subscription;

        if self.settings.initial_scan {
            let adopted = self.worker.initial_scan(&snapshot);
            info!("初始扫描完成: {} 个条目, 收编 {} 个", snapshot.len(), adopted);
        }

        let worker = Arc::clone(&self.worker);
        self.task = Some(tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                worker.process_event(&event);
            }
            debug!("目录事件通道已关闭");
        }));

        self.state = LifecycleState::Running;
        info!("目录同步器已启动");
        Ok(())
    }

    async fn on_stop(&mut self) -> LifecycleResult<()> {
        if !self.state.can_stop() {
            return Err(LifecycleError::InvalidState {
                current: self.state.to_string(),
                expected: LifecycleState::Running.to_string(),
            });
        }
        self.state = LifecycleState::Stopping;
        info!("停止目录同步器");

        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.subscriber = None;
        self.state = LifecycleState::Stopped;
        info!("目录同步器已停止, 统计: {:?}", self.stats());
        Ok(())
    }

    fn lifecycle_state(&self) -> LifecycleState {
        self.state
    }
}

impl Drop for CatalogSynchronizer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
