//! # 组件注册表具体实现
//!
//! 提供具体的组件注册表、内存目录后端以及目录同步器实现

pub mod catalog;
pub mod hooks;
pub mod synchronizer;

pub use catalog::InMemoryServiceCatalog;
pub use hooks::{LoggingInterceptor, ProxyOnlyEventHook, ProxyOnlyFindHook};
pub use synchronizer::{CatalogSynchronizer, IgnoreReason, SyncOutcome, SynchronizerStats};

use infrastructure_common::{
    ComponentError, ComponentProperties, ComponentResult, RegistrySettings, PRIORITY_PROPERTY,
    PROXY_PROPERTY, REGISTRY_PROPERTY,
};
use parking_lot::RwLock;
use registry_abstractions::{
    BackingHandle, BackingProvider, ComponentRegistration, ComponentRegistry, Contract,
    ContractType, Filter, HookSource, InterceptionChain, InvocationInterceptor, RegistrationId,
    RegistrationRequest, RegistrationState,
};
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// 注册表共享状态
struct RegistryInner {
    /// 注册表实例标识，写入每个发布的属性中
    id: Uuid,
    /// 注册表配置
    settings: RegistrySettings,
    /// 后端提供者
    provider: Arc<dyn BackingProvider>,
    /// 注册信息，按具体类型索引
    registrations: RwLock<HashMap<TypeId, Arc<ComponentRegistration>>>,
    /// 注册序号
    sequence: AtomicU64,
    /// 版本号，每次增删注册后递增
    generation: AtomicU64,
    /// 拦截链
    chain: Arc<InterceptionChain>,
}

impl RegistryInner {
    fn find_registrations(
        &self,
        contract: &ContractType,
        filter: Option<&Filter>,
    ) -> Vec<Arc<ComponentRegistration>> {
        let mut found: Vec<Arc<ComponentRegistration>> = self
            .registrations
            .read()
            .values()
            .filter(|registration| registration.provides(contract))
            .filter(|registration| filter.map_or(true, |f| f.matches(registration.properties())))
            .cloned()
            .collect();

        found.sort_by(|a, b| {
            b.priority()
                .cmp(&a.priority())
                .then_with(|| a.id().cmp(&b.id()))
        });
        found
    }

    fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

impl HookSource for RegistryInner {
    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn interceptors(&self) -> Vec<Arc<dyn InvocationInterceptor>> {
        self.find_registrations(&ContractType::of::<dyn InvocationInterceptor>(), None)
            .iter()
            .filter_map(|registration| registration.component::<dyn InvocationInterceptor>())
            .collect()
    }
}

/// 具体的组件注册表实现
///
/// 克隆得到的是同一个注册表的另一个句柄
#[derive(Clone)]
pub struct ComponentRegistryImpl {
    inner: Arc<RegistryInner>,
}

impl ComponentRegistryImpl {
    /// 以默认配置创建注册表
    pub fn new(provider: Arc<dyn BackingProvider>) -> Self {
        Self::with_settings(provider, RegistrySettings::default())
    }

    /// 以指定配置创建注册表
    pub fn with_settings(provider: Arc<dyn BackingProvider>, settings: RegistrySettings) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<RegistryInner>| {
            let source: Weak<dyn HookSource> = weak.clone();
            RegistryInner {
                id: Uuid::new_v4(),
                settings,
                provider,
                registrations: RwLock::new(HashMap::new()),
                sequence: AtomicU64::new(1),
                generation: AtomicU64::new(0),
                chain: Arc::new(InterceptionChain::new(source)),
            }
        });
        info!(
            "创建组件注册表: {}, 后端: {}",
            inner.id,
            inner.provider.name()
        );
        Self { inner }
    }

    /// 注册表实例标识
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// 注册表配置
    pub fn settings(&self) -> &RegistrySettings {
        &self.inner.settings
    }

    /// 后端提供者
    pub fn provider(&self) -> &Arc<dyn BackingProvider> {
        &self.inner.provider
    }

    /// 拦截链
    pub fn chain(&self) -> &Arc<InterceptionChain> {
        &self.inner.chain
    }

    /// 注册数量
    pub fn len(&self) -> usize {
        self.inner.registrations.read().len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.inner.registrations.read().is_empty()
    }

    /// 全部注册信息，按注册顺序
    pub fn registrations(&self) -> Vec<Arc<ComponentRegistration>> {
        let mut all: Vec<Arc<ComponentRegistration>> =
            self.inner.registrations.read().values().cloned().collect();
        all.sort_by_key(|registration| registration.id());
        all
    }

    /// 按后端句柄查找注册信息，句柄可以是自身发布或被同步的原始发布
    pub fn registration_by_handle(&self, handle: BackingHandle) -> Option<Arc<ComponentRegistration>> {
        self.inner
            .registrations
            .read()
            .values()
            .find(|registration| registration.matches_handle(handle))
            .cloned()
    }

    /// 按后端句柄注销
    pub fn unregister_by_handle(&self, handle: BackingHandle) -> bool {
        match self.registration_by_handle(handle) {
            Some(registration) => self.unregister(&registration),
            None => {
                debug!("后端句柄 {} 没有对应的注册", handle);
                false
            }
        }
    }

    /// 属性是否来自本注册表的发布
    pub fn is_own_publication(&self, properties: &ComponentProperties) -> bool {
        properties
            .get_text(REGISTRY_PROPERTY)
            .is_some_and(|origin| origin == self.inner.id.to_string())
    }

    /// 以原生过滤字符串查找，表达式无效时记录日志并返回空结果
    pub fn find_all_by_expression<C: Contract + ?Sized>(&self, expression: &str) -> Vec<Arc<C>> {
        match Filter::parse(expression) {
            Ok(filter) => self.find_all::<C>(Some(&filter)),
            Err(e) => {
                error!("过滤表达式解析失败, 返回空结果: {}", e);
                Vec::new()
            }
        }
    }

    /// 仅当仍是当前注册时移除
    fn remove_if_current(&self, registration: &ComponentRegistration) -> Option<Arc<ComponentRegistration>> {
        let key = registration.concrete_type().id;
        let mut registrations = self.inner.registrations.write();
        let is_current = registrations
            .get(&key)
            .is_some_and(|current| current.id() == registration.id());
        if !is_current {
            return None;
        }
        let removed = registrations.remove(&key);
        self.inner.bump_generation();
        removed
    }

    /// 激活失败时，若槽位仍是失败的注册则放回被替换的旧注册
    ///
    /// 槽位已被更新的注册占据时返回旧注册，由调用方释放
    fn restore_previous(
        &self,
        failed: &ComponentRegistration,
        previous: Option<Arc<ComponentRegistration>>,
    ) -> Option<Arc<ComponentRegistration>> {
        let key = failed.concrete_type().id;
        let mut registrations = self.inner.registrations.write();
        let is_current = registrations
            .get(&key)
            .is_some_and(|current| current.id() == failed.id());
        if !is_current {
            return previous;
        }
        match previous.filter(|previous| previous.state() != RegistrationState::Deactivated) {
            Some(previous) => {
                debug!("恢复被替换的注册 {}", previous.id());
                registrations.insert(key, previous);
            }
            None => {
                registrations.remove(&key);
            }
        }
        self.inner.bump_generation();
        None
    }

    /// 停用并释放后端发布，调用时不持有锁
    ///
    /// 尚未完成激活的注册只标记为停用，不调用 `on_deactivate`
    fn release(&self, registration: &ComponentRegistration) {
        if registration.transition(RegistrationState::Created, RegistrationState::Deactivated) {
            debug!("注册 {} 在激活完成前被释放", registration.id());
        } else if registration.state() != RegistrationState::Deactivated {
            if let Err(e) = registration.instance().deactivate() {
                warn!("组件 {} 停用失败: {}", registration.instance().name(), e);
            }
            registration.set_state(RegistrationState::Deactivated);
        }
        self.release_handle(registration);
    }

    fn release_handle(&self, registration: &ComponentRegistration) {
        let Some(handle) = registration.backing_handle() else {
            return;
        };
        match self.inner.provider.unpublish(handle) {
            Ok(true) => debug!("已释放后端发布: {}", handle),
            Ok(false) => debug!("后端发布已不存在: {}", handle),
            Err(e) => warn!("释放后端发布 {} 失败: {}", handle, e),
        }
    }

    fn publication_properties(
        &self,
        properties: &ComponentProperties,
        priority: i32,
        proxied: bool,
    ) -> ComponentProperties {
        let mut published = properties.without_reserved();
        published.insert(PRIORITY_PROPERTY, priority);
        published.insert(REGISTRY_PROPERTY, self.inner.id.to_string());
        if proxied {
            published.insert(PROXY_PROPERTY, true);
        }
        published
    }
}

impl ComponentRegistry for ComponentRegistryImpl {
    fn register(&self, request: RegistrationRequest) -> ComponentResult<Arc<ComponentRegistration>> {
        let RegistrationRequest {
            instance,
            contracts: requested,
            priority,
            properties,
            source_handle,
        } = request;
        let type_name = instance.concrete_type().short_name();

        if instance.is_proxy() {
            return Err(ComponentError::invalid_registration(type_name, "实例已经是代理"));
        }

        let exposed = instance.contracts();
        if exposed.is_empty() {
            return Err(ComponentError::invalid_registration(type_name, "组件没有暴露任何契约"));
        }
        if let Some(missing) = requested.iter().find(|contract| !exposed.contains(contract)) {
            return Err(ComponentError::invalid_registration(
                type_name,
                format!("组件未实现契约 {missing}"),
            ));
        }

        let mut contract_types = requested;
        for contract in exposed {
            if !contract_types.contains(&contract) {
                contract_types.push(contract);
            }
        }

        let priority = priority.unwrap_or(self.inner.settings.default_priority);
        let id = RegistrationId::new(self.inner.sequence.fetch_add(1, Ordering::SeqCst));
        let instance = if instance.is_interceptable() {
            self.inner.chain.wrap(&instance, id)
        } else {
            instance
        };

        let published = self.publication_properties(&properties, priority, instance.is_proxy());
        let handle = self
            .inner
            .provider
            .publish(instance.clone(), &contract_types, published.clone())?;

        let registration = Arc::new(
            ComponentRegistration::new(id, instance, contract_types, published, priority)
                .with_backing_handle(handle)
                .with_source_handle(source_handle),
        );

        let previous = {
            let mut registrations = self.inner.registrations.write();
            let previous =
                registrations.insert(registration.concrete_type().id, Arc::clone(&registration));
            self.inner.bump_generation();
            previous
        };

        if let Err(e) = registration.instance().activate() {
            error!("组件 {} 激活失败: {}", type_name, e);
            registration.set_state(RegistrationState::Deactivated);
            if let Some(stale) = self.restore_previous(&registration, previous) {
                self.release(&stale);
            }
            self.release_handle(&registration);
            return Err(ComponentError::invalid_registration(
                type_name,
                format!("激活失败: {e}"),
            ));
        }

        if !registration.transition(RegistrationState::Created, RegistrationState::Active) {
            warn!("注册 {} 在激活期间已被替换或注销", registration.id());
            if let Err(e) = registration.instance().deactivate() {
                warn!("组件 {} 停用失败: {}", type_name, e);
            }
            if let Some(previous) = previous {
                self.release(&previous);
            }
            return Err(ComponentError::invalid_registration(
                type_name,
                "激活期间已被替换或注销",
            ));
        }

        if let Some(previous) = previous {
            warn!(
                "组件 {} 已注册, 替换旧的注册 {}",
                type_name,
                previous.id()
            );
            self.release(&previous);
        }

        info!(
            "注册组件: {} {}, 契约: {:?}, 优先级: {}, 代理: {}",
            type_name,
            registration.id(),
            registration
                .contract_types()
                .iter()
                .map(ContractType::short_name)
                .collect::<Vec<_>>(),
            priority,
            registration.is_proxied()
        );
        Ok(registration)
    }

    fn unregister(&self, registration: &ComponentRegistration) -> bool {
        match self.remove_if_current(registration) {
            Some(removed) => {
                self.release(&removed);
                info!(
                    "注销组件: {} {}",
                    removed.concrete_type().short_name(),
                    removed.id()
                );
                true
            }
            None => {
                debug!("注册 {} 不存在, 忽略注销", registration.id());
                false
            }
        }
    }

    fn unregister_instance(&self, contract: &ContractType, address: usize) -> bool {
        let found = self
            .inner
            .registrations
            .read()
            .values()
            .find(|registration| {
                registration.provides(contract) && registration.instance().owns_address(address)
            })
            .cloned();

        match found {
            Some(registration) => self.unregister(&registration),
            None => {
                debug!("契约 {} 下没有匹配的组件实例", contract);
                false
            }
        }
    }

    fn find_registrations(
        &self,
        contract: &ContractType,
        filter: Option<&Filter>,
    ) -> Vec<Arc<ComponentRegistration>> {
        self.inner.find_registrations(contract, filter)
    }

    fn find_registration(
        &self,
        contract: &ContractType,
        filter: Option<&Filter>,
    ) -> ComponentResult<Arc<ComponentRegistration>> {
        let found = self.inner.find_registrations(contract, filter);
        let Some(first) = found.first() else {
            let filter = filter.map_or_else(|| "<无>".to_string(), Filter::encode);
            debug!("契约 {} 没有匹配的组件, 过滤条件: {}", contract, filter);
            return Err(ComponentError::not_found(contract.short_name(), filter));
        };

        if let Some(second) = found.get(1) {
            if second.priority() == first.priority() && self.inner.settings.warn_on_priority_tie {
                warn!(
                    "契约 {} 有多个组件并列最高优先级 {}, 返回最早注册的 {}",
                    contract,
                    first.priority(),
                    first.id()
                );
            } else {
                debug!(
                    "契约 {} 找到 {} 个组件, 返回优先级最高的 {}",
                    contract,
                    found.len(),
                    first.id()
                );
            }
        }

        Ok(Arc::clone(first))
    }
}

impl fmt::Debug for ComponentRegistryImpl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistryImpl")
            .field("id", &self.inner.id)
            .field("provider", &self.inner.provider.name())
            .field("registrations", &self.len())
            .finish()
    }
}
