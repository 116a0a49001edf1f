//! 组件注册表抽象接口

use crate::component::{Component, ComponentInstance};
use crate::contract::{instance_address, Contract, ContractType};
use crate::filter::Filter;
use crate::provider::BackingHandle;
use infrastructure_common::{
    ComponentError, ComponentProperties, ComponentResult, PropertyValue, TypeInfo,
};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// 注册标识
///
/// 按注册顺序单调递增，同优先级时作为稳定的排序依据
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrationId(u64);

impl RegistrationId {
    /// 创建注册标识
    pub const fn new(sequence: u64) -> Self {
        Self(sequence)
    }

    /// 序号
    pub const fn sequence(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 注册状态
///
/// `Created → Active → (Modified)* → Deactivated`，`Modified` 只由目录同步器产生
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistrationState {
    /// 已创建，尚未激活
    Created,
    /// 已激活
    Active,
    /// 已由同步器根据后端变更重建
    Modified,
    /// 已停用
    Deactivated,
}

/// 组件注册信息
pub struct ComponentRegistration {
    id: RegistrationId,
    contract_types: Vec<ContractType>,
    instance: ComponentInstance,
    properties: ComponentProperties,
    priority: i32,
    backing_handle: Option<BackingHandle>,
    source_handle: Option<BackingHandle>,
    state: RwLock<RegistrationState>,
}

impl ComponentRegistration {
    /// 创建注册信息
    pub fn new(
        id: RegistrationId,
        instance: ComponentInstance,
        contract_types: Vec<ContractType>,
        properties: ComponentProperties,
        priority: i32,
    ) -> Self {
        Self {
            id,
            contract_types,
            instance,
            properties,
            priority,
            backing_handle: None,
            source_handle: None,
            state: RwLock::new(RegistrationState::Created),
        }
    }

    /// 设置后端发布句柄
    #[must_use]
    pub fn with_backing_handle(mut self, handle: BackingHandle) -> Self {
        self.backing_handle = Some(handle);
        self
    }

    /// 设置被同步的原始发布句柄
    #[must_use]
    pub fn with_source_handle(mut self, handle: Option<BackingHandle>) -> Self {
        self.source_handle = handle;
        self
    }

    /// 注册标识
    pub fn id(&self) -> RegistrationId {
        self.id
    }

    /// 契约类型
    pub fn contract_types(&self) -> &[ContractType] {
        &self.contract_types
    }

    /// 是否提供指定契约
    pub fn provides(&self, contract: &ContractType) -> bool {
        self.contract_types.contains(contract)
    }

    /// 具体类型
    pub fn concrete_type(&self) -> TypeInfo {
        self.instance.concrete_type()
    }

    /// 组件实例（可能已被代理）
    pub fn instance(&self) -> &ComponentInstance {
        &self.instance
    }

    /// 按契约获取组件
    pub fn component<C: Contract + ?Sized>(&self) -> Option<Arc<C>> {
        self.instance.get::<C>()
    }

    /// 属性
    pub fn properties(&self) -> &ComponentProperties {
        &self.properties
    }

    /// 优先级
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// 后端发布句柄
    pub fn backing_handle(&self) -> Option<BackingHandle> {
        self.backing_handle
    }

    /// 被同步的原始发布句柄，仅同步器创建的注册有值
    pub fn source_handle(&self) -> Option<BackingHandle> {
        self.source_handle
    }

    /// 是否经过代理
    pub fn is_proxied(&self) -> bool {
        self.instance.is_proxy()
    }

    /// 当前状态
    pub fn state(&self) -> RegistrationState {
        *self.state.read()
    }

    /// 更新状态
    pub fn set_state(&self, state: RegistrationState) {
        *self.state.write() = state;
    }

    /// 仅当当前状态为 `from` 时切换到 `to`
    pub fn transition(&self, from: RegistrationState, to: RegistrationState) -> bool {
        let mut state = self.state.write();
        if *state != from {
            return false;
        }
        *state = to;
        true
    }

    /// 是否与后端句柄关联（自身发布或被同步的原始发布）
    pub fn matches_handle(&self, handle: BackingHandle) -> bool {
        self.backing_handle == Some(handle) || self.source_handle == Some(handle)
    }
}

impl fmt::Debug for ComponentRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistration")
            .field("id", &self.id)
            .field("concrete_type", &self.concrete_type().short_name())
            .field("contract_types", &self.contract_types)
            .field("priority", &self.priority)
            .field("properties", &self.properties)
            .field("backing_handle", &self.backing_handle)
            .field("source_handle", &self.source_handle)
            .field("proxied", &self.is_proxied())
            .field("state", &self.state())
            .finish()
    }
}

/// 注册请求
#[derive(Debug, Clone)]
pub struct RegistrationRequest {
    /// 组件实例
    pub instance: ComponentInstance,
    /// 显式请求的契约
    pub contracts: Vec<ContractType>,
    /// 优先级，未指定时使用默认值
    pub priority: Option<i32>,
    /// 属性
    pub properties: ComponentProperties,
    /// 被同步的原始发布句柄
    pub source_handle: Option<BackingHandle>,
}

impl RegistrationRequest {
    /// 创建注册请求
    pub fn new<T: Component>(component: Arc<T>) -> Self {
        Self::from_instance(ComponentInstance::new(component))
    }

    /// 从组件实例创建注册请求
    pub fn from_instance(instance: ComponentInstance) -> Self {
        Self {
            instance,
            contracts: Vec::new(),
            priority: None,
            properties: ComponentProperties::new(),
            source_handle: None,
        }
    }

    /// 显式请求契约 `C`
    #[must_use]
    pub fn with_contract<C: Contract + ?Sized>(self) -> Self {
        self.with_contract_type(ContractType::of::<C>())
    }

    /// 显式请求契约类型
    #[must_use]
    pub fn with_contract_type(mut self, contract: ContractType) -> Self {
        if !self.contracts.contains(&contract) {
            self.contracts.push(contract);
        }
        self
    }

    /// 设置优先级
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// 添加属性
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key, value);
        self
    }

    /// 合并属性
    #[must_use]
    pub fn with_properties(mut self, properties: ComponentProperties) -> Self {
        self.properties.merge(&properties);
        self
    }

    /// 记录被同步的原始发布句柄
    #[must_use]
    pub fn with_source_handle(mut self, handle: BackingHandle) -> Self {
        self.source_handle = Some(handle);
        self
    }
}

/// 组件注册表 trait
///
/// 提供组件注册、注销与按契约查找的核心接口
pub trait ComponentRegistry: Send + Sync {
    /// 注册组件
    fn register(&self, request: RegistrationRequest) -> ComponentResult<Arc<ComponentRegistration>>;

    /// 注销注册信息，不存在时返回 false
    fn unregister(&self, registration: &ComponentRegistration) -> bool;

    /// 按契约与对象地址注销，地址可以是原始对象也可以是代理
    fn unregister_instance(&self, contract: &ContractType, address: usize) -> bool;

    /// 查找全部匹配的注册信息，按优先级降序
    fn find_registrations(
        &self,
        contract: &ContractType,
        filter: Option<&Filter>,
    ) -> Vec<Arc<ComponentRegistration>>;

    /// 查找优先级最高的注册信息
    fn find_registration(
        &self,
        contract: &ContractType,
        filter: Option<&Filter>,
    ) -> ComponentResult<Arc<ComponentRegistration>>;

    /// 按组件对象注销
    fn unregister_component<C: Contract + ?Sized>(&self, component: &Arc<C>) -> bool
    where
        Self: Sized,
    {
        self.unregister_instance(&ContractType::of::<C>(), instance_address(component))
    }

    /// 查找全部实现契约 `C` 的组件，按优先级降序
    fn find_all<C: Contract + ?Sized>(&self, filter: Option<&Filter>) -> Vec<Arc<C>>
    where
        Self: Sized,
    {
        self.find_registrations(&ContractType::of::<C>(), filter)
            .iter()
            .filter_map(|registration| registration.component::<C>())
            .collect()
    }

    /// 查找优先级最高的组件
    fn find<C: Contract + ?Sized>(&self, filter: Option<&Filter>) -> ComponentResult<Arc<C>>
    where
        Self: Sized,
    {
        let contract = ContractType::of::<C>();
        self.find_registration(&contract, filter)?
            .component::<C>()
            .ok_or_else(|| {
                ComponentError::not_found(
                    contract.short_name(),
                    filter.map_or_else(|| "<无>".to_string(), Filter::encode),
                )
            })
    }
}
