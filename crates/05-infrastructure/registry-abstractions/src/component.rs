//! 组件定义

use crate::contract::{instance_address, Contract, ContractBinding, ContractExposer, ContractType};
use crate::interceptor::MethodSignature;
use crate::proxy::ProxyHandle;
use infrastructure_common::{ComponentError, ComponentResult, TypeInfo};
use std::fmt;
use std::sync::Arc;

/// 组件基础 trait
///
/// 可注册到注册表中的实现都需要实现此 trait
pub trait Component: Send + Sync + 'static {
    /// 组件名称
    fn name(&self) -> &str {
        self.component_type().name
    }

    /// 组件具体类型
    fn component_type(&self) -> TypeInfo {
        TypeInfo::of::<Self>()
    }

    /// 是否需要经过拦截链，默认不拦截
    fn is_interceptable(&self) -> bool {
        false
    }

    /// 声明组件满足的全部契约
    fn expose(self: Arc<Self>, exposer: &mut ContractExposer);

    /// 激活回调，注册完成后调用一次
    fn on_activate(&self) -> ComponentResult<()> {
        Ok(())
    }

    /// 停用回调，注销时调用一次
    fn on_deactivate(&self) {}
}

const ON_ACTIVATE: MethodSignature = MethodSignature::new("Component", "on_activate");
const ON_DEACTIVATE: MethodSignature = MethodSignature::new("Component", "on_deactivate");

/// 组件实例
///
/// 持有组件本身及其在各契约下的绑定；被代理时绑定指向代理对象，
/// 组件本身仍是唯一的目标实例
#[derive(Clone)]
pub struct ComponentInstance {
    component: Arc<dyn Component>,
    concrete_type: TypeInfo,
    bindings: Arc<[ContractBinding]>,
    proxy: Option<Arc<ProxyHandle>>,
}

impl ComponentInstance {
    /// 从组件创建实例
    pub fn new<T: Component>(component: Arc<T>) -> Self {
        Self::from_dyn(component)
    }

    /// 从组件 trait object 创建实例
    pub fn from_dyn(component: Arc<dyn Component>) -> Self {
        let mut exposer = ContractExposer::new();
        Arc::clone(&component).expose(&mut exposer);
        Self {
            concrete_type: component.component_type(),
            component,
            bindings: exposer.into_bindings().into(),
            proxy: None,
        }
    }

    /// 组件本身（未代理的目标）
    pub fn component(&self) -> &Arc<dyn Component> {
        &self.component
    }

    /// 组件名称
    pub fn name(&self) -> &str {
        self.component.name()
    }

    /// 具体类型
    pub fn concrete_type(&self) -> TypeInfo {
        self.concrete_type
    }

    /// 暴露的契约
    pub fn contracts(&self) -> Vec<ContractType> {
        self.bindings.iter().map(ContractBinding::contract).collect()
    }

    /// 是否提供指定契约
    pub fn provides(&self, contract: &ContractType) -> bool {
        self.bindings
            .iter()
            .any(|binding| binding.contract() == *contract)
    }

    /// 按契约获取对象，被代理时返回代理
    pub fn get<C: Contract + ?Sized>(&self) -> Option<Arc<C>> {
        let contract = ContractType::of::<C>();
        self.bindings
            .iter()
            .find(|binding| binding.contract() == contract)
            .and_then(ContractBinding::get::<C>)
    }

    /// 组件是否声明需要拦截
    pub fn is_interceptable(&self) -> bool {
        self.component.is_interceptable()
    }

    /// 是否为代理
    pub fn is_proxy(&self) -> bool {
        self.proxy.is_some()
    }

    /// 代理句柄
    pub fn proxy_handle(&self) -> Option<&Arc<ProxyHandle>> {
        self.proxy.as_ref()
    }

    /// 判断地址是否指向该实例（目标本身或任一契约绑定）
    pub fn owns_address(&self, address: usize) -> bool {
        instance_address(&self.component) == address
            || self.bindings.iter().any(|binding| binding.address() == address)
    }

    /// 判断是否与另一个实例指向同一目标
    pub fn same_target(&self, other: &Self) -> bool {
        instance_address(&self.component) == instance_address(&other.component)
    }

    /// 用代理句柄包装，不支持拦截的契约保持原绑定
    pub fn with_proxy(&self, handle: Arc<ProxyHandle>) -> Self {
        let bindings: Vec<ContractBinding> = self
            .bindings
            .iter()
            .map(|binding| binding.wrap(&handle).unwrap_or_else(|| binding.clone()))
            .collect();
        Self {
            component: Arc::clone(&self.component),
            concrete_type: self.concrete_type,
            bindings: bindings.into(),
            proxy: Some(handle),
        }
    }

    /// 调用激活回调，被代理时经过拦截链
    pub fn activate(&self) -> ComponentResult<()> {
        match &self.proxy {
            Some(handle) => handle.invoke(&*self.component, &ON_ACTIVATE, &[], |target| {
                target.on_activate()
            }),
            None => self.component.on_activate(),
        }
    }

    /// 调用停用回调，被代理时经过拦截链
    pub fn deactivate(&self) -> ComponentResult<()> {
        match &self.proxy {
            Some(handle) => {
                handle.invoke(&*self.component, &ON_DEACTIVATE, &[], |target| {
                    target.on_deactivate();
                    Ok::<(), ComponentError>(())
                })
            }
            None => {
                self.component.on_deactivate();
                Ok(())
            }
        }
    }
}

impl fmt::Debug for ComponentInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInstance")
            .field("name", &self.name())
            .field("concrete_type", &self.concrete_type.short_name())
            .field("contracts", &self.contracts())
            .field("proxy", &self.is_proxy())
            .finish()
    }
}
